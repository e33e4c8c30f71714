//! Range compression for change notifications and dumps.
//!
//! A walk over consecutive VLANs feeds every VLAN into a [`RangeBatcher`].
//! Changed VLANs extend the open range while they are mergeable with its
//! last member; anything else closes it.

use serde::Serialize;
use sonic_types::VlanId;

use crate::callbacks::{McastOps, VlanGroup};
use crate::config::Capabilities;
use crate::types::{EntryFlags, McastContext, StpState, TunnelInfo, VlanEntry};

/// Inclusive run of VLANs reported together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChangeRange {
    pub start: VlanId,
    pub end: VlanId,
}

impl ChangeRange {
    pub fn single(vid: VlanId) -> Self {
        Self {
            start: vid,
            end: vid,
        }
    }

    pub fn as_raw(&self) -> (u16, u16) {
        (self.start.get(), self.end.get())
    }
}

/// Snapshot a batcher keeps of a range's last member.
pub trait RangeMember: Copy {
    fn vid(&self) -> VlanId;
}

/// Per-VLAN option values that decide range membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VlanOptsView {
    pub vid: VlanId,
    pub flags: EntryFlags,
    pub state: StpState,
    pub tunnel: TunnelInfo,
    pub mcast_router: u8,
    pub mcast_max_groups: u32,
    pub neigh_suppress: bool,
}

impl VlanOptsView {
    pub fn capture(entry: &VlanEntry, mcast: &dyn McastOps, caps: Capabilities) -> Self {
        let (mcast_router, mcast_max_groups) = if caps.multicast {
            (mcast.router_mode(entry), entry.port_mcast.max_groups)
        } else {
            (0, 0)
        };
        Self {
            vid: entry.vid,
            flags: entry.flags,
            state: entry.state,
            tunnel: entry.tunnel,
            mcast_router,
            mcast_max_groups,
            neigh_suppress: entry.neigh_suppress(),
        }
    }
}

impl RangeMember for VlanOptsView {
    fn vid(&self) -> VlanId {
        self.vid
    }
}

/// Bridge-wide option values that decide global range membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlobalOptsView {
    pub vid: VlanId,
    pub mcast_enabled: bool,
    pub msti: u16,
    pub mcast_ctx: McastContext,
}

impl GlobalOptsView {
    pub fn capture(entry: &VlanEntry) -> Self {
        Self {
            vid: entry.vid,
            mcast_enabled: entry.global_mcast_enabled(),
            msti: entry.msti,
            mcast_ctx: entry.mcast_ctx,
        }
    }
}

impl RangeMember for GlobalOptsView {
    fn vid(&self) -> VlanId {
        self.vid
    }
}

fn tunnels_mergeable(curr: &VlanOptsView, range_end: &VlanOptsView) -> bool {
    match (curr.tunnel.has_dst, range_end.tunnel.has_dst) {
        (false, false) => true,
        (true, true) => curr
            .vid
            .offset_from(range_end.vid)
            .and_then(|delta| range_end.tunnel.tunnel_id.checked_add(u32::from(delta)))
            == Some(curr.tunnel.tunnel_id),
        _ => false,
    }
}

/// Whether `curr` may extend a range ending at `range_end`.
///
/// Tunnel ids must keep the same offset from their VLAN ids across the
/// range.
pub fn per_vlan_mergeable(curr: &VlanOptsView, range_end: &VlanOptsView) -> bool {
    curr.state == range_end.state
        && tunnels_mergeable(curr, range_end)
        && curr.mcast_router == range_end.mcast_router
        && curr.mcast_max_groups == range_end.mcast_max_groups
        && curr.neigh_suppress == range_end.neigh_suppress
}

/// Whether `curr` may extend a global range ending at `range_end`.
///
/// Unlike [`per_vlan_mergeable`] adjacency is checked here.
pub fn global_mergeable(
    curr: &GlobalOptsView,
    range_end: &GlobalOptsView,
    mcast: &dyn McastOps,
) -> bool {
    curr.vid.offset_from(range_end.vid) == Some(1)
        && curr.mcast_enabled == range_end.mcast_enabled
        && curr.msti == range_end.msti
        && mcast.contexts_equal(&curr.mcast_ctx, &range_end.mcast_ctx)
}

/// Open range: its first VLAN and a snapshot of its last.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Batch<V> {
    Idle,
    Open { start: VlanId, end: V },
}

/// Two-state walker grouping changed VLANs into ranges.
#[derive(Debug, Clone, Copy)]
pub struct RangeBatcher<V> {
    batch: Batch<V>,
}

impl<V: RangeMember> Default for RangeBatcher<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: RangeMember> RangeBatcher<V> {
    pub fn new() -> Self {
        Self { batch: Batch::Idle }
    }

    pub fn is_open(&self) -> bool {
        matches!(self.batch, Batch::Open { .. })
    }

    /// Feeds a changed VLAN.
    ///
    /// `splits(curr, end)` is asked whether `curr` must start a new range.
    /// Returns the range that had to be closed, if any.
    pub fn changed<F>(&mut self, view: V, splits: F) -> Option<ChangeRange>
    where
        F: FnOnce(&V, &V) -> bool,
    {
        match self.batch {
            Batch::Idle => {
                self.batch = Batch::Open {
                    start: view.vid(),
                    end: view,
                };
                None
            }
            Batch::Open { start, end } => {
                if splits(&view, &end) {
                    self.batch = Batch::Open {
                        start: view.vid(),
                        end: view,
                    };
                    Some(ChangeRange {
                        start,
                        end: end.vid(),
                    })
                } else {
                    self.batch = Batch::Open { start, end: view };
                    None
                }
            }
        }
    }

    /// Feeds an unchanged VLAN, closing the open range.
    pub fn unchanged(&mut self) -> Option<ChangeRange> {
        self.close()
    }

    /// Ends the walk, returning the range still open.
    pub fn finish(mut self) -> Option<ChangeRange> {
        self.close()
    }

    fn close(&mut self) -> Option<ChangeRange> {
        match std::mem::replace(&mut self.batch, Batch::Idle) {
            Batch::Idle => None,
            Batch::Open { start, end } => Some(ChangeRange {
                start,
                end: end.vid(),
            }),
        }
    }
}

/// Compresses the usable VLANs of a group into dump ranges.
///
/// A range holds adjacent VLANs with equal membership flags and mergeable
/// options. The pvid always heads its own range.
pub fn dump_ranges<G: VlanGroup + ?Sized>(
    group: &G,
    mcast: &dyn McastOps,
    caps: Capabilities,
) -> Vec<ChangeRange> {
    let pvid = group.pvid();
    let mut batch = RangeBatcher::<VlanOptsView>::new();
    let mut ranges = Vec::new();

    for entry in group.entries().filter(|entry| entry.is_usable()) {
        let view = VlanOptsView::capture(entry, mcast, caps);
        let closed = batch.changed(view, |curr, end| {
            Some(curr.vid) == pvid
                || curr.vid.offset_from(end.vid) != Some(1)
                || curr.flags != end.flags
                || !per_vlan_mergeable(curr, end)
        });
        ranges.extend(closed);
    }
    ranges.extend(batch.finish());
    ranges
}

/// Compresses the usable bridge VLANs of a group by their global options.
pub fn dump_global_ranges<G: VlanGroup + ?Sized>(
    group: &G,
    mcast: &dyn McastOps,
) -> Vec<ChangeRange> {
    let mut batch = RangeBatcher::<GlobalOptsView>::new();
    let mut ranges = Vec::new();

    for entry in group
        .entries()
        .filter(|entry| entry.is_master() && entry.is_usable())
    {
        let view = GlobalOptsView::capture(entry);
        let closed = batch.changed(view, |curr, end| !global_mergeable(curr, end, mcast));
        ranges.extend(closed);
    }
    ranges.extend(batch.finish());
    ranges
}
