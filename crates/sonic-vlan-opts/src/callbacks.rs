//! Collaborator interfaces the engine drives.
//!
//! The VLAN database, tunnel index, multicast subsystem and notification
//! transport all live outside this crate. Callers must hold the bridge
//! control-plane exclusive section for the whole of one engine call; none of
//! these traits is expected to block.

use serde::Serialize;
use sonic_types::VlanId;

use crate::attrs::TunnelCmd;
use crate::error::VlanOptsResult;
use crate::types::{McastContext, PortInfo, StpState, VlanEntry};

/// VLAN group of a bridge or of one bridge port.
pub trait VlanGroup {
    fn get(&self, vid: VlanId) -> Option<&VlanEntry>;

    fn get_mut(&mut self, vid: VlanId) -> Option<&mut VlanEntry>;

    /// Entries in ascending VLAN order.
    fn entries(&self) -> Box<dyn Iterator<Item = &VlanEntry> + '_>;

    /// Current pvid, if one is configured.
    fn pvid(&self) -> Option<VlanId>;

    /// Keeps the group's pvid state in step with the pvid entry.
    fn set_pvid_state(&mut self, state: StpState);

    /// The VLAN exists and is not a context-only or transitional entry.
    fn is_usable(&self, vid: VlanId) -> bool {
        self.get(vid).is_some_and(VlanEntry::is_usable)
    }
}

/// Per-port VLAN to tunnel id index.
pub trait TunnelTable {
    /// Applies `cmd` for `entry`, returning whether the mapping changed.
    fn apply(
        &mut self,
        port: &PortInfo,
        entry: &mut VlanEntry,
        cmd: TunnelCmd,
        tunnel_id: u32,
    ) -> VlanOptsResult<bool>;
}

/// Multicast subsystem hooks.
pub trait McastOps: Send + Sync {
    /// Router mode tag of a VLAN, compared only for equality.
    fn router_mode(&self, entry: &VlanEntry) -> u8;

    /// Sets the router mode, returning whether it changed.
    fn set_router(&self, entry: &mut VlanEntry, mode: u8) -> VlanOptsResult<bool>;

    fn contexts_equal(&self, a: &McastContext, b: &McastContext) -> bool;
}

/// Where a notification is addressed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "scope", content = "name", rename_all = "lowercase")]
pub enum NotifyScope {
    Bridge(String),
    Port(String),
}

/// What a notification describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifyKind {
    /// Per-VLAN options of a new or updated range (`RTM_NEWVLAN`).
    NewVlan,
    /// Bridge-wide options of a range.
    GlobalOptions,
}

/// Fire-and-forget notification transport.
pub trait VlanNotifier: Send + Sync {
    /// Announces the inclusive range `start..=end`.
    fn notify(&self, scope: &NotifyScope, start: VlanId, end: VlanId, kind: NotifyKind);
}
