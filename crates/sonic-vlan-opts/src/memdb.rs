//! In-memory implementations of the collaborator traits.
//!
//! Used by `vlanoptsctl` and by tests; a switch daemon plugs in its own
//! VLAN database instead.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use serde::Serialize;
use sonic_types::{VlanId, VlanRange};

use crate::attrs::TunnelCmd;
use crate::callbacks::{McastOps, NotifyKind, NotifyScope, TunnelTable, VlanGroup, VlanNotifier};
use crate::error::{VlanOptsError, VlanOptsResult};
use crate::types::{McastContext, McastRouter, PortInfo, StpState, TunnelInfo, VlanEntry};

/// Ordered VLAN group with an optional pvid.
#[derive(Debug, Clone, Default)]
pub struct VlanTable {
    entries: BTreeMap<VlanId, VlanEntry>,
    pvid: Option<VlanId>,
    pvid_state: StpState,
}

impl VlanTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces an entry, returning the previous one.
    pub fn insert(&mut self, entry: VlanEntry) -> Option<VlanEntry> {
        self.entries.insert(entry.vid, entry)
    }

    /// Adds one entry per VLAN of `range`.
    pub fn insert_range(&mut self, range: VlanRange, make: impl Fn(VlanId) -> VlanEntry) {
        for vid in range {
            self.insert(make(vid));
        }
    }

    /// Removes an entry; removing the pvid clears it.
    pub fn remove(&mut self, vid: VlanId) -> Option<VlanEntry> {
        if self.pvid == Some(vid) {
            self.pvid = None;
        }
        self.entries.remove(&vid)
    }

    /// Sets or clears the pvid. The pvid must be a member.
    pub fn set_pvid(&mut self, pvid: Option<VlanId>) -> VlanOptsResult<()> {
        match pvid {
            Some(vid) => {
                let entry = self.entries.get(&vid).ok_or_else(|| {
                    VlanOptsError::not_found(format!("pvid {} is not a member vlan", vid))
                })?;
                self.pvid_state = entry.state;
                self.pvid = Some(vid);
            }
            None => self.pvid = None,
        }
        Ok(())
    }

    pub fn pvid_state(&self) -> StpState {
        self.pvid_state
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl VlanGroup for VlanTable {
    fn get(&self, vid: VlanId) -> Option<&VlanEntry> {
        self.entries.get(&vid)
    }

    fn get_mut(&mut self, vid: VlanId) -> Option<&mut VlanEntry> {
        self.entries.get_mut(&vid)
    }

    fn entries(&self) -> Box<dyn Iterator<Item = &VlanEntry> + '_> {
        Box::new(self.entries.values())
    }

    fn pvid(&self) -> Option<VlanId> {
        self.pvid
    }

    fn set_pvid_state(&mut self, state: StpState) {
        self.pvid_state = state;
    }
}

/// Tunnel id index of one port. Each tunnel id maps to at most one VLAN.
#[derive(Debug, Clone, Default)]
pub struct PortTunnelMap {
    by_id: HashMap<u32, VlanId>,
}

impl PortTunnelMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an existing mapping without touching any entry.
    pub fn insert(&mut self, tunnel_id: u32, vid: VlanId) -> Option<VlanId> {
        self.by_id.insert(tunnel_id, vid)
    }

    pub fn vid_for(&self, tunnel_id: u32) -> Option<VlanId> {
        self.by_id.get(&tunnel_id).copied()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

impl TunnelTable for PortTunnelMap {
    fn apply(
        &mut self,
        port: &PortInfo,
        entry: &mut VlanEntry,
        cmd: TunnelCmd,
        tunnel_id: u32,
    ) -> VlanOptsResult<bool> {
        match cmd {
            TunnelCmd::Set => {
                if entry.tunnel == TunnelInfo::mapped(tunnel_id) {
                    return Ok(false);
                }
                if let Some(owner) = self.vid_for(tunnel_id) {
                    if owner != entry.vid {
                        return Err(VlanOptsError::exists(format!(
                            "Tunnel id {} already mapped to vlan {} on {}",
                            tunnel_id, owner, port.name
                        )));
                    }
                }
                if entry.tunnel.has_dst {
                    self.by_id.remove(&entry.tunnel.tunnel_id);
                }
                self.by_id.insert(tunnel_id, entry.vid);
                entry.tunnel = TunnelInfo::mapped(tunnel_id);
                Ok(true)
            }
            TunnelCmd::Delete => {
                if !entry.tunnel.has_dst {
                    return Ok(false);
                }
                self.by_id.remove(&entry.tunnel.tunnel_id);
                entry.tunnel = TunnelInfo::default();
                Ok(true)
            }
        }
    }
}

/// Multicast hooks over the router modes stored in [`VlanEntry`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultMcastOps;

impl McastOps for DefaultMcastOps {
    fn router_mode(&self, entry: &VlanEntry) -> u8 {
        let router = if entry.is_master() {
            entry.mcast_ctx.router
        } else {
            entry.port_mcast.router
        };
        router as u8
    }

    fn set_router(&self, entry: &mut VlanEntry, mode: u8) -> VlanOptsResult<bool> {
        let router = McastRouter::from_raw(mode)
            .ok_or_else(|| VlanOptsError::invalid(format!("Invalid multicast router mode {}", mode)))?;
        if entry.is_master() {
            if router == McastRouter::Temp {
                return Err(VlanOptsError::invalid(
                    "Temporary router mode is only valid on ports",
                ));
            }
            if entry.mcast_ctx.router == router {
                return Ok(false);
            }
            entry.mcast_ctx.router = router;
        } else {
            if entry.port_mcast.router == router {
                return Ok(false);
            }
            entry.port_mcast.router = router;
        }
        Ok(true)
    }

    fn contexts_equal(&self, a: &McastContext, b: &McastContext) -> bool {
        a == b
    }
}

/// One notification as seen by [`RecordingNotifier`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VlanNotification {
    #[serde(flatten)]
    pub scope: NotifyScope,
    pub start: VlanId,
    pub end: VlanId,
    pub kind: NotifyKind,
}

/// Notifier that keeps every notification in memory.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<VlanNotification>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drains recorded notifications.
    pub fn take(&self) -> Vec<VlanNotification> {
        self.events
            .lock()
            .map(|mut events| std::mem::take(&mut *events))
            .unwrap_or_default()
    }

    /// Recorded ranges as raw pairs, oldest first.
    pub fn ranges(&self) -> Vec<(u16, u16)> {
        self.events
            .lock()
            .map(|events| {
                events
                    .iter()
                    .map(|e| (e.start.get(), e.end.get()))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().map(|e| e.is_empty()).unwrap_or(true)
    }
}

impl VlanNotifier for RecordingNotifier {
    fn notify(&self, scope: &NotifyScope, start: VlanId, end: VlanId, kind: NotifyKind) {
        if let Ok(mut events) = self.events.lock() {
            events.push(VlanNotification {
                scope: scope.clone(),
                start,
                end,
                kind,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn vid(id: u16) -> VlanId {
        VlanId::new(id).unwrap()
    }

    #[test]
    fn test_table_pvid_must_be_member() {
        let mut table = VlanTable::new();
        table.insert(VlanEntry::port(vid(10)).with_state(StpState::Learning));

        assert!(table.set_pvid(Some(vid(11))).is_err());
        table.set_pvid(Some(vid(10))).unwrap();
        assert_eq!(table.pvid(), Some(vid(10)));
        assert_eq!(table.pvid_state(), StpState::Learning);

        table.remove(vid(10));
        assert_eq!(table.pvid(), None);
        assert!(table.is_empty());
    }

    #[test]
    fn test_table_iterates_in_order() {
        let mut table = VlanTable::new();
        for id in [30, 10, 20] {
            table.insert(VlanEntry::port(vid(id)));
        }
        let vids: Vec<u16> = table.entries().map(|e| e.vid.get()).collect();
        assert_eq!(vids, vec![10, 20, 30]);
    }

    #[test]
    fn test_tunnel_map_remaps() {
        let port = PortInfo::new("Ethernet0").with_vlan_tunnel();
        let mut map = PortTunnelMap::new();
        let mut entry = VlanEntry::port(vid(10));

        assert!(map.apply(&port, &mut entry, TunnelCmd::Set, 100).unwrap());
        assert!(!map.apply(&port, &mut entry, TunnelCmd::Set, 100).unwrap());
        assert!(map.apply(&port, &mut entry, TunnelCmd::Set, 200).unwrap());
        assert_eq!(map.vid_for(100), None);
        assert_eq!(map.vid_for(200), Some(vid(10)));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_tunnel_map_rejects_duplicate_id() {
        let port = PortInfo::new("Ethernet0").with_vlan_tunnel();
        let mut map = PortTunnelMap::new();
        let mut first = VlanEntry::port(vid(10));
        let mut second = VlanEntry::port(vid(11));

        map.apply(&port, &mut first, TunnelCmd::Set, 100).unwrap();
        let err = map.apply(&port, &mut second, TunnelCmd::Set, 100).unwrap_err();
        assert_eq!(err.errno(), -17);
        assert!(!second.tunnel.has_dst);
    }

    #[test]
    fn test_master_rejects_temp_router() {
        let mut entry = VlanEntry::bridge(vid(10));
        let err = DefaultMcastOps
            .set_router(&mut entry, McastRouter::Temp as u8)
            .unwrap_err();
        assert!(matches!(err, VlanOptsError::InvalidArgument { .. }));

        assert!(DefaultMcastOps
            .set_router(&mut entry, McastRouter::Perm as u8)
            .unwrap());
        assert_eq!(DefaultMcastOps.router_mode(&entry), 2);
    }

    #[test]
    fn test_recording_notifier_drains() {
        let notifier = RecordingNotifier::new();
        let scope = NotifyScope::Bridge("br0".to_string());
        notifier.notify(&scope, vid(1), vid(4), NotifyKind::NewVlan);

        assert_eq!(notifier.ranges(), vec![(1, 4)]);
        let events = notifier.take();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].scope, scope);
        assert!(notifier.is_empty());
    }
}
