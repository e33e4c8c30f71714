//! Integration tests for VLAN option processing
//!
//! Drive the engine end to end against the in-memory VLAN tables and check
//! both the resulting VLAN state and the notifications emitted.

use std::sync::Arc;

use pretty_assertions::assert_eq;
use sonic_vlan_opts::encode::{iter_attrs, vlan_opts_nl_size};
use sonic_vlan_opts::range::{global_mergeable, GlobalOptsView};
use sonic_vlan_opts::{
    dump_ranges, BridgeCtx, Capabilities, DefaultMcastOps, EntryFlags, GlobalOptsAttrs,
    NotifyKind, NotifyScope, PortCtx, PortInfo, PortTunnelMap, RecordingNotifier, StpState,
    TunnelInfoAttrs, VlanEntry, VlanEntryAttrs, VlanGroup, VlanId, VlanOptsConfig,
    VlanOptsEngine, VlanOptsError, VlanRange, VlanTable,
};

fn vid(id: u16) -> VlanId {
    VlanId::new(id).unwrap()
}

fn range(start: u16, end: u16) -> VlanRange {
    VlanRange::from_raw(start, end).unwrap()
}

fn port_table(ids: impl IntoIterator<Item = u16>) -> VlanTable {
    let mut table = VlanTable::new();
    for id in ids {
        table.insert(VlanEntry::port(vid(id)));
    }
    table
}

struct Harness {
    engine: VlanOptsEngine,
    notifier: Arc<RecordingNotifier>,
    bridge: BridgeCtx,
    port: PortInfo,
    tunnels: PortTunnelMap,
}

impl Harness {
    fn new() -> Self {
        let notifier = Arc::new(RecordingNotifier::new());
        let config = VlanOptsConfig::with_capabilities(Capabilities::all());
        Self {
            engine: VlanOptsEngine::new(config, notifier.clone()),
            notifier,
            bridge: BridgeCtx::new("Bridge"),
            port: PortInfo::new("Ethernet0").with_vlan_tunnel(),
            tunnels: PortTunnelMap::new(),
        }
    }

    fn on_port(
        &mut self,
        table: &mut VlanTable,
        vlans: VlanRange,
        attrs: &VlanEntryAttrs,
    ) -> Result<(), VlanOptsError> {
        self.engine.process_options(
            &self.bridge,
            Some(PortCtx::new(&self.port, &mut self.tunnels)),
            table,
            vlans,
            attrs,
        )
    }
}

#[test]
fn test_request_without_options_is_silent() {
    let mut h = Harness::new();
    let mut table = port_table(1..=100);

    h.on_port(&mut table, range(1, 100), &VlanEntryAttrs::new())
        .unwrap();
    assert!(h.notifier.is_empty());
    assert_eq!(h.engine.stats().vlans_changed, 0);
}

#[test]
fn test_repeated_request_is_idempotent() {
    let mut h = Harness::new();
    let mut table = port_table(10..=15);
    let attrs = VlanEntryAttrs::new()
        .with_state(StpState::Learning)
        .with_neigh_suppress(true);

    h.on_port(&mut table, range(10, 15), &attrs).unwrap();
    assert_eq!(h.notifier.take().len(), 1);

    h.on_port(&mut table, range(10, 15), &attrs).unwrap();
    assert!(h.notifier.is_empty());
}

#[test]
fn test_pvid_starts_its_own_range() {
    let mut h = Harness::new();
    let mut table = port_table(10..=15);
    table.set_pvid(Some(vid(12))).unwrap();

    let attrs = VlanEntryAttrs::new().with_state(StpState::Blocking);
    h.on_port(&mut table, range(10, 15), &attrs).unwrap();

    assert_eq!(h.notifier.ranges(), vec![(10, 11), (12, 15)]);
    assert_eq!(table.pvid_state(), StpState::Blocking);
    for id in 10..=15 {
        assert_eq!(table.get(vid(id)).unwrap().state, StpState::Blocking);
    }
}

#[test]
fn test_tunnel_ids_follow_vlan_offsets() {
    let mut h = Harness::new();
    let mut table = port_table(20..=23);

    let attrs = VlanEntryAttrs::new().with_tunnel(TunnelInfoAttrs::set(100));
    h.on_port(&mut table, range(20, 23), &attrs).unwrap();

    for (id, tunnel_id) in [(20, 100), (21, 101), (22, 102), (23, 103)] {
        let entry = table.get(vid(id)).unwrap();
        assert!(entry.tunnel.has_dst);
        assert_eq!(entry.tunnel.tunnel_id, tunnel_id);
        assert_eq!(h.tunnels.vid_for(tunnel_id), Some(vid(id)));
    }
    // consistent offsets keep the range whole
    assert_eq!(h.notifier.ranges(), vec![(20, 23)]);

    h.on_port(
        &mut table,
        range(20, 23),
        &VlanEntryAttrs::new().with_tunnel(TunnelInfoAttrs::delete()),
    )
    .unwrap();
    assert!(h.tunnels.is_empty());
    assert_eq!(h.notifier.ranges(), vec![(20, 23), (20, 23)]);
}

#[test]
fn test_invalid_state_leaves_vlans_untouched() {
    let mut h = Harness::new();
    let mut table = port_table(10..=12);

    let err = h
        .on_port(&mut table, range(10, 12), &VlanEntryAttrs::new().with_raw_state(5))
        .unwrap_err();
    assert!(matches!(err, VlanOptsError::InvalidArgument { .. }));
    assert_eq!(err.errno(), -22);
    assert_eq!(table.get(vid(10)).unwrap().state, StpState::Forwarding);
    assert!(h.notifier.is_empty());
    assert_eq!(h.engine.stats().failures, 1);
}

#[test]
fn test_gap_in_range_is_not_found() {
    let mut h = Harness::new();
    let mut table = port_table([10, 11, 12, 14, 15]);

    let err = h
        .on_port(
            &mut table,
            range(10, 15),
            &VlanEntryAttrs::new().with_state(StpState::Learning),
        )
        .unwrap_err();
    assert!(matches!(err, VlanOptsError::NotFound { .. }));
    assert!(h.notifier.is_empty());
    assert_eq!(table.get(vid(10)).unwrap().state, StpState::Forwarding);
}

#[test]
fn test_context_only_bridge_vlan_is_not_found() {
    let notifier = Arc::new(RecordingNotifier::new());
    let mut engine = VlanOptsEngine::new(VlanOptsConfig::default(), notifier.clone());
    let mut table = VlanTable::new();
    table.insert(VlanEntry::bridge(vid(10)));
    let mut ctx_only = VlanEntry::bridge(vid(11));
    ctx_only.flags.remove(EntryFlags::BRENTRY);
    table.insert(ctx_only);

    let err = engine
        .process_options(
            &BridgeCtx::new("Bridge"),
            None,
            &mut table,
            range(10, 11),
            &VlanEntryAttrs::new().with_state(StpState::Disabled),
        )
        .unwrap_err();
    assert!(matches!(err, VlanOptsError::NotFound { .. }));
    assert!(notifier.is_empty());
}

#[test]
fn test_notifications_are_ascending_and_disjoint() {
    let mut h = Harness::new();
    let mut table = port_table(1..=40);
    for id in [5, 6, 17, 30] {
        table.get_mut(vid(id)).unwrap().state = StpState::Learning;
    }
    table.set_pvid(Some(vid(25))).unwrap();

    let attrs = VlanEntryAttrs::new().with_state(StpState::Learning);
    h.on_port(&mut table, range(1, 40), &attrs).unwrap();

    let ranges = h.notifier.ranges();
    assert_eq!(
        ranges,
        vec![(1, 4), (7, 16), (18, 24), (25, 29), (31, 40)]
    );
    for pair in ranges.windows(2) {
        assert!(pair[0].1 < pair[1].0);
    }
    let covered: u16 = ranges.iter().map(|(s, e)| e - s + 1).sum();
    assert_eq!(u64::from(covered), h.engine.stats().vlans_changed);
}

#[test]
fn test_port_notifications_carry_port_scope() {
    let mut h = Harness::new();
    let mut table = port_table(100..=101);

    h.on_port(
        &mut table,
        range(100, 101),
        &VlanEntryAttrs::new().with_mcast_max_groups(32),
    )
    .unwrap();

    let events = h.notifier.take();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].scope, NotifyScope::Port("Ethernet0".to_string()));
    assert_eq!(events[0].kind, NotifyKind::NewVlan);
    assert_eq!(table.get(vid(101)).unwrap().port_mcast.max_groups, 32);
}

#[test]
fn test_global_options_notify_bridge() {
    let notifier = Arc::new(RecordingNotifier::new());
    let config = VlanOptsConfig::with_capabilities(Capabilities::all());
    let mut engine = VlanOptsEngine::new(config, notifier.clone());
    let bridge = BridgeCtx::new("Bridge");
    let mut table = VlanTable::new();
    table.insert_range(range(1, 10), VlanEntry::bridge);

    let gopts = GlobalOptsAttrs {
        mcast_snooping: Some(false),
        msti: Some(4),
        ..GlobalOptsAttrs::default()
    };
    engine
        .process_global_options(&bridge, &mut table, range(3, 8), &gopts)
        .unwrap();

    let events = notifier.take();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].scope, NotifyScope::Bridge("Bridge".to_string()));
    assert_eq!(events[0].kind, NotifyKind::GlobalOptions);
    assert_eq!((events[0].start.get(), events[0].end.get()), (3, 8));
    assert!(!table.get(vid(5)).unwrap().global_mcast_enabled());
    assert!(table.get(vid(2)).unwrap().global_mcast_enabled());
}

#[test]
fn test_global_mergeable_rejects_gap() {
    let a = GlobalOptsView::capture(&VlanEntry::bridge(vid(10)));
    let b = GlobalOptsView::capture(&VlanEntry::bridge(vid(12)));
    assert!(!global_mergeable(&b, &a, &DefaultMcastOps));
}

#[test]
fn test_encoded_options_fit_size_bound() {
    let h = Harness::new();
    let mut entry = VlanEntry::port(vid(10)).with_tunnel(4000);
    entry.port_mcast.n_groups = 3;
    entry.port_mcast.max_groups = 64;

    let buf = h.engine.opts_fill(&entry, true).unwrap();
    let bound = vlan_opts_nl_size(Capabilities::all());
    assert!(buf.len() <= bound);
    assert_eq!(iter_attrs(buf.as_bytes()).count(), 6);
}

#[test]
fn test_dump_after_processing() {
    let mut h = Harness::new();
    let mut table = port_table(1..=8);

    h.on_port(
        &mut table,
        range(4, 5),
        &VlanEntryAttrs::new().with_state(StpState::Disabled),
    )
    .unwrap();

    let ranges: Vec<_> = dump_ranges(&table, h.engine.mcast(), Capabilities::all())
        .iter()
        .map(|r| r.as_raw())
        .collect();
    assert_eq!(ranges, vec![(1, 3), (4, 5), (6, 8)]);
}
