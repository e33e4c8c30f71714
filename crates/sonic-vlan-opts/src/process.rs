//! VLAN options engine.
//!
//! Walks a request range, applies the options to every VLAN and announces
//! the changed VLANs as compressed ranges.

use std::sync::Arc;

use serde::Serialize;
use sonic_types::{VlanId, VlanRange};
use tracing::{debug, info, instrument, warn};

use crate::attrs::{GlobalOptsAttrs, VlanEntryAttrs};
use crate::callbacks::{McastOps, NotifyKind, NotifyScope, VlanGroup, VlanNotifier};
use crate::config::VlanOptsConfig;
use crate::encode::{self, NlaBuffer};
use crate::error::{VlanOptsError, VlanOptsResult};
use crate::memdb::DefaultMcastOps;
use crate::mutators::{process_global_one, process_one, OptsEnv, PortCtx};
use crate::range::{
    global_mergeable, per_vlan_mergeable, ChangeRange, GlobalOptsView, RangeBatcher,
    VlanOptsView,
};
use crate::types::{BridgeCtx, VlanEntry};

/// Engine counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VlanOptsStats {
    /// Requests that completed without error.
    pub ranges_processed: u64,
    /// VLANs an option actually changed.
    pub vlans_changed: u64,
    /// Notifications sent.
    pub notifications: u64,
    /// Requests rejected with an error.
    pub failures: u64,
}

/// Applies VLAN option requests and emits change notifications.
pub struct VlanOptsEngine {
    config: VlanOptsConfig,
    stats: VlanOptsStats,
    notifier: Arc<dyn VlanNotifier>,
    mcast: Arc<dyn McastOps>,
}

impl VlanOptsEngine {
    /// Creates an engine using the built-in multicast hooks.
    pub fn new(config: VlanOptsConfig, notifier: Arc<dyn VlanNotifier>) -> Self {
        Self {
            config,
            stats: VlanOptsStats::default(),
            notifier,
            mcast: Arc::new(DefaultMcastOps),
        }
    }

    /// Replaces the multicast hooks.
    pub fn with_mcast(mut self, mcast: Arc<dyn McastOps>) -> Self {
        self.mcast = mcast;
        self
    }

    pub fn config(&self) -> &VlanOptsConfig {
        &self.config
    }

    pub fn stats(&self) -> &VlanOptsStats {
        &self.stats
    }

    pub fn mcast(&self) -> &dyn McastOps {
        self.mcast.as_ref()
    }

    /// Applies per-VLAN options to every VLAN of `range`.
    ///
    /// `group` is the port's VLAN group when `port` is given, otherwise the
    /// bridge's. Every VLAN of the range must exist and be usable before any
    /// is touched. On error, VLANs already changed stay changed and the
    /// range still open is never announced.
    #[instrument(skip(self, port, group, attrs), fields(bridge = %bridge.name, range = %range))]
    pub fn process_options<G: VlanGroup + ?Sized>(
        &mut self,
        bridge: &BridgeCtx,
        mut port: Option<PortCtx<'_>>,
        group: &mut G,
        range: VlanRange,
        attrs: &VlanEntryAttrs,
    ) -> VlanOptsResult<()> {
        let before = self.stats.clone();
        let result = self.walk_options(bridge, port.as_mut(), group, range, attrs);
        self.record(&before, result)
    }

    /// Applies bridge-wide options to every VLAN of `range` of a bridge
    /// group.
    #[instrument(skip(self, group, gopts), fields(bridge = %bridge.name, range = %range))]
    pub fn process_global_options<G: VlanGroup + ?Sized>(
        &mut self,
        bridge: &BridgeCtx,
        group: &mut G,
        range: VlanRange,
        gopts: &GlobalOptsAttrs,
    ) -> VlanOptsResult<()> {
        let before = self.stats.clone();
        let result = self.walk_global(bridge, group, range, gopts);
        self.record(&before, result)
    }

    /// Upper bound on the bytes [`Self::opts_fill`] produces for one VLAN.
    pub fn opts_nl_size(&self) -> usize {
        encode::vlan_opts_nl_size(self.config.capabilities)
    }

    /// Encodes the per-VLAN options of `entry` into a buffer sized for
    /// them.
    pub fn opts_fill(&self, entry: &VlanEntry, is_port: bool) -> VlanOptsResult<NlaBuffer> {
        let caps = self.config.capabilities;
        let mut buf = NlaBuffer::with_capacity(self.opts_nl_size());
        encode::encode_per_vlan_options(&mut buf, entry, is_port, caps, self.mcast.as_ref())?;
        Ok(buf)
    }

    /// Encodes the bridge-wide options of a range headed by `opts`.
    pub fn global_opts_fill(&self, range_end: u16, opts: &VlanEntry) -> VlanOptsResult<NlaBuffer> {
        let mut buf =
            NlaBuffer::with_capacity(encode::global_opts_nl_size(self.config.capabilities));
        encode::encode_global_options(&mut buf, range_end, opts, &self.config)?;
        Ok(buf)
    }

    fn record(
        &mut self,
        before: &VlanOptsStats,
        result: VlanOptsResult<()>,
    ) -> VlanOptsResult<()> {
        match &result {
            Ok(()) => {
                self.stats.ranges_processed += 1;
                info!(
                    changed = self.stats.vlans_changed - before.vlans_changed,
                    notifications = self.stats.notifications - before.notifications,
                    "vlan options applied"
                );
            }
            Err(e) => {
                self.stats.failures += 1;
                warn!(errno = e.errno(), "vlan options request failed: {}", e);
            }
        }
        result
    }

    fn walk_options<G: VlanGroup + ?Sized>(
        &mut self,
        bridge: &BridgeCtx,
        mut port: Option<&mut PortCtx<'_>>,
        group: &mut G,
        range: VlanRange,
        attrs: &VlanEntryAttrs,
    ) -> VlanOptsResult<()> {
        if let Some(missing) = range.iter().find(|vid| !group.is_usable(*vid)) {
            return Err(VlanOptsError::not_found(format!(
                "Vlan {} of range {} doesn't exist, can't process options",
                missing, range
            )));
        }

        let scope = match port.as_deref() {
            Some(port) => NotifyScope::Port(port.info.name.clone()),
            None => NotifyScope::Bridge(bridge.name.clone()),
        };
        let config = self.config.clone();
        let mcast = Arc::clone(&self.mcast);
        let env = OptsEnv {
            bridge,
            config: &config,
            mcast: mcast.as_ref(),
        };
        let pvid = group.pvid();
        let mut batch = RangeBatcher::<VlanOptsView>::new();

        for vid in range {
            let changed = process_one(&env, group, port.as_deref_mut(), vid, range.start(), attrs)?;
            if !changed {
                if let Some(done) = batch.unchanged() {
                    self.emit(&scope, done, NotifyKind::NewVlan);
                }
                continue;
            }

            self.stats.vlans_changed += 1;
            let entry = lookup(&*group, vid)?;
            let view = VlanOptsView::capture(entry, env.mcast, config.capabilities);
            let closed = batch.changed(view, |curr, end| {
                Some(curr.vid) == pvid || !per_vlan_mergeable(curr, end)
            });
            if let Some(done) = closed {
                self.emit(&scope, done, NotifyKind::NewVlan);
            }
        }

        if let Some(done) = batch.finish() {
            self.emit(&scope, done, NotifyKind::NewVlan);
        }
        Ok(())
    }

    fn walk_global<G: VlanGroup + ?Sized>(
        &mut self,
        bridge: &BridgeCtx,
        group: &mut G,
        range: VlanRange,
        gopts: &GlobalOptsAttrs,
    ) -> VlanOptsResult<()> {
        for vid in range {
            match group.get(vid) {
                Some(entry) if !entry.is_master() => {
                    return Err(VlanOptsError::invalid(format!(
                        "Global vlan options can only be set on bridge vlans, {} is not one",
                        vid
                    )))
                }
                Some(entry) if entry.is_usable() => {}
                _ => {
                    return Err(VlanOptsError::not_found(format!(
                        "Vlan {} of range {} doesn't exist, can't process global options",
                        vid, range
                    )))
                }
            }
        }

        let scope = NotifyScope::Bridge(bridge.name.clone());
        let config = self.config.clone();
        let mcast = Arc::clone(&self.mcast);
        let env = OptsEnv {
            bridge,
            config: &config,
            mcast: mcast.as_ref(),
        };
        let mut batch = RangeBatcher::<GlobalOptsView>::new();

        for vid in range {
            let entry = group.get_mut(vid).ok_or_else(|| {
                VlanOptsError::not_found(format!("Vlan {} doesn't exist", vid))
            })?;
            if !process_global_one(&env, entry, gopts)? {
                if let Some(done) = batch.unchanged() {
                    self.emit(&scope, done, NotifyKind::GlobalOptions);
                }
                continue;
            }

            self.stats.vlans_changed += 1;
            let view = GlobalOptsView::capture(entry);
            let closed = batch.changed(view, |curr, end| {
                !global_mergeable(curr, end, env.mcast)
            });
            if let Some(done) = closed {
                self.emit(&scope, done, NotifyKind::GlobalOptions);
            }
        }

        if let Some(done) = batch.finish() {
            self.emit(&scope, done, NotifyKind::GlobalOptions);
        }
        Ok(())
    }

    fn emit(&mut self, scope: &NotifyScope, range: ChangeRange, kind: NotifyKind) {
        debug!(?scope, start = %range.start, end = %range.end, ?kind, "notify vlan range");
        self.notifier.notify(scope, range.start, range.end, kind);
        self.stats.notifications += 1;
    }
}

fn lookup<G: VlanGroup + ?Sized>(group: &G, vid: VlanId) -> VlanOptsResult<&VlanEntry> {
    group
        .get(vid)
        .ok_or_else(|| VlanOptsError::not_found(format!("Vlan {} doesn't exist", vid)))
}
