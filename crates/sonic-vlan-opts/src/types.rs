//! Bridge VLAN entry model and the small enums around it.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use sonic_types::VlanId;

use crate::config::DEFAULT_HZ;

/// Per-VLAN spanning tree state.
///
/// Ordinals match the bridge's `BR_STATE_*` values; anything above
/// [`StpState::Blocking`] is not a state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum StpState {
    Disabled = 0,
    Listening = 1,
    Learning = 2,
    #[default]
    Forwarding = 3,
    Blocking = 4,
}

impl StpState {
    /// Highest valid ordinal.
    ///
    /// Blocking is 4 as in `BR_STATE_BLOCKING`, so raw 4 is a valid state and
    /// 5 is the first value rejected. Tables that number Blocking as 3 drop
    /// the Listening state the bridge still carries.
    pub const MAX: u8 = StpState::Blocking as u8;

    /// Converts a raw attribute value.
    pub fn from_raw(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Disabled),
            1 => Some(Self::Listening),
            2 => Some(Self::Learning),
            3 => Some(Self::Forwarding),
            4 => Some(Self::Blocking),
            _ => None,
        }
    }

    /// Parses an STP state from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "disabled" => Some(Self::Disabled),
            "listening" => Some(Self::Listening),
            "learning" => Some(Self::Learning),
            "forwarding" => Some(Self::Forwarding),
            "blocking" => Some(Self::Blocking),
            _ => s.parse().ok().and_then(Self::from_raw),
        }
    }

    pub fn as_raw(self) -> u8 {
        self as u8
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::Listening => "listening",
            Self::Learning => "learning",
            Self::Forwarding => "forwarding",
            Self::Blocking => "blocking",
        }
    }
}

/// Who runs spanning tree on the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StpMode {
    #[default]
    None,
    /// In-kernel STP owns port and VLAN states.
    Kernel,
    /// A userspace daemon drives states through VLAN options.
    User,
}

/// Bridge-level settings read at call time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeCtx {
    pub name: String,
    pub stp_mode: StpMode,
    /// Multiple spanning tree: VLAN state follows the MST instance.
    pub mst_enabled: bool,
}

impl BridgeCtx {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn is_kernel_stp_active(&self) -> bool {
        self.stp_mode == StpMode::Kernel
    }
}

/// Bridge port settings relevant to VLAN options.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PortInfo {
    pub name: String,
    /// Port has `vlan_tunnel` enabled and accepts VLAN to tunnel mappings.
    pub vlan_tunnel: bool,
}

impl PortInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            vlan_tunnel: false,
        }
    }

    pub fn with_vlan_tunnel(mut self) -> Self {
        self.vlan_tunnel = true;
        self
    }
}

bitflags! {
    /// Membership flags of a VLAN entry.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct EntryFlags: u16 {
        /// Entry belongs to the bridge device itself.
        const MASTER = 0b0000_0001;
        /// Bridge device is an actual member, not just a port-created context.
        const BRENTRY = 0b0000_0010;
        /// Egress untagged.
        const UNTAGGED = 0b0000_0100;
    }
}

bitflags! {
    /// Private per-VLAN flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct VlanPrivFlags: u8 {
        /// Multicast snooping enabled for this VLAN (bridge entries).
        const GLOBAL_MCAST_ENABLED = 0b0000_0001;
        /// Neighbor suppression enabled (port entries).
        const NEIGH_SUPPRESS_ENABLED = 0b0000_0010;
    }
}

/// VLAN to tunnel mapping state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TunnelInfo {
    pub tunnel_id: u32,
    /// A tunnel destination is attached, i.e. the mapping is live.
    pub has_dst: bool,
}

impl TunnelInfo {
    pub fn mapped(tunnel_id: u32) -> Self {
        Self {
            tunnel_id,
            has_dst: true,
        }
    }
}

/// Multicast router mode of a VLAN context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum McastRouter {
    Disabled = 0,
    #[default]
    TempQuery = 1,
    Perm = 2,
    /// Only valid on port contexts.
    Temp = 3,
}

impl McastRouter {
    pub fn from_raw(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Disabled),
            1 => Some(Self::TempQuery),
            2 => Some(Self::Perm),
            3 => Some(Self::Temp),
            _ => None,
        }
    }
}

/// Bridge-wide multicast context of one VLAN. Intervals are in internal
/// ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct McastContext {
    pub router: McastRouter,
    pub igmp_version: u8,
    pub mld_version: u8,
    pub last_member_count: u32,
    pub startup_query_count: u32,
    pub last_member_interval: u64,
    pub membership_interval: u64,
    pub querier_interval: u64,
    pub query_interval: u64,
    pub query_response_interval: u64,
    pub startup_query_interval: u64,
    pub querier: bool,
}

impl McastContext {
    /// Protocol defaults expressed at the given tick rate.
    pub fn with_hz(hz: u32) -> Self {
        let hz = u64::from(hz);
        Self {
            router: McastRouter::TempQuery,
            igmp_version: 2,
            mld_version: 1,
            last_member_count: 2,
            startup_query_count: 2,
            last_member_interval: hz,
            membership_interval: 260 * hz,
            querier_interval: 255 * hz,
            query_interval: 125 * hz,
            query_response_interval: 10 * hz,
            startup_query_interval: 125 * hz / 4,
            querier: false,
        }
    }
}

impl Default for McastContext {
    fn default() -> Self {
        Self::with_hz(DEFAULT_HZ)
    }
}

/// Per-port, per-VLAN multicast context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PortMcastCtx {
    pub router: McastRouter,
    pub n_groups: u32,
    pub max_groups: u32,
    /// Snooping turned off for this VLAN on this port.
    pub disabled: bool,
}

/// One VLAN of a bridge or bridge port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VlanEntry {
    pub vid: VlanId,
    pub flags: EntryFlags,
    pub priv_flags: VlanPrivFlags,
    pub state: StpState,
    pub tunnel: TunnelInfo,
    /// MST instance (bridge entries).
    pub msti: u16,
    /// Bridge-wide multicast options (bridge entries).
    pub mcast_ctx: McastContext,
    /// Port multicast options (port entries).
    pub port_mcast: PortMcastCtx,
}

impl VlanEntry {
    /// A bridge (master) VLAN that the bridge device is a member of.
    pub fn bridge(vid: VlanId) -> Self {
        Self {
            vid,
            flags: EntryFlags::MASTER | EntryFlags::BRENTRY,
            priv_flags: VlanPrivFlags::GLOBAL_MCAST_ENABLED,
            state: StpState::Forwarding,
            tunnel: TunnelInfo::default(),
            msti: 0,
            mcast_ctx: McastContext::default(),
            port_mcast: PortMcastCtx::default(),
        }
    }

    /// A VLAN on a bridge port.
    pub fn port(vid: VlanId) -> Self {
        Self {
            vid,
            flags: EntryFlags::empty(),
            priv_flags: VlanPrivFlags::empty(),
            state: StpState::Forwarding,
            tunnel: TunnelInfo::default(),
            msti: 0,
            mcast_ctx: McastContext::default(),
            port_mcast: PortMcastCtx::default(),
        }
    }

    pub fn with_state(mut self, state: StpState) -> Self {
        self.state = state;
        self
    }

    pub fn with_tunnel(mut self, tunnel_id: u32) -> Self {
        self.tunnel = TunnelInfo::mapped(tunnel_id);
        self
    }

    pub fn with_flags(mut self, flags: EntryFlags) -> Self {
        self.flags |= flags;
        self
    }

    pub fn is_master(&self) -> bool {
        self.flags.contains(EntryFlags::MASTER)
    }

    /// Master entries only count once the bridge itself joined the VLAN.
    pub fn is_usable(&self) -> bool {
        !self.is_master() || self.flags.contains(EntryFlags::BRENTRY)
    }

    pub fn global_mcast_enabled(&self) -> bool {
        self.priv_flags.contains(VlanPrivFlags::GLOBAL_MCAST_ENABLED)
    }

    pub fn neigh_suppress(&self) -> bool {
        self.priv_flags.contains(VlanPrivFlags::NEIGH_SUPPRESS_ENABLED)
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
    fn test_stp_state_raw_bounds() {
        assert_eq!(StpState::from_raw(0), Some(StpState::Disabled));
        assert_eq!(StpState::from_raw(4), Some(StpState::Blocking));
        assert_eq!(StpState::from_raw(5), None);
        assert_eq!(StpState::MAX, 4);
    }

    #[test]
    fn test_stp_state_parse() {
        assert_eq!(StpState::parse("blocking"), Some(StpState::Blocking));
        assert_eq!(StpState::parse("3"), Some(StpState::Forwarding));
        assert_eq!(StpState::parse("9"), None);
        assert_eq!(StpState::parse("invalid"), None);
    }

    #[test]
    fn test_bridge_entry_usable() {
        let entry = VlanEntry::bridge(vid(10));
        assert!(entry.is_master());
        assert!(entry.is_usable());
        assert!(entry.global_mcast_enabled());

        let mut context_only = VlanEntry::bridge(vid(11));
        context_only.flags.remove(EntryFlags::BRENTRY);
        assert!(!context_only.is_usable());
    }

    #[test]
    fn test_port_entry_always_usable() {
        let entry = VlanEntry::port(vid(10));
        assert!(!entry.is_master());
        assert!(entry.is_usable());
        assert!(!entry.tunnel.has_dst);
    }

    #[test]
    fn test_mcast_defaults_scale_with_hz() {
        let ctx = McastContext::with_hz(100);
        assert_eq!(ctx.query_interval, 12500);
        assert_eq!(ctx.startup_query_interval, 3125);
        assert_eq!(McastContext::default().last_member_interval, 250);
    }

    #[test]
    fn test_mcast_router_from_raw() {
        assert_eq!(McastRouter::from_raw(2), Some(McastRouter::Perm));
        assert_eq!(McastRouter::from_raw(4), None);
    }
}
