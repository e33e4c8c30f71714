//! Parsed request attributes and bridge VLAN database attribute ids.
//!
//! Requests arrive already decoded from the wire; each option is `Some`
//! only when the request carried it.

use serde::{Deserialize, Serialize};

use crate::types::StpState;

/// rtnetlink message types used as tunnel commands.
pub mod rtm {
    pub const DELLINK: u32 = 17;
    pub const SETLINK: u32 = 19;
}

/// `BRIDGE_VLANDB_*` attribute type numbers.
pub mod ids {
    pub const VLANDB_GLOBAL_OPTIONS: u16 = 2;

    /// Per-VLAN option attributes of a `BRIDGE_VLANDB_ENTRY`.
    pub mod entry {
        pub const STATE: u16 = 3;
        pub const TUNNEL_INFO: u16 = 4;
        pub const MCAST_ROUTER: u16 = 6;
        pub const MCAST_N_GROUPS: u16 = 7;
        pub const MCAST_MAX_GROUPS: u16 = 8;
        pub const NEIGH_SUPPRESS: u16 = 9;
    }

    /// Attributes nested in `entry::TUNNEL_INFO`.
    pub mod tinfo {
        pub const ID: u16 = 1;
    }

    /// Attributes nested in `VLANDB_GLOBAL_OPTIONS`.
    pub mod gopts {
        pub const ID: u16 = 1;
        pub const RANGE: u16 = 2;
        pub const MCAST_SNOOPING: u16 = 3;
        pub const MCAST_IGMP_VERSION: u16 = 4;
        pub const MCAST_MLD_VERSION: u16 = 5;
        pub const MCAST_LAST_MEMBER_CNT: u16 = 6;
        pub const MCAST_STARTUP_QUERY_CNT: u16 = 7;
        pub const MCAST_LAST_MEMBER_INTVL: u16 = 8;
        pub const PAD: u16 = 9;
        pub const MCAST_MEMBERSHIP_INTVL: u16 = 10;
        pub const MCAST_QUERIER: u16 = 11;
        pub const MCAST_QUERIER_INTVL: u16 = 12;
        pub const MCAST_QUERY_INTVL: u16 = 13;
        pub const MCAST_QUERY_RESPONSE_INTVL: u16 = 14;
        pub const MCAST_STARTUP_QUERY_INTVL: u16 = 15;
        pub const MSTI: u16 = 18;
    }
}

/// Tunnel mapping command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunnelCmd {
    /// Map the VLAN to a tunnel id.
    Set,
    /// Drop the VLAN's mapping.
    Delete,
}

impl TunnelCmd {
    pub fn from_raw(cmd: u32) -> Option<Self> {
        match cmd {
            rtm::SETLINK => Some(Self::Set),
            rtm::DELLINK => Some(Self::Delete),
            _ => None,
        }
    }

    pub fn as_raw(self) -> u32 {
        match self {
            Self::Set => rtm::SETLINK,
            Self::Delete => rtm::DELLINK,
        }
    }
}

/// Nested tunnel-info attribute. Both fields are raw so that a missing or
/// unknown command can be reported by the tunnel mutator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TunnelInfoAttrs {
    pub cmd: Option<u32>,
    /// Tunnel id of the first VLAN of the request range.
    pub id: Option<u32>,
}

impl TunnelInfoAttrs {
    pub fn set(base_tunnel_id: u32) -> Self {
        Self {
            cmd: Some(rtm::SETLINK),
            id: Some(base_tunnel_id),
        }
    }

    pub fn delete() -> Self {
        Self {
            cmd: Some(rtm::DELLINK),
            id: None,
        }
    }
}

/// Per-VLAN options of a bridge or port VLAN request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VlanEntryAttrs {
    /// Raw STP state; validated when applied.
    pub state: Option<u8>,
    pub tunnel_info: Option<TunnelInfoAttrs>,
    pub mcast_router: Option<u8>,
    pub mcast_max_groups: Option<u32>,
    pub neigh_suppress: Option<bool>,
}

impl VlanEntryAttrs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(mut self, state: StpState) -> Self {
        self.state = Some(state.as_raw());
        self
    }

    pub fn with_raw_state(mut self, state: u8) -> Self {
        self.state = Some(state);
        self
    }

    pub fn with_tunnel(mut self, tunnel_info: TunnelInfoAttrs) -> Self {
        self.tunnel_info = Some(tunnel_info);
        self
    }

    pub fn with_mcast_router(mut self, mode: u8) -> Self {
        self.mcast_router = Some(mode);
        self
    }

    pub fn with_mcast_max_groups(mut self, max: u32) -> Self {
        self.mcast_max_groups = Some(max);
        self
    }

    pub fn with_neigh_suppress(mut self, enabled: bool) -> Self {
        self.neigh_suppress = Some(enabled);
        self
    }

    /// No option present.
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// Bridge-wide (global) VLAN options. Intervals are in user clock ticks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalOptsAttrs {
    pub mcast_snooping: Option<bool>,
    pub mcast_igmp_version: Option<u8>,
    pub mcast_mld_version: Option<u8>,
    pub mcast_last_member_cnt: Option<u32>,
    pub mcast_startup_query_cnt: Option<u32>,
    pub mcast_last_member_intvl: Option<u64>,
    pub mcast_membership_intvl: Option<u64>,
    pub mcast_querier_intvl: Option<u64>,
    pub mcast_query_intvl: Option<u64>,
    pub mcast_query_response_intvl: Option<u64>,
    pub mcast_startup_query_intvl: Option<u64>,
    pub mcast_querier: Option<bool>,
    pub msti: Option<u16>,
}

impl GlobalOptsAttrs {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}
