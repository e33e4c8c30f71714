//! sonic-vlan-opts - bridge per-VLAN and global VLAN option processing
//!
//! Applies option changes (STP state, VLAN to tunnel mapping, multicast
//! router mode and group limits, neighbor suppression, bridge-wide
//! multicast and MST settings) to ranges of bridge VLANs, and announces the
//! VLANs that actually changed as compressed ranges.
//!
//! The VLAN database, tunnel index, multicast subsystem and notifier are
//! supplied through the traits in [`callbacks`]; [`memdb`] has in-memory
//! versions of all of them.

pub mod attrs;
pub mod callbacks;
pub mod config;
pub mod encode;
mod error;
pub mod memdb;
pub mod mutators;
mod process;
pub mod range;
mod types;

pub use attrs::{GlobalOptsAttrs, TunnelCmd, TunnelInfoAttrs, VlanEntryAttrs};
pub use callbacks::{McastOps, NotifyKind, NotifyScope, TunnelTable, VlanGroup, VlanNotifier};
pub use config::{Capabilities, VlanOptsConfig};
pub use encode::{AttrWriter, NlaBuffer};
pub use error::{EncodeError, VlanOptsError, VlanOptsResult};
pub use memdb::{DefaultMcastOps, PortTunnelMap, RecordingNotifier, VlanNotification, VlanTable};
pub use mutators::PortCtx;
pub use process::{VlanOptsEngine, VlanOptsStats};
pub use range::{dump_global_ranges, dump_ranges, ChangeRange};
pub use types::*;

pub use sonic_types::{VlanId, VlanRange};
