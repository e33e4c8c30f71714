//! Common SONiC types shared by the bridge VLAN crates.
//!
//! - [`VlanId`]: IEEE 802.1Q VLAN identifier (1-4094)
//! - [`VlanRange`]: inclusive run of VLAN identifiers

mod vlan;

pub use vlan::{VlanId, VlanRange, VlanRangeIter};

/// Common error type for parsing failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid VLAN ID: {0} (must be 1-4094)")]
    InvalidVlanId(u16),

    #[error("invalid VLAN range: start {start} is above end {end}")]
    InvertedVlanRange { start: u16, end: u16 },

    #[error("malformed VLAN range: {0}")]
    MalformedVlanRange(String),
}
