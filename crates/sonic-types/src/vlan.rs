//! VLAN identifiers and inclusive VLAN ranges.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// IEEE 802.1Q VLAN identifier (1-4094).
///
/// 0 and 4095 are reserved by the standard and never name a bridge VLAN.
///
/// # Examples
///
/// ```
/// use sonic_types::VlanId;
///
/// let vid = VlanId::new(100).unwrap();
/// assert_eq!(vid.get(), 100);
/// assert!(VlanId::new(4095).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub struct VlanId(u16);

impl VlanId {
    /// Lowest usable VLAN ID.
    pub const MIN: u16 = 1;

    /// Highest usable VLAN ID.
    pub const MAX: u16 = 4094;

    /// Validates and wraps a raw VLAN ID.
    pub const fn new(id: u16) -> Result<Self, ParseError> {
        if id >= Self::MIN && id <= Self::MAX {
            Ok(VlanId(id))
        } else {
            Err(ParseError::InvalidVlanId(id))
        }
    }

    /// Returns the raw 12-bit value.
    pub const fn get(self) -> u16 {
        self.0
    }

    /// Distance from `base` to `self`, or `None` when `base` lies above.
    pub const fn offset_from(self, base: VlanId) -> Option<u16> {
        self.0.checked_sub(base.0)
    }

    /// The next VLAN ID, `None` past 4094.
    pub fn checked_next(self) -> Option<VlanId> {
        VlanId::new(self.0 + 1).ok()
    }
}

impl fmt::Display for VlanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for VlanId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Accept both "100" and the "Vlan100" alias form
        let digits = match s.get(..4) {
            Some(prefix) if prefix.eq_ignore_ascii_case("vlan") => &s[4..],
            _ => s,
        };
        let id: u16 = digits.parse().map_err(|_| ParseError::InvalidVlanId(0))?;
        VlanId::new(id)
    }
}

impl TryFrom<u16> for VlanId {
    type Error = ParseError;

    fn try_from(id: u16) -> Result<Self, Self::Error> {
        VlanId::new(id)
    }
}

impl From<VlanId> for u16 {
    fn from(vid: VlanId) -> u16 {
        vid.0
    }
}

/// Inclusive range of VLAN IDs, `start <= end`.
///
/// Bridge VLAN requests address VLANs in blocks; a single VLAN is the
/// degenerate range where both ends are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawRange", into = "RawRange")]
pub struct VlanRange {
    start: VlanId,
    end: VlanId,
}

#[derive(Serialize, Deserialize)]
struct RawRange {
    start: u16,
    end: u16,
}

impl VlanRange {
    /// Builds a range, rejecting an inverted pair.
    pub fn new(start: VlanId, end: VlanId) -> Result<Self, ParseError> {
        if start > end {
            return Err(ParseError::InvertedVlanRange {
                start: start.get(),
                end: end.get(),
            });
        }
        Ok(Self { start, end })
    }

    /// Builds a range from raw IDs, validating both ends.
    pub fn from_raw(start: u16, end: u16) -> Result<Self, ParseError> {
        Self::new(VlanId::new(start)?, VlanId::new(end)?)
    }

    /// Range holding exactly one VLAN.
    pub fn single(vid: VlanId) -> Self {
        Self { start: vid, end: vid }
    }

    pub fn start(&self) -> VlanId {
        self.start
    }

    pub fn end(&self) -> VlanId {
        self.end
    }

    /// Number of VLANs covered.
    pub fn len(&self) -> usize {
        usize::from(self.end.get() - self.start.get()) + 1
    }

    /// Always false; kept for clippy's `len_without_is_empty`.
    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn contains(&self, vid: VlanId) -> bool {
        self.start <= vid && vid <= self.end
    }

    pub fn iter(&self) -> VlanRangeIter {
        VlanRangeIter {
            next: Some(self.start),
            end: self.end,
        }
    }
}

impl fmt::Display for VlanRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}-{}", self.start, self.end)
        }
    }
}

impl FromStr for VlanRange {
    type Err = ParseError;

    /// Parses "10" or "10-20".
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('-') {
            Some((lo, hi)) => Self::new(lo.trim().parse()?, hi.trim().parse()?),
            None if !s.is_empty() => Ok(Self::single(s.trim().parse()?)),
            None => Err(ParseError::MalformedVlanRange(s.to_string())),
        }
    }
}

impl TryFrom<RawRange> for VlanRange {
    type Error = ParseError;

    fn try_from(raw: RawRange) -> Result<Self, Self::Error> {
        Self::from_raw(raw.start, raw.end)
    }
}

impl From<VlanRange> for RawRange {
    fn from(range: VlanRange) -> Self {
        RawRange {
            start: range.start.get(),
            end: range.end.get(),
        }
    }
}

impl IntoIterator for VlanRange {
    type Item = VlanId;
    type IntoIter = VlanRangeIter;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Ascending iterator over a [`VlanRange`].
#[derive(Debug, Clone)]
pub struct VlanRangeIter {
    next: Option<VlanId>,
    end: VlanId,
}

impl Iterator for VlanRangeIter {
    type Item = VlanId;

    fn next(&mut self) -> Option<VlanId> {
        let current = self.next?;
        self.next = if current < self.end {
            current.checked_next()
        } else {
            None
        };
        Some(current)
    }
}
