//! Engine configuration: optional subsystems and tick rates.

use serde::{Deserialize, Serialize};

use crate::error::{VlanOptsError, VlanOptsResult};

/// Internal tick rate used when none is configured.
pub const DEFAULT_HZ: u32 = 250;

/// User-facing clock tick rate (`USER_HZ`).
pub const DEFAULT_USER_HZ: u32 = 100;

/// Optional subsystems the bridge was built with.
///
/// Defaults follow the crate's cargo features, so a build without
/// `multicast` behaves like a bridge without multicast snooping unless the
/// configuration turns it back on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Capabilities {
    /// Multicast snooping (router mode, max groups, global mcast options).
    pub multicast: bool,
    /// IPv6 multicast (MLD version).
    pub ipv6: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            multicast: cfg!(feature = "multicast"),
            ipv6: cfg!(feature = "ipv6"),
        }
    }
}

impl Capabilities {
    /// Everything enabled, regardless of features.
    pub const fn all() -> Self {
        Self {
            multicast: true,
            ipv6: true,
        }
    }

    /// Nothing optional enabled.
    pub const fn none() -> Self {
        Self {
            multicast: false,
            ipv6: false,
        }
    }

    /// MLD options need both multicast and IPv6.
    pub fn mld(&self) -> bool {
        self.multicast && self.ipv6
    }
}

/// VLAN options engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VlanOptsConfig {
    pub capabilities: Capabilities,
    /// Internal ticks per second.
    pub hz: u32,
    /// User clock ticks per second.
    pub user_hz: u32,
}

impl Default for VlanOptsConfig {
    fn default() -> Self {
        Self {
            capabilities: Capabilities::default(),
            hz: DEFAULT_HZ,
            user_hz: DEFAULT_USER_HZ,
        }
    }
}

impl VlanOptsConfig {
    /// Creates a configuration with the given capabilities and default rates.
    pub fn with_capabilities(capabilities: Capabilities) -> Self {
        Self {
            capabilities,
            ..Self::default()
        }
    }

    /// Rejects zero tick rates.
    pub fn validate(&self) -> VlanOptsResult<()> {
        if self.hz == 0 || self.user_hz == 0 {
            return Err(VlanOptsError::invalid(format!(
                "tick rates must be non-zero (hz={}, user_hz={})",
                self.hz, self.user_hz
            )));
        }
        Ok(())
    }

    /// Converts internal ticks to user clock ticks, rounding down.
    pub fn ticks_to_clock_t(&self, ticks: u64) -> u64 {
        scale(ticks, self.user_hz, self.hz)
    }

    /// Converts user clock ticks to internal ticks, saturating.
    pub fn clock_t_to_ticks(&self, clock: u64) -> u64 {
        scale(clock, self.hz, self.user_hz)
    }

    /// Whole seconds in internal ticks.
    pub fn secs_to_ticks(&self, secs: u64) -> u64 {
        secs.saturating_mul(u64::from(self.hz))
    }
}

fn scale(value: u64, mul: u32, div: u32) -> u64 {
    if div == 0 {
        return u64::MAX;
    }
    let scaled = u128::from(value) * u128::from(mul) / u128::from(div);
    u64::try_from(scaled).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_rates() {
        let config = VlanOptsConfig::default();
        assert_eq!(config.hz, 250);
        assert_eq!(config.user_hz, 100);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_tick_conversion() {
        let config = VlanOptsConfig::default();
        // 125s query interval
        assert_eq!(config.ticks_to_clock_t(125 * 250), 12500);
        assert_eq!(config.clock_t_to_ticks(12500), 125 * 250);
        assert_eq!(config.secs_to_ticks(2), 500);
    }

    #[test]
    fn test_tick_conversion_saturates() {
        let config = VlanOptsConfig::default();
        assert_eq!(config.clock_t_to_ticks(u64::MAX), u64::MAX);
    }

    #[test]
    fn test_validate_rejects_zero_hz() {
        let config = VlanOptsConfig {
            hz: 0,
            ..VlanOptsConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_deserialize_partial() {
        let config: VlanOptsConfig =
            serde_json::from_str(r#"{"capabilities":{"multicast":false},"hz":1000}"#).unwrap();
        assert!(!config.capabilities.multicast);
        assert_eq!(config.hz, 1000);
        assert_eq!(config.user_hz, 100);
    }

    #[test]
    fn test_mld_needs_both() {
        assert!(Capabilities::all().mld());
        let caps = Capabilities {
            multicast: false,
            ipv6: true,
        };
        assert!(!caps.mld());
    }
}
