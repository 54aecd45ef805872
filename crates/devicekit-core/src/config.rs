// ── Runtime service configuration ──
//
// These types describe how the background workers behave. They never
// touch disk: the binary loads a config file through devicekit-config
// and hands the translated values in.

use std::time::Duration;

/// Periodic discovery settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiscoveryConfig {
    /// Master switch for the periodic trigger. Manual triggers still work
    /// when this is `false`.
    pub enabled: bool,
    /// Seconds between periodic triggers. `<= 0` disables the periodic loop.
    pub interval_secs: i64,
}

impl DiscoveryConfig {
    /// The periodic cadence, or `None` when periodic discovery is off.
    pub fn periodic_interval(&self) -> Option<Duration> {
        if !self.enabled || self.interval_secs <= 0 {
            return None;
        }
        u64::try_from(self.interval_secs)
            .ok()
            .map(Duration::from_secs)
    }
}

/// Configuration for a single device service instance.
///
/// Built by the binary, passed to core -- core never reads config files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Service name, stamped onto devices registered by discovery when a
    /// provision watcher does not name one.
    pub name: String,
    pub discovery: DiscoveryConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "devicekit".into(),
            discovery: DiscoveryConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn periodic_interval_requires_enabled_and_positive() {
        let on = DiscoveryConfig {
            enabled: true,
            interval_secs: 30,
        };
        assert_eq!(on.periodic_interval(), Some(Duration::from_secs(30)));

        let disabled = DiscoveryConfig {
            enabled: false,
            interval_secs: 30,
        };
        assert_eq!(disabled.periodic_interval(), None);

        let zero = DiscoveryConfig {
            enabled: true,
            interval_secs: 0,
        };
        assert_eq!(zero.periodic_interval(), None);

        let negative = DiscoveryConfig {
            enabled: true,
            interval_secs: -5,
        };
        assert_eq!(negative.periodic_interval(), None);
    }
}
