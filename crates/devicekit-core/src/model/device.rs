// ── Device domain types ──

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::CoreError;

/// Protocol property bundle: property name -> value (e.g. `"mac"` -> `"AA:11:..."`).
pub type ProtocolProperties = HashMap<String, String>;

/// Administrative state, set by operators.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum AdminState {
    Locked,
    #[default]
    Unlocked,
}

/// Operational state, reported by the service.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum OperatingState {
    #[default]
    Enabled,
    Disabled,
}

/// A periodic (or change-triggered) reading bound to one device resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoEvent {
    pub resource: String,
    /// Human-readable cadence, e.g. `"10s"` or `"500ms"`.
    pub interval: String,
    /// Only publish when the reading differs from the previous one.
    #[serde(default)]
    pub on_change: bool,
}

impl AutoEvent {
    /// Parse and validate the cadence.
    ///
    /// Fails for an empty resource name, an unparseable interval, or a zero
    /// interval -- an executor cannot be built from any of those.
    pub fn interval_duration(&self) -> Result<Duration, CoreError> {
        if self.resource.trim().is_empty() {
            return Err(CoreError::InvalidAutoEvent {
                resource: self.resource.clone(),
                reason: "resource name is empty".into(),
            });
        }
        let duration = humantime::parse_duration(self.interval.trim()).map_err(|e| {
            CoreError::InvalidAutoEvent {
                resource: self.resource.clone(),
                reason: format!("invalid interval '{}': {e}", self.interval),
            }
        })?;
        if duration.is_zero() {
            return Err(CoreError::InvalidAutoEvent {
                resource: self.resource.clone(),
                reason: "interval must be greater than zero".into(),
            });
        }
        Ok(duration)
    }
}

/// A registered device, as held by the registry.
///
/// Core only ever sees snapshots; the registry owns the record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    /// Registry-assigned id. Empty until registered.
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub admin_state: AdminState,
    #[serde(default)]
    pub operating_state: OperatingState,
    /// Protocol name -> property bundle.
    #[serde(default)]
    pub protocols: HashMap<String, ProtocolProperties>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub profile_name: String,
    #[serde(default)]
    pub service_name: String,
    #[serde(default)]
    pub auto_events: Vec<AutoEvent>,
    /// Creation timestamp, milliseconds since the Unix epoch.
    #[serde(default)]
    pub origin: i64,
}

/// Registration request built for an admitted discovery candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddDeviceRequest {
    pub name: String,
    pub description: String,
    pub profile_name: String,
    pub service_name: String,
    pub admin_state: AdminState,
    pub operating_state: OperatingState,
    pub protocols: HashMap<String, ProtocolProperties>,
    pub labels: Vec<String>,
    pub auto_events: Vec<AutoEvent>,
    pub origin: i64,
}

impl AddDeviceRequest {
    /// Materialise the request as a device record with the given id.
    pub fn into_device(self, id: String) -> Device {
        Device {
            id,
            name: self.name,
            description: self.description,
            admin_state: self.admin_state,
            operating_state: self.operating_state,
            protocols: self.protocols,
            labels: self.labels,
            profile_name: self.profile_name,
            service_name: self.service_name,
            auto_events: self.auto_events,
            origin: self.origin,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn auto_event(resource: &str, interval: &str) -> AutoEvent {
        AutoEvent {
            resource: resource.into(),
            interval: interval.into(),
            on_change: false,
        }
    }

    #[test]
    fn interval_parses_humantime_strings() {
        assert_eq!(
            auto_event("temperature", "10s").interval_duration().ok(),
            Some(Duration::from_secs(10))
        );
        assert_eq!(
            auto_event("humidity", "500ms").interval_duration().ok(),
            Some(Duration::from_millis(500))
        );
    }

    #[test]
    fn interval_rejects_garbage_zero_and_empty_resource() {
        assert!(matches!(
            auto_event("temperature", "often").interval_duration(),
            Err(CoreError::InvalidAutoEvent { .. })
        ));
        assert!(matches!(
            auto_event("temperature", "0s").interval_duration(),
            Err(CoreError::InvalidAutoEvent { .. })
        ));
        assert!(matches!(
            auto_event("  ", "1s").interval_duration(),
            Err(CoreError::InvalidAutoEvent { .. })
        ));
    }

    #[test]
    fn states_render_upper_case() {
        assert_eq!(AdminState::Unlocked.to_string(), "UNLOCKED");
        assert_eq!(OperatingState::Enabled.to_string(), "ENABLED");
        assert_eq!("locked".parse::<AdminState>().ok(), Some(AdminState::Locked));
    }
}
