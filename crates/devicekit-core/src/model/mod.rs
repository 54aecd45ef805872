// ── Domain model ──
//
// Devices and provision watchers are registry-owned; core holds
// snapshots. Discovered devices live for a single discovery cycle.

pub mod device;
pub mod watcher;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

pub use device::{
    AddDeviceRequest, AdminState, AutoEvent, Device, OperatingState, ProtocolProperties,
};
pub use watcher::ProvisionWatcher;

/// An unregistered candidate produced by a protocol scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredDevice {
    pub name: String,
    #[serde(default)]
    pub protocols: HashMap<String, ProtocolProperties>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub labels: Vec<String>,
}

impl DiscoveredDevice {
    /// Every value exposed for `property` across all protocol bundles.
    pub fn property_values<'a>(
        &'a self,
        property: &'a str,
    ) -> impl Iterator<Item = &'a str> + 'a {
        self.protocols
            .values()
            .filter_map(move |bundle| bundle.get(property).map(String::as_str))
    }
}
