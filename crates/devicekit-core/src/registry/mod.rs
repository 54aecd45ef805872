// ── Registry collaborators ──
//
// The device registry owns devices and provision watchers. Core reads
// them through `RegistryCache` and writes new devices through
// `RegistryClient`; it never mutates the cache directly.

mod memory;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::CoreError;
use crate::model::{AddDeviceRequest, Device, ProvisionWatcher};

pub use memory::InMemoryRegistry;

/// Read-only view of the registry.
pub trait RegistryCache: Send + Sync {
    fn all_devices(&self) -> Vec<Arc<Device>>;

    fn device_by_name(&self, name: &str) -> Option<Arc<Device>>;

    /// All provision watchers, in the order discovery should evaluate them.
    fn all_provision_watchers(&self) -> Vec<Arc<ProvisionWatcher>>;
}

/// Write side of the registry.
#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// Register a new device, returning its registry id.
    async fn add_device(&self, request: AddDeviceRequest) -> Result<String, CoreError>;
}

/// Device lifecycle notification published by the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceChange {
    Added(String),
    Updated(String),
    Removed(String),
}

impl DeviceChange {
    pub fn device_name(&self) -> &str {
        match self {
            Self::Added(name) | Self::Updated(name) | Self::Removed(name) => name,
        }
    }
}
