// ── In-memory registry ──
//
// Concurrent device and provision-watcher storage with push-based
// change notification via a `broadcast` channel.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

use super::{DeviceChange, RegistryCache, RegistryClient};
use crate::error::CoreError;
use crate::model::{AddDeviceRequest, Device, ProvisionWatcher};

const CHANGE_CHANNEL_SIZE: usize = 256;

/// A registry that lives entirely in process memory.
///
/// Devices are keyed by name, which the registry keeps unique. Every
/// mutation publishes a [`DeviceChange`] to subscribers.
pub struct InMemoryRegistry {
    devices: DashMap<String, Arc<Device>>,
    watchers: DashMap<String, Arc<ProvisionWatcher>>,
    changes: broadcast::Sender<DeviceChange>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_SIZE);
        Self {
            devices: DashMap::new(),
            watchers: DashMap::new(),
            changes,
        }
    }

    /// Build a registry pre-populated with devices and watchers.
    ///
    /// Seeding does not publish change notifications.
    pub fn seeded(
        devices: impl IntoIterator<Item = Device>,
        watchers: impl IntoIterator<Item = ProvisionWatcher>,
    ) -> Self {
        let registry = Self::new();
        for mut device in devices {
            if device.id.is_empty() {
                device.id = Uuid::new_v4().to_string();
            }
            registry.devices.insert(device.name.clone(), Arc::new(device));
        }
        for watcher in watchers {
            registry
                .watchers
                .insert(watcher.name.clone(), Arc::new(watcher));
        }
        registry
    }

    /// Subscribe to device lifecycle notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<DeviceChange> {
        self.changes.subscribe()
    }

    /// Insert or replace a device. Returns `true` if the name was new.
    pub fn upsert_device(&self, mut device: Device) -> bool {
        if device.id.is_empty() {
            device.id = self
                .devices
                .get(&device.name)
                .map_or_else(|| Uuid::new_v4().to_string(), |d| d.id.clone());
        }
        let name = device.name.clone();
        let is_new = self.devices.insert(name.clone(), Arc::new(device)).is_none();
        let change = if is_new {
            DeviceChange::Added(name)
        } else {
            DeviceChange::Updated(name)
        };
        self.publish(change);
        is_new
    }

    /// Remove a device by name. Returns the removed record if it existed.
    pub fn remove_device(&self, name: &str) -> Option<Arc<Device>> {
        let removed = self.devices.remove(name).map(|(_, d)| d);
        if removed.is_some() {
            self.publish(DeviceChange::Removed(name.to_owned()));
        }
        removed
    }

    pub fn upsert_provision_watcher(&self, watcher: ProvisionWatcher) {
        self.watchers.insert(watcher.name.clone(), Arc::new(watcher));
    }

    pub fn remove_provision_watcher(&self, name: &str) -> Option<Arc<ProvisionWatcher>> {
        self.watchers.remove(name).map(|(_, w)| w)
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    fn publish(&self, change: DeviceChange) {
        // No receivers is not an error: nobody is listening yet.
        if self.changes.send(change.clone()).is_err() {
            debug!(device = change.device_name(), "no change subscribers");
        }
    }
}

impl Default for InMemoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RegistryCache for InMemoryRegistry {
    fn all_devices(&self) -> Vec<Arc<Device>> {
        let mut devices: Vec<Arc<Device>> =
            self.devices.iter().map(|r| Arc::clone(r.value())).collect();
        devices.sort_by(|a, b| a.name.cmp(&b.name));
        devices
    }

    fn device_by_name(&self, name: &str) -> Option<Arc<Device>> {
        self.devices.get(name).map(|r| Arc::clone(r.value()))
    }

    fn all_provision_watchers(&self) -> Vec<Arc<ProvisionWatcher>> {
        let mut watchers: Vec<Arc<ProvisionWatcher>> =
            self.watchers.iter().map(|r| Arc::clone(r.value())).collect();
        watchers.sort_by(|a, b| a.name.cmp(&b.name));
        watchers
    }
}

#[async_trait]
impl RegistryClient for InMemoryRegistry {
    async fn add_device(&self, request: AddDeviceRequest) -> Result<String, CoreError> {
        if request.name.trim().is_empty() {
            return Err(CoreError::RegistryWrite {
                name: request.name,
                reason: "device name is empty".into(),
            });
        }
        let id = Uuid::new_v4().to_string();
        let name = request.name.clone();
        match self.devices.entry(name.clone()) {
            Entry::Occupied(_) => return Err(CoreError::DuplicateDevice { name }),
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(request.into_device(id.clone())));
            }
        }
        self.publish(DeviceChange::Added(name));
        Ok(id)
    }
}
