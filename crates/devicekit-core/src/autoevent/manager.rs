// ── AutoEvent fleet manager ──
//
// Device name -> running executors. One lock guards the whole map and
// the one-shot start flag; executors are cancelled and joined while it
// is held, so no caller ever observes a half-updated device entry.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::executor::{ExecutorFactory, RunningExecutor};
use crate::model::Device;
use crate::registry::{DeviceChange, RegistryCache};

struct FleetState {
    started: bool,
    executors: HashMap<String, Vec<RunningExecutor>>,
}

/// Owns every auto-event executor in the service.
///
/// Construct one per service and share it behind an `Arc`.
pub struct AutoEventManager {
    cache: Arc<dyn RegistryCache>,
    factory: Arc<dyn ExecutorFactory>,
    /// Parent of every executor token; cancelling it stops the whole fleet.
    cancel: CancellationToken,
    state: Mutex<FleetState>,
}

impl AutoEventManager {
    pub fn new(
        cache: Arc<dyn RegistryCache>,
        factory: Arc<dyn ExecutorFactory>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            cache,
            factory,
            cancel,
            state: Mutex::new(FleetState {
                started: false,
                executors: HashMap::new(),
            }),
        }
    }

    /// Start executors for every cached device.
    ///
    /// Runs the bootstrap once for the lifetime of the manager; later calls
    /// are no-ops. Always returns `true`.
    pub async fn start(&self) -> bool {
        let mut state = self.state.lock().await;
        if state.started {
            debug!("auto-events already started");
            return true;
        }
        state.started = true;

        let devices = self.cache.all_devices();
        for device in &devices {
            if state.executors.contains_key(&device.name) {
                continue;
            }
            let executors = self.spawn_executors(device);
            if !executors.is_empty() {
                state.executors.insert(device.name.clone(), executors);
            }
        }
        info!(
            devices = devices.len(),
            active = state.executors.len(),
            "auto-events started"
        );
        true
    }

    /// Stop and remove every executor.
    pub async fn stop(&self) {
        let mut state = self.state.lock().await;
        let running: Vec<RunningExecutor> = state
            .executors
            .drain()
            .flat_map(|(_, executors)| executors)
            .collect();
        let count = running.len();
        join_all(running.into_iter().map(RunningExecutor::stop)).await;
        info!(executors = count, "auto-events stopped");
    }

    /// Stop and remove one device's executors. No-op if it has none.
    pub async fn stop_for_device(&self, device_name: &str) {
        let mut state = self.state.lock().await;
        if let Some(running) = state.executors.remove(device_name) {
            join_all(running.into_iter().map(RunningExecutor::stop)).await;
            debug!(device = %device_name, "auto-events stopped for device");
        }
    }

    /// Replace a device's executors with ones built from its current
    /// definition in the registry cache.
    pub async fn restart_for_device(&self, device_name: &str) {
        let mut state = self.state.lock().await;
        if let Some(running) = state.executors.remove(device_name) {
            join_all(running.into_iter().map(RunningExecutor::stop)).await;
        }

        let Some(device) = self.cache.device_by_name(device_name) else {
            error!(device = %device_name, "no device in cache to start auto-events for");
            return;
        };

        let executors = self.spawn_executors(&device);
        debug!(device = %device_name, executors = executors.len(), "auto-events restarted for device");
        if !executors.is_empty() {
            state.executors.insert(device.name.clone(), executors);
        }
    }

    /// Apply a registry lifecycle notification.
    pub async fn handle_change(&self, change: &DeviceChange) {
        match change {
            DeviceChange::Added(name) | DeviceChange::Updated(name) => {
                self.restart_for_device(name).await;
            }
            DeviceChange::Removed(name) => self.stop_for_device(name).await,
        }
    }

    /// Resources with a live executor for `device_name`, in definition order.
    pub async fn running_resources(&self, device_name: &str) -> Vec<String> {
        self.state
            .lock()
            .await
            .executors
            .get(device_name)
            .map(|running| running.iter().map(|e| e.resource().to_owned()).collect())
            .unwrap_or_default()
    }

    /// Number of devices with at least one live executor.
    pub async fn device_count(&self) -> usize {
        self.state.lock().await.executors.len()
    }

    /// Build and spawn one executor per auto-event. Failures are logged and
    /// skipped; the rest of the device's auto-events still start.
    fn spawn_executors(&self, device: &Device) -> Vec<RunningExecutor> {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut running = Vec::with_capacity(device.auto_events.len());

        for auto_event in &device.auto_events {
            if !seen.insert(auto_event.resource.as_str()) {
                warn!(
                    device = %device.name,
                    resource = %auto_event.resource,
                    "duplicate auto-event resource, skipping"
                );
                continue;
            }
            match self.factory.create(&device.name, auto_event) {
                Ok(executor) => running.push(RunningExecutor::spawn(
                    &device.name,
                    &auto_event.resource,
                    executor,
                    self.cancel.child_token(),
                )),
                Err(e) => warn!(
                    device = %device.name,
                    resource = %auto_event.resource,
                    error = %e,
                    "auto-event cannot be created, skipping"
                ),
            }
        }
        running
    }
}

/// Feed registry change notifications into the manager until `cancel` fires.
pub fn spawn_change_listener(
    manager: Arc<AutoEventManager>,
    mut changes: broadcast::Receiver<DeviceChange>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                change = changes.recv() => match change {
                    Ok(change) => {
                        debug!(device = change.device_name(), ?change, "device change received");
                        manager.handle_change(&change).await;
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "device change listener lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }
        debug!("device change listener stopped");
    })
}
