//! Background work coordination for a device service.
//!
//! This crate owns the two long-lived background concerns a device
//! service runs on behalf of its managed devices:
//!
//! - **[`AutoEventManager`]**: the fleet of periodic executors, keyed by
//!   device name. [`start()`](AutoEventManager::start) bootstraps every
//!   cached device exactly once; [`restart_for_device()`](AutoEventManager::restart_for_device)
//!   and [`stop_for_device()`](AutoEventManager::stop_for_device) follow
//!   registry changes delivered as [`DeviceChange`] notifications.
//!
//! - **[`DiscoveryCoordinator`]**: single-flight discovery. A trigger
//!   either starts a new run (tagged with a correlation id) or reports the
//!   run already in flight. Scan results flow through the admission
//!   [`filter`](discovery::filter) (allow-list, then deny-list) before
//!   accepted candidates are registered.
//!
//! - **[`run_periodic_discovery`]**: fixed-cadence trigger loop driven by
//!   [`DiscoveryConfig`].
//!
//! - **Registry seams** ([`registry`]): [`RegistryCache`] for read-only
//!   device and provision-watcher lookups, [`RegistryClient`] for writes,
//!   and an [`InMemoryRegistry`] implementing both.

pub mod autoevent;
pub mod config;
pub mod discovery;
pub mod error;
pub mod model;
pub mod registry;

// ── Primary re-exports ──────────────────────────────────────────────
pub use autoevent::{AutoEventManager, Executor, ExecutorFactory, spawn_change_listener};
pub use config::{DiscoveryConfig, ServiceConfig};
pub use discovery::{
    DiscoveryCoordinator, DiscoveryReport, DiscoveryRun, ProtocolDiscovery, TriggerAck,
    TriggerOutcome, run_periodic_discovery,
};
pub use error::CoreError;
pub use registry::{DeviceChange, InMemoryRegistry, RegistryCache, RegistryClient};

pub use model::{
    AddDeviceRequest, AdminState, AutoEvent, Device, DiscoveredDevice, OperatingState,
    ProtocolProperties, ProvisionWatcher,
};
