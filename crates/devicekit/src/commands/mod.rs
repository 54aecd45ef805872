//! Command handlers and the service wiring they share.

pub mod discover;
pub mod run;

use std::path::Path;
use std::sync::Arc;

use devicekit_config::Config;
use devicekit_core::{DiscoveryCoordinator, InMemoryRegistry, RegistryCache, RegistryClient};

use crate::error::CliError;
use crate::simulated::SimulatedDiscovery;

/// Load the config. An explicit path must exist; the default location
/// may be absent, in which case built-in defaults apply.
pub fn load(path: Option<&Path>) -> Result<Config, CliError> {
    if let Some(missing) = path.filter(|p| !p.exists()) {
        return Err(CliError::NoConfig {
            path: missing.display().to_string(),
        });
    }
    Ok(devicekit_config::load_config(path)?)
}

/// The pieces every command runs against.
struct Service {
    registry: Arc<InMemoryRegistry>,
    coordinator: DiscoveryCoordinator,
}

impl Service {
    fn build(config: &Config) -> Self {
        let registry = Arc::new(InMemoryRegistry::seeded(
            config.devices.iter().cloned(),
            config.provision_watchers.iter().cloned(),
        ));
        let coordinator = DiscoveryCoordinator::new(
            config.service.name.clone(),
            Arc::new(SimulatedDiscovery::new(&config.simulated)),
            Arc::clone(&registry) as Arc<dyn RegistryCache>,
            Arc::clone(&registry) as Arc<dyn RegistryClient>,
        );
        Self {
            registry,
            coordinator,
        }
    }
}
