//! `devicekitd discover`: one discovery cycle, report on stdout.

use tracing::info;

use devicekit_config::Config;

use super::Service;
use crate::error::CliError;

pub async fn handle(config: &Config) -> Result<(), CliError> {
    let Service {
        registry,
        coordinator,
    } = Service::build(config);

    let mut reports = coordinator.subscribe_reports();
    let ack = coordinator.handle_trigger_request();
    info!(correlation_id = %ack.correlation_id, "{}", ack.message);

    reports
        .changed()
        .await
        .map_err(|_| CliError::DiscoveryAborted)?;
    let report = reports
        .borrow_and_update()
        .clone()
        .ok_or(CliError::DiscoveryAborted)?;

    info!(devices = registry.device_count(), "discovery finished");
    println!("{}", serde_json::to_string_pretty(&*report)?);
    Ok(())
}
