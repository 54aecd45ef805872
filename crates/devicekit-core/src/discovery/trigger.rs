// ── Periodic discovery trigger ──

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{DiscoveryCoordinator, TriggerOutcome};
use crate::config::DiscoveryConfig;

/// Trigger discovery on a fixed cadence until `cancel` fires.
///
/// The configuration is read once on entry. When discovery is disabled or
/// the interval is not positive this returns immediately and discovery is
/// only reachable through manual triggers. A tick that finds a run already
/// in flight is dropped; the next tick tries again.
pub async fn run_periodic_discovery(
    coordinator: DiscoveryCoordinator,
    config: DiscoveryConfig,
    cancel: CancellationToken,
) {
    let Some(period) = config.periodic_interval() else {
        info!(
            enabled = config.enabled,
            interval_secs = config.interval_secs,
            "periodic discovery disabled"
        );
        return;
    };
    info!(interval_secs = config.interval_secs, "periodic discovery started");

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(period) => {
                match coordinator.trigger_discovery() {
                    TriggerOutcome::Accepted { correlation_id } => {
                        debug!(%correlation_id, "auto-discovery triggered");
                    }
                    TriggerOutcome::Busy { correlation_id } => {
                        debug!(%correlation_id, "discovery still running, tick skipped");
                    }
                }
            }
        }
    }
    debug!("periodic discovery stopped");
}
