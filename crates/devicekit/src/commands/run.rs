//! `devicekitd run`: the long-running service.
//!
//! Besides the periodic trigger, `SIGUSR1` requests a discovery run on
//! demand. The ack is logged since there is no caller to return it to.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use devicekit_config::Config;
use devicekit_core::{
    AutoEventManager, DiscoveryCoordinator, RegistryCache, run_periodic_discovery,
    spawn_change_listener,
};

use super::Service;
use crate::error::CliError;
use crate::simulated::TickExecutorFactory;

pub async fn handle(config: &Config) -> Result<(), CliError> {
    let service_config = config.service_config();
    let Service {
        registry,
        coordinator,
    } = Service::build(config);

    let root = CancellationToken::new();
    let manager = Arc::new(AutoEventManager::new(
        Arc::clone(&registry) as Arc<dyn RegistryCache>,
        Arc::new(TickExecutorFactory),
        root.child_token(),
    ));

    // One slot: a request queued behind a pending one adds nothing.
    let (manual_tx, manual_rx) = mpsc::channel(1);
    #[cfg(unix)]
    let forwarder = forward_sigusr1(manual_tx, root.child_token())?;
    #[cfg(not(unix))]
    drop(manual_tx);

    // Subscribe before start so no change published during bootstrap is lost.
    let changes = registry.subscribe();
    manager.start().await;
    let listener = spawn_change_listener(Arc::clone(&manager), changes, root.child_token());
    let manual = tokio::spawn(serve_manual_triggers(
        coordinator.clone(),
        manual_rx,
        root.child_token(),
    ));
    let trigger = tokio::spawn(run_periodic_discovery(
        coordinator,
        service_config.discovery,
        root.child_token(),
    ));

    info!(
        service = %service_config.name,
        devices = registry.device_count(),
        periodic_discovery = ?service_config.discovery.periodic_interval(),
        "service running, send SIGUSR1 to discover, press Ctrl-C to stop"
    );

    let signal = tokio::signal::ctrl_c().await;
    info!("shutting down");
    root.cancel();
    manager.stop().await;

    let mut tasks = vec![
        ("change listener", listener),
        ("manual trigger", manual),
        ("discovery trigger", trigger),
    ];
    #[cfg(unix)]
    tasks.push(("signal forwarder", forwarder));
    for (task, handle) in tasks {
        if let Err(e) = handle.await {
            warn!(task, error = %e, "background task ended abnormally");
        }
    }
    signal?;
    Ok(())
}

/// Turn each queued request into a trigger until `cancel` fires or every
/// sender is gone.
async fn serve_manual_triggers(
    coordinator: DiscoveryCoordinator,
    mut requests: mpsc::Receiver<()>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            request = requests.recv() => {
                let Some(()) = request else { break };
                let ack = coordinator.handle_trigger_request();
                info!(
                    correlation_id = %ack.correlation_id,
                    accepted = ack.accepted,
                    "{}",
                    ack.message
                );
            }
        }
    }
    debug!("manual trigger stopped");
}

/// Register the `SIGUSR1` handler now so a registration failure aborts
/// startup, then forward each signal as a trigger request.
#[cfg(unix)]
fn forward_sigusr1(
    requests: mpsc::Sender<()>,
    cancel: CancellationToken,
) -> std::io::Result<tokio::task::JoinHandle<()>> {
    use tokio::signal::unix::{SignalKind, signal};
    use tokio::sync::mpsc::error::TrySendError;

    let mut usr1 = signal(SignalKind::user_defined1())?;
    Ok(tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                received = usr1.recv() => {
                    if received.is_none() {
                        break;
                    }
                    debug!("SIGUSR1 received");
                    match requests.try_send(()) {
                        Ok(()) => {}
                        Err(TrySendError::Full(())) => debug!("trigger request already pending"),
                        Err(TrySendError::Closed(())) => break,
                    }
                }
            }
        }
    }))
}
