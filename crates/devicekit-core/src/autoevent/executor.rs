// ── Executor seam ──
//
// The device service supplies executors; the fleet manager owns their
// lifecycle. Each live executor runs on its own task and is stopped by
// cancelling the token it was handed.

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, info_span, warn};

use crate::error::CoreError;
use crate::model::AutoEvent;

/// Runs one auto-event for one device.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Read and publish on the auto-event's cadence until `cancel` fires.
    /// Should return promptly once cancelled.
    async fn run(&self, cancel: CancellationToken);
}

/// Builds executors from auto-event definitions.
pub trait ExecutorFactory: Send + Sync {
    fn create(
        &self,
        device_name: &str,
        auto_event: &AutoEvent,
    ) -> Result<Box<dyn Executor>, CoreError>;
}

/// A spawned executor tracked by the fleet manager.
pub(crate) struct RunningExecutor {
    resource: String,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl RunningExecutor {
    pub(crate) fn spawn(
        device_name: &str,
        resource: &str,
        executor: Box<dyn Executor>,
        cancel: CancellationToken,
    ) -> Self {
        let span = info_span!("auto_event", device = %device_name, resource = %resource);
        let token = cancel.clone();
        let handle = tokio::spawn(async move { executor.run(token).await }.instrument(span));
        Self {
            resource: resource.to_owned(),
            cancel,
            handle,
        }
    }

    pub(crate) fn resource(&self) -> &str {
        &self.resource
    }

    /// Signal cancellation and wait for the run loop to return.
    pub(crate) async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            warn!(resource = %self.resource, error = %e, "auto-event executor ended abnormally");
        }
    }
}
