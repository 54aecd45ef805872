//! Simulated protocol driver.
//!
//! Stands in for real hardware: the scan returns the candidates listed
//! in `[simulated]`, and each auto-event ticks out a synthetic reading.

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use devicekit_config::SimulatedSection;
use devicekit_core::{
    AutoEvent, CoreError, DiscoveredDevice, Executor, ExecutorFactory, ProtocolDiscovery,
};

// ── Discovery ────────────────────────────────────────────────────────

pub struct SimulatedDiscovery {
    candidates: Vec<DiscoveredDevice>,
    delay: Duration,
}

impl SimulatedDiscovery {
    pub fn new(section: &SimulatedSection) -> Self {
        Self {
            candidates: section.candidates.clone(),
            delay: Duration::from_millis(section.scan_delay_ms),
        }
    }
}

#[async_trait]
impl ProtocolDiscovery for SimulatedDiscovery {
    async fn discover(&self) -> Vec<DiscoveredDevice> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        info!(count = self.candidates.len(), "simulated scan complete");
        self.candidates.clone()
    }
}

// ── Auto-events ──────────────────────────────────────────────────────

pub struct TickExecutorFactory;

impl ExecutorFactory for TickExecutorFactory {
    fn create(
        &self,
        device_name: &str,
        auto_event: &AutoEvent,
    ) -> Result<Box<dyn Executor>, CoreError> {
        let interval = auto_event.interval_duration()?;
        Ok(Box::new(TickExecutor {
            device: device_name.to_owned(),
            resource: auto_event.resource.clone(),
            interval,
            on_change: auto_event.on_change,
        }))
    }
}

/// Publishes a counter-derived reading on every tick.
struct TickExecutor {
    device: String,
    resource: String,
    interval: Duration,
    on_change: bool,
}

impl TickExecutor {
    /// Changes every other tick so `on_change` has something to suppress.
    fn reading(tick: u64) -> u64 {
        tick / 2
    }
}

#[async_trait]
impl Executor for TickExecutor {
    async fn run(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut tick: u64 = 0;
        let mut last: Option<u64> = None;

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let value = Self::reading(tick);
                    tick += 1;
                    if self.on_change && last == Some(value) {
                        continue;
                    }
                    last = Some(value);
                    info!(device = %self.device, resource = %self.resource, value, "reading");
                }
            }
        }
        debug!(device = %self.device, resource = %self.resource, "executor finished");
    }
}
