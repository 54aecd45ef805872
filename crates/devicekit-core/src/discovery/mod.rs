// ── Device discovery ──
//
// Single-flight coordination of protocol scans, admission filtering of
// the candidates they produce, and the periodic trigger loop.

mod coordinator;
pub mod filter;
mod trigger;

use async_trait::async_trait;

use crate::model::DiscoveredDevice;

pub use coordinator::{DiscoveryCoordinator, DiscoveryReport, DiscoveryRun, TriggerAck, TriggerOutcome};
pub use filter::Verdict;
pub use trigger::run_periodic_discovery;

/// Protocol-specific device scan, supplied by the device service.
///
/// Each invocation must eventually return exactly one (possibly empty)
/// list. A scan that never returns keeps the discovery gate busy.
#[async_trait]
pub trait ProtocolDiscovery: Send + Sync {
    async fn discover(&self) -> Vec<DiscoveredDevice>;
}
