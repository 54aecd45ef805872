// ── Discovery coordinator ──
//
// Owns the single-flight gate. The gate and the correlation id of the
// run it guards live in one `ArcSwapOption`: `None` is idle, `Some(run)`
// is running, and the idle -> running transition is a single
// compare-and-swap.

use std::collections::HashSet;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{oneshot, watch};
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use super::ProtocolDiscovery;
use super::filter::{self, CompiledWatcher, Verdict};
use crate::model::{AddDeviceRequest, DiscoveredDevice, OperatingState, ProvisionWatcher};
use crate::registry::{RegistryCache, RegistryClient};

/// HTTP-style status used for both trigger acknowledgments.
const STATUS_ACCEPTED: u16 = 202;

// ── DiscoveryRun ─────────────────────────────────────────────────

/// The in-flight discovery operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscoveryRun {
    pub correlation_id: Uuid,
    pub started_at: DateTime<Utc>,
}

// ── Trigger outcome ──────────────────────────────────────────────

/// Result of a trigger attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// A new run started with this correlation id.
    Accepted { correlation_id: Uuid },
    /// A run was already in flight; nothing was started.
    Busy { correlation_id: Uuid },
}

impl TriggerOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }

    pub fn correlation_id(&self) -> Uuid {
        match self {
            Self::Accepted { correlation_id } | Self::Busy { correlation_id } => *correlation_id,
        }
    }
}

/// Acknowledgment returned to whichever transport exposes the trigger.
///
/// Sent before the run completes; it is advisory only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TriggerAck {
    pub status: u16,
    pub accepted: bool,
    pub correlation_id: Uuid,
    pub message: String,
}

impl From<TriggerOutcome> for TriggerAck {
    fn from(outcome: TriggerOutcome) -> Self {
        match outcome {
            TriggerOutcome::Accepted { correlation_id } => Self {
                status: STATUS_ACCEPTED,
                accepted: true,
                correlation_id,
                message: format!("Discovery triggered, id = {correlation_id}"),
            },
            TriggerOutcome::Busy { correlation_id } => Self {
                status: STATUS_ACCEPTED,
                accepted: false,
                correlation_id,
                message: format!("Discovery already running, request ignored, id = {correlation_id}"),
            },
        }
    }
}

// ── DiscoveryReport ──────────────────────────────────────────────

/// Summary of one completed discovery cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscoveryReport {
    pub correlation_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub discovered: usize,
    pub registered: usize,
    pub rejected: usize,
    pub already_existing: usize,
    pub failed: usize,
}

impl DiscoveryReport {
    fn begin(run: &DiscoveryRun, discovered: usize) -> Self {
        Self {
            correlation_id: run.correlation_id,
            started_at: run.started_at,
            finished_at: run.started_at,
            discovered,
            registered: 0,
            rejected: 0,
            already_existing: 0,
            failed: 0,
        }
    }
}

/// What happened to a single candidate.
enum Admission {
    Registered,
    Rejected,
    AlreadyExisting,
    Failed,
}

// ── DiscoveryCoordinator ─────────────────────────────────────────

/// Single-flight discovery coordinator.
///
/// Cheaply cloneable via `Arc<CoordinatorInner>`. Construct one per
/// service and hand clones to every trigger source.
#[derive(Clone)]
pub struct DiscoveryCoordinator {
    inner: Arc<CoordinatorInner>,
}

struct CoordinatorInner {
    service_name: String,
    driver: Arc<dyn ProtocolDiscovery>,
    cache: Arc<dyn RegistryCache>,
    client: Arc<dyn RegistryClient>,
    run: ArcSwapOption<DiscoveryRun>,
    reports: watch::Sender<Option<Arc<DiscoveryReport>>>,
}

impl DiscoveryCoordinator {
    /// `service_name` is stamped on registered devices whose admitting
    /// watcher does not name a service.
    pub fn new(
        service_name: impl Into<String>,
        driver: Arc<dyn ProtocolDiscovery>,
        cache: Arc<dyn RegistryCache>,
        client: Arc<dyn RegistryClient>,
    ) -> Self {
        let (reports, _) = watch::channel(None);
        Self {
            inner: Arc::new(CoordinatorInner {
                service_name: service_name.into(),
                driver,
                cache,
                client,
                run: ArcSwapOption::empty(),
                reports,
            }),
        }
    }

    /// Try to start a discovery run.
    ///
    /// Exactly one of any number of concurrent callers observes
    /// [`TriggerOutcome::Accepted`]; the rest get [`TriggerOutcome::Busy`]
    /// until the run completes. Must be called within a tokio runtime.
    pub fn trigger_discovery(&self) -> TriggerOutcome {
        let run = Arc::new(DiscoveryRun {
            correlation_id: Uuid::new_v4(),
            started_at: Utc::now(),
        });

        let previous = self
            .inner
            .run
            .compare_and_swap(&None::<Arc<DiscoveryRun>>, Some(Arc::clone(&run)));
        if let Some(current) = &*previous {
            debug!(
                correlation_id = %current.correlation_id,
                "discovery request ignored, a run is already in flight"
            );
            return TriggerOutcome::Busy {
                correlation_id: current.correlation_id,
            };
        }

        info!(
            correlation_id = %run.correlation_id,
            service = %self.inner.service_name,
            "discovery triggered"
        );
        let correlation_id = run.correlation_id;
        self.spawn_run(run);
        TriggerOutcome::Accepted { correlation_id }
    }

    /// Trigger discovery and render the outcome as an acknowledgment.
    pub fn handle_trigger_request(&self) -> TriggerAck {
        TriggerAck::from(self.trigger_discovery())
    }

    /// The run currently in flight, if any.
    pub fn current_run(&self) -> Option<Arc<DiscoveryRun>> {
        self.inner.run.load_full()
    }

    pub fn is_running(&self) -> bool {
        self.inner.run.load().is_some()
    }

    /// Subscribe to completed-cycle reports. Holds `None` until the first
    /// cycle finishes.
    pub fn subscribe_reports(&self) -> watch::Receiver<Option<Arc<DiscoveryReport>>> {
        self.inner.reports.subscribe()
    }

    // ── Pipeline ─────────────────────────────────────────────────

    /// Run the scan and the admission pipeline as two tasks joined by a
    /// single-value channel.
    fn spawn_run(&self, run: Arc<DiscoveryRun>) {
        let span = info_span!("discovery", correlation_id = %run.correlation_id);
        let (tx, rx) = oneshot::channel();

        let driver = Arc::clone(&self.inner.driver);
        tokio::spawn(
            async move {
                let devices = driver.discover().await;
                if tx.send(devices).is_err() {
                    error!("discovery pipeline dropped before scan results arrived");
                }
            }
            .instrument(span.clone()),
        );

        let coordinator = self.clone();
        tokio::spawn(async move { coordinator.complete_run(&run, rx).await }.instrument(span));
    }

    async fn complete_run(
        &self,
        run: &DiscoveryRun,
        rx: oneshot::Receiver<Vec<DiscoveredDevice>>,
    ) {
        // The only suspension point: unbounded wait for the scan.
        let devices = rx.await.unwrap_or_else(|_| {
            error!("scan ended without delivering results");
            Vec::new()
        });

        let mut report = DiscoveryReport::begin(run, devices.len());
        self.filter_and_register(devices, &mut report).await;
        report.finished_at = Utc::now();

        self.inner.run.store(None);
        info!(
            discovered = report.discovered,
            registered = report.registered,
            rejected = report.rejected,
            already_existing = report.already_existing,
            failed = report.failed,
            "filtered device addition finished"
        );
        self.inner.reports.send_replace(Some(Arc::new(report)));
    }

    /// Evaluate candidates sequentially, each against the watchers in
    /// iteration order. A name is submitted at most once per scan.
    async fn filter_and_register(
        &self,
        devices: Vec<DiscoveredDevice>,
        report: &mut DiscoveryReport,
    ) {
        let watchers = self.inner.cache.all_provision_watchers();
        let compiled = compile_watchers(&watchers);
        let mut attempted: HashSet<String> = HashSet::new();

        for candidate in devices {
            if attempted.contains(&candidate.name) {
                debug!(device = %candidate.name, "duplicate candidate in scan result");
                report.already_existing += 1;
                continue;
            }

            match self.admit(&candidate, &compiled).await {
                Admission::Registered => {
                    report.registered += 1;
                    attempted.insert(candidate.name);
                }
                Admission::Failed => {
                    report.failed += 1;
                    attempted.insert(candidate.name);
                }
                Admission::AlreadyExisting => report.already_existing += 1,
                Admission::Rejected => report.rejected += 1,
            }
        }
    }

    /// The first watcher that admits the candidate decides its fate; a
    /// rejection moves on to the next watcher.
    async fn admit(
        &self,
        candidate: &DiscoveredDevice,
        watchers: &[CompiledWatcher<'_>],
    ) -> Admission {
        for compiled in watchers {
            let verdict = filter::evaluate(candidate, compiled);
            let watcher = compiled.watcher();
            if !verdict.is_admitted() {
                log_rejection(candidate, watcher, &verdict);
                continue;
            }

            if self.inner.cache.device_by_name(&candidate.name).is_some() {
                info!(device = %candidate.name, "candidate discovered device already exists");
                return Admission::AlreadyExisting;
            }

            info!(device = %candidate.name, watcher = %watcher.name, "registering discovered device");
            let request = self.registration_request(candidate, watcher);
            return match self.inner.client.add_device(request).await {
                Ok(id) => {
                    debug!(device = %candidate.name, id = %id, "discovered device registered");
                    Admission::Registered
                }
                Err(e) => {
                    error!(
                        device = %candidate.name,
                        watcher = %watcher.name,
                        error = %e,
                        "failed to register discovered device"
                    );
                    Admission::Failed
                }
            };
        }
        Admission::Rejected
    }

    fn registration_request(
        &self,
        candidate: &DiscoveredDevice,
        watcher: &ProvisionWatcher,
    ) -> AddDeviceRequest {
        let service_name = if watcher.service_name.is_empty() {
            self.inner.service_name.clone()
        } else {
            watcher.service_name.clone()
        };
        AddDeviceRequest {
            name: candidate.name.clone(),
            description: candidate.description.clone(),
            profile_name: watcher.profile_name.clone(),
            service_name,
            admin_state: watcher.admin_state,
            operating_state: OperatingState::Enabled,
            protocols: candidate.protocols.clone(),
            labels: candidate.labels.clone(),
            auto_events: Vec::new(),
            origin: Utc::now().timestamp_millis(),
        }
    }
}

/// Compile every watcher once for the cycle. A watcher with an invalid
/// pattern is skipped and rejects nothing on its own.
fn compile_watchers(watchers: &[Arc<ProvisionWatcher>]) -> Vec<CompiledWatcher<'_>> {
    watchers
        .iter()
        .filter_map(|watcher| match CompiledWatcher::compile(watcher) {
            Ok(compiled) => Some(compiled),
            Err(e) => {
                warn!(watcher = %watcher.name, error = %e, "skipping provision watcher");
                None
            }
        })
        .collect()
}

fn log_rejection(candidate: &DiscoveredDevice, watcher: &ProvisionWatcher, verdict: &Verdict) {
    match verdict {
        Verdict::Admitted => {}
        Verdict::MissingIdentifier { property } => debug!(
            device = %candidate.name,
            watcher = %watcher.name,
            property = %property,
            "identifier missing from discovered device"
        ),
        Verdict::PatternMismatch {
            property,
            value,
            pattern,
        } => debug!(
            device = %candidate.name,
            watcher = %watcher.name,
            property = %property,
            value = %value,
            pattern = %pattern,
            "value did not match watcher identifier"
        ),
        Verdict::Blocked { property, value } => debug!(
            device = %candidate.name,
            watcher = %watcher.name,
            property = %property,
            value = %value,
            "discovered device matches a blocking identifier"
        ),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;

    use async_trait::async_trait;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::model::AdminState;
    use crate::registry::InMemoryRegistry;

    struct FixedScan(Vec<DiscoveredDevice>);

    #[async_trait]
    impl ProtocolDiscovery for FixedScan {
        async fn discover(&self) -> Vec<DiscoveredDevice> {
            self.0.clone()
        }
    }

    fn candidate(name: &str, mac: &str) -> DiscoveredDevice {
        DiscoveredDevice {
            name: name.into(),
            protocols: HashMap::from([(
                "other".to_owned(),
                HashMap::from([("mac".to_owned(), mac.to_owned())]),
            )]),
            description: format!("{name} description"),
            labels: vec!["discovered".into()],
        }
    }

    fn mac_watcher(name: &str, pattern: &str, service: &str) -> ProvisionWatcher {
        ProvisionWatcher {
            name: name.into(),
            profile_name: format!("{name}-profile"),
            service_name: service.into(),
            admin_state: AdminState::Locked,
            identifiers: HashMap::from([("mac".to_owned(), pattern.to_owned())]),
            blocking_identifiers: HashMap::new(),
        }
    }

    fn coordinator(
        scan: Vec<DiscoveredDevice>,
        registry: &Arc<InMemoryRegistry>,
    ) -> DiscoveryCoordinator {
        DiscoveryCoordinator::new(
            "device-simple",
            Arc::new(FixedScan(scan)),
            Arc::clone(registry) as Arc<dyn RegistryCache>,
            Arc::clone(registry) as Arc<dyn RegistryClient>,
        )
    }

    async fn next_report(
        rx: &mut watch::Receiver<Option<Arc<DiscoveryReport>>>,
    ) -> Arc<DiscoveryReport> {
        rx.changed().await.unwrap();
        rx.borrow_and_update().clone().unwrap()
    }

    #[test]
    fn ack_distinguishes_accepted_and_busy() {
        let id = Uuid::new_v4();
        let accepted = TriggerAck::from(TriggerOutcome::Accepted { correlation_id: id });
        assert_eq!(accepted.status, 202);
        assert!(accepted.accepted);
        assert!(accepted.message.contains(&id.to_string()));

        let busy = TriggerAck::from(TriggerOutcome::Busy { correlation_id: id });
        assert_eq!(busy.status, 202);
        assert!(!busy.accepted);
        assert!(busy.message.contains("already running"));
    }

    #[tokio::test]
    async fn admitted_candidate_is_registered_with_watcher_fields() {
        let registry = Arc::new(InMemoryRegistry::seeded(
            [],
            [mac_watcher("w1", "^AA:.*", "")],
        ));
        let coordinator = coordinator(
            vec![
                candidate("c1", "AA:11:22:33:44:55"),
                candidate("c2", "BB:11:22:33:44:55"),
            ],
            &registry,
        );
        let mut reports = coordinator.subscribe_reports();

        let outcome = coordinator.trigger_discovery();
        assert!(outcome.is_accepted());
        let report = next_report(&mut reports).await;

        assert_eq!(report.correlation_id, outcome.correlation_id());
        assert_eq!(report.discovered, 2);
        assert_eq!(report.registered, 1);
        assert_eq!(report.rejected, 1);

        let c1 = registry.device_by_name("c1").unwrap();
        assert_eq!(c1.profile_name, "w1-profile");
        assert_eq!(c1.service_name, "device-simple");
        assert_eq!(c1.admin_state, AdminState::Locked);
        assert_eq!(c1.operating_state, OperatingState::Enabled);
        assert_eq!(c1.labels, vec!["discovered".to_owned()]);
        assert_eq!(c1.description, "c1 description");
        assert!(c1.auto_events.is_empty());
        assert!(c1.origin > 0);
        assert!(registry.device_by_name("c2").is_none());
        assert!(!coordinator.is_running());
    }

    #[tokio::test]
    async fn first_admitting_watcher_wins() {
        let registry = Arc::new(InMemoryRegistry::seeded(
            [],
            [
                mac_watcher("a-strict", "^CC:", "strict-service"),
                mac_watcher("b-any", ".*", "any-service"),
                mac_watcher("c-aa", "^AA:", "aa-service"),
            ],
        ));
        let coordinator = coordinator(vec![candidate("c1", "AA:01")], &registry);
        let mut reports = coordinator.subscribe_reports();

        coordinator.trigger_discovery();
        let report = next_report(&mut reports).await;

        assert_eq!(report.registered, 1);
        assert_eq!(
            registry.device_by_name("c1").unwrap().service_name,
            "any-service"
        );
    }

    #[tokio::test]
    async fn existing_and_repeated_names_are_not_resubmitted() {
        let registry = Arc::new(InMemoryRegistry::seeded(
            [],
            [mac_watcher("w1", "^AA:", "")],
        ));
        let coordinator = coordinator(
            vec![candidate("c1", "AA:01"), candidate("c1", "AA:02")],
            &registry,
        );
        let mut reports = coordinator.subscribe_reports();

        coordinator.trigger_discovery();
        let first = next_report(&mut reports).await;
        assert_eq!(first.registered, 1);
        assert_eq!(first.already_existing, 1);

        coordinator.trigger_discovery();
        let second = next_report(&mut reports).await;
        assert_eq!(second.registered, 0);
        assert_eq!(second.already_existing, 2);
        assert_eq!(second.failed, 0);
        assert_eq!(registry.device_count(), 1);
    }

    #[tokio::test]
    async fn watcher_with_invalid_pattern_is_skipped() {
        let registry = Arc::new(InMemoryRegistry::seeded(
            [],
            [
                mac_watcher("a-broken", "([unclosed", "broken-service"),
                mac_watcher("b-aa", "^AA:", "aa-service"),
            ],
        ));
        let coordinator = coordinator(
            vec![candidate("c1", "AA:01"), candidate("c2", "BB:01")],
            &registry,
        );
        let mut reports = coordinator.subscribe_reports();

        coordinator.trigger_discovery();
        let report = next_report(&mut reports).await;

        assert_eq!(report.registered, 1);
        assert_eq!(report.rejected, 1);
        assert_eq!(
            registry.device_by_name("c1").unwrap().service_name,
            "aa-service"
        );
    }

    #[tokio::test]
    async fn no_watchers_rejects_everything() {
        let registry = Arc::new(InMemoryRegistry::new());
        let coordinator = coordinator(vec![candidate("c1", "AA:01")], &registry);
        let mut reports = coordinator.subscribe_reports();

        coordinator.trigger_discovery();
        let report = next_report(&mut reports).await;
        assert_eq!(report.rejected, 1);
        assert_eq!(registry.device_count(), 0);
    }
}
