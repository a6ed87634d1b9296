//! The reconciling license controller.
//!
//! One worker drains a [`WorkQueue`] keyed by the license record. Record
//! and node watch events all enqueue that same key, so any burst of churn
//! collapses into a single pending pass. Each pass reads the record, the
//! node list and the cluster count, evaluates them together, and writes
//! the status annotation only when it differs from what is stored.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::census::{ClusterCensus, ClusterMembership};
use crate::config::ControllerConfig;
use crate::error::ControllerError;
use crate::evaluator::{assess, Assessment};
use crate::queue::WorkQueue;
use crate::retry::retry_transient;
use crate::signature::LicenseVerifier;
use crate::store::{ObjectKey, ResourceStore, WatchStream};
use crate::types::{LicenseStatus, StatusAnnotation};

/// Source of the current time.
pub trait Clock: Send + Sync {
    /// Current time.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

impl<F> Clock for F
where
    F: Fn() -> DateTime<Utc> + Send + Sync,
{
    fn now(&self) -> DateTime<Utc> {
        self()
    }
}

/// Where the controller stands for its license record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerPhase {
    /// No record exists.
    Unobserved,
    /// A pass is running or pending.
    Evaluating,
    /// The stored status matches the latest verdict and nothing is pending.
    Settled,
}

/// Published after every state change; see [`LicenseController::subscribe`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerSnapshot {
    /// Current phase.
    pub phase: ControllerPhase,
    /// Completed passes.
    pub passes: u64,
    /// Status writes performed.
    pub writes: u64,
    /// Verdict of the latest completed pass, if a record existed.
    pub last_status: Option<LicenseStatus>,
}

/// What a single pass did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The record does not exist; nothing was written.
    Unobserved,
    /// The stored status already matched.
    Unchanged(LicenseStatus),
    /// A new status was written.
    Written(LicenseStatus),
}

impl ReconcileOutcome {
    /// The computed status, if a record existed.
    #[must_use]
    pub fn status(&self) -> Option<&LicenseStatus> {
        match self {
            Self::Unobserved => None,
            Self::Unchanged(status) | Self::Written(status) => Some(status),
        }
    }
}

/// Result of [`LicenseController::reconcile`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    /// What the pass did.
    pub outcome: ReconcileOutcome,
    /// Next validity boundary of a verified license.
    pub next_transition: Option<DateTime<Utc>>,
}

impl Reconciliation {
    fn unobserved() -> Self {
        Self {
            outcome: ReconcileOutcome::Unobserved,
            next_transition: None,
        }
    }
}

/// Keeps the license record's status annotation in line with the license
/// and the cluster it runs on.
pub struct LicenseController {
    config: ControllerConfig,
    key: ObjectKey,
    store: Arc<dyn ResourceStore>,
    membership: Arc<dyn ClusterMembership>,
    verifier: LicenseVerifier,
    clock: Arc<dyn Clock>,
    queue: WorkQueue<ObjectKey>,
    snapshot: watch::Sender<ControllerSnapshot>,
}

impl std::fmt::Debug for LicenseController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LicenseController")
            .field("key", &self.key)
            .field("anchor", self.verifier.anchor())
            .finish_non_exhaustive()
    }
}

impl LicenseController {
    /// Create a controller. Nothing runs until [`LicenseController::run`].
    #[must_use]
    pub fn new(
        config: ControllerConfig,
        store: Arc<dyn ResourceStore>,
        membership: Arc<dyn ClusterMembership>,
        verifier: LicenseVerifier,
    ) -> Self {
        let key = ObjectKey::new(&config.namespace, &config.record_name);
        let queue = WorkQueue::new(config.requeue_base_delay, config.requeue_max_delay);
        let (snapshot, _) = watch::channel(ControllerSnapshot {
            phase: ControllerPhase::Unobserved,
            passes: 0,
            writes: 0,
            last_status: None,
        });

        Self {
            config,
            key,
            store,
            membership,
            verifier,
            clock: Arc::new(SystemClock),
            queue,
            snapshot,
        }
    }

    /// Replace the clock used for validity checks.
    #[must_use]
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Identity of the license record this controller owns.
    #[must_use]
    pub fn key(&self) -> &ObjectKey {
        &self.key
    }

    /// Observe phase changes and pass results.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ControllerSnapshot> {
        self.snapshot.subscribe()
    }

    /// Request a pass.
    pub fn enqueue(&self) {
        self.queue.add(self.key.clone());
        self.snapshot.send_if_modified(|s| {
            let changed = s.phase != ControllerPhase::Evaluating;
            s.phase = ControllerPhase::Evaluating;
            changed
        });
    }

    /// Run one pass, re-running it against a fresh read whenever the status
    /// write loses a version race.
    ///
    /// # Errors
    ///
    /// Returns error on store failures that outlast the retry policy, or
    /// when every attempt conflicts.
    #[instrument(skip(self), fields(license = %self.key))]
    pub async fn reconcile(&self) -> Result<Reconciliation, ControllerError> {
        let attempts = self.config.max_conflict_retries.max(1);
        for attempt in 1..=attempts {
            match self.reconcile_once().await {
                Err(ControllerError::Store(e)) if e.is_conflict() => {
                    debug!(attempt, "Status write conflicted; re-reading record");
                },
                other => return other,
            }
        }
        Err(ControllerError::ConflictRetriesExhausted { attempts })
    }

    async fn reconcile_once(&self) -> Result<Reconciliation, ControllerError> {
        let retry = self.config.store_retry;

        let record = retry_transient(retry, "get_license", || self.store.get_license(&self.key)).await?;
        let Some(record) = record else {
            debug!("License record absent; nothing to annotate");
            return Ok(Reconciliation::unobserved());
        };

        let nodes = retry_transient(retry, "list_nodes", || self.store.list_nodes()).await?;
        let clusters =
            retry_transient(retry, "cluster_count", || self.membership.cluster_count()).await?;
        let census = ClusterCensus::from_nodes(&nodes, clusters);

        let raw = record.data.get(&self.config.data_key).map(Vec::as_slice);
        let Assessment {
            status,
            next_transition,
        } = assess(raw, &self.verifier, census, self.clock.now());

        let stored = record
            .annotations
            .get(self.store.status_annotation_key())
            .and_then(|value| StatusAnnotation::parse(value).ok());
        if stored.as_ref() == Some(&status) {
            debug!(violation = %status.violation.kind, "Status unchanged; skipping write");
            return Ok(Reconciliation {
                outcome: ReconcileOutcome::Unchanged(status),
                next_transition,
            });
        }

        let annotation = StatusAnnotation::encode(&status)?;
        let key = record.key();
        retry_transient(retry, "write_status", || {
            self.store
                .write_status(&key, &record.resource_version, &annotation)
        })
        .await?;

        info!(
            violation = %status.violation.kind,
            license_id = status.license_id.as_deref().unwrap_or(""),
            nodes = status.usage.nodes,
            cores = status.usage.cores,
            clusters = status.usage.clusters,
            "License status updated"
        );
        Ok(Reconciliation {
            outcome: ReconcileOutcome::Written(status),
            next_transition,
        })
    }

    /// Watch the record and the nodes and reconcile until `shutdown` fires.
    ///
    /// Failed passes are requeued with backoff; nothing short of
    /// cancellation ends the loop.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(
            license = %self.key,
            anchor = %self.verifier.anchor().fingerprint(),
            "License controller started"
        );

        // Watches open before the first pass so no change slips between them.
        let licenses = self.store.watch_licenses(&self.key.namespace);
        let nodes = self.store.watch_nodes();
        self.enqueue();

        let name = self.key.name.clone();
        tokio::join!(
            self.pump("license", licenses, move |r| r.name == name, &shutdown),
            self.pump("node", nodes, |_| true, &shutdown),
            self.work(&shutdown),
        );

        info!(license = %self.key, "License controller stopped");
    }

    async fn pump<T>(
        &self,
        source: &'static str,
        mut events: WatchStream<T>,
        relevant: impl Fn(&T) -> bool,
        shutdown: &CancellationToken,
    ) {
        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                item = events.next() => match item {
                    Some(Ok(event)) => {
                        if relevant(event.object()) {
                            self.enqueue();
                        }
                    },
                    Some(Err(e)) => {
                        warn!(source, error = %e, "Watch error; scheduling a full pass");
                        self.enqueue();
                    },
                    None => {
                        warn!(source, "Watch stream ended; relying on periodic resync");
                        break;
                    },
                },
            }
        }
    }

    async fn work(&self, shutdown: &CancellationToken) {
        loop {
            let key = tokio::select! {
                () = shutdown.cancelled() => break,
                key = self.queue.next() => match key {
                    Some(key) => key,
                    None => break,
                },
            };

            let result = tokio::select! {
                () = shutdown.cancelled() => {
                    self.queue.done(&key);
                    break;
                },
                result = self.reconcile() => result,
            };

            match result {
                Ok(reconciliation) => {
                    self.queue.forget(&key);
                    self.queue.done(&key);
                    let delay = self.requeue_delay(reconciliation.next_transition);
                    self.queue.add_after(key, delay);
                    self.publish(reconciliation.outcome);
                },
                Err(e) => {
                    warn!(
                        license = %key,
                        attempt = self.queue.num_requeues(&key) + 1,
                        error = %e,
                        "Reconciliation failed; requeueing"
                    );
                    self.queue.done(&key);
                    self.queue.add_rate_limited(key);
                },
            }
        }

        self.queue.shut_down();
    }

    fn requeue_delay(&self, next_transition: Option<DateTime<Utc>>) -> Duration {
        let resync = self.config.resync_interval;
        match next_transition {
            Some(at) => (at - self.clock.now())
                .to_std()
                .unwrap_or(Duration::ZERO)
                .min(resync),
            None => resync,
        }
    }

    fn publish(&self, outcome: ReconcileOutcome) {
        let idle = self.queue.is_idle();
        self.snapshot.send_modify(|s| {
            s.passes += 1;
            if matches!(outcome, ReconcileOutcome::Written(_)) {
                s.writes += 1;
            }
            s.phase = match (&outcome, idle) {
                (_, false) => ControllerPhase::Evaluating,
                (ReconcileOutcome::Unobserved, true) => ControllerPhase::Unobserved,
                (_, true) => ControllerPhase::Settled,
            };
            s.last_status = outcome.status().cloned();
        });
    }
}
