//! Reconcile trigger worker.
//!
//! Turns store watch events, a periodic resync and reconcile outcomes into
//! scheduled passes, one cluster key at a time.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, instrument, warn};
use vto_reconcile::{FailureBackoff, Outcome, DEFAULT_BACKOFF_BASE, DEFAULT_BACKOFF_MAX};
use vto_topology::{Cluster, LabelSelector, ObjectKey};

use crate::controller::ClusterReconciler;
use crate::store::{ApiStore, Kind, StoreExt, WatchEvent};

/// Keys waiting for a pass, each with the earliest time it is due.
#[derive(Debug, Default)]
pub struct WorkQueue {
    due: BTreeMap<ObjectKey, Instant>,
}

impl WorkQueue {
    /// Schedule `key` at `at`, keeping an earlier schedule if one exists.
    pub fn schedule(&mut self, key: ObjectKey, at: Instant) {
        self.due
            .entry(key)
            .and_modify(|due| *due = (*due).min(at))
            .or_insert(at);
    }

    /// Earliest scheduled time.
    pub fn next_due(&self) -> Option<Instant> {
        self.due.values().min().copied()
    }

    /// Remove and return every key due at or before `now`.
    pub fn pop_due(&mut self, now: Instant) -> Vec<ObjectKey> {
        let ready: Vec<ObjectKey> = self
            .due
            .iter()
            .filter(|(_, at)| **at <= now)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &ready {
            self.due.remove(key);
        }
        ready
    }

    pub fn len(&self) -> usize {
        self.due.len()
    }

    pub fn is_empty(&self) -> bool {
        self.due.is_empty()
    }
}

/// Worker driving [`ClusterReconciler`] passes.
pub struct ReconcileWorker {
    store: Arc<dyn ApiStore>,
    reconciler: ClusterReconciler,
    namespace: String,
    resync_interval: Duration,
    backoff_base: Duration,
    backoff_max: Duration,
}

impl ReconcileWorker {
    /// Create a worker that resyncs every cluster in `namespace` on `resync_interval`.
    pub fn new(
        store: Arc<dyn ApiStore>,
        namespace: impl Into<String>,
        resync_interval: Duration,
    ) -> Self {
        Self {
            reconciler: ClusterReconciler::new(store.clone()),
            store,
            namespace: namespace.into(),
            resync_interval,
            backoff_base: DEFAULT_BACKOFF_BASE,
            backoff_max: DEFAULT_BACKOFF_MAX,
        }
    }

    #[must_use]
    pub fn with_backoff(mut self, base: Duration, max: Duration) -> Self {
        self.backoff_base = base;
        self.backoff_max = max;
        self
    }

    /// Run until shutdown is signaled.
    #[instrument(skip(self, shutdown), fields(namespace = %self.namespace))]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.resync_interval.as_secs(),
            "Starting reconcile worker"
        );

        let mut events = self.store.subscribe();
        let mut queue = WorkQueue::default();
        let mut backoff = FailureBackoff::new(self.backoff_base, self.backoff_max);

        self.resync(&mut queue).await;

        let mut interval = tokio::time::interval(self.resync_interval);
        // The initial resync above stands in for the first tick.
        interval.tick().await;

        loop {
            let next_due = queue.next_due();

            tokio::select! {
                event = events.recv() => match event {
                    Ok(event) => self.handle_event(event, &mut queue).await,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Watch lagged; resyncing");
                        self.resync(&mut queue).await;
                    }
                    Err(RecvError::Closed) => {
                        info!("Store watch closed");
                        break;
                    }
                },
                _ = interval.tick() => {
                    self.resync(&mut queue).await;
                }
                _ = sleep_until(next_due.unwrap_or_else(Instant::now)), if next_due.is_some() => {
                    for key in queue.pop_due(Instant::now()) {
                        self.process(key, &mut queue, &mut backoff).await;
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Reconcile worker shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Run one pass for `key` and schedule the next one from its result.
    pub async fn process(
        &self,
        key: ObjectKey,
        queue: &mut WorkQueue,
        backoff: &mut FailureBackoff,
    ) {
        let backoff_key = key.to_string();

        match self.reconciler.reconcile(&key).await {
            Ok(outcome) => {
                backoff.clear(&backoff_key);
                if let Some(delay) = self.requeue_delay(&outcome) {
                    debug!(
                        cluster = %key,
                        delay_ms = delay.as_millis() as u64,
                        "Requeue scheduled"
                    );
                    queue.schedule(key, Instant::now() + delay);
                }
            }
            Err(e) if e.is_retryable() => {
                let delay = backoff.record_failure(&backoff_key);
                warn!(
                    cluster = %key,
                    error = %e,
                    failures = backoff.failures(&backoff_key),
                    delay_ms = delay.as_millis() as u64,
                    "Reconcile failed; retrying"
                );
                queue.schedule(key, Instant::now() + delay);
            }
            Err(e) => {
                backoff.clear(&backoff_key);
                error!(
                    cluster = %key,
                    error = %e,
                    "Reconcile failed; not retrying until the cluster changes"
                );
            }
        }
    }

    fn requeue_delay(&self, outcome: &Outcome) -> Option<Duration> {
        if let Some(delay) = outcome.requeue_after {
            return Some(delay);
        }
        outcome.requeue.then_some(self.backoff_base)
    }

    /// Map a watch event to the cluster keys it affects.
    async fn handle_event(&self, event: WatchEvent, queue: &mut WorkQueue) {
        let now = Instant::now();

        if event.kind == Kind::Cluster {
            queue.schedule(event.key, now);
        } else if let Some(owner) = event.owner {
            queue.schedule(owner, now);
        } else if event.kind.is_topology() {
            // Standalone entities may be pulled in by any cluster's selectors.
            debug!(kind = %event.kind, key = %event.key, "Topology entity changed");
            self.enqueue_clusters(&event.key.namespace, queue).await;
        }
    }

    async fn resync(&self, queue: &mut WorkQueue) {
        debug!("Resyncing clusters");
        self.enqueue_clusters(&self.namespace, queue).await;
    }

    async fn enqueue_clusters(&self, namespace: &str, queue: &mut WorkQueue) {
        let now = Instant::now();
        match self
            .store
            .list_objects::<Cluster>(namespace, &LabelSelector::All(Vec::new()))
            .await
        {
            Ok(clusters) => {
                for cluster in clusters {
                    queue.schedule(cluster.metadata.key(), now);
                }
            }
            Err(e) => error!(namespace, error = %e, "Failed to list clusters"),
        }
    }
}
