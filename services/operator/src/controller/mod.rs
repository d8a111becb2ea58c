//! Cluster reconciliation.
//!
//! One pass per cluster key, sequential and fail-fast:
//! 1. Load the cluster (gone → done)
//! 2. Sanity, normalize, validate (failures are not retried)
//! 3. Converge infrastructure: lockserver record, tablet service, per-cell
//!    control and gateway resources, per-tablet stateful sets and jobs
//! 4. Advance the phase: None → Creating → Ready
//!
//! Readiness waits come back as [`Outcome::requeue_after`], never as errors.

mod cell;
mod cluster;
mod tablet;

pub use cluster::{LOCKSERVER_READY, LOCKSERVER_UNCONFIGURED};

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, error, info, instrument};
use vto_reconcile::{Outcome, READINESS_RECHECK_INTERVAL};
use vto_topology::{Cluster, ClusterPhase, LockserverStatus, ObjectKey, TabletReadiness};

use crate::generator::GenerateError;
use crate::normalizer::{
    test_cluster_sanity, validate_cluster, validate_tablet, NormalizeError, Normalizer,
    SanityError, ValidationError,
};
use crate::store::{ApiStore, Object, StoreError, StoreExt};

/// Why a pass stopped early.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("cluster failed sanity check: {0}")]
    Sanity(#[from] SanityError),

    #[error("cluster normalization failed: {0}")]
    Normalize(#[from] NormalizeError),

    #[error("cluster failed validation: {0}")]
    Validation(#[from] ValidationError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("resource generation failed: {0}")]
    Generate(#[from] GenerateError),
}

impl ReconcileError {
    /// Store and generation failures may clear up on their own; specification
    /// errors need the cluster to be edited.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Store(_) | Self::Generate(_))
    }

    pub fn outcome(&self) -> Outcome {
        if self.is_retryable() {
            Outcome::requeue()
        } else {
            Outcome::done()
        }
    }
}

/// Converges stored clusters to their infrastructure resources.
#[derive(Clone)]
pub struct ClusterReconciler {
    store: Arc<dyn ApiStore>,
}

impl ClusterReconciler {
    pub fn new(store: Arc<dyn ApiStore>) -> Self {
        Self { store }
    }

    /// Run one reconciliation pass for the cluster at `key`.
    #[instrument(skip(self), fields(cluster = %key))]
    pub async fn reconcile(&self, key: &ObjectKey) -> Result<Outcome, ReconcileError> {
        let mut cluster = match self.store.get_object::<Cluster>(key).await {
            Ok(cluster) => cluster,
            Err(e) if e.is_not_found() => {
                debug!("Cluster no longer exists");
                return Ok(Outcome::done());
            }
            Err(e) => return Err(e.into()),
        };

        if let Err(e) = test_cluster_sanity(&cluster) {
            error!(error = %e, "Cluster failed sanity test");
            return Err(e.into());
        }

        Normalizer::new(self.store.as_ref())
            .normalize_cluster(&mut cluster)
            .await?;

        if let Err(e) = validate(&cluster) {
            error!(error = %e, "Cluster failed validation");
            return Err(e.into());
        }

        let lockserver = self.reconcile_lockserver(&cluster);

        let outcome = self.reconcile_cluster_resources(&cluster).await?;
        if outcome.is_requeue() {
            info!("Requeue after reconciling cluster resources");
            return Ok(outcome);
        }

        let mut readiness = TabletReadiness::new();
        self.reconcile_tablets(&cluster, &mut readiness).await?;

        self.advance_phase(&cluster, &readiness, lockserver).await
    }

    async fn advance_phase(
        &self,
        cluster: &Cluster,
        readiness: &TabletReadiness,
        lockserver: LockserverStatus,
    ) -> Result<Outcome, ReconcileError> {
        let current = cluster.phase();
        let (phase, outcome) = match current {
            ClusterPhase::None => (ClusterPhase::Creating, Outcome::done()),
            ClusterPhase::Creating if cluster.all_tablets_ready(readiness) => {
                (ClusterPhase::Ready, Outcome::done())
            }
            ClusterPhase::Creating => {
                info!("Cluster created but not ready; will check again later");
                (ClusterPhase::Creating, Outcome::requeue_after(READINESS_RECHECK_INTERVAL))
            }
            ClusterPhase::Ready => (ClusterPhase::Ready, Outcome::done()),
        };

        let lockserver_changed = cluster.status.lockserver.as_ref() != Some(&lockserver);
        if phase != current || lockserver_changed {
            self.write_status(&cluster.metadata.key(), phase, lockserver).await?;
        } else if !outcome.is_requeue() {
            debug!("All managed resources in sync");
        }

        Ok(outcome)
    }

    /// Read-modify-write of the cluster status against the latest stored version.
    async fn write_status(
        &self,
        key: &ObjectKey,
        phase: ClusterPhase,
        lockserver: LockserverStatus,
    ) -> Result<(), StoreError> {
        let mut latest = self.store.get_object::<Cluster>(key).await?;
        if latest.phase() != phase {
            info!(phase = phase.as_str(), "Setting cluster phase");
        }
        latest.set_phase(phase);
        latest.status.lockserver = Some(lockserver);
        self.store.update_object_status(&latest).await?;
        Ok(())
    }

    /// Create `desired` unless an object with its key exists.
    ///
    /// Losing a creation race asks for another pass rather than failing.
    async fn create_if_missing<T: Object>(&self, desired: &T) -> Result<Outcome, StoreError> {
        let key = desired.metadata().key();
        match self.store.get_object::<T>(&key).await {
            Ok(_) => Ok(Outcome::done()),
            Err(e) if e.is_not_found() => match self.store.create_object(desired).await {
                Ok(_) => {
                    info!(kind = %T::KIND, name = %key.name, "Created resource");
                    Ok(Outcome::done())
                }
                Err(StoreError::AlreadyExists { .. }) => Ok(Outcome::requeue()),
                Err(e) => Err(e),
            },
            Err(e) => Err(e),
        }
    }
}

fn validate(cluster: &Cluster) -> Result<(), ValidationError> {
    validate_cluster(cluster)?;
    for tablet in cluster.tablets() {
        validate_tablet(&tablet)?;
    }
    Ok(())
}
