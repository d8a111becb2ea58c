//! Cluster-level convergence.

use tracing::{debug, instrument};
use vto_reconcile::Outcome;
use vto_topology::{Cluster, LockserverStatus};

use super::{ClusterReconciler, ReconcileError};
use crate::generator::tablet_service;

/// Lockserver has connection details.
pub const LOCKSERVER_READY: &str = "Ready";

/// Lockserver is present but has nothing to connect to.
pub const LOCKSERVER_UNCONFIGURED: &str = "Unconfigured";

impl ClusterReconciler {
    /// Lockservers are never provisioned; record whether the cluster's
    /// lockserver can be connected to.
    pub(super) fn reconcile_lockserver(&self, cluster: &Cluster) -> LockserverStatus {
        let configured = cluster
            .lockserver()
            .and_then(|lockserver| lockserver.spec.etcd2.as_ref())
            .is_some_and(|etcd2| !etcd2.address.is_empty());

        let state = if configured {
            LOCKSERVER_READY
        } else {
            LOCKSERVER_UNCONFIGURED
        };
        debug!(state, "Lockserver converged");

        LockserverStatus {
            state: state.to_string(),
        }
    }

    /// The tablet service, then every cell's resources.
    #[instrument(skip_all)]
    pub(super) async fn reconcile_cluster_resources(
        &self,
        cluster: &Cluster,
    ) -> Result<Outcome, ReconcileError> {
        let outcome = self.create_if_missing(&tablet_service(cluster)).await?;
        if outcome.is_requeue() {
            return Ok(outcome);
        }

        for cell in cluster.cells() {
            let outcome = self.reconcile_cell(cell).await?;
            if outcome.is_requeue() {
                return Ok(outcome);
            }
        }

        Ok(Outcome::done())
    }
}
