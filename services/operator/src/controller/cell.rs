//! Cell-level convergence.

use tracing::instrument;
use vto_reconcile::Outcome;
use vto_topology::{Cell, Linked};

use super::{ClusterReconciler, ReconcileError};
use crate::generator::resources::{Deployment, Service};
use crate::generator::{vtctld_resources, vtgate_resources};

impl ClusterReconciler {
    /// vtctld then vtgate, each deployment before its service.
    #[instrument(skip_all, fields(cell = cell.name()))]
    pub(super) async fn reconcile_cell(
        &self,
        cell: Linked<'_, Cell>,
    ) -> Result<Outcome, ReconcileError> {
        let outcome = self.reconcile_component(vtctld_resources(cell)?).await?;
        if outcome.is_requeue() {
            return Ok(outcome);
        }
        self.reconcile_component(vtgate_resources(cell)?).await
    }

    async fn reconcile_component(
        &self,
        (deployment, service): (Deployment, Service),
    ) -> Result<Outcome, ReconcileError> {
        let outcome = self.create_if_missing(&deployment).await?;
        if outcome.is_requeue() {
            return Ok(outcome);
        }
        Ok(self.create_if_missing(&service).await?)
    }
}
