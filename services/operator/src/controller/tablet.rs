//! Keyspace, shard and tablet convergence.

use serde::Serialize;
use tracing::{debug, info, instrument};
use vto_reconcile::{ConvergenceStatus, SpecHash};
use vto_topology::{Cluster, Linked, Tablet, TabletPhase, TabletReadiness, TabletType};

use super::{ClusterReconciler, ReconcileError};
use crate::generator::resources::{PodTemplateSpec, StatefulSet, StatefulSetUpdateStrategy};
use crate::generator::{replica_init_job, stateful_set};
use crate::store::{StoreError, StoreExt};

/// The parts of a stateful set the reconciler owns after creation.
#[derive(Serialize)]
struct ManagedFields<'a> {
    template: &'a PodTemplateSpec,
    replicas: i32,
    update_strategy: &'a StatefulSetUpdateStrategy,
}

impl<'a> ManagedFields<'a> {
    fn of(set: &'a StatefulSet) -> Self {
        Self {
            template: &set.spec.template,
            replicas: set.spec.replicas,
            update_strategy: &set.spec.update_strategy,
        }
    }

    fn hash(&self) -> Result<SpecHash, StoreError> {
        Ok(SpecHash::of(self)?)
    }
}

impl ClusterReconciler {
    /// Every tablet, keyspace by keyspace and shard by shard.
    pub(super) async fn reconcile_tablets(
        &self,
        cluster: &Cluster,
        readiness: &mut TabletReadiness,
    ) -> Result<(), ReconcileError> {
        for (k, keyspace) in cluster.keyspaces().iter().enumerate() {
            for (s, shard) in keyspace.shards().iter().enumerate() {
                debug!(keyspace = keyspace.name(), shard = shard.name(), "Reconciling shard");
                for tablet in cluster.shard_tablets(k, s) {
                    self.reconcile_tablet(tablet, readiness).await?;
                }
            }
        }
        Ok(())
    }

    #[instrument(skip_all, fields(tablet = %tablet.stateful_set_name()))]
    async fn reconcile_tablet(
        &self,
        tablet: Linked<'_, Tablet>,
        readiness: &mut TabletReadiness,
    ) -> Result<(), ReconcileError> {
        let desired = stateful_set(tablet)?;
        let phase = self.converge_stateful_set(&desired).await?;
        readiness.set_phase(desired.metadata.name.clone(), phase);

        if tablet.tablet_type() == TabletType::Replica {
            self.create_if_missing(&replica_init_job(tablet)?).await?;
        }

        Ok(())
    }

    /// Create the set, or patch its managed fields when they drifted, and
    /// report whether its pods are all ready.
    async fn converge_stateful_set(
        &self,
        desired: &StatefulSet,
    ) -> Result<TabletPhase, StoreError> {
        let key = desired.metadata.key();
        let observed = match self.store.get_object::<StatefulSet>(&key).await {
            Ok(mut existing) => {
                if ManagedFields::of(&existing).hash()? != ManagedFields::of(desired).hash()? {
                    existing.spec.template = desired.spec.template.clone();
                    existing.spec.replicas = desired.spec.replicas;
                    existing.spec.update_strategy = desired.spec.update_strategy.clone();
                    existing = self.store.update_object(&existing).await?;
                    info!(name = %key.name, "Patched stateful set");
                }
                existing
            }
            Err(e) if e.is_not_found() => {
                let created = self.store.create_object(desired).await?;
                info!(name = %key.name, "Created stateful set");
                created
            }
            Err(e) => return Err(e),
        };

        let status =
            ConvergenceStatus::from_replicas(desired.spec.replicas, observed.status.ready_replicas);
        Ok(if status.is_converged() {
            TabletPhase::Ready
        } else {
            TabletPhase::None
        })
    }
}
