//! Normalization: expand a stored cluster into a fully linked entity tree.
//!
//! The pass runs top-down, one level at a time:
//! - cluster lockserver reference resolution
//! - cells (selector matches appended, then each cell's lockserver)
//! - keyspaces, then shards, then tablets (selector matches appended)
//!
//! Selector matches are appended after embedded children and never
//! deduplicated. Parent links are set as each level is completed. Any store
//! failure aborts the pass; callers discard the partially expanded cluster.

mod error;
mod sanity;
mod validation;

use tracing::{debug, instrument};
use vto_topology::{
    Cell, Cluster, Keyspace, LocalObjectReference, Lockserver, ObjectKey, Shard, Tablet,
};

use crate::selector::resolve;
use crate::store::{ApiStore, StoreExt};

pub use error::{NormalizeError, SanityError, ValidationError};
pub use sanity::test_cluster_sanity;
pub use validation::{validate_cluster, validate_tablet};

/// Expands clusters against an [`ApiStore`].
pub struct Normalizer<'a> {
    store: &'a dyn ApiStore,
}

impl<'a> Normalizer<'a> {
    pub fn new(store: &'a dyn ApiStore) -> Self {
        Self { store }
    }

    /// Normalize `cluster` in place.
    #[instrument(skip_all, fields(cluster = %cluster.metadata.key()))]
    pub async fn normalize_cluster(&self, cluster: &mut Cluster) -> Result<(), NormalizeError> {
        self.normalize_cluster_lockserver(cluster).await?;
        self.normalize_cluster_cells(cluster).await?;
        self.normalize_cluster_keyspaces(cluster).await?;
        Ok(())
    }

    async fn normalize_cluster_lockserver(
        &self,
        cluster: &mut Cluster,
    ) -> Result<(), NormalizeError> {
        if let Some(reference) = cluster.spec.lockserver_ref.take() {
            let lockserver = self.fetch_lockserver(cluster.namespace(), &reference).await?;
            cluster.spec.lockserver = Some(lockserver);
        }
        Ok(())
    }

    async fn normalize_cluster_cells(&self, cluster: &mut Cluster) -> Result<(), NormalizeError> {
        let namespace = cluster.namespace().to_string();

        let matched: Vec<Cell> =
            resolve(self.store, &namespace, &cluster.spec.cell_selector).await?;
        if !cluster.spec.cell_selector.is_empty() {
            debug!(matched = matched.len(), "Cluster cellSelector resolved");
        }
        for cell in &matched {
            cluster.embed_cell_copy(cell);
        }

        for cell in &mut cluster.spec.cells {
            cell.set_parent_cluster();
            if let Some(reference) = cell.spec.lockserver_ref.take() {
                cell.spec.lockserver = Some(self.fetch_lockserver(&namespace, &reference).await?);
            }
        }

        Ok(())
    }

    async fn normalize_cluster_keyspaces(
        &self,
        cluster: &mut Cluster,
    ) -> Result<(), NormalizeError> {
        let namespace = cluster.namespace().to_string();

        let matched: Vec<Keyspace> =
            resolve(self.store, &namespace, &cluster.spec.keyspace_selector).await?;
        if !cluster.spec.keyspace_selector.is_empty() {
            debug!(matched = matched.len(), "Cluster keyspaceSelector resolved");
        }
        for keyspace in &matched {
            cluster.embed_keyspace_copy(keyspace);
        }

        for k in 0..cluster.spec.keyspaces.len() {
            cluster.spec.keyspaces[k].set_parent_cluster();
            self.normalize_keyspace_shards(cluster, k, &namespace).await?;
        }

        Ok(())
    }

    async fn normalize_keyspace_shards(
        &self,
        cluster: &mut Cluster,
        k: usize,
        namespace: &str,
    ) -> Result<(), NormalizeError> {
        let keyspace = &cluster.spec.keyspaces[k];
        let matched: Vec<Shard> =
            resolve(self.store, namespace, &keyspace.spec.shard_selector).await?;
        if !keyspace.spec.shard_selector.is_empty() {
            debug!(
                keyspace = keyspace.name(),
                matched = matched.len(),
                "Keyspace shardSelector resolved"
            );
        }

        let keyspace = &mut cluster.spec.keyspaces[k];
        for shard in &matched {
            keyspace.embed_shard_copy(shard);
        }

        for s in 0..cluster.spec.keyspaces[k].spec.shards.len() {
            cluster.spec.keyspaces[k].spec.shards[s].set_parents(k);
            self.normalize_shard_tablets(cluster, k, s, namespace).await?;
        }

        Ok(())
    }

    async fn normalize_shard_tablets(
        &self,
        cluster: &mut Cluster,
        k: usize,
        s: usize,
        namespace: &str,
    ) -> Result<(), NormalizeError> {
        let shard = &cluster.spec.keyspaces[k].spec.shards[s];
        let matched: Vec<Tablet> =
            resolve(self.store, namespace, &shard.spec.tablet_selector).await?;
        if !shard.spec.tablet_selector.is_empty() {
            debug!(shard = shard.name(), matched = matched.len(), "Shard tabletSelector resolved");
        }

        let shard = &mut cluster.spec.keyspaces[k].spec.shards[s];
        for tablet in &matched {
            shard.embed_tablet_copy(tablet);
        }

        let cells: Vec<Option<usize>> = cluster.spec.keyspaces[k].spec.shards[s]
            .tablets()
            .iter()
            .map(|tablet| cluster.cell_index(&tablet.spec.cell_id))
            .collect();

        let shard = &mut cluster.spec.keyspaces[k].spec.shards[s];
        for (tablet, cell) in shard.spec.tablets.iter_mut().zip(cells) {
            tablet.set_parents(k, s, cell);
        }

        Ok(())
    }

    async fn fetch_lockserver(
        &self,
        namespace: &str,
        reference: &LocalObjectReference,
    ) -> Result<Lockserver, NormalizeError> {
        let key = ObjectKey::new(namespace, reference.name.clone());
        let lockserver = self.store.get_object::<Lockserver>(&key).await?;
        debug!(lockserver = %key, "Resolved lockserverRef");
        Ok(lockserver)
    }
}
