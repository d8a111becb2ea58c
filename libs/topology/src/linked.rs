//! Transient parent links and the view that follows them.

use std::ops::Deref;

use crate::cell::Cell;
use crate::cluster::Cluster;
use crate::keyspace::Keyspace;
use crate::shard::Shard;

/// Non-persisted back-references, as indices into the owning [`Cluster`].
///
/// Set by normalization; a default value means "not linked".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParentLinks {
    /// Linked to the cluster the entity lives in.
    pub cluster: bool,
    /// Index into `cluster.spec.keyspaces`.
    pub keyspace: Option<usize>,
    /// Index into the keyspace's `spec.shards`.
    pub shard: Option<usize>,
    /// Index into `cluster.spec.cells`.
    pub cell: Option<usize>,
}

/// Entities carrying [`ParentLinks`].
pub trait HasParents {
    fn parents(&self) -> &ParentLinks;
}

/// An entity borrowed together with the cluster that owns it.
pub struct Linked<'a, T> {
    cluster: &'a Cluster,
    item: &'a T,
}

impl<T> Clone for Linked<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Linked<'_, T> {}

impl<T: std::fmt::Debug> std::fmt::Debug for Linked<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Linked")
            .field("cluster", &self.cluster.metadata.name)
            .field("item", self.item)
            .finish()
    }
}

impl<T> Deref for Linked<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.item
    }
}

impl<'a, T> Linked<'a, T> {
    pub fn new(cluster: &'a Cluster, item: &'a T) -> Self {
        Self { cluster, item }
    }

    /// The underlying entity, with the view's full lifetime.
    pub fn item(&self) -> &'a T {
        self.item
    }

    /// The cluster this view was taken from, linked or not.
    pub fn owner(&self) -> &'a Cluster {
        self.cluster
    }
}

impl<'a, T: HasParents> Linked<'a, T> {
    pub fn cluster(&self) -> Option<&'a Cluster> {
        self.item.parents().cluster.then_some(self.cluster)
    }

    pub fn keyspace(&self) -> Option<Linked<'a, Keyspace>> {
        let index = self.item.parents().keyspace?;
        self.cluster
            .spec
            .keyspaces
            .get(index)
            .map(|keyspace| Linked::new(self.cluster, keyspace))
    }

    pub fn shard(&self) -> Option<Linked<'a, Shard>> {
        let links = self.item.parents();
        let keyspace = self.cluster.spec.keyspaces.get(links.keyspace?)?;
        keyspace
            .spec
            .shards
            .get(links.shard?)
            .map(|shard| Linked::new(self.cluster, shard))
    }

    pub fn cell(&self) -> Option<Linked<'a, Cell>> {
        let index = self.item.parents().cell?;
        self.cluster
            .spec
            .cells
            .get(index)
            .map(|cell| Linked::new(self.cluster, cell))
    }
}
