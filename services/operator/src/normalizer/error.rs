//! Error types raised before any infrastructure is touched.

use thiserror::Error;
use vto_topology::SelectorError;

use crate::selector::ResolveError;
use crate::store::StoreError;

/// Mutually exclusive fields set together.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SanityError {
    #[error("cannot specify both a lockserver and lockserverRef on the cluster")]
    ClusterLockserverAndRef,

    #[error("cannot specify both a lockserver and lockserverRef on cell {cell}")]
    CellLockserverAndRef { cell: String },
}

/// Structural invariants violated by a normalized cluster.
///
/// Validation returns the first violation only.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("no lockserver in cluster")]
    NoLockserverForCluster,

    #[error("no cells in cluster")]
    NoCells,

    #[error("no lockserver in cell {cell}")]
    NoLockserverForCell { cell: String },

    #[error("no keyspaces in cluster")]
    NoKeyspaces,

    #[error("no shards in cluster")]
    NoShards,

    #[error("multiple shards provided with the same keyrange {key_range}")]
    OverlappingKeyrange { key_range: String },

    #[error("no tablets in cluster")]
    NoTablets,

    #[error("no cell {cell_id:?} for tablet {tablet}")]
    NoCellForTablet { tablet: String, cell_id: String },

    #[error("tablets {first} and {second} would share stateful set {name}")]
    DuplicateStatefulSet {
        name: String,
        first: String,
        second: String,
    },

    #[error(
        "tablet {tablet} hostname would be {length} characters, too long for mysql replication"
    )]
    TabletNameTooLong { tablet: String, length: usize },
}

/// Failure while expanding a cluster from the store.
#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("client error: {0}")]
    Client(#[source] StoreError),

    #[error("invalid selector: {0}")]
    InvalidSelector(#[source] SelectorError),
}

impl From<StoreError> for NormalizeError {
    fn from(err: StoreError) -> Self {
        Self::Client(err)
    }
}

impl From<ResolveError> for NormalizeError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::InvalidSelector(e) => Self::InvalidSelector(e),
            ResolveError::Client(e) => Self::Client(e),
        }
    }
}
