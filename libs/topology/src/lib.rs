//! # vto-topology
//!
//! Typed entity graph for a sharded database topology.
//!
//! ## Shape
//!
//! ```text
//! Cluster
//! ├── Lockserver (embedded or referenced)
//! ├── Cell*      (each with its own Lockserver)
//! └── Keyspace*
//!     └── Shard*  (identified by KeyRange)
//!         └── Tablet*  (placed in a Cell by cellID)
//! ```
//!
//! ## Ownership
//!
//! - A Cluster owns its Cells and Keyspaces by value; Keyspaces own Shards and
//!   Shards own Tablets.
//! - Parent back-references are transient [`ParentLinks`]: indices into the
//!   owning Cluster, never serialized, rebuilt by every normalization pass.
//! - Back-references are followed through [`Linked`], a borrowed view pairing an
//!   entity with the Cluster it lives in.

mod cell;
mod cluster;
mod containers;
mod keyspace;
mod linked;
mod lockserver;
mod meta;
pub mod selector;
mod shard;
mod tablet;

pub use cell::{Cell, CellDefaults, CellMySqlProtocol, CellSpec, MySqlAuthType};
pub use cluster::{Cluster, ClusterPhase, ClusterSpec, ClusterStatus};
pub use containers::{
    ConfigProvider, MySqlContainer, ResourceRequirements, TabletContainers, VtTabletContainer,
    DEFAULT_DB_FLAVOR,
};
pub use keyspace::{BatchOptions, Keyspace, KeyspaceSpec, ShardOptions};
pub use linked::{Linked, ParentLinks};
pub use lockserver::{
    Etcd2Lockserver, Lockserver, LockserverSpec, LockserverStatus, LockserverType,
};
pub use meta::{
    LocalObjectReference, ObjectKey, ObjectMeta, OwnerReference, SecretKeySelector,
    SecretReference,
};
pub use selector::{LabelSelector, ResourceSelector, SelectorError, SelectorOperator};
pub use shard::{KeyRange, Shard, ShardSpec};
pub use tablet::{
    Tablet, TabletCredentials, TabletDatastore, TabletDatastoreType, TabletPhase, TabletReadiness,
    TabletSpec, TabletType, VolumeClaimSource, MAX_TABLET_HOSTNAME_LENGTH,
    MAX_TABLET_ORDINAL_LENGTH,
};
