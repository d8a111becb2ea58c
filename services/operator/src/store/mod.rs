//! API store interface.
//!
//! The store persists topology entities and generated infrastructure
//! resources, answers label-selector list queries, and notifies watchers of
//! every write:
//! - `get` / `list` for reads
//! - `create` / `update` for spec writes, `update_status` for status writes
//! - `subscribe` for change notification
//!
//! Objects cross the trait boundary as [`DynamicObject`]s so the trait stays
//! object safe; [`StoreExt`] layers typed access on top.

mod memory;

use std::fmt;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::broadcast;
use vto_topology::{
    Cell, Cluster, Keyspace, LabelSelector, Lockserver, ObjectKey, ObjectMeta, Shard, Tablet,
};

pub use memory::{InMemoryStore, StoreOp};

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Every kind the store knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Kind {
    #[serde(rename = "VitessCluster")]
    Cluster,
    #[serde(rename = "VitessCell")]
    Cell,
    #[serde(rename = "VitessKeyspace")]
    Keyspace,
    #[serde(rename = "VitessShard")]
    Shard,
    #[serde(rename = "VitessTablet")]
    Tablet,
    #[serde(rename = "VitessLockserver")]
    Lockserver,
    Service,
    Deployment,
    StatefulSet,
    Job,
}

impl Kind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cluster => "VitessCluster",
            Self::Cell => "VitessCell",
            Self::Keyspace => "VitessKeyspace",
            Self::Shard => "VitessShard",
            Self::Tablet => "VitessTablet",
            Self::Lockserver => "VitessLockserver",
            Self::Service => "Service",
            Self::Deployment => "Deployment",
            Self::StatefulSet => "StatefulSet",
            Self::Job => "Job",
        }
    }

    /// Topology entity kinds, as opposed to generated infrastructure.
    pub fn is_topology(&self) -> bool {
        matches!(
            self,
            Self::Cluster
                | Self::Cell
                | Self::Keyspace
                | Self::Shard
                | Self::Tablet
                | Self::Lockserver
        )
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Store operation errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No object with this kind and key.
    #[error("{kind} {key} not found")]
    NotFound { kind: Kind, key: ObjectKey },

    /// Create of an object that already exists.
    #[error("{kind} {key} already exists")]
    AlreadyExists { kind: Kind, key: ObjectKey },

    /// Write against a stale resource version (optimistic concurrency).
    #[error("conflict writing {kind} {key}: expected resource version {expected}, got {actual}")]
    Conflict {
        kind: Kind,
        key: ObjectKey,
        expected: u64,
        actual: u64,
    },

    /// Object could not be converted to or from its stored form.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The store could not serve the request.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// A stored object in kind-erased form.
///
/// `data` holds every top-level field except `metadata` (typically `spec`
/// and `status`).
#[derive(Debug, Clone, PartialEq)]
pub struct DynamicObject {
    pub kind: Kind,
    pub metadata: ObjectMeta,
    pub data: Map<String, Value>,
}

impl DynamicObject {
    /// Erase a typed object.
    pub fn from_typed<T: Object>(object: &T) -> StoreResult<Self> {
        let mut data: Map<String, Value> = serde_json::from_value(serde_json::to_value(object)?)?;
        data.remove("metadata");
        Ok(Self {
            kind: T::KIND,
            metadata: object.metadata().clone(),
            data,
        })
    }

    /// Recover the typed object.
    pub fn into_typed<T: Object>(self) -> StoreResult<T> {
        let mut data = self.data;
        data.insert("metadata".to_string(), serde_json::to_value(&self.metadata)?);
        Ok(serde_json::from_value(Value::Object(data))?)
    }

    pub fn key(&self) -> ObjectKey {
        self.metadata.key()
    }

    pub fn status(&self) -> Option<&Value> {
        self.data.get("status")
    }
}

/// A change notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub kind: Kind,
    pub key: ObjectKey,

    /// Key of the cluster controlling this object, if any.
    pub owner: Option<ObjectKey>,
}

impl WatchEvent {
    pub(crate) fn for_object(object: &DynamicObject) -> Self {
        let owner = object
            .metadata
            .controller_owner()
            .filter(|owner| owner.kind == Kind::Cluster.as_str())
            .map(|owner| ObjectKey::new(object.metadata.namespace.clone(), owner.name.clone()));

        Self {
            kind: object.kind,
            key: object.key(),
            owner,
        }
    }
}

/// Persistence and query interface consumed by the reconciler.
#[async_trait]
pub trait ApiStore: Send + Sync {
    /// Fetch one object.
    async fn get(&self, kind: Kind, key: &ObjectKey) -> StoreResult<DynamicObject>;

    /// List objects of `kind` in `namespace` whose labels match `selector`.
    ///
    /// An empty namespace lists across all namespaces.
    async fn list(
        &self,
        kind: Kind,
        namespace: &str,
        selector: &LabelSelector,
    ) -> StoreResult<Vec<DynamicObject>>;

    /// Create a new object. Its resource version is assigned by the store.
    async fn create(&self, object: DynamicObject) -> StoreResult<DynamicObject>;

    /// Replace spec and metadata, preserving stored status.
    async fn update(&self, object: DynamicObject) -> StoreResult<DynamicObject>;

    /// Replace status only.
    async fn update_status(&self, object: DynamicObject) -> StoreResult<DynamicObject>;

    /// Receive a [`WatchEvent`] for every successful write.
    fn subscribe(&self) -> broadcast::Receiver<WatchEvent>;
}

/// Types persisted in the store.
pub trait Object: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const KIND: Kind;

    fn metadata(&self) -> &ObjectMeta;

    fn metadata_mut(&mut self) -> &mut ObjectMeta;
}

macro_rules! impl_object {
    ($($ty:ty => $kind:expr),* $(,)?) => {
        $(
            impl Object for $ty {
                const KIND: Kind = $kind;

                fn metadata(&self) -> &ObjectMeta {
                    &self.metadata
                }

                fn metadata_mut(&mut self) -> &mut ObjectMeta {
                    &mut self.metadata
                }
            }
        )*
    };
}

pub(crate) use impl_object;

impl_object! {
    Cluster => Kind::Cluster,
    Cell => Kind::Cell,
    Keyspace => Kind::Keyspace,
    Shard => Kind::Shard,
    Tablet => Kind::Tablet,
    Lockserver => Kind::Lockserver,
}

/// Typed access over any [`ApiStore`].
#[async_trait]
pub trait StoreExt: ApiStore {
    async fn get_object<T: Object>(&self, key: &ObjectKey) -> StoreResult<T> {
        self.get(T::KIND, key).await?.into_typed()
    }

    async fn list_objects<T: Object>(
        &self,
        namespace: &str,
        selector: &LabelSelector,
    ) -> StoreResult<Vec<T>> {
        self.list(T::KIND, namespace, selector)
            .await?
            .into_iter()
            .map(DynamicObject::into_typed)
            .collect()
    }

    async fn create_object<T: Object>(&self, object: &T) -> StoreResult<T> {
        let object = DynamicObject::from_typed(object)?;
        self.create(object).await?.into_typed()
    }

    async fn update_object<T: Object>(&self, object: &T) -> StoreResult<T> {
        let object = DynamicObject::from_typed(object)?;
        self.update(object).await?.into_typed()
    }

    async fn update_object_status<T: Object>(&self, object: &T) -> StoreResult<T> {
        let object = DynamicObject::from_typed(object)?;
        self.update_status(object).await?.into_typed()
    }
}

impl<S: ApiStore + ?Sized> StoreExt for S {}
