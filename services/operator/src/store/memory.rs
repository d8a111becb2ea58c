//! In-memory [`ApiStore`] used by the binary and by tests.
//!
//! Writes are serialized per store and guarded by resource versions. Tests
//! can inject failures per (operation, kind) and count calls per operation.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::{broadcast, RwLock};
use tracing::debug;
use vto_topology::{LabelSelector, ObjectKey};

use super::{ApiStore, DynamicObject, Kind, StoreError, StoreResult, WatchEvent};

const WATCH_CAPACITY: usize = 1024;

/// Store operations, for failure injection and call counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StoreOp {
    Get,
    List,
    Create,
    Update,
    UpdateStatus,
}

impl StoreOp {
    const ALL: [StoreOp; 5] = [
        StoreOp::Get,
        StoreOp::List,
        StoreOp::Create,
        StoreOp::Update,
        StoreOp::UpdateStatus,
    ];

    fn index(self) -> usize {
        self as usize
    }
}

/// In-memory store.
pub struct InMemoryStore {
    objects: RwLock<BTreeMap<(Kind, ObjectKey), DynamicObject>>,

    /// Last assigned resource version.
    version: AtomicU64,

    events: broadcast::Sender<WatchEvent>,

    /// Injected failures.
    failures: RwLock<Vec<(StoreOp, Kind)>>,

    /// Calls per operation, indexed by [`StoreOp::index`].
    calls: [AtomicUsize; 5],
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(WATCH_CAPACITY);
        Self {
            objects: RwLock::new(BTreeMap::new()),
            version: AtomicU64::new(0),
            events,
            failures: RwLock::new(Vec::new()),
            calls: Default::default(),
        }
    }

    /// Make every `op` on `kind` fail with [`StoreError::Unavailable`].
    pub async fn fail_on(&self, op: StoreOp, kind: Kind) {
        self.failures.write().await.push((op, kind));
    }

    /// Remove all injected failures.
    pub async fn clear_failures(&self) {
        self.failures.write().await.clear();
    }

    /// Number of `op` calls served so far, failed ones included.
    pub fn calls(&self, op: StoreOp) -> usize {
        self.calls[op.index()].load(Ordering::SeqCst)
    }

    /// Reset all call counters.
    pub fn reset_calls(&self) {
        for op in StoreOp::ALL {
            self.calls[op.index()].store(0, Ordering::SeqCst);
        }
    }

    /// Number of stored objects of `kind`.
    pub async fn count(&self, kind: Kind) -> usize {
        self.objects
            .read()
            .await
            .keys()
            .filter(|(k, _)| *k == kind)
            .count()
    }

    async fn enter(&self, op: StoreOp, kind: Kind) -> StoreResult<()> {
        self.calls[op.index()].fetch_add(1, Ordering::SeqCst);
        if self.failures.read().await.contains(&(op, kind)) {
            return Err(StoreError::Unavailable(format!(
                "injected failure for {op:?} on {kind}"
            )));
        }
        Ok(())
    }

    fn next_version(&self) -> u64 {
        self.version.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn notify(&self, object: &DynamicObject) {
        // No subscribers is fine.
        let _ = self.events.send(WatchEvent::for_object(object));
    }

    fn check_version(stored: &DynamicObject, incoming: &DynamicObject) -> StoreResult<()> {
        let expected = stored.metadata.resource_version;
        let actual = incoming.metadata.resource_version;
        if expected != actual {
            return Err(StoreError::Conflict {
                kind: stored.kind,
                key: stored.key(),
                expected,
                actual,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ApiStore for InMemoryStore {
    async fn get(&self, kind: Kind, key: &ObjectKey) -> StoreResult<DynamicObject> {
        self.enter(StoreOp::Get, kind).await?;
        self.objects
            .read()
            .await
            .get(&(kind, key.clone()))
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                kind,
                key: key.clone(),
            })
    }

    async fn list(
        &self,
        kind: Kind,
        namespace: &str,
        selector: &LabelSelector,
    ) -> StoreResult<Vec<DynamicObject>> {
        self.enter(StoreOp::List, kind).await?;
        let objects = self.objects.read().await;
        let matched: Vec<DynamicObject> = objects
            .iter()
            .filter(|((k, key), _)| {
                *k == kind && (namespace.is_empty() || key.namespace == namespace)
            })
            .filter(|(_, object)| selector.matches(&object.metadata.labels))
            .map(|(_, object)| object.clone())
            .collect();
        debug!(%kind, namespace, %selector, matched = matched.len(), "Listed objects");
        Ok(matched)
    }

    async fn create(&self, mut object: DynamicObject) -> StoreResult<DynamicObject> {
        self.enter(StoreOp::Create, object.kind).await?;
        let mut objects = self.objects.write().await;

        let id = (object.kind, object.key());
        if objects.contains_key(&id) {
            return Err(StoreError::AlreadyExists {
                kind: id.0,
                key: id.1,
            });
        }

        object.metadata.resource_version = self.next_version();
        objects.insert(id, object.clone());
        self.notify(&object);
        Ok(object)
    }

    async fn update(&self, mut object: DynamicObject) -> StoreResult<DynamicObject> {
        self.enter(StoreOp::Update, object.kind).await?;
        let mut objects = self.objects.write().await;

        let id = (object.kind, object.key());
        let stored = objects.get(&id).ok_or_else(|| StoreError::NotFound {
            kind: id.0,
            key: id.1.clone(),
        })?;
        Self::check_version(stored, &object)?;

        match stored.status().cloned() {
            Some(status) => object.data.insert("status".to_string(), status),
            None => object.data.remove("status"),
        };
        object.metadata.resource_version = self.next_version();
        objects.insert(id, object.clone());
        self.notify(&object);
        Ok(object)
    }

    async fn update_status(&self, object: DynamicObject) -> StoreResult<DynamicObject> {
        self.enter(StoreOp::UpdateStatus, object.kind).await?;
        let mut objects = self.objects.write().await;

        let id = (object.kind, object.key());
        let stored = objects.get_mut(&id).ok_or_else(|| StoreError::NotFound {
            kind: id.0,
            key: id.1.clone(),
        })?;
        Self::check_version(stored, &object)?;

        match object.status().cloned() {
            Some(status) => stored.data.insert("status".to_string(), status),
            None => stored.data.remove("status"),
        };
        stored.metadata.resource_version = self.next_version();
        let updated = stored.clone();
        self.notify(&updated);
        Ok(updated)
    }

    fn subscribe(&self) -> broadcast::Receiver<WatchEvent> {
        self.events.subscribe()
    }
}
