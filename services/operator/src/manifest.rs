//! Seed manifests for the in-memory store.
//!
//! A manifest is one JSON document listing standalone entities by kind:
//!
//! ```json
//! {
//!   "lockservers": [...],
//!   "clusters": [...],
//!   "cells": [...],
//!   "keyspaces": [...],
//!   "shards": [...],
//!   "tablets": [...]
//! }
//! ```
//!
//! Objects without a namespace are placed in the operator's namespace.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::info;
use vto_topology::{Cell, Cluster, Keyspace, Lockserver, Shard, Tablet};

use crate::store::{ApiStore, Object, StoreError, StoreExt};

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read manifest {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse manifest {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to seed store: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Manifest {
    pub lockservers: Vec<Lockserver>,
    pub clusters: Vec<Cluster>,
    pub cells: Vec<Cell>,
    pub keyspaces: Vec<Keyspace>,
    pub shards: Vec<Shard>,
    pub tablets: Vec<Tablet>,
}

impl Manifest {
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ManifestError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ManifestError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Create every object in `store`, returning how many were written.
    ///
    /// Clusters go last so their first pass sees the entities they reference.
    pub async fn seed(
        &self,
        store: &dyn ApiStore,
        namespace: &str,
    ) -> Result<usize, ManifestError> {
        let mut written = 0;
        written += seed_all(store, namespace, &self.lockservers).await?;
        written += seed_all(store, namespace, &self.cells).await?;
        written += seed_all(store, namespace, &self.keyspaces).await?;
        written += seed_all(store, namespace, &self.shards).await?;
        written += seed_all(store, namespace, &self.tablets).await?;
        written += seed_all(store, namespace, &self.clusters).await?;
        info!(objects = written, namespace, "Seeded store from manifest");
        Ok(written)
    }
}

async fn seed_all<T: Object>(
    store: &dyn ApiStore,
    namespace: &str,
    objects: &[T],
) -> Result<usize, StoreError> {
    for object in objects {
        let mut object = object.clone();
        if object.metadata().namespace.is_empty() {
            object.metadata_mut().namespace = namespace.to_string();
        }
        store.create_object(&object).await?;
    }
    Ok(objects.len())
}
