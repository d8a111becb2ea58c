//! Keyspaces: logical databases split into shards.

use serde::{Deserialize, Serialize};

use crate::containers::{ConfigProvider, TabletContainers};
use crate::linked::{HasParents, ParentLinks};
use crate::meta::ObjectMeta;
use crate::selector::ResourceSelector;
use crate::shard::Shard;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOptions {
    #[serde(default)]
    pub count: i64,
}

/// Defaults inherited by the shards and tablets below a keyspace or shard.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShardOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,
    #[serde(default)]
    pub batch: BatchOptions,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub containers: Option<TabletContainers>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cells: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cell_selector: Vec<ResourceSelector>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyspaceSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub defaults: Option<ShardOptions>,
    #[serde(default)]
    pub shards: Vec<Shard>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub shard_selector: Vec<ResourceSelector>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Keyspace {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: KeyspaceSpec,
    #[serde(skip)]
    parents: ParentLinks,
}

impl Keyspace {
    pub fn new(metadata: ObjectMeta, spec: KeyspaceSpec) -> Self {
        Self {
            metadata,
            spec,
            parents: ParentLinks::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn shards(&self) -> &[Shard] {
        &self.spec.shards
    }

    /// Append a copy of a selector-matched shard.
    pub fn embed_shard_copy(&mut self, shard: &Shard) {
        self.spec.shards.push(shard.clone());
    }

    pub fn set_parent_cluster(&mut self) {
        self.parents.cluster = true;
    }
}

impl HasParents for Keyspace {
    fn parents(&self) -> &ParentLinks {
        &self.parents
    }
}

impl ConfigProvider for Keyspace {
    fn tablet_containers(&self) -> Option<&TabletContainers> {
        self.spec.defaults.as_ref()?.containers.as_ref()
    }
}
