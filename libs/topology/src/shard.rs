//! Shards: horizontal partitions identified by a key range.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::containers::{ConfigProvider, TabletContainers};
use crate::keyspace::ShardOptions;
use crate::linked::{HasParents, ParentLinks};
use crate::meta::ObjectMeta;
use crate::selector::ResourceSelector;
use crate::tablet::Tablet;

/// Hex-encoded partition bounds.
///
/// The canonical string is `from-to`, or `0` when both bounds are empty. It is
/// the uniqueness key for shards within a cluster.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyRange {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub from: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub to: String,
}

impl KeyRange {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

impl fmt::Display for KeyRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.from.is_empty() && self.to.is_empty() {
            f.write_str("0")
        } else {
            write!(f, "{}-{}", self.from, self.to)
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShardSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub defaults: Option<ShardOptions>,
    #[serde(default)]
    pub key_range: KeyRange,
    #[serde(default)]
    pub tablets: Vec<Tablet>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tablet_selector: Vec<ResourceSelector>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shard {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: ShardSpec,
    #[serde(skip)]
    parents: ParentLinks,
}

impl Shard {
    pub fn new(metadata: ObjectMeta, spec: ShardSpec) -> Self {
        Self {
            metadata,
            spec,
            parents: ParentLinks::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn key_range(&self) -> &KeyRange {
        &self.spec.key_range
    }

    pub fn tablets(&self) -> &[Tablet] {
        &self.spec.tablets
    }

    /// Append a copy of a selector-matched tablet.
    pub fn embed_tablet_copy(&mut self, tablet: &Tablet) {
        self.spec.tablets.push(tablet.clone());
    }

    /// Link to the cluster and to the keyspace at `keyspace` within it.
    pub fn set_parents(&mut self, keyspace: usize) {
        self.parents = ParentLinks {
            cluster: true,
            keyspace: Some(keyspace),
            shard: None,
            cell: None,
        };
    }

    /// Replicas declared in the shard defaults.
    pub fn default_replicas(&self) -> Option<i32> {
        self.spec.defaults.as_ref()?.replicas
    }
}

impl HasParents for Shard {
    fn parents(&self) -> &ParentLinks {
        &self.parents
    }
}

impl ConfigProvider for Shard {
    fn tablet_containers(&self) -> Option<&TabletContainers> {
        self.spec.defaults.as_ref()?.containers.as_ref()
    }
}
