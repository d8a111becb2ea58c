//! Tablets: the unit of compute, one per (cell, keyspace, shard, type).

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::containers::{
    resolve_container, ConfigProvider, MySqlContainer, TabletContainers, VtTabletContainer,
};
use crate::linked::{HasParents, Linked, ParentLinks};
use crate::lockserver::Lockserver;
use crate::meta::{ObjectMeta, SecretReference};

/// Hostnames used for replication must stay strictly below this length.
pub const MAX_TABLET_HOSTNAME_LENGTH: usize = 60;

/// Largest ordinal suffix a tablet pod can carry, in digits.
pub const MAX_TABLET_ORDINAL_LENGTH: usize = 2;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TabletType {
    Master,
    #[default]
    Replica,
    #[serde(rename = "readonly")]
    ReadOnly,
    Backup,
    Restore,
    Drained,
}

impl TabletType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Master => "master",
            Self::Replica => "replica",
            Self::ReadOnly => "readonly",
            Self::Backup => "backup",
            Self::Restore => "restore",
            Self::Drained => "drained",
        }
    }
}

impl fmt::Display for TabletType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TabletDatastoreType {
    #[default]
    Local,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabletDatastore {
    #[serde(default, rename = "type")]
    pub kind: TabletDatastoreType,
}

/// An existing claim to mount as the tablet's data volume.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeClaimSource {
    pub claim_name: String,
    #[serde(default)]
    pub read_only: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabletCredentials {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_ref: Option<SecretReference>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabletSpec {
    #[serde(default, rename = "tabletID")]
    pub tablet_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,
    #[serde(default, rename = "cellID")]
    pub cell_id: String,
    #[serde(default, rename = "type")]
    pub kind: TabletType,
    #[serde(default)]
    pub datastore: TabletDatastore,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub containers: Option<TabletContainers>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_claim: Option<VolumeClaimSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<TabletCredentials>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tablet {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: TabletSpec,
    #[serde(skip)]
    parents: ParentLinks,
}

impl Tablet {
    pub fn new(metadata: ObjectMeta, spec: TabletSpec) -> Self {
        Self {
            metadata,
            spec,
            parents: ParentLinks::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn tablet_type(&self) -> TabletType {
        self.spec.kind
    }

    /// The numeric tablet id as a decimal string.
    pub fn tablet_id(&self) -> String {
        self.spec.tablet_id.to_string()
    }

    /// Link to the cluster, the keyspace and shard it sits under, and the
    /// cell named by `cellID` when one was found.
    pub fn set_parents(&mut self, keyspace: usize, shard: usize, cell: Option<usize>) {
        self.parents = ParentLinks {
            cluster: true,
            keyspace: Some(keyspace),
            shard: Some(shard),
            cell,
        };
    }
}

impl HasParents for Tablet {
    fn parents(&self) -> &ParentLinks {
        &self.parents
    }
}

impl ConfigProvider for Tablet {
    fn tablet_containers(&self) -> Option<&TabletContainers> {
        self.spec.containers.as_ref()
    }
}

impl<'a> Linked<'a, Tablet> {
    /// `<cluster>-<cell>-<keyspace>-<shard>[-extra...]`; unlinked parents render empty.
    pub fn scoped_name(&self, extra: &[&str]) -> String {
        let cell = self.cell();
        let keyspace = self.keyspace();
        let shard = self.shard();

        let mut parts = vec![
            self.owner().name(),
            cell.as_ref().map_or("", |c| c.item().name()),
            keyspace.as_ref().map_or("", |k| k.item().name()),
            shard.as_ref().map_or("", |s| s.item().name()),
        ];
        parts.extend_from_slice(extra);
        parts.join("-")
    }

    pub fn stateful_set_name(&self) -> String {
        self.scoped_name(&[self.tablet_type().as_str()])
    }

    /// Longest hostname a pod of this tablet can get:
    /// `<statefulset>-<ordinal>.<tablet service>`.
    pub fn max_hostname_length(&self) -> usize {
        self.stateful_set_name().len()
            + "-".len()
            + MAX_TABLET_ORDINAL_LENGTH
            + ".".len()
            + self.owner().tablet_service_name().len()
    }

    /// The lockserver of the tablet's cell.
    pub fn lockserver(&self) -> Option<&'a Lockserver> {
        self.cell().and_then(|cell| cell.item().lockserver())
    }

    /// Tablet replicas, else shard default replicas, else zero.
    pub fn replicas(&self) -> i32 {
        self.spec
            .replicas
            .or_else(|| self.shard().and_then(|s| s.item().default_replicas()))
            .unwrap_or(0)
    }

    fn providers(&self) -> Vec<&'a dyn ConfigProvider> {
        let mut providers: Vec<&'a dyn ConfigProvider> = Vec::with_capacity(3);
        providers.push(self.item());
        if let Some(shard) = self.shard() {
            providers.push(shard.item());
        }
        if let Some(keyspace) = self.keyspace() {
            providers.push(keyspace.item());
        }
        providers
    }

    /// Effective mysql container: tablet, then shard defaults, then keyspace defaults.
    pub fn mysql_container(&self) -> Option<MySqlContainer> {
        resolve_container(&self.providers(), |c| c.mysql.as_ref())
    }

    /// Effective vttablet container, resolved like [`Self::mysql_container`].
    pub fn vttablet_container(&self) -> Option<VtTabletContainer> {
        resolve_container(&self.providers(), |c| c.vttablet.as_ref())
    }
}

/// Readiness of one tablet within a reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TabletPhase {
    #[default]
    None,
    Ready,
}

/// Pass-scoped readiness, keyed by stateful set name.
#[derive(Debug, Clone, Default)]
pub struct TabletReadiness {
    phases: BTreeMap<String, TabletPhase>,
}

impl TabletReadiness {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_phase(&mut self, stateful_set: impl Into<String>, phase: TabletPhase) {
        self.phases.insert(stateful_set.into(), phase);
    }

    pub fn phase(&self, stateful_set: &str) -> TabletPhase {
        self.phases.get(stateful_set).copied().unwrap_or_default()
    }

    pub fn is_ready(&self, stateful_set: &str) -> bool {
        self.phase(stateful_set) == TabletPhase::Ready
    }
}
