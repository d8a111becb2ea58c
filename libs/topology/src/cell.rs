//! Cells: failure-domain groupings with their own lockserver.

use serde::{Deserialize, Serialize};

use crate::linked::{HasParents, Linked, ParentLinks};
use crate::lockserver::Lockserver;
use crate::meta::{LocalObjectReference, ObjectMeta, SecretKeySelector};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MySqlAuthType {
    #[default]
    None,
    Static,
}

/// MySQL-protocol listener settings for a cell's gateway.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CellMySqlProtocol {
    #[serde(default)]
    pub auth_type: MySqlAuthType,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_secret_ref: Option<SecretKeySelector>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellDefaults {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub image: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CellSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lockserver: Option<Lockserver>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lockserver_ref: Option<LocalObjectReference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub defaults: Option<CellDefaults>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mysql_protocol: Option<CellMySqlProtocol>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: CellSpec,
    #[serde(skip)]
    parents: ParentLinks,
}

impl Cell {
    pub fn new(metadata: ObjectMeta, spec: CellSpec) -> Self {
        Self {
            metadata,
            spec,
            parents: ParentLinks::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn lockserver(&self) -> Option<&Lockserver> {
        self.spec.lockserver.as_ref()
    }

    pub fn set_parent_cluster(&mut self) {
        self.parents.cluster = true;
    }

    /// Gateway replica override, if any.
    pub fn replicas(&self) -> Option<i32> {
        self.spec.defaults.as_ref().and_then(|d| d.replicas)
    }

    /// Gateway image override, if any.
    pub fn image(&self) -> Option<&str> {
        self.spec
            .defaults
            .as_ref()
            .map(|d| d.image.as_str())
            .filter(|image| !image.is_empty())
    }
}

impl HasParents for Cell {
    fn parents(&self) -> &ParentLinks {
        &self.parents
    }
}

impl Linked<'_, Cell> {
    /// `<cluster>-<cell>[-extra...]`.
    pub fn scoped_name(&self, extra: &[&str]) -> String {
        let mut parts = vec![self.owner().name(), self.name()];
        parts.extend_from_slice(extra);
        parts.join("-")
    }
}
