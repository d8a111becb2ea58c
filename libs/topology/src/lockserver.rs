//! Coordination-service descriptors.

use serde::{Deserialize, Serialize};

use crate::meta::ObjectMeta;

/// Supported coordination backends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockserverType {
    #[default]
    Etcd2,
}

impl LockserverType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Etcd2 => "etcd2",
        }
    }
}

/// Connection details for an etcd v2 lockserver.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Etcd2Lockserver {
    pub address: String,
    pub path: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockserverSpec {
    /// Whether the operator should provision the service (not implemented; recorded only).
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub provision: bool,

    #[serde(default, rename = "type")]
    pub kind: LockserverType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etcd2: Option<Etcd2Lockserver>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockserverStatus {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub state: String,
}

/// A lockserver, stored on its own or embedded in a cluster or cell.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lockserver {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: LockserverSpec,
    #[serde(default)]
    pub status: LockserverStatus,
}

impl Lockserver {
    /// An etcd2 lockserver at `address`, rooted at `path`.
    pub fn etcd2(
        namespace: impl Into<String>,
        name: impl Into<String>,
        address: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self {
            metadata: ObjectMeta::named(namespace, name),
            spec: LockserverSpec {
                provision: false,
                kind: LockserverType::Etcd2,
                etcd2: Some(Etcd2Lockserver {
                    address: address.into(),
                    path: path.into(),
                }),
            },
            status: LockserverStatus::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }
}
