//! Tablet container configuration and its inheritance chain.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Database flavor used when no level of the chain names one.
pub const DEFAULT_DB_FLAVOR: &str = "mysql56";

/// Resource limits and requests, in the usual quantity notation (`"500m"`, `"1Gi"`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRequirements {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub limits: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub requests: BTreeMap<String, String>,
}

/// Container settings for the mysqld process.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MySqlContainer {
    pub image: String,
    #[serde(default)]
    pub resources: ResourceRequirements,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub db_flavor: String,
}

/// Container settings for the vttablet process.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VtTabletContainer {
    pub image: String,
    #[serde(default)]
    pub resources: ResourceRequirements,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub db_flavor: String,
}

/// The container directory offered by a tablet, shard, or keyspace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabletContainers {
    /// Flavor applied to any container below that leaves its own empty.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub db_flavor: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mysql: Option<MySqlContainer>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vttablet: Option<VtTabletContainer>,
}

/// Anything that can answer "which tablet containers do you specify".
pub trait ConfigProvider {
    fn tablet_containers(&self) -> Option<&TabletContainers>;
}

/// Containers that carry their own database flavor.
pub(crate) trait Flavored: Clone {
    fn db_flavor_mut(&mut self) -> &mut String;
}

impl Flavored for MySqlContainer {
    fn db_flavor_mut(&mut self) -> &mut String {
        &mut self.db_flavor
    }
}

impl Flavored for VtTabletContainer {
    fn db_flavor_mut(&mut self) -> &mut String {
        &mut self.db_flavor
    }
}

/// Walk `providers` in order and return a copy of the first container `pick`
/// finds, with an empty flavor backfilled from the provider's directory and
/// then from [`DEFAULT_DB_FLAVOR`].
pub(crate) fn resolve_container<C, F>(providers: &[&dyn ConfigProvider], pick: F) -> Option<C>
where
    C: Flavored,
    F: Fn(&TabletContainers) -> Option<&C>,
{
    providers.iter().find_map(|provider| {
        let containers = provider.tablet_containers()?;
        let mut container = pick(containers)?.clone();

        let flavor = container.db_flavor_mut();
        if flavor.is_empty() {
            *flavor = if containers.db_flavor.is_empty() {
                DEFAULT_DB_FLAVOR.to_string()
            } else {
                containers.db_flavor.clone()
            };
        }

        Some(container)
    })
}
