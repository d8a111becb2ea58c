//! Infrastructure resource generation.
//!
//! Pure functions from a normalized, linked topology to the resources that
//! run it. Nothing here talks to the store; the controller decides whether a
//! generated resource is created, patched or left alone.

mod cell;
mod cluster;
pub mod resources;
mod scripts;
mod tablet;

use thiserror::Error;
use vto_topology::Cluster;

use resources::{labels, Labels};

pub use cell::{vtctld_resources, vtgate_resources};
pub use cluster::tablet_service;
pub use scripts::{Script, ScriptContext, ScriptEngine};
pub use tablet::{replica_init_job, stateful_set};

pub const VTCTLD_IMAGE: &str = "vitess/vtctld:helm-1.0.3";
pub const VTGATE_IMAGE: &str = "vitess/vtgate:helm-1.0.3";
pub const VTCTL_IMAGE: &str = "vitess/vtctl:helm-1.0.3";
pub const VTCTLCLIENT_IMAGE: &str = "vitess/vtctlclient:helm-1.0.3";
pub const MYSQLCTLD_IMAGE: &str = "vitess/mysqlctld:helm-1.0.3";
pub const LOGROTATE_IMAGE: &str = "vitess/logrotate:helm-1.0.4";
pub const LOGTAIL_IMAGE: &str = "vitess/logtail:helm-1.0.4";

/// Gateway replicas when the cell does not override them.
pub const DEFAULT_VTGATE_REPLICAS: i32 = 2;

/// Generation errors.
#[derive(Debug, Error)]
pub enum GenerateError {
    /// No level of the tablet's container chain provides this container.
    #[error("tablet {tablet} has no {container} container")]
    MissingContainer {
        tablet: String,
        container: &'static str,
    },

    /// The tablet was not linked to the named parent by normalization.
    #[error("tablet {tablet} is not linked to a {parent}")]
    MissingParent { tablet: String, parent: &'static str },

    /// A script template failed to render.
    #[error("script template error: {0}")]
    Template(#[from] minijinja::Error),
}

/// `app=vitess` and `cluster=<name>`, carried by every generated resource.
fn cluster_labels(cluster: &Cluster) -> Labels {
    labels([("app", "vitess"), ("cluster", cluster.name())])
}

fn with_labels(mut base: Labels, extra: &[(&str, &str)]) -> Labels {
    for (key, value) in extra {
        base.insert((*key).to_string(), (*value).to_string());
    }
    base
}
