//! Container scripts, rendered from the templates under `templates/`.
//!
//! Rendering is strict: a template that references a value the context does
//! not carry fails instead of producing an empty flag.

use std::sync::OnceLock;

use minijinja::{Environment, ErrorKind, UndefinedBehavior};
use serde::Serialize;
use vto_topology::{Cell, Linked, Lockserver, MySqlAuthType, Tablet};

/// Every script a generated container runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Script {
    VtTabletInit,
    VtTabletStart,
    VtTabletPreStop,
    MySqlInit,
    MySqlStart,
    MySqlPreStop,
    VtctldStart,
    VtGateStart,
    InitMySqlCreds,
    InitReplicaMaster,
}

impl Script {
    pub const ALL: [Script; 10] = [
        Self::VtTabletInit,
        Self::VtTabletStart,
        Self::VtTabletPreStop,
        Self::MySqlInit,
        Self::MySqlStart,
        Self::MySqlPreStop,
        Self::VtctldStart,
        Self::VtGateStart,
        Self::InitMySqlCreds,
        Self::InitReplicaMaster,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::VtTabletInit => "vttablet_init.sh",
            Self::VtTabletStart => "vttablet_start.sh",
            Self::VtTabletPreStop => "vttablet_pre_stop.sh",
            Self::MySqlInit => "mysql_init.sh",
            Self::MySqlStart => "mysql_start.sh",
            Self::MySqlPreStop => "mysql_pre_stop.sh",
            Self::VtctldStart => "vtctld_start.sh",
            Self::VtGateStart => "vtgate_start.sh",
            Self::InitMySqlCreds => "init_mysql_creds.sh",
            Self::InitReplicaMaster => "init_replica_master.sh",
        }
    }

    fn source(&self) -> &'static str {
        match self {
            Self::VtTabletInit => include_str!("../../templates/vttablet_init.sh"),
            Self::VtTabletStart => include_str!("../../templates/vttablet_start.sh"),
            Self::VtTabletPreStop => include_str!("../../templates/vttablet_pre_stop.sh"),
            Self::MySqlInit => include_str!("../../templates/mysql_init.sh"),
            Self::MySqlStart => include_str!("../../templates/mysql_start.sh"),
            Self::MySqlPreStop => include_str!("../../templates/mysql_pre_stop.sh"),
            Self::VtctldStart => include_str!("../../templates/vtctld_start.sh"),
            Self::VtGateStart => include_str!("../../templates/vtgate_start.sh"),
            Self::InitMySqlCreds => include_str!("../../templates/init_mysql_creds.sh"),
            Self::InitReplicaMaster => include_str!("../../templates/init_replica_master.sh"),
        }
    }
}

/// Topology-service flags shared by every component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopoContext {
    pub implementation: String,
    pub address: String,
    pub root: String,
}

impl TopoContext {
    /// Flags for `lockserver`, when it carries connection details.
    pub fn from_lockserver(lockserver: &Lockserver) -> Option<Self> {
        let etcd2 = lockserver.spec.etcd2.as_ref()?;
        Some(Self {
            implementation: lockserver.spec.kind.as_str().to_string(),
            address: etcd2.address.clone(),
            root: etcd2.path.clone(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MySqlProtocolContext {
    pub auth_type: MySqlAuthType,
    pub username: String,
    pub has_password_secret: bool,
}

/// Values available to every template.
///
/// Optional sections serialize as `null` so templates can test them.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScriptContext {
    pub cluster: String,
    pub namespace: String,
    pub cell: String,
    pub keyspace: String,
    pub key_range: String,
    pub tablet_type: String,
    pub scoped_name: String,
    pub tablet_service: String,
    pub vtctld_service: String,
    pub shard_tablet_prefix: String,
    pub expected_tablets: i32,
    pub topo: Option<TopoContext>,
    pub mysql_protocol: Option<MySqlProtocolContext>,
}

impl ScriptContext {
    pub fn for_cell(cell: Linked<'_, Cell>) -> Self {
        let cluster = cell.owner();
        Self {
            cluster: cluster.name().to_string(),
            namespace: cluster.namespace().to_string(),
            cell: cell.name().to_string(),
            scoped_name: cell.scoped_name(&[]),
            tablet_service: cluster.tablet_service_name(),
            vtctld_service: vtctld_address(cell),
            topo: cell.lockserver().and_then(TopoContext::from_lockserver),
            mysql_protocol: cell.spec.mysql_protocol.as_ref().map(|protocol| MySqlProtocolContext {
                auth_type: protocol.auth_type,
                username: protocol.username.clone(),
                has_password_secret: protocol.password_secret_ref.is_some(),
            }),
            ..Default::default()
        }
    }

    /// Context for a linked tablet; a tablet without a cell falls back to
    /// cluster-level values only.
    pub fn for_tablet(tablet: Linked<'_, Tablet>) -> Self {
        let mut context = match tablet.cell() {
            Some(cell) => Self::for_cell(cell),
            None => Self {
                cluster: tablet.owner().name().to_string(),
                namespace: tablet.owner().namespace().to_string(),
                tablet_service: tablet.owner().tablet_service_name(),
                ..Default::default()
            },
        };

        context.keyspace = tablet.keyspace().map(|k| k.name().to_string()).unwrap_or_default();
        context.key_range = tablet
            .shard()
            .map(|s| s.key_range().to_string())
            .unwrap_or_default();
        context.tablet_type = tablet.tablet_type().to_string();
        context.scoped_name = tablet.scoped_name(&[]);
        context.shard_tablet_prefix = tablet.scoped_name(&[]);
        context.expected_tablets = expected_tablets(tablet);
        context
    }
}

/// `<cluster>-<cell>-vtctld.<namespace>:15999`
fn vtctld_address(cell: Linked<'_, Cell>) -> String {
    format!(
        "{}.{}:15999",
        cell.scoped_name(&["vtctld"]),
        cell.owner().namespace()
    )
}

/// Tablets of the shard in this tablet's cell, across every tablet type.
fn expected_tablets(tablet: Linked<'_, Tablet>) -> i32 {
    let Some(shard) = tablet.shard() else {
        return tablet.replicas();
    };
    shard
        .tablets()
        .iter()
        .filter(|other| other.spec.cell_id == tablet.spec.cell_id)
        .map(|other| Linked::new(tablet.owner(), other).replicas())
        .sum()
}

/// Renders [`Script`]s.
pub struct ScriptEngine {
    env: Environment<'static>,
}

impl ScriptEngine {
    pub fn new() -> Result<Self, minijinja::Error> {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        for script in Script::ALL {
            env.add_template(script.name(), script.source())?;
        }
        Ok(Self { env })
    }

    /// The process-wide engine, built on first use.
    pub fn shared() -> Result<&'static Self, minijinja::Error> {
        static ENGINE: OnceLock<Result<ScriptEngine, String>> = OnceLock::new();
        ENGINE
            .get_or_init(|| Self::new().map_err(|e| e.to_string()))
            .as_ref()
            .map_err(|detail| minijinja::Error::new(ErrorKind::InvalidOperation, detail.clone()))
    }

    pub fn render(
        &self,
        script: Script,
        context: &ScriptContext,
    ) -> Result<String, minijinja::Error> {
        self.env.get_template(script.name())?.render(context)
    }
}
