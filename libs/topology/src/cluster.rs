//! The root of the topology.

use serde::{Deserialize, Serialize};

use crate::cell::Cell;
use crate::keyspace::Keyspace;
use crate::linked::Linked;
use crate::lockserver::{Lockserver, LockserverStatus};
use crate::meta::{LocalObjectReference, ObjectMeta};
use crate::selector::ResourceSelector;
use crate::shard::Shard;
use crate::tablet::{Tablet, TabletReadiness};

/// Coarse lifecycle of a cluster. Never moves backwards.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClusterPhase {
    #[default]
    #[serde(rename = "")]
    None,
    Creating,
    Ready,
}

impl ClusterPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "",
            Self::Creating => "Creating",
            Self::Ready => "Ready",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lockserver: Option<Lockserver>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lockserver_ref: Option<LocalObjectReference>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cells: Vec<Cell>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cell_selector: Vec<ResourceSelector>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keyspaces: Vec<Keyspace>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keyspace_selector: Vec<ResourceSelector>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterStatus {
    #[serde(default)]
    pub phase: ClusterPhase,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lockserver: Option<LockserverStatus>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cluster {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: ClusterSpec,
    #[serde(default)]
    pub status: ClusterStatus,
}

impl Cluster {
    pub fn new(metadata: ObjectMeta, spec: ClusterSpec) -> Self {
        Self {
            metadata,
            spec,
            status: ClusterStatus::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn namespace(&self) -> &str {
        &self.metadata.namespace
    }

    pub fn lockserver(&self) -> Option<&Lockserver> {
        self.spec.lockserver.as_ref()
    }

    pub fn cells(&self) -> Vec<Linked<'_, Cell>> {
        self.spec.cells.iter().map(|c| Linked::new(self, c)).collect()
    }

    pub fn keyspaces(&self) -> Vec<Linked<'_, Keyspace>> {
        self.spec
            .keyspaces
            .iter()
            .map(|k| Linked::new(self, k))
            .collect()
    }

    /// Every shard of every keyspace, in declaration order.
    pub fn shards(&self) -> Vec<Linked<'_, Shard>> {
        self.spec
            .keyspaces
            .iter()
            .flat_map(|k| k.shards())
            .map(|s| Linked::new(self, s))
            .collect()
    }

    /// Every tablet of every shard, in declaration order.
    pub fn tablets(&self) -> Vec<Linked<'_, Tablet>> {
        self.spec
            .keyspaces
            .iter()
            .flat_map(|k| k.shards())
            .flat_map(|s| s.tablets())
            .map(|t| Linked::new(self, t))
            .collect()
    }

    /// Tablets under one shard, addressed by position.
    pub fn shard_tablets(&self, keyspace: usize, shard: usize) -> Vec<Linked<'_, Tablet>> {
        self.spec
            .keyspaces
            .get(keyspace)
            .and_then(|k| k.spec.shards.get(shard))
            .map(|s| s.tablets().iter().map(|t| Linked::new(self, t)).collect())
            .unwrap_or_default()
    }

    /// Position of the cell named `cell_id`.
    pub fn cell_index(&self, cell_id: &str) -> Option<usize> {
        self.spec.cells.iter().position(|c| c.name() == cell_id)
    }

    pub fn cell_by_id(&self, cell_id: &str) -> Option<Linked<'_, Cell>> {
        let index = self.cell_index(cell_id)?;
        Some(Linked::new(self, &self.spec.cells[index]))
    }

    /// Append a copy of a selector-matched cell.
    pub fn embed_cell_copy(&mut self, cell: &Cell) {
        self.spec.cells.push(cell.clone());
    }

    /// Append a copy of a selector-matched keyspace.
    pub fn embed_keyspace_copy(&mut self, keyspace: &Keyspace) {
        self.spec.keyspaces.push(keyspace.clone());
    }

    /// Recompute every parent link from the current tree.
    pub fn link_parents(&mut self) {
        let Self { spec, .. } = self;
        for cell in &mut spec.cells {
            cell.set_parent_cluster();
        }
        for (k, keyspace) in spec.keyspaces.iter_mut().enumerate() {
            keyspace.set_parent_cluster();
            for (s, shard) in keyspace.spec.shards.iter_mut().enumerate() {
                shard.set_parents(k);
                for tablet in &mut shard.spec.tablets {
                    let cell = spec.cells.iter().position(|c| c.name() == tablet.spec.cell_id);
                    tablet.set_parents(k, s, cell);
                }
            }
        }
    }

    /// `<cluster>[-extra...]`.
    pub fn scoped_name(&self, extra: &[&str]) -> String {
        let mut parts = vec![self.name()];
        parts.extend_from_slice(extra);
        parts.join("-")
    }

    /// Name of the headless service fronting every tablet.
    pub fn tablet_service_name(&self) -> String {
        self.scoped_name(&["tab"])
    }

    pub fn phase(&self) -> ClusterPhase {
        self.status.phase
    }

    pub fn set_phase(&mut self, phase: ClusterPhase) {
        self.status.phase = phase;
    }

    pub fn in_phase(&self, phase: ClusterPhase) -> bool {
        self.status.phase == phase
    }

    pub fn all_tablets_ready(&self, readiness: &TabletReadiness) -> bool {
        self.tablets()
            .iter()
            .all(|tablet| readiness.is_ready(&tablet.stateful_set_name()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::CellSpec;
    use crate::containers::{MySqlContainer, TabletContainers, VtTabletContainer};
    use crate::keyspace::{KeyspaceSpec, ShardOptions};
    use crate::shard::{KeyRange, ShardSpec};
    use crate::tablet::{TabletPhase, TabletSpec, TabletType, MAX_TABLET_HOSTNAME_LENGTH};
    use proptest::prelude::*;
    use rstest::rstest;

    const NS: &str = "vitess";

    fn cell(name: &str) -> Cell {
        Cell::new(
            ObjectMeta::named(NS, name),
            CellSpec {
                lockserver: Some(Lockserver::etcd2(NS, format!("{name}-ls"), "etcd:2379", "/vt")),
                ..Default::default()
            },
        )
    }

    fn tablet(name: &str, cell_id: &str) -> Tablet {
        Tablet::new(
            ObjectMeta::named(NS, name),
            TabletSpec {
                cell_id: cell_id.to_string(),
                ..Default::default()
            },
        )
    }

    fn shard(name: &str, tablets: Vec<Tablet>) -> Shard {
        Shard::new(
            ObjectMeta::named(NS, name),
            ShardSpec {
                tablets,
                ..Default::default()
            },
        )
    }

    fn keyspace(name: &str, shards: Vec<Shard>) -> Keyspace {
        Keyspace::new(
            ObjectMeta::named(NS, name),
            KeyspaceSpec {
                shards,
                ..Default::default()
            },
        )
    }

    fn cluster(name: &str, cells: Vec<Cell>, keyspaces: Vec<Keyspace>) -> Cluster {
        let mut cluster = Cluster::new(
            ObjectMeta::named(NS, name),
            ClusterSpec {
                cells,
                keyspaces,
                ..Default::default()
            },
        );
        cluster.link_parents();
        cluster
    }

    fn containers(mysql_image: Option<&str>, vttablet_image: Option<&str>) -> TabletContainers {
        TabletContainers {
            db_flavor: String::new(),
            mysql: mysql_image.map(|image| MySqlContainer {
                image: image.to_string(),
                ..Default::default()
            }),
            vttablet: vttablet_image.map(|image| VtTabletContainer {
                image: image.to_string(),
                ..Default::default()
            }),
        }
    }

    #[test]
    fn test_linkage_through_views() {
        let c = cluster(
            "main",
            vec![cell("zone1")],
            vec![keyspace("users", vec![shard("0", vec![tablet("t1", "zone1")])])],
        );

        let tablets = c.tablets();
        assert_eq!(tablets.len(), 1);

        let t = tablets[0];
        assert_eq!(t.cluster().map(Cluster::name), Some("main"));
        assert_eq!(t.cell().map(|x| x.item().name()), Some("zone1"));
        assert_eq!(t.keyspace().map(|x| x.item().name()), Some("users"));
        assert_eq!(t.shard().map(|x| x.item().name()), Some("0"));
        assert_eq!(t.lockserver().map(Lockserver::name), Some("zone1-ls"));
    }

    #[test]
    fn test_missing_cell_leaves_link_empty() {
        let c = cluster(
            "main",
            vec![cell("zone1")],
            vec![keyspace("users", vec![shard("0", vec![tablet("t1", "zone9")])])],
        );
        let tablets = c.tablets();
        assert!(tablets[0].cell().is_none());
        assert!(tablets[0].lockserver().is_none());
        assert_eq!(tablets[0].scoped_name(&[]), "main--users-0");
    }

    #[test]
    fn test_scoped_names() {
        let c = cluster(
            "main",
            vec![cell("zone1")],
            vec![keyspace("users", vec![shard("-80", vec![tablet("t1", "zone1")])])],
        );
        assert_eq!(c.scoped_name(&[]), "main");
        assert_eq!(c.tablet_service_name(), "main-tab");
        assert_eq!(c.cells()[0].scoped_name(&["vtgate"]), "main-zone1-vtgate");

        let t = c.tablets()[0];
        assert_eq!(t.stateful_set_name(), "main-zone1-users--80-replica");
        assert_eq!(
            t.scoped_name(&["init-replica-master"]),
            "main-zone1-users--80-init-replica-master"
        );
    }

    // Hostname is <sts>-NN.<cluster>-tab; with one-char cell/keyspace/shard the
    // fixed part is "-a-b-c-replica" (14) + "-" + 2 + "." + "-tab" (4) = 22,
    // so a cluster name of length n gives 2n + 22.
    #[rstest]
    #[case(18, 58)]
    #[case(19, 60)]
    #[case(20, 62)]
    fn test_max_hostname_length(#[case] cluster_len: usize, #[case] expected: usize) {
        let name = "c".repeat(cluster_len);
        let c = cluster(
            &name,
            vec![cell("a")],
            vec![keyspace("b", vec![shard("c", vec![tablet("t", "a")])])],
        );
        let len = c.tablets()[0].max_hostname_length();
        assert_eq!(len, expected);
        assert_eq!(len < MAX_TABLET_HOSTNAME_LENGTH, expected < 60);
    }

    #[test]
    fn test_container_inheritance_shard_beats_keyspace() {
        let mut s = shard("0", vec![tablet("t", "zone1")]);
        s.spec.defaults = Some(ShardOptions {
            containers: Some(containers(Some("mysql:shard"), None)),
            ..Default::default()
        });
        let mut k = keyspace("users", vec![s]);
        k.spec.defaults = Some(ShardOptions {
            containers: Some(containers(Some("mysql:keyspace"), Some("vttablet:keyspace"))),
            ..Default::default()
        });
        let c = cluster("main", vec![cell("zone1")], vec![k]);
        let t = c.tablets()[0];

        let mysql = t.mysql_container().unwrap();
        assert_eq!(mysql.image, "mysql:shard");
        assert_eq!(mysql.db_flavor, "mysql56");

        // Shard has no vttablet container, so the keyspace supplies it.
        assert_eq!(t.vttablet_container().unwrap().image, "vttablet:keyspace");

        // Stored entities keep their empty flavor.
        let stored = c.spec.keyspaces[0].spec.shards[0]
            .spec
            .defaults
            .as_ref()
            .and_then(|d| d.containers.as_ref())
            .and_then(|c| c.mysql.as_ref())
            .map(|m| m.db_flavor.clone());
        assert_eq!(stored.as_deref(), Some(""));
    }

    #[test]
    fn test_tablet_override_wins() {
        let mut t = tablet("t", "zone1");
        t.spec.containers = Some(containers(Some("mysql:tablet"), None));
        let mut s = shard("0", vec![t]);
        s.spec.defaults = Some(ShardOptions {
            containers: Some(containers(Some("mysql:shard"), None)),
            ..Default::default()
        });
        let c = cluster("main", vec![cell("zone1")], vec![keyspace("users", vec![s])]);
        assert_eq!(c.tablets()[0].mysql_container().unwrap().image, "mysql:tablet");
    }

    #[test]
    fn test_replicas_precedence() {
        let mut explicit = tablet("t1", "zone1");
        explicit.spec.replicas = Some(3);
        let mut s = shard("0", vec![explicit, tablet("t2", "zone1")]);
        s.spec.defaults = Some(ShardOptions {
            replicas: Some(2),
            ..Default::default()
        });
        let bare = shard("1", vec![tablet("t3", "zone1")]);
        let c = cluster("main", vec![cell("zone1")], vec![keyspace("users", vec![s, bare])]);

        let replicas: Vec<i32> = c.tablets().iter().map(|t| t.replicas()).collect();
        assert_eq!(replicas, vec![3, 2, 0]);
    }

    #[test]
    fn test_all_tablets_ready() {
        let mut master = tablet("m", "zone1");
        master.spec.kind = TabletType::Master;
        let c = cluster(
            "main",
            vec![cell("zone1")],
            vec![keyspace("users", vec![shard("0", vec![master, tablet("r", "zone1")])])],
        );

        let mut readiness = TabletReadiness::new();
        readiness.set_phase("main-zone1-users-0-master", TabletPhase::Ready);
        assert!(!c.all_tablets_ready(&readiness));

        readiness.set_phase("main-zone1-users-0-replica", TabletPhase::Ready);
        assert!(c.all_tablets_ready(&readiness));
    }

    #[test]
    fn test_phase_wire_format() {
        let mut c = Cluster::default();
        let json = serde_json::to_value(&c.status).unwrap();
        assert_eq!(json["phase"], "");

        c.set_phase(ClusterPhase::Creating);
        assert!(c.in_phase(ClusterPhase::Creating));
        let json = serde_json::to_value(&c.status).unwrap();
        assert_eq!(json["phase"], "Creating");
    }

    #[test]
    fn test_key_range_on_shards() {
        let mut s = shard("-80", vec![]);
        s.spec.key_range = KeyRange::new("", "80");
        let c = cluster("main", vec![], vec![keyspace("users", vec![s])]);
        assert_eq!(c.shards()[0].key_range().to_string(), "-80");
        assert_eq!(c.shards()[0].keyspace().map(|k| k.item().name()), Some("users"));
    }

    proptest! {
        #[test]
        fn prop_tablets_flatten_every_shard(
            shape in prop::collection::vec(prop::collection::vec(0usize..4, 0..4), 0..4)
        ) {
            let keyspaces: Vec<Keyspace> = shape
                .iter()
                .enumerate()
                .map(|(k, shards)| {
                    let shards = shards
                        .iter()
                        .enumerate()
                        .map(|(s, n)| {
                            let tablets = (0..*n)
                                .map(|t| tablet(&format!("t{k}{s}{t}"), "zone1"))
                                .collect();
                            shard(&s.to_string(), tablets)
                        })
                        .collect();
                    keyspace(&format!("ks{k}"), shards)
                })
                .collect();
            let c = cluster("main", vec![cell("zone1")], keyspaces);

            let expected: usize = shape.iter().flatten().sum();
            prop_assert_eq!(c.tablets().len(), expected);
            for t in c.tablets() {
                prop_assert!(t.cell().is_some());
                prop_assert!(t.shard().is_some());
                prop_assert!(t.keyspace().is_some());
            }
        }
    }
}
