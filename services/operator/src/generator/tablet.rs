//! Per-tablet workload and the replica master election job.

use std::collections::BTreeMap;

use vto_topology::{Linked, ObjectMeta, ResourceRequirements, Tablet};

use super::resources::{
    set_controller_reference, Affinity, Container, ContainerPort, EnvVar, HealthCheck, Job,
    JobSpec, PersistentVolumeClaim, PersistentVolumeClaimSpec, PodAffinity, PodSecurityContext,
    PodSpec, PodTemplateSpec, Selector, StatefulSet, StatefulSetSpec, StatefulSetUpdateStrategy,
    Volume, VolumeMount, WeightedPodAffinityTerm,
};
use super::scripts::{Script, ScriptContext, ScriptEngine};
use super::{
    cluster_labels, with_labels, GenerateError, LOGROTATE_IMAGE, LOGTAIL_IMAGE, MYSQLCTLD_IMAGE,
    VTCTLCLIENT_IMAGE, VTCTL_IMAGE,
};

const DATA_VOLUME: &str = "vtdataroot";
const DATA_VOLUME_SIZE: &str = "10Gi";
const TERMINATION_GRACE_PERIOD_SECONDS: i64 = 60_000_000;

/// Names of the parents a tablet's resources are scoped by.
struct Placement<'a> {
    cell: &'a str,
    keyspace: &'a str,
    shard: &'a str,
}

impl<'a> Placement<'a> {
    fn of(tablet: Linked<'a, Tablet>) -> Result<Self, GenerateError> {
        let missing = |parent| GenerateError::MissingParent {
            tablet: tablet.item().name().to_string(),
            parent,
        };
        Ok(Self {
            cell: tablet.cell().ok_or_else(|| missing("cell"))?.item().name(),
            keyspace: tablet.keyspace().ok_or_else(|| missing("keyspace"))?.item().name(),
            shard: tablet.shard().ok_or_else(|| missing("shard"))?.item().name(),
        })
    }
}

/// The stateful set running `tablet`'s mysqld and vttablet pods.
pub fn stateful_set(tablet: Linked<'_, Tablet>) -> Result<StatefulSet, GenerateError> {
    let placement = Placement::of(tablet)?;
    let cluster = tablet.owner();
    let name = tablet.stateful_set_name();

    let mysql = tablet
        .mysql_container()
        .ok_or_else(|| GenerateError::MissingContainer {
            tablet: tablet.item().name().to_string(),
            container: "mysql",
        })?;
    let vttablet = tablet
        .vttablet_container()
        .ok_or_else(|| GenerateError::MissingContainer {
            tablet: tablet.item().name().to_string(),
            container: "vttablet",
        })?;

    let engine = ScriptEngine::shared()?;
    let context = ScriptContext::for_tablet(tablet);

    let base = with_labels(cluster_labels(cluster), &[("component", "vttablet")]);
    let shard_labels = with_labels(
        base.clone(),
        &[("keyspace", placement.keyspace), ("shard", placement.shard)],
    );
    let pod_labels = with_labels(
        shard_labels.clone(),
        &[
            ("tabletname", tablet.item().name()),
            ("cell", placement.cell),
            ("type", tablet.tablet_type().as_str()),
        ],
    );
    let vtgate_labels = with_labels(cluster_labels(cluster), &[("component", "vtgate")]);

    let data_mount = VolumeMount::new(DATA_VOLUME, "/vtdataroot");

    let init_mysql = Container::bash(
        "init-mysql",
        MYSQLCTLD_IMAGE,
        engine.render(Script::MySqlInit, &context)?,
    )
    .pull_if_not_present();
    let init_mysql = Container {
        volume_mounts: vec![data_mount.clone(), VolumeMount::new("vt", "/vttmp")],
        ..init_mysql
    };

    let init_vttablet = Container {
        volume_mounts: vec![data_mount.clone()],
        ..Container::bash(
            "init-vttablet",
            VTCTL_IMAGE,
            engine.render(Script::VtTabletInit, &context)?,
        )
        .pull_if_not_present()
    };

    let mysql_container = Container {
        readiness: Some(HealthCheck::exec(
            &[
                "mysqladmin",
                "ping",
                "-uroot",
                "--socket=/vtdataroot/tabletdata/mysql.sock",
            ],
            60,
            10,
        )),
        resources: mysql.resources.clone(),
        volume_mounts: vec![data_mount.clone(), VolumeMount::new("vt", "/vt")],
        env: tablet_env(&mysql.db_flavor),
        ..Container::bash(
            "mysql",
            &mysql.image,
            engine.render(Script::MySqlStart, &context)?,
        )
        .pull_if_not_present()
        .with_pre_stop(engine.render(Script::MySqlPreStop, &context)?)
    };

    let vttablet_container = Container {
        readiness: Some(HealthCheck::http("/debug/health", 15002, 60, 10)),
        liveness: Some(HealthCheck::http("/debug/status", 15002, 60, 10)),
        ports: vec![
            ContainerPort::tcp("web", 15002),
            ContainerPort::tcp("grpc", 16002),
        ],
        resources: vttablet.resources.clone(),
        volume_mounts: vec![data_mount.clone()],
        env: tablet_env(&vttablet.db_flavor),
        ..Container::bash(
            "vttablet",
            &vttablet.image,
            engine.render(Script::VtTabletStart, &context)?,
        )
        .pull_if_not_present()
        .with_pre_stop(engine.render(Script::VtTabletPreStop, &context)?)
    };

    let logrotate = Container {
        name: "logrotate".to_string(),
        image: LOGROTATE_IMAGE.to_string(),
        image_pull_policy: Some("IfNotPresent".to_string()),
        volume_mounts: vec![data_mount.clone()],
        ..Default::default()
    };

    let mut containers = vec![mysql_container, vttablet_container, logrotate];
    for (name, file) in [
        ("general-log", "general.log"),
        ("error-log", "error.log"),
        ("slow-log", "slow-query.log"),
    ] {
        containers.push(Container {
            name: name.to_string(),
            image: LOGTAIL_IMAGE.to_string(),
            image_pull_policy: Some("IfNotPresent".to_string()),
            env: vec![EnvVar::value(
                "TAIL_FILEPATH",
                format!("/vtdataroot/tabletdata/{file}"),
            )],
            volume_mounts: vec![data_mount.clone()],
            ..Default::default()
        });
    }

    let mut volumes = vec![Volume::empty_dir("vt")];
    let mut volume_claim_templates = Vec::new();
    match tablet.spec.volume_claim.as_ref() {
        Some(claim) => volumes.push(Volume::claim(DATA_VOLUME, &claim.claim_name, claim.read_only)),
        None => volume_claim_templates.push(data_claim_template()),
    }

    let mut metadata = ObjectMeta::named(cluster.namespace(), name);
    metadata.labels = pod_labels.clone();

    let mut set = StatefulSet {
        metadata,
        spec: StatefulSetSpec {
            pod_management_policy: "Parallel".to_string(),
            replicas: tablet.replicas(),
            selector: Selector::new(pod_labels.clone()),
            update_strategy: StatefulSetUpdateStrategy {
                kind: "RollingUpdate".to_string(),
            },
            service_name: cluster.tablet_service_name(),
            template: PodTemplateSpec::labeled(
                pod_labels,
                PodSpec {
                    affinity: Some(Affinity {
                        pod_affinity: PodAffinity {
                            preferred_during_scheduling_ignored_during_execution: vec![
                                WeightedPodAffinityTerm::same_host(10, vtgate_labels),
                            ],
                        },
                        pod_anti_affinity: PodAffinity {
                            preferred_during_scheduling_ignored_during_execution: vec![
                                WeightedPodAffinityTerm::same_host(100, shard_labels),
                                WeightedPodAffinityTerm::same_host(10, base),
                            ],
                        },
                    }),
                    containers,
                    init_containers: vec![init_mysql, init_vttablet],
                    volumes,
                    security_context: Some(PodSecurityContext::default()),
                    termination_grace_period_seconds: Some(TERMINATION_GRACE_PERIOD_SECONDS),
                    restart_policy: None,
                },
            ),
            volume_claim_templates,
        },
        status: Default::default(),
    };
    set_controller_reference(&mut set, cluster.name());

    Ok(set)
}

/// One-shot job that promotes the first replica of `tablet`'s shard once
/// every tablet of the shard in its cell has registered.
pub fn replica_init_job(tablet: Linked<'_, Tablet>) -> Result<Job, GenerateError> {
    let placement = Placement::of(tablet)?;
    let cluster = tablet.owner();
    let name = tablet.scoped_name(&["init", "replica", "master"]);

    let engine = ScriptEngine::shared()?;
    let context = ScriptContext::for_tablet(tablet);

    let job_labels = with_labels(
        cluster_labels(cluster),
        &[
            ("keyspace", placement.keyspace),
            ("shard", placement.shard),
            ("component", "vttablet-replica-elector"),
            ("initShardMasterJob", "true"),
            ("job-name", name.as_str()),
        ],
    );

    let container = Container::bash(
        "init-master",
        VTCTLCLIENT_IMAGE,
        engine.render(Script::InitReplicaMaster, &context)?,
    )
    .pull_if_not_present();

    let mut metadata = ObjectMeta::named(cluster.namespace(), name.clone());
    metadata.labels = job_labels.clone();

    let mut job = Job {
        metadata,
        spec: JobSpec {
            backoff_limit: 1,
            completions: 1,
            parallelism: 1,
            template: PodTemplateSpec::labeled(
                job_labels,
                PodSpec {
                    containers: vec![container],
                    restart_policy: Some("OnFailure".to_string()),
                    ..Default::default()
                },
            ),
        },
    };
    set_controller_reference(&mut job, cluster.name());

    Ok(job)
}

fn tablet_env(db_flavor: &str) -> Vec<EnvVar> {
    vec![
        EnvVar::value("VTROOT", "/vt"),
        EnvVar::value("VTDATAROOT", "/vtdataroot"),
        EnvVar::value("GOBIN", "/vt/bin"),
        EnvVar::value("VT_MYSQL_ROOT", "/usr"),
        EnvVar::value("PKG_CONFIG_PATH", "/vt/lib"),
        EnvVar::value("VT_DB_FLAVOR", db_flavor),
    ]
}

fn data_claim_template() -> PersistentVolumeClaim {
    PersistentVolumeClaim {
        metadata: ObjectMeta {
            name: DATA_VOLUME.to_string(),
            ..Default::default()
        },
        spec: PersistentVolumeClaimSpec {
            access_modes: vec!["ReadWriteOnce".to_string()],
            resources: ResourceRequirements {
                limits: BTreeMap::new(),
                requests: BTreeMap::from([("storage".to_string(), DATA_VOLUME_SIZE.to_string())]),
            },
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vto_topology::{
        Cell, CellSpec, Cluster, ClusterSpec, KeyRange, Keyspace, KeyspaceSpec, Lockserver,
        MySqlContainer, Shard, ShardSpec, TabletContainers, TabletSpec, TabletType,
        VolumeClaimSource, VtTabletContainer,
    };

    const NS: &str = "vitess";

    fn containers() -> TabletContainers {
        TabletContainers {
            db_flavor: "mysql56".to_string(),
            mysql: Some(MySqlContainer {
                image: "percona:5.7".to_string(),
                db_flavor: "percona".to_string(),
                ..Default::default()
            }),
            vttablet: Some(VtTabletContainer {
                image: "vitess/vttablet:helm-1.0.3".to_string(),
                ..Default::default()
            }),
        }
    }

    fn cluster(tablet_spec: TabletSpec) -> Cluster {
        let mut cluster = Cluster::new(
            ObjectMeta::named(NS, "main"),
            ClusterSpec {
                cells: vec![Cell::new(
                    ObjectMeta::named(NS, "zone1"),
                    CellSpec {
                        lockserver: Some(Lockserver::etcd2(
                            NS,
                            "zone1",
                            "etcd:2379",
                            "/vitess/zone1",
                        )),
                        ..Default::default()
                    },
                )],
                keyspaces: vec![Keyspace::new(
                    ObjectMeta::named(NS, "users"),
                    KeyspaceSpec {
                        shards: vec![Shard::new(
                            ObjectMeta::named(NS, "0"),
                            ShardSpec {
                                key_range: KeyRange::default(),
                                tablets: vec![Tablet::new(
                                    ObjectMeta::named(NS, "replica"),
                                    tablet_spec,
                                )],
                                ..Default::default()
                            },
                        )],
                        ..Default::default()
                    },
                )],
                ..Default::default()
            },
        );
        cluster.link_parents();
        cluster
    }

    fn replica() -> TabletSpec {
        TabletSpec {
            cell_id: "zone1".to_string(),
            kind: TabletType::Replica,
            replicas: Some(2),
            containers: Some(containers()),
            ..Default::default()
        }
    }

    fn env<'a>(container: &'a Container, name: &str) -> Option<&'a str> {
        container
            .env
            .iter()
            .find(|e| e.name == name)
            .and_then(|e| e.value.as_deref())
    }

    #[test]
    fn test_stateful_set_shape() {
        let c = cluster(replica());
        let set = stateful_set(c.tablets()[0]).unwrap();

        assert_eq!(set.metadata.name, "main-zone1-users-0-replica");
        assert_eq!(set.spec.replicas, 2);
        assert_eq!(set.spec.service_name, "main-tab");
        assert_eq!(set.spec.pod_management_policy, "Parallel");
        assert_eq!(set.metadata.controller_owner().map(|o| o.name.as_str()), Some("main"));

        let labels = &set.spec.selector.match_labels;
        assert_eq!(labels.get("tabletname").map(String::as_str), Some("replica"));
        assert_eq!(labels.get("type").map(String::as_str), Some("replica"));
        assert_eq!(labels.get("shard").map(String::as_str), Some("0"));

        let pod = &set.spec.template.spec;
        let names: Vec<&str> = pod.containers.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["mysql", "vttablet", "logrotate", "general-log", "error-log", "slow-log"]
        );
        let init: Vec<&str> = pod.init_containers.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(init, vec!["init-mysql", "init-vttablet"]);
        assert_eq!(pod.termination_grace_period_seconds, Some(TERMINATION_GRACE_PERIOD_SECONDS));

        let anti = &pod.affinity.as_ref().unwrap().pod_anti_affinity;
        let weights: Vec<i32> = anti
            .preferred_during_scheduling_ignored_during_execution
            .iter()
            .map(|t| t.weight)
            .collect();
        assert_eq!(weights, vec![100, 10]);

        assert_eq!(set.spec.volume_claim_templates.len(), 1);
        assert_eq!(set.spec.volume_claim_templates[0].metadata.name, DATA_VOLUME);
    }

    #[test]
    fn test_container_flavor_and_image() {
        let c = cluster(replica());
        let set = stateful_set(c.tablets()[0]).unwrap();
        let pod = &set.spec.template.spec;

        let mysql = &pod.containers[0];
        assert_eq!(mysql.image, "percona:5.7");
        assert_eq!(env(mysql, "VT_DB_FLAVOR"), Some("percona"));
        assert!(mysql.lifecycle.is_some());

        let vttablet = &pod.containers[1];
        assert_eq!(env(vttablet, "VT_DB_FLAVOR"), Some("mysql56"));
        assert!(vttablet.args[1].contains(r#"-init_keyspace="users""#));

        let error_log = &pod.containers[4];
        assert_eq!(env(error_log, "TAIL_FILEPATH"), Some("/vtdataroot/tabletdata/error.log"));
    }

    #[test]
    fn test_volume_claim_replaces_template() {
        let mut spec = replica();
        spec.volume_claim = Some(VolumeClaimSource {
            claim_name: "existing-data".to_string(),
            read_only: false,
        });
        let c = cluster(spec);
        let set = stateful_set(c.tablets()[0]).unwrap();

        assert!(set.spec.volume_claim_templates.is_empty());
        let data = set
            .spec
            .template
            .spec
            .volumes
            .iter()
            .find(|v| v.name == DATA_VOLUME)
            .unwrap();
        assert_eq!(
            data.persistent_volume_claim.as_ref().map(|c| c.claim_name.as_str()),
            Some("existing-data")
        );
    }

    #[test]
    fn test_missing_container() {
        let mut spec = replica();
        spec.containers = Some(TabletContainers {
            vttablet: None,
            ..containers()
        });
        let c = cluster(spec);

        let err = stateful_set(c.tablets()[0]).unwrap_err();
        assert!(matches!(
            err,
            GenerateError::MissingContainer { container: "vttablet", .. }
        ));
    }

    #[test]
    fn test_unlinked_cell_is_rejected() {
        let mut spec = replica();
        spec.cell_id = "zone9".to_string();
        let c = cluster(spec);

        let err = stateful_set(c.tablets()[0]).unwrap_err();
        assert!(matches!(err, GenerateError::MissingParent { parent: "cell", .. }));
    }

    #[test]
    fn test_replica_init_job() {
        let c = cluster(replica());
        let job = replica_init_job(c.tablets()[0]).unwrap();

        assert_eq!(job.metadata.name, "main-zone1-users-0-init-replica-master");
        assert_eq!(
            job.metadata.labels.get("job-name").map(String::as_str),
            Some("main-zone1-users-0-init-replica-master")
        );
        assert_eq!(
            job.metadata.labels.get("component").map(String::as_str),
            Some("vttablet-replica-elector")
        );
        assert_eq!(job.spec.backoff_limit, 1);
        let pod = &job.spec.template.spec;
        assert_eq!(pod.restart_policy.as_deref(), Some("OnFailure"));
        assert_eq!(pod.containers[0].image, VTCTLCLIENT_IMAGE);
        assert!(pod.containers[0].args[1].contains("EXPECTED_TABLETS=2"));
    }
}
