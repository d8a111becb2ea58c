//! Per-cell control and gateway resources.

use vto_topology::{Cell, Linked, ObjectMeta};

use super::resources::{
    set_controller_reference, Affinity, Container, ContainerPort, Deployment, DeploymentSpec,
    EnvVar, HealthCheck, PodAffinity, PodSecurityContext, PodSpec, PodTemplateSpec, Selector,
    Service, ServicePort, ServiceSpec, Volume, VolumeMount, WeightedPodAffinityTerm,
};
use super::scripts::{Script, ScriptContext, ScriptEngine};
use super::{
    cluster_labels, with_labels, GenerateError, DEFAULT_VTGATE_REPLICAS, VTCTLD_IMAGE,
    VTGATE_IMAGE,
};

/// The vtctld deployment and service for `cell`.
pub fn vtctld_resources(cell: Linked<'_, Cell>) -> Result<(Deployment, Service), GenerateError> {
    let engine = ScriptEngine::shared()?;
    let context = ScriptContext::for_cell(cell);
    let cluster = cell.owner();
    let name = cell.scoped_name(&["vtctld"]);
    let pod_labels = with_labels(
        cluster_labels(cluster),
        &[("cell", cell.name()), ("component", "vtctld")],
    );

    let mut container = Container::bash(
        "vtctld",
        VTCTLD_IMAGE,
        engine.render(Script::VtctldStart, &context)?,
    );
    container.liveness = Some(HealthCheck::http("/debug/status", 15000, 30, 5));
    container.readiness = Some(HealthCheck::http("/debug/health", 15000, 30, 5));

    let mut deployment = Deployment {
        metadata: labeled_meta(cell, &name, &pod_labels),
        spec: DeploymentSpec {
            progress_deadline_seconds: 1,
            replicas: 1,
            selector: Selector::new(pod_labels.clone()),
            template: PodTemplateSpec::labeled(
                pod_labels.clone(),
                PodSpec {
                    containers: vec![container],
                    security_context: Some(PodSecurityContext::default()),
                    ..Default::default()
                },
            ),
        },
    };
    set_controller_reference(&mut deployment, cluster.name());

    let service = cell_service(
        cell,
        &name,
        pod_labels,
        vec![ServicePort::new("web", 15000), ServicePort::new("grpc", 15999)],
    );

    Ok((deployment, service))
}

/// The vtgate deployment and service for `cell`.
///
/// Gateways prefer nodes running tablets of the same cluster and spread away
/// from each other.
pub fn vtgate_resources(cell: Linked<'_, Cell>) -> Result<(Deployment, Service), GenerateError> {
    let engine = ScriptEngine::shared()?;
    let context = ScriptContext::for_cell(cell);
    let cluster = cell.owner();
    let name = cell.scoped_name(&["vtgate"]);
    let image = cell.image().unwrap_or(VTGATE_IMAGE);
    let pod_labels = with_labels(
        cluster_labels(cluster),
        &[("cell", cell.name()), ("component", "vtgate")],
    );
    let tablet_labels = with_labels(cluster_labels(cluster), &[("component", "vttablet")]);

    let mut container = Container::bash(
        "vtgate",
        image,
        engine.render(Script::VtGateStart, &context)?,
    );
    container.liveness = Some(HealthCheck::http("/debug/status", 15001, 30, 5));
    container.readiness = Some(HealthCheck::http("/debug/health", 15001, 30, 5));
    container.volume_mounts = vec![VolumeMount::new("creds", "/mysqlcreds")];

    let mut ports = vec![ServicePort::new("web", 15001), ServicePort::new("grpc", 15991)];
    let mut init_containers = Vec::new();

    if let Some(protocol) = cell.spec.mysql_protocol.as_ref() {
        container.ports.push(ContainerPort::tcp("mysql", 3306));
        ports.push(ServicePort::new("mysql", 3306));

        if let Some(secret) = protocol.password_secret_ref.as_ref() {
            let mut init = Container::bash(
                "init-mysql-creds",
                image,
                engine.render(Script::InitMySqlCreds, &context)?,
            );
            init.env = vec![EnvVar::secret("MYSQL_PASSWORD", secret.clone())];
            init.volume_mounts = vec![VolumeMount::new("creds", "/mysqlcreds")];
            init_containers.push(init);
        }
    }

    let mut deployment = Deployment {
        metadata: labeled_meta(cell, &name, &pod_labels),
        spec: DeploymentSpec {
            progress_deadline_seconds: 600,
            replicas: cell.replicas().unwrap_or(DEFAULT_VTGATE_REPLICAS),
            selector: Selector::new(pod_labels.clone()),
            template: PodTemplateSpec::labeled(
                pod_labels.clone(),
                PodSpec {
                    affinity: Some(Affinity {
                        pod_affinity: PodAffinity {
                            preferred_during_scheduling_ignored_during_execution: vec![
                                WeightedPodAffinityTerm::same_host(10, tablet_labels),
                            ],
                        },
                        pod_anti_affinity: PodAffinity {
                            preferred_during_scheduling_ignored_during_execution: vec![
                                WeightedPodAffinityTerm::same_host(100, pod_labels.clone()),
                            ],
                        },
                    }),
                    containers: vec![container],
                    init_containers,
                    volumes: vec![Volume::empty_dir("creds")],
                    security_context: Some(PodSecurityContext::default()),
                    ..Default::default()
                },
            ),
        },
    };
    set_controller_reference(&mut deployment, cluster.name());

    let service = cell_service(cell, &name, pod_labels, ports);

    Ok((deployment, service))
}

fn labeled_meta(cell: Linked<'_, Cell>, name: &str, pod_labels: &super::Labels) -> ObjectMeta {
    let mut metadata = ObjectMeta::named(cell.owner().namespace(), name);
    metadata.labels = pod_labels.clone();
    metadata
}

fn cell_service(
    cell: Linked<'_, Cell>,
    name: &str,
    selector: super::Labels,
    ports: Vec<ServicePort>,
) -> Service {
    let mut service = Service {
        metadata: labeled_meta(cell, name, &selector),
        spec: ServiceSpec {
            cluster_ip: None,
            selector,
            kind: "ClusterIP".to_string(),
            publish_not_ready_addresses: false,
            ports,
        },
    };
    set_controller_reference(&mut service, cell.owner().name());
    service
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::resources::labels;
    use vto_topology::{
        CellDefaults, CellMySqlProtocol, CellSpec, Cluster, ClusterSpec, Lockserver, MySqlAuthType,
        SecretKeySelector,
    };

    fn cluster(spec: CellSpec) -> Cluster {
        let mut spec = spec;
        spec.lockserver = Some(Lockserver::etcd2("vitess", "zone1", "etcd:2379", "/vitess/zone1"));
        let mut cluster = Cluster::new(
            ObjectMeta::named("vitess", "main"),
            ClusterSpec {
                cells: vec![Cell::new(ObjectMeta::named("vitess", "zone1"), spec)],
                ..Default::default()
            },
        );
        cluster.link_parents();
        cluster
    }

    #[test]
    fn test_vtctld_resources() {
        let c = cluster(CellSpec::default());
        let (deployment, service) = vtctld_resources(c.cells()[0]).unwrap();

        assert_eq!(deployment.metadata.name, "main-zone1-vtctld");
        assert_eq!(deployment.spec.replicas, 1);
        assert_eq!(deployment.spec.progress_deadline_seconds, 1);
        assert_eq!(
            deployment.spec.selector.match_labels,
            labels([
                ("app", "vitess"),
                ("cell", "zone1"),
                ("cluster", "main"),
                ("component", "vtctld"),
            ])
        );

        let container = &deployment.spec.template.spec.containers[0];
        assert_eq!(container.image, VTCTLD_IMAGE);
        assert_eq!(container.command, vec!["bash"]);
        assert!(container.args[1].contains(r#"-cell="zone1""#));
        assert_eq!(
            container
                .readiness
                .as_ref()
                .and_then(|c| c.http_get.as_ref())
                .map(|h| h.path.as_str()),
            Some("/debug/health")
        );

        assert_eq!(service.metadata.name, "main-zone1-vtctld");
        let ports: Vec<i32> = service.spec.ports.iter().map(|p| p.port).collect();
        assert_eq!(ports, vec![15000, 15999]);
    }

    #[test]
    fn test_vtgate_defaults() {
        let c = cluster(CellSpec::default());
        let (deployment, service) = vtgate_resources(c.cells()[0]).unwrap();

        assert_eq!(deployment.spec.replicas, DEFAULT_VTGATE_REPLICAS);
        assert_eq!(deployment.spec.progress_deadline_seconds, 600);
        let pod = &deployment.spec.template.spec;
        assert_eq!(pod.containers[0].image, VTGATE_IMAGE);
        assert!(pod.init_containers.is_empty());

        let affinity = pod.affinity.as_ref().unwrap();
        let attract =
            &affinity.pod_affinity.preferred_during_scheduling_ignored_during_execution[0];
        assert_eq!(attract.weight, 10);
        assert_eq!(
            attract
                .pod_affinity_term
                .label_selector
                .match_labels
                .get("component")
                .map(String::as_str),
            Some("vttablet")
        );
        let spread =
            &affinity.pod_anti_affinity.preferred_during_scheduling_ignored_during_execution[0];
        assert_eq!(spread.weight, 100);

        let ports: Vec<i32> = service.spec.ports.iter().map(|p| p.port).collect();
        assert_eq!(ports, vec![15001, 15991]);
    }

    #[test]
    fn test_vtgate_overrides_and_credentials() {
        let c = cluster(CellSpec {
            defaults: Some(CellDefaults {
                replicas: Some(3),
                image: "registry.local/vtgate:dev".to_string(),
            }),
            mysql_protocol: Some(CellMySqlProtocol {
                auth_type: MySqlAuthType::Static,
                username: "app".to_string(),
                password_secret_ref: Some(SecretKeySelector {
                    name: "vtgate-creds".to_string(),
                    key: "password".to_string(),
                }),
            }),
            ..Default::default()
        });
        let (deployment, service) = vtgate_resources(c.cells()[0]).unwrap();

        assert_eq!(deployment.spec.replicas, 3);
        let pod = &deployment.spec.template.spec;
        assert_eq!(pod.containers[0].image, "registry.local/vtgate:dev");

        let init = &pod.init_containers[0];
        assert_eq!(init.name, "init-mysql-creds");
        assert_eq!(init.image, "registry.local/vtgate:dev");
        let secret = init.env[0].value_from.as_ref().unwrap();
        assert_eq!(secret.secret_key_ref.name, "vtgate-creds");
        assert!(init.args[1].contains(r#""UserData": "app""#));

        assert!(service.spec.ports.iter().any(|p| p.name == "mysql" && p.port == 3306));
    }
}
