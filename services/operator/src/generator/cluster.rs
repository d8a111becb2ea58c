//! Cluster-wide resources.

use vto_topology::{Cluster, ObjectMeta};

use super::resources::{set_controller_reference, Service, ServicePort, ServiceSpec};
use super::{cluster_labels, with_labels};

/// Headless service fronting every tablet pod of `cluster`, including pods
/// that are not ready yet.
pub fn tablet_service(cluster: &Cluster) -> Service {
    let selector = with_labels(cluster_labels(cluster), &[("component", "vttablet")]);

    let mut metadata = ObjectMeta::named(cluster.namespace(), cluster.tablet_service_name());
    metadata.labels = selector.clone();
    metadata.annotations.insert(
        "service.alpha.kubernetes.io/tolerate-unready-endpoints".to_string(),
        "true".to_string(),
    );

    let mut service = Service {
        metadata,
        spec: ServiceSpec {
            cluster_ip: Some("None".to_string()),
            selector,
            kind: "ClusterIP".to_string(),
            publish_not_ready_addresses: true,
            ports: vec![
                ServicePort::new("web", 15002),
                ServicePort::new("grpc", 16002),
                ServicePort::new("query-data", 42001),
                ServicePort::new("mysql-metrics", 42002),
            ],
        },
    };
    set_controller_reference(&mut service, cluster.name());
    service
}
