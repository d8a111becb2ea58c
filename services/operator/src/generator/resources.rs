//! Infrastructure resource types written to the store.
//!
//! These mirror the subset of the usual workload API that generated
//! resources need; field names serialize in camelCase.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use vto_topology::{ObjectMeta, OwnerReference, ResourceRequirements, SecretKeySelector};

use crate::store::{impl_object, Kind, Object};

pub type Labels = BTreeMap<String, String>;

/// `matchLabels` selector.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Selector {
    pub match_labels: Labels,
}

impl Selector {
    pub fn new(match_labels: Labels) -> Self {
        Self { match_labels }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServicePort {
    pub name: String,
    pub port: i32,
}

impl ServicePort {
    pub fn new(name: &str, port: i32) -> Self {
        Self {
            name: name.to_string(),
            port,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceSpec {
    /// `None` for a headless service.
    #[serde(default, rename = "clusterIP", skip_serializing_if = "Option::is_none")]
    pub cluster_ip: Option<String>,
    pub selector: Labels,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub publish_not_ready_addresses: bool,
    pub ports: Vec<ServicePort>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub metadata: ObjectMeta,
    pub spec: ServiceSpec,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpGetAction {
    pub path: String,
    pub port: i32,
    pub scheme: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecAction {
    pub command: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheck {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_get: Option<HttpGetAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exec: Option<ExecAction>,
    pub initial_delay_seconds: i32,
    pub timeout_seconds: i32,
    pub period_seconds: i32,
    pub success_threshold: i32,
    pub failure_threshold: i32,
}

impl HealthCheck {
    /// HTTP GET check with the shared period and thresholds.
    pub fn http(path: &str, port: i32, initial_delay_seconds: i32, timeout_seconds: i32) -> Self {
        Self {
            http_get: Some(HttpGetAction {
                path: path.to_string(),
                port,
                scheme: "HTTP".to_string(),
            }),
            exec: None,
            initial_delay_seconds,
            timeout_seconds,
            period_seconds: 10,
            success_threshold: 1,
            failure_threshold: 3,
        }
    }

    /// Command check with the shared period and thresholds.
    pub fn exec(command: &[&str], initial_delay_seconds: i32, timeout_seconds: i32) -> Self {
        Self {
            http_get: None,
            exec: Some(ExecAction {
                command: command.iter().map(ToString::to_string).collect(),
            }),
            initial_delay_seconds,
            timeout_seconds,
            period_seconds: 10,
            success_threshold: 1,
            failure_threshold: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lifecycle {
    pub pre_stop: ExecAction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvVarSource {
    pub secret_key_ref: SecretKeySelector,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvVar {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_from: Option<EnvVarSource>,
}

impl EnvVar {
    pub fn value(name: &str, value: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            value: Some(value.into()),
            value_from: None,
        }
    }

    pub fn secret(name: &str, secret_key_ref: SecretKeySelector) -> Self {
        Self {
            name: name.to_string(),
            value: None,
            value_from: Some(EnvVarSource { secret_key_ref }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerPort {
    pub name: String,
    pub container_port: i32,
    pub protocol: String,
}

impl ContainerPort {
    pub fn tcp(name: &str, container_port: i32) -> Self {
        Self {
            name: name.to_string(),
            container_port,
            protocol: "TCP".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeMount {
    pub name: String,
    pub mount_path: String,
}

impl VolumeMount {
    pub fn new(name: &str, mount_path: &str) -> Self {
        Self {
            name: name.to_string(),
            mount_path: mount_path.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Container {
    pub name: String,
    pub image: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_pull_policy: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVar>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<ContainerPort>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volume_mounts: Vec<VolumeMount>,
    #[serde(default)]
    pub resources: ResourceRequirements,
    #[serde(
        default,
        rename = "livenessProbe",
        skip_serializing_if = "Option::is_none"
    )]
    pub liveness: Option<HealthCheck>,
    #[serde(
        default,
        rename = "readinessProbe",
        skip_serializing_if = "Option::is_none"
    )]
    pub readiness: Option<HealthCheck>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lifecycle: Option<Lifecycle>,
}

impl Container {
    /// A container running `script` under `bash -c`.
    pub fn bash(name: &str, image: &str, script: String) -> Self {
        Self {
            name: name.to_string(),
            image: image.to_string(),
            command: vec!["bash".to_string()],
            args: vec!["-c".to_string(), script],
            ..Default::default()
        }
    }

    #[must_use]
    pub fn pull_if_not_present(mut self) -> Self {
        self.image_pull_policy = Some("IfNotPresent".to_string());
        self
    }

    #[must_use]
    pub fn with_pre_stop(mut self, script: String) -> Self {
        self.lifecycle = Some(Lifecycle {
            pre_stop: ExecAction {
                command: vec!["bash".to_string(), "-c".to_string(), script],
            },
        });
        self
    }
}

/// Existing claim mounted as a pod volume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimVolumeSource {
    pub claim_name: String,
    #[serde(default)]
    pub read_only: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmptyDirVolumeSource {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Volume {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub empty_dir: Option<EmptyDirVolumeSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persistent_volume_claim: Option<ClaimVolumeSource>,
}

impl Volume {
    pub fn empty_dir(name: &str) -> Self {
        Self {
            name: name.to_string(),
            empty_dir: Some(EmptyDirVolumeSource {}),
            persistent_volume_claim: None,
        }
    }

    pub fn claim(name: &str, claim_name: &str, read_only: bool) -> Self {
        Self {
            name: name.to_string(),
            empty_dir: None,
            persistent_volume_claim: Some(ClaimVolumeSource {
                claim_name: claim_name.to_string(),
                read_only,
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodAffinityTerm {
    pub label_selector: Selector,
    pub topology_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeightedPodAffinityTerm {
    pub weight: i32,
    pub pod_affinity_term: PodAffinityTerm,
}

impl WeightedPodAffinityTerm {
    /// Preference for (or against) nodes running pods labeled `labels`.
    pub fn same_host(weight: i32, labels: Labels) -> Self {
        Self {
            weight,
            pod_affinity_term: PodAffinityTerm {
                label_selector: Selector::new(labels),
                topology_key: "kubernetes.io/hostname".to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodAffinity {
    pub preferred_during_scheduling_ignored_during_execution: Vec<WeightedPodAffinityTerm>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Affinity {
    pub pod_affinity: PodAffinity,
    pub pod_anti_affinity: PodAffinity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodSecurityContext {
    pub fs_group: i64,
    pub run_as_user: i64,
}

impl Default for PodSecurityContext {
    fn default() -> Self {
        Self {
            fs_group: 2000,
            run_as_user: 1000,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affinity: Option<Affinity>,
    pub containers: Vec<Container>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub init_containers: Vec<Container>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<Volume>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_context: Option<PodSecurityContext>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub termination_grace_period_seconds: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restart_policy: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodTemplateSpec {
    pub metadata: ObjectMeta,
    pub spec: PodSpec,
}

impl PodTemplateSpec {
    pub fn labeled(labels: Labels, spec: PodSpec) -> Self {
        Self {
            metadata: ObjectMeta {
                labels,
                ..Default::default()
            },
            spec,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentSpec {
    pub progress_deadline_seconds: i32,
    pub replicas: i32,
    pub selector: Selector,
    pub template: PodTemplateSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deployment {
    pub metadata: ObjectMeta,
    pub spec: DeploymentSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistentVolumeClaimSpec {
    pub access_modes: Vec<String>,
    pub resources: ResourceRequirements,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistentVolumeClaim {
    pub metadata: ObjectMeta,
    pub spec: PersistentVolumeClaimSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatefulSetUpdateStrategy {
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatefulSetSpec {
    pub pod_management_policy: String,
    pub replicas: i32,
    pub selector: Selector,
    pub update_strategy: StatefulSetUpdateStrategy,
    pub service_name: String,
    pub template: PodTemplateSpec,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volume_claim_templates: Vec<PersistentVolumeClaim>,
}

/// Observed state, written by whatever runs the pods.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatefulSetStatus {
    #[serde(default)]
    pub replicas: i32,
    #[serde(default)]
    pub ready_replicas: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatefulSet {
    pub metadata: ObjectMeta,
    pub spec: StatefulSetSpec,
    #[serde(default)]
    pub status: StatefulSetStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSpec {
    pub backoff_limit: i32,
    pub completions: i32,
    pub parallelism: i32,
    pub template: PodTemplateSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub metadata: ObjectMeta,
    pub spec: JobSpec,
}

impl_object! {
    Service => Kind::Service,
    Deployment => Kind::Deployment,
    StatefulSet => Kind::StatefulSet,
    Job => Kind::Job,
}

/// Mark `object` as controlled by the cluster named `cluster`.
pub fn set_controller_reference<T: Object>(object: &mut T, cluster: &str) {
    let owners = &mut object.metadata_mut().owner_references;
    owners.retain(|owner| !owner.controller);
    owners.push(OwnerReference {
        kind: Kind::Cluster.as_str().to_string(),
        name: cluster.to_string(),
        controller: true,
    });
}

/// Build a label map from pairs.
pub fn labels<const N: usize>(pairs: [(&str, &str); N]) -> Labels {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}
