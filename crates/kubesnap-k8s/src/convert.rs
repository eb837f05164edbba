//! Conversion from kubectl JSON into snapshot types

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::{
    Container, ContainerState, Endpoints, Event, Namespace, Node, PersistentVolumeClaim, Pod,
    Service, ServiceAccount,
};
use k8s_openapi::api::networking::v1::{Ingress, IngressBackend};
use k8s_openapi::api::rbac::v1::{Role, RoleBinding};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use serde::Deserialize;
use serde_json::Value;

use kubesnap_metrics::{parse_bytes, parse_cpu};
use kubesnap_types::{
    ConfigKind, ConfigResourceInfo, ContainerInfo, EventInfo, EventType, IngressInfo,
    NamespaceInfo, NodeInfo, NodeStats, PodInfo, PodStatus, ResourceBounds, ResourceUsage,
    RoleBindingInfo, RoleInfo, ServiceAccountInfo, ServiceInfo, VolumeClaimInfo, WorkloadInfo,
    WorkloadKind,
};

fn quantity(
    map: Option<&BTreeMap<String, Quantity>>,
    key: &str,
    parse: fn(&str) -> Option<f64>,
) -> Option<f64> {
    map?.get(key).and_then(|q| parse(&q.0))
}

// ============================================================================
// Namespaces & Nodes
// ============================================================================

pub(crate) fn namespace_info(ns: Namespace) -> NamespaceInfo {
    let name = ns.metadata.name.unwrap_or_default();
    let status = ns
        .status
        .and_then(|s| s.phase)
        .unwrap_or_else(|| "Unknown".to_string());

    let mut info = NamespaceInfo::new(name, status);
    info.labels = ns.metadata.labels.unwrap_or_default();
    info.created = ns.metadata.creation_timestamp.as_ref().map(|t| t.0);
    info
}

const ROLE_LABEL_PREFIX: &str = "node-role.kubernetes.io/";

pub(crate) fn node_info(node: Node) -> NodeInfo {
    let mut info = NodeInfo::new(node.metadata.name.unwrap_or_default());
    info.created = node.metadata.creation_timestamp.as_ref().map(|t| t.0);
    info.roles = node
        .metadata
        .labels
        .unwrap_or_default()
        .keys()
        .filter_map(|k| k.strip_prefix(ROLE_LABEL_PREFIX))
        .filter(|role| !role.is_empty())
        .map(str::to_string)
        .collect();

    if let Some(spec) = node.spec {
        info.unschedulable = spec.unschedulable.unwrap_or(false);
    }

    if let Some(status) = node.status {
        info.ready = status
            .conditions
            .unwrap_or_default()
            .iter()
            .any(|c| c.type_ == "Ready" && c.status == "True");
        info.internal_ip = status
            .addresses
            .unwrap_or_default()
            .into_iter()
            .find(|a| a.type_ == "InternalIP")
            .map(|a| a.address);
        if let Some(system) = status.node_info {
            info.kubelet_version = Some(system.kubelet_version);
            info.os_image = Some(system.os_image);
        }

        info.cpu_capacity = quantity(status.capacity.as_ref(), "cpu", parse_cpu);
        info.memory_capacity = quantity(status.capacity.as_ref(), "memory", parse_bytes);
        info.cpu_allocatable = quantity(status.allocatable.as_ref(), "cpu", parse_cpu);
        info.memory_allocatable = quantity(status.allocatable.as_ref(), "memory", parse_bytes);
    }

    info
}

// ============================================================================
// Pods & Events
// ============================================================================

fn container_bounds(container: &Container) -> ResourceBounds {
    let Some(resources) = &container.resources else {
        return ResourceBounds::default();
    };
    ResourceBounds {
        cpu_request: quantity(resources.requests.as_ref(), "cpu", parse_cpu),
        cpu_limit: quantity(resources.limits.as_ref(), "cpu", parse_cpu),
        memory_request: quantity(resources.requests.as_ref(), "memory", parse_bytes),
        memory_limit: quantity(resources.limits.as_ref(), "memory", parse_bytes),
    }
}

fn container_state(state: &ContainerState) -> Option<String> {
    if let Some(waiting) = &state.waiting {
        return Some(waiting.reason.clone().unwrap_or_else(|| "waiting".to_string()));
    }
    if state.running.is_some() {
        return Some("running".to_string());
    }
    state.terminated.as_ref().map(|t| {
        t.reason
            .clone()
            .unwrap_or_else(|| "terminated".to_string())
    })
}

pub(crate) fn pod_info(pod: Pod) -> PodInfo {
    let name = pod.metadata.name.unwrap_or_default();
    let namespace = pod.metadata.namespace.unwrap_or_default();
    let mut info = PodInfo::new(name, namespace);
    info.labels = pod.metadata.labels.unwrap_or_default();
    info.created = pod.metadata.creation_timestamp.as_ref().map(|t| t.0);

    if let Some(spec) = &pod.spec {
        info.node_name = spec.node_name.clone();
        info.containers = spec
            .containers
            .iter()
            .map(|c| {
                let mut container = ContainerInfo::new(c.name.clone());
                container.image = c.image.clone();
                container.resources = container_bounds(c);
                container
            })
            .collect();
        info.resources = ResourceBounds::total(info.containers.iter().map(|c| &c.resources));
    }

    if let Some(status) = pod.status {
        info.pod_ip = status.pod_ip;
        info.status = status
            .phase
            .as_deref()
            .map(PodStatus::from)
            .unwrap_or(PodStatus::Unknown);

        for cs in status.container_statuses.unwrap_or_default() {
            let index = match info.containers.iter().position(|c| c.name == cs.name) {
                Some(index) => index,
                None => {
                    info.containers.push(ContainerInfo::new(cs.name.clone()));
                    info.containers.len() - 1
                }
            };
            let container = &mut info.containers[index];
            container.ready = cs.ready;
            container.restart_count = cs.restart_count;
            container.state = cs.state.as_ref().and_then(container_state);
            if container.image.is_none() {
                container.image = Some(cs.image);
            }
        }
    }

    info
}

pub(crate) fn event_info(event: Event) -> EventInfo {
    let last_seen = event
        .last_timestamp
        .as_ref()
        .map(|t| t.0)
        .or_else(|| event.event_time.as_ref().map(|t| t.0))
        .or_else(|| event.first_timestamp.as_ref().map(|t| t.0))
        .or_else(|| event.metadata.creation_timestamp.as_ref().map(|t| t.0));

    EventInfo {
        event_type: event
            .type_
            .as_deref()
            .map(EventType::from)
            .unwrap_or(EventType::Normal),
        reason: event.reason.unwrap_or_default(),
        message: event.message.unwrap_or_default(),
        object_kind: event.involved_object.kind.unwrap_or_default(),
        object_name: event.involved_object.name.unwrap_or_default(),
        count: event.count.unwrap_or(1),
        last_seen,
    }
}

/// Most recent first, ties broken by object name
pub(crate) fn sort_events(events: &mut [EventInfo]) {
    events.sort_by(|a, b| {
        b.last_seen
            .cmp(&a.last_seen)
            .then_with(|| a.object_name.to_lowercase().cmp(&b.object_name.to_lowercase()))
    });
}

// ============================================================================
// Networking
// ============================================================================

pub(crate) fn service_info(svc: Service) -> ServiceInfo {
    let spec = svc.spec.unwrap_or_default();
    let ports = spec
        .ports
        .unwrap_or_default()
        .into_iter()
        .map(|p| {
            let protocol = p.protocol.unwrap_or_else(|| "TCP".to_string());
            match p.target_port {
                Some(IntOrString::Int(target)) if target != p.port => {
                    format!("{}:{}/{}", p.port, target, protocol)
                }
                Some(IntOrString::String(target)) => {
                    format!("{}:{}/{}", p.port, target, protocol)
                }
                _ => format!("{}/{}", p.port, protocol),
            }
        })
        .collect();

    ServiceInfo {
        name: svc.metadata.name.unwrap_or_default(),
        namespace: svc.metadata.namespace.unwrap_or_default(),
        service_type: spec.type_.unwrap_or_else(|| "ClusterIP".to_string()),
        cluster_ip: spec.cluster_ip,
        ports,
        selector: spec.selector.unwrap_or_default(),
        target_pods: Vec::new(),
        latency: None,
    }
}

/// Service name and the names of the pods its endpoints point at
pub(crate) fn endpoint_targets(endpoints: Endpoints) -> (String, Vec<String>) {
    let name = endpoints.metadata.name.unwrap_or_default();
    let mut pods: Vec<String> = endpoints
        .subsets
        .unwrap_or_default()
        .into_iter()
        .flat_map(|subset| {
            subset
                .addresses
                .unwrap_or_default()
                .into_iter()
                .chain(subset.not_ready_addresses.unwrap_or_default())
        })
        .filter_map(|address| address.target_ref)
        .filter(|target| target.kind.as_deref() == Some("Pod"))
        .filter_map(|target| target.name)
        .collect();
    pods.sort();
    pods.dedup();
    (name, pods)
}

fn backend_service(backend: &IngressBackend) -> Option<String> {
    backend.service.as_ref().map(|s| s.name.clone())
}

pub(crate) fn ingress_info(ingress: Ingress) -> IngressInfo {
    let spec = ingress.spec.unwrap_or_default();
    let rules = spec.rules.unwrap_or_default();

    let hosts = rules.iter().filter_map(|r| r.host.clone()).collect();
    let mut services: Vec<String> = rules
        .iter()
        .filter_map(|r| r.http.as_ref())
        .flat_map(|http| http.paths.iter())
        .filter_map(|path| backend_service(&path.backend))
        .chain(spec.default_backend.as_ref().and_then(backend_service))
        .collect();
    services.sort();
    services.dedup();

    IngressInfo {
        name: ingress.metadata.name.unwrap_or_default(),
        namespace: ingress.metadata.namespace.unwrap_or_default(),
        class: spec.ingress_class_name,
        hosts,
        services,
    }
}

// ============================================================================
// Storage & RBAC
// ============================================================================

pub(crate) fn volume_claim_info(pvc: PersistentVolumeClaim) -> VolumeClaimInfo {
    let spec = pvc.spec.unwrap_or_default();
    let status = pvc.status.unwrap_or_default();

    VolumeClaimInfo {
        name: pvc.metadata.name.unwrap_or_default(),
        namespace: pvc.metadata.namespace.unwrap_or_default(),
        phase: status.phase.unwrap_or_else(|| "Unknown".to_string()),
        storage_class: spec.storage_class_name,
        volume_name: spec.volume_name,
        access_modes: spec.access_modes.unwrap_or_default(),
        requested_bytes: spec
            .resources
            .as_ref()
            .and_then(|r| quantity(r.requests.as_ref(), "storage", parse_bytes)),
        capacity_bytes: quantity(status.capacity.as_ref(), "storage", parse_bytes),
    }
}

pub(crate) fn service_account_info(sa: ServiceAccount) -> ServiceAccountInfo {
    ServiceAccountInfo {
        name: sa.metadata.name.unwrap_or_default(),
        namespace: sa.metadata.namespace.unwrap_or_default(),
        created: sa.metadata.creation_timestamp.as_ref().map(|t| t.0),
    }
}

pub(crate) fn role_info(role: Role) -> RoleInfo {
    RoleInfo {
        name: role.metadata.name.unwrap_or_default(),
        namespace: role.metadata.namespace.unwrap_or_default(),
        rule_count: role.rules.map(|r| r.len()).unwrap_or(0),
        created: role.metadata.creation_timestamp.as_ref().map(|t| t.0),
    }
}

pub(crate) fn role_binding_info(binding: RoleBinding) -> RoleBindingInfo {
    RoleBindingInfo {
        name: binding.metadata.name.unwrap_or_default(),
        namespace: binding.metadata.namespace.unwrap_or_default(),
        role_kind: binding.role_ref.kind,
        role_name: binding.role_ref.name,
        subjects: binding
            .subjects
            .unwrap_or_default()
            .into_iter()
            .map(|s| format!("{}/{}", s.kind, s.name))
            .collect(),
    }
}

// ============================================================================
// Workloads & config resources
// ============================================================================

/// Metadata fields shared by every object
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub(crate) struct Meta {
    pub name: String,
    pub namespace: String,
    pub labels: BTreeMap<String, String>,
    pub creation_timestamp: Option<DateTime<Utc>>,
}

/// Any workload object; the seven kinds differ only in where the replica
/// counts live
#[derive(Debug, Deserialize)]
pub(crate) struct WorkloadObject {
    #[serde(default)]
    metadata: Meta,
    #[serde(default)]
    spec: Value,
    #[serde(default)]
    status: Value,
}

fn int_at(value: &Value, pointer: &str) -> Option<i32> {
    value.pointer(pointer)?.as_i64().map(|n| n as i32)
}

fn string_map_at(value: &Value, pointer: &str) -> BTreeMap<String, String> {
    value
        .pointer(pointer)
        .and_then(Value::as_object)
        .map(|map| {
            map.iter()
                .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                .collect()
        })
        .unwrap_or_default()
}

fn images_at(value: &Value, pointer: &str) -> Vec<String> {
    value
        .pointer(pointer)
        .and_then(Value::as_array)
        .map(|containers| {
            containers
                .iter()
                .filter_map(|c| c.get("image")?.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

pub(crate) fn workload_info(kind: WorkloadKind, object: WorkloadObject) -> WorkloadInfo {
    let WorkloadObject {
        metadata,
        spec,
        status,
    } = object;

    let mut info = WorkloadInfo::new(kind, metadata.name, metadata.namespace);
    info.labels = metadata.labels;
    info.created = metadata.creation_timestamp;

    match kind {
        WorkloadKind::DaemonSet => {
            info.desired = int_at(&status, "/desiredNumberScheduled").unwrap_or(0);
            info.ready = int_at(&status, "/numberReady").unwrap_or(0);
            info.available = int_at(&status, "/numberAvailable").unwrap_or(0);
        }
        WorkloadKind::Job => {
            info.desired = int_at(&spec, "/completions").unwrap_or(1);
            info.ready = int_at(&status, "/succeeded").unwrap_or(0);
            info.available = int_at(&status, "/active").unwrap_or(0);
        }
        WorkloadKind::CronJob => {
            let active = status
                .pointer("/active")
                .and_then(Value::as_array)
                .map(|a| a.len() as i32)
                .unwrap_or(0);
            info.ready = active;
            info.available = active;
            info.schedule = spec
                .pointer("/schedule")
                .and_then(Value::as_str)
                .map(str::to_string);
            info.suspended = spec
                .pointer("/suspend")
                .and_then(Value::as_bool)
                .unwrap_or(false);
        }
        _ => {
            info.desired = int_at(&spec, "/replicas")
                .or_else(|| int_at(&status, "/replicas"))
                .unwrap_or(0);
            info.ready = int_at(&status, "/readyReplicas").unwrap_or(0);
            info.available = int_at(&status, "/availableReplicas").unwrap_or(0);
        }
    }

    info.selector = match kind {
        WorkloadKind::ReplicationController => string_map_at(&spec, "/selector"),
        WorkloadKind::CronJob => {
            string_map_at(&spec, "/jobTemplate/spec/selector/matchLabels")
        }
        _ => string_map_at(&spec, "/selector/matchLabels"),
    };

    info.images = match kind {
        WorkloadKind::CronJob => images_at(&spec, "/jobTemplate/spec/template/spec/containers"),
        _ => images_at(&spec, "/template/spec/containers"),
    };

    info
}

/// Config maps, secrets, quotas and limit ranges
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ConfigObject {
    #[serde(default)]
    metadata: Meta,
    #[serde(default)]
    data: BTreeMap<String, Value>,
    #[serde(default)]
    binary_data: BTreeMap<String, Value>,
    #[serde(rename = "type")]
    secret_type: Option<String>,
    #[serde(default)]
    spec: Value,
}

pub(crate) fn config_info(kind: ConfigKind, object: ConfigObject) -> ConfigResourceInfo {
    let ConfigObject {
        metadata,
        data,
        binary_data,
        secret_type,
        spec,
    } = object;

    let mut keys: Vec<String> = match kind {
        ConfigKind::ConfigMap | ConfigKind::Secret => {
            data.into_keys().chain(binary_data.into_keys()).collect()
        }
        ConfigKind::ResourceQuota => spec
            .pointer("/hard")
            .and_then(Value::as_object)
            .map(|hard| hard.keys().cloned().collect())
            .unwrap_or_default(),
        ConfigKind::LimitRange => spec
            .pointer("/limits")
            .and_then(Value::as_array)
            .map(|limits| {
                limits
                    .iter()
                    .filter_map(|l| l.get("type")?.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default(),
    };
    keys.sort();
    keys.dedup();

    ConfigResourceInfo {
        kind,
        name: metadata.name,
        namespace: metadata.namespace,
        keys,
        secret_type: match kind {
            ConfigKind::Secret => secret_type,
            _ => None,
        },
        created: metadata.creation_timestamp,
    }
}

// ============================================================================
// Metrics API & kubelet stats
// ============================================================================

#[derive(Debug, Deserialize)]
pub(crate) struct ContainerMetrics {
    #[serde(default)]
    pub usage: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PodMetrics {
    #[serde(default)]
    pub metadata: Meta,
    #[serde(default)]
    pub containers: Vec<ContainerMetrics>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct NodeMetrics {
    #[serde(default)]
    pub metadata: Meta,
    #[serde(default)]
    pub usage: BTreeMap<String, String>,
}

fn usage_of(usage: &BTreeMap<String, String>) -> (Option<f64>, Option<f64>) {
    (
        usage.get("cpu").and_then(|q| parse_cpu(q)),
        usage.get("memory").and_then(|q| parse_bytes(q)),
    )
}

impl PodMetrics {
    /// Summed container usage; None when no container reported anything usable
    pub fn usage(&self) -> Option<ResourceUsage> {
        let mut total = ResourceUsage::default();
        let mut any = false;
        for container in &self.containers {
            let (cpu, memory) = usage_of(&container.usage);
            if let Some(cpu) = cpu {
                total.cpu_cores += cpu;
                any = true;
            }
            if let Some(memory) = memory {
                total.memory_bytes += memory;
                any = true;
            }
        }
        any.then_some(total)
    }
}

impl NodeMetrics {
    pub fn usage(&self) -> Option<ResourceUsage> {
        match usage_of(&self.usage) {
            (None, None) => None,
            (cpu, memory) => Some(ResourceUsage {
                cpu_cores: cpu.unwrap_or(0.0),
                memory_bytes: memory.unwrap_or(0.0),
            }),
        }
    }
}

/// The parts of the kubelet stats summary that end up in [`NodeStats`]
#[derive(Debug, Default, Deserialize)]
pub(crate) struct StatsSummary {
    #[serde(default)]
    node: SummaryNode,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SummaryNode {
    fs: Option<SummaryFs>,
    network: Option<SummaryNetwork>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct SummaryFs {
    used_bytes: Option<f64>,
    capacity_bytes: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct SummaryNetwork {
    rx_bytes: Option<f64>,
    tx_bytes: Option<f64>,
}

impl From<StatsSummary> for NodeStats {
    fn from(summary: StatsSummary) -> Self {
        let fs = summary.node.fs.unwrap_or_default();
        let network = summary.node.network.unwrap_or_default();
        NodeStats {
            fs_used_bytes: fs.used_bytes,
            fs_capacity_bytes: fs.capacity_bytes,
            network_rx_bytes: network.rx_bytes,
            network_tx_bytes: network.tx_bytes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_pod_info_merges_spec_and_status() {
        let pod: Pod = serde_json::from_value(json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": {"name": "web-0", "namespace": "apps", "labels": {"app": "web"}},
            "spec": {
                "nodeName": "node-a",
                "containers": [
                    {"name": "app", "image": "web:1.2",
                     "resources": {"requests": {"cpu": "250m", "memory": "128Mi"},
                                   "limits": {"cpu": "500m"}}},
                    {"name": "proxy", "image": "envoy:1.30",
                     "resources": {"requests": {"cpu": "100m"}}}
                ]
            },
            "status": {
                "phase": "Running",
                "podIP": "10.0.0.7",
                "containerStatuses": [
                    {"name": "app", "image": "web:1.2", "imageID": "", "ready": true,
                     "restartCount": 2, "state": {"running": {}}},
                    {"name": "proxy", "image": "envoy:1.30", "imageID": "", "ready": false,
                     "restartCount": 5, "state": {"waiting": {"reason": "CrashLoopBackOff"}}}
                ]
            }
        }))
        .unwrap();

        let info = pod_info(pod);
        assert_eq!(info.status, PodStatus::Running);
        assert_eq!(info.node_name.as_deref(), Some("node-a"));
        assert_eq!(info.restarts(), 7);
        assert_eq!(info.containers[1].state.as_deref(), Some("CrashLoopBackOff"));
        assert!((info.resources.cpu_request.unwrap() - 0.35).abs() < 1e-9);
        // proxy sets no CPU limit
        assert_eq!(info.resources.cpu_limit, None);
        assert_eq!(info.resources.memory_request, Some(128.0 * 1024.0 * 1024.0));
    }

    #[test]
    fn test_unlimited_container_leaves_pod_unlimited() {
        let pod: Pod = serde_json::from_value(json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": {"name": "api-0", "namespace": "apps"},
            "spec": {"containers": [
                {"name": "app", "resources": {"requests": {"memory": "1Gi"}}},
                {"name": "sidecar", "resources": {"limits": {"memory": "100Mi"}}}
            ]}
        }))
        .unwrap();
        let mut pods = vec![pod_info(pod)];
        assert_eq!(pods[0].resources.memory_limit, None);

        let metrics: Vec<PodMetrics> = serde_json::from_value(json!([
            {"metadata": {"name": "api-0"}, "containers": [{"usage": {"cpu": "10m", "memory": "522Mi"}}]}
        ]))
        .unwrap();
        crate::enrich::apply_pod_metrics(&mut pods, &metrics);

        let ratio = pods[0].memory_ratio.unwrap();
        assert!((ratio - 522.0 / 1024.0).abs() < 1e-9);
    }

    #[test]
    fn test_node_info_roles_and_allocatable() {
        let node: Node = serde_json::from_value(json!({
            "apiVersion": "v1",
            "kind": "Node",
            "metadata": {"name": "cp-1", "labels": {
                "node-role.kubernetes.io/control-plane": "",
                "kubernetes.io/os": "linux"
            }},
            "spec": {"unschedulable": true},
            "status": {
                "capacity": {"cpu": "4", "memory": "16Gi"},
                "allocatable": {"cpu": "3800m", "memory": "15Gi"},
                "conditions": [{"type": "Ready", "status": "True"}],
                "addresses": [{"type": "InternalIP", "address": "192.168.1.10"}]
            }
        }))
        .unwrap();

        let info = node_info(node);
        assert_eq!(info.roles, ["control-plane"]);
        assert!(info.ready);
        assert!(info.unschedulable);
        assert!((info.cpu_allocatable.unwrap() - 3.8).abs() < 1e-9);
        assert_eq!(info.memory_capacity, Some(16.0 * 1024.0 * 1024.0 * 1024.0));
        assert_eq!(info.internal_ip.as_deref(), Some("192.168.1.10"));
    }

    #[test]
    fn test_workload_shapes() {
        let daemon: WorkloadObject = serde_json::from_value(json!({
            "metadata": {"name": "fluent-bit", "namespace": "logging"},
            "spec": {"selector": {"matchLabels": {"app": "fluent-bit"}},
                     "template": {"spec": {"containers": [{"name": "fb", "image": "fluent-bit:3"}]}}},
            "status": {"desiredNumberScheduled": 3, "numberReady": 2, "numberAvailable": 2}
        }))
        .unwrap();
        let info = workload_info(WorkloadKind::DaemonSet, daemon);
        assert_eq!((info.desired, info.ready, info.available), (3, 2, 2));
        assert_eq!(info.images, ["fluent-bit:3"]);
        assert_eq!(info.selector["app"], "fluent-bit");

        let cron: WorkloadObject = serde_json::from_value(json!({
            "metadata": {"name": "backup", "namespace": "ops"},
            "spec": {"schedule": "0 3 * * *", "suspend": true,
                     "jobTemplate": {"spec": {"template": {"spec": {"containers": [{"image": "restic:0.16"}]}}}}},
            "status": {"active": [{"name": "backup-1"}]}
        }))
        .unwrap();
        let info = workload_info(WorkloadKind::CronJob, cron);
        assert_eq!(info.schedule.as_deref(), Some("0 3 * * *"));
        assert!(info.suspended);
        assert_eq!(info.ready, 1);
        assert_eq!(info.images, ["restic:0.16"]);

        let rc: WorkloadObject = serde_json::from_value(json!({
            "metadata": {"name": "legacy"},
            "spec": {"selector": {"app": "legacy"}},
            "status": {"replicas": 2, "readyReplicas": 1}
        }))
        .unwrap();
        let info = workload_info(WorkloadKind::ReplicationController, rc);
        assert_eq!(info.desired, 2);
        assert_eq!(info.selector["app"], "legacy");
    }

    #[test]
    fn test_config_keys() {
        let secret: ConfigObject = serde_json::from_value(json!({
            "metadata": {"name": "tls", "namespace": "apps"},
            "type": "kubernetes.io/tls",
            "data": {"tls.key": "…", "tls.crt": "…"}
        }))
        .unwrap();
        let info = config_info(ConfigKind::Secret, secret);
        assert_eq!(info.keys, ["tls.crt", "tls.key"]);
        assert_eq!(info.secret_type.as_deref(), Some("kubernetes.io/tls"));

        let quota: ConfigObject = serde_json::from_value(json!({
            "metadata": {"name": "compute"},
            "spec": {"hard": {"requests.cpu": "4", "pods": "20"}}
        }))
        .unwrap();
        let info = config_info(ConfigKind::ResourceQuota, quota);
        assert_eq!(info.keys, ["pods", "requests.cpu"]);
        assert_eq!(info.secret_type, None);
    }

    #[test]
    fn test_service_ports() {
        let svc: Service = serde_json::from_value(json!({
            "apiVersion": "v1",
            "kind": "Service",
            "metadata": {"name": "web", "namespace": "apps"},
            "spec": {"clusterIP": "10.96.0.10", "selector": {"app": "web"}, "ports": [
                {"port": 80, "targetPort": 80},
                {"port": 443, "targetPort": 8443, "protocol": "TCP"},
                {"port": 9000, "targetPort": "metrics", "protocol": "UDP"}
            ]}
        }))
        .unwrap();
        let info = service_info(svc);
        assert_eq!(info.service_type, "ClusterIP");
        assert_eq!(info.ports, ["80/TCP", "443:8443/TCP", "9000:metrics/UDP"]);
    }

    #[test]
    fn test_events_newest_first() {
        let event = |name: &str, ts: &str| -> EventInfo {
            let event: Event = serde_json::from_value(json!({
                "apiVersion": "v1",
                "kind": "Event",
                "metadata": {"name": format!("{name}.1")},
                "involvedObject": {"kind": "Pod", "name": name},
                "type": "Warning",
                "reason": "BackOff",
                "lastTimestamp": ts
            }))
            .unwrap();
            event_info(event)
        };

        let mut events = vec![
            event("b", "2024-05-01T10:00:00Z"),
            event("a", "2024-05-01T12:00:00Z"),
            event("c", "2024-05-01T12:00:00Z"),
        ];
        sort_events(&mut events);
        let names: Vec<&str> = events.iter().map(|e| e.object_name.as_str()).collect();
        assert_eq!(names, ["a", "c", "b"]);
        assert_eq!(events[0].event_type, EventType::Warning);
        assert_eq!(events[0].count, 1);
    }

    #[test]
    fn test_event_time_fallbacks() {
        let event: Event = serde_json::from_value(json!({
            "apiVersion": "v1",
            "kind": "Event",
            "metadata": {"name": "web-0.2", "creationTimestamp": "2024-05-01T09:00:00Z"},
            "involvedObject": {"kind": "Pod", "name": "web-0"},
            "eventTime": "2024-05-01T11:30:00.250000Z"
        }))
        .unwrap();
        let info = event_info(event);
        let expected: DateTime<Utc> = "2024-05-01T11:30:00.250Z".parse().unwrap();
        assert_eq!(info.last_seen, Some(expected));
        assert_eq!(info.event_type, EventType::Normal);
    }

    #[test]
    fn test_stats_summary() {
        let summary: StatsSummary = serde_json::from_value(json!({
            "node": {
                "nodeName": "node-a",
                "fs": {"usedBytes": 1024.0, "capacityBytes": 4096.0},
                "network": {"rxBytes": 10, "txBytes": 20}
            },
            "pods": []
        }))
        .unwrap();
        let stats = NodeStats::from(summary);
        assert_eq!(stats.fs_used_bytes, Some(1024.0));
        assert_eq!(stats.network_tx_bytes, Some(20.0));
    }

    #[test]
    fn test_pod_metrics_usage() {
        let metrics: PodMetrics = serde_json::from_value(json!({
            "metadata": {"name": "web-0", "namespace": "apps"},
            "containers": [
                {"name": "app", "usage": {"cpu": "120m", "memory": "64Mi"}},
                {"name": "proxy", "usage": {"cpu": "30000000n", "memory": "16Mi"}}
            ]
        }))
        .unwrap();
        let usage = metrics.usage().unwrap();
        assert!((usage.cpu_cores - 0.15).abs() < 1e-9);
        assert_eq!(usage.memory_bytes, 80.0 * 1024.0 * 1024.0);
    }
}
