//! Shared types for kubesnap
//!
//! Plain data produced by the aggregator: already merged, already sorted,
//! with raw quantities converted to numbers. Formatting for display is left
//! to whoever consumes these.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Anything listed in a snapshot, sorted by its name
pub trait Named {
    fn name(&self) -> &str;
}

/// Sort by name, ascending and case-insensitive
pub fn sort_by_name<T: Named>(items: &mut [T]) {
    items.sort_by_cached_key(|item| item.name().to_lowercase());
}

macro_rules! impl_named {
    ($($ty:ty),* $(,)?) => {
        $(impl Named for $ty {
            fn name(&self) -> &str {
                &self.name
            }
        })*
    };
}

impl_named!(
    ContextInfo,
    NamespaceInfo,
    WorkloadInfo,
    PodInfo,
    ContainerInfo,
    ServiceInfo,
    IngressInfo,
    VolumeClaimInfo,
    ServiceAccountInfo,
    RoleInfo,
    RoleBindingInfo,
    ConfigResourceInfo,
    NodeInfo,
    HelmRelease,
    SecretPermission,
);

// ============================================================================
// Contexts & Namespaces
// ============================================================================

/// Kubernetes context information
#[derive(Clone, Debug, Serialize)]
pub struct ContextInfo {
    /// Stable for the lifetime of the process
    pub id: Uuid,
    pub name: String,
    pub cluster: String,
    pub user: String,
    pub namespace: Option<String>,
    pub is_current: bool,
}

impl ContextInfo {
    pub fn new(
        name: String,
        cluster: String,
        user: String,
        namespace: Option<String>,
        is_current: bool,
    ) -> Self {
        Self {
            id: Uuid::nil(),
            name,
            cluster,
            user,
            namespace,
            is_current,
        }
    }
}

/// Namespace information
#[derive(Clone, Debug, Serialize)]
pub struct NamespaceInfo {
    pub name: String,
    pub status: String,
    pub labels: BTreeMap<String, String>,
    pub created: Option<DateTime<Utc>>,
}

impl NamespaceInfo {
    pub fn new(name: String, status: String) -> Self {
        Self {
            name,
            status,
            labels: BTreeMap::new(),
            created: None,
        }
    }
}

// ============================================================================
// Workloads
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum WorkloadKind {
    Deployment,
    StatefulSet,
    DaemonSet,
    ReplicaSet,
    Job,
    CronJob,
    ReplicationController,
}

impl WorkloadKind {
    pub const ALL: [WorkloadKind; 7] = [
        Self::Deployment,
        Self::StatefulSet,
        Self::DaemonSet,
        Self::ReplicaSet,
        Self::Job,
        Self::CronJob,
        Self::ReplicationController,
    ];

    /// Resource name as understood by kubectl
    pub fn resource(&self) -> &'static str {
        match self {
            Self::Deployment => "deployments",
            Self::StatefulSet => "statefulsets",
            Self::DaemonSet => "daemonsets",
            Self::ReplicaSet => "replicasets",
            Self::Job => "jobs",
            Self::CronJob => "cronjobs",
            Self::ReplicationController => "replicationcontrollers",
        }
    }
}

/// Any of the seven workload kinds, reduced to a common shape
#[derive(Clone, Debug, Serialize)]
pub struct WorkloadInfo {
    pub kind: WorkloadKind,
    pub name: String,
    pub namespace: String,
    /// Desired replicas, or scheduled pods for daemon sets, or completions for jobs
    pub desired: i32,
    pub ready: i32,
    pub available: i32,
    pub labels: BTreeMap<String, String>,
    pub selector: BTreeMap<String, String>,
    pub images: Vec<String>,
    /// Cron schedule, for cron jobs
    pub schedule: Option<String>,
    pub suspended: bool,
    pub created: Option<DateTime<Utc>>,
}

impl WorkloadInfo {
    pub fn new(kind: WorkloadKind, name: String, namespace: String) -> Self {
        Self {
            kind,
            name,
            namespace,
            desired: 0,
            ready: 0,
            available: 0,
            labels: BTreeMap::new(),
            selector: BTreeMap::new(),
            images: Vec::new(),
            schedule: None,
            suspended: false,
            created: None,
        }
    }
}

/// Workloads of a namespace, one list per kind
#[derive(Clone, Debug, Default, Serialize)]
pub struct WorkloadSet {
    pub deployments: Vec<WorkloadInfo>,
    pub stateful_sets: Vec<WorkloadInfo>,
    pub daemon_sets: Vec<WorkloadInfo>,
    pub replica_sets: Vec<WorkloadInfo>,
    pub jobs: Vec<WorkloadInfo>,
    pub cron_jobs: Vec<WorkloadInfo>,
    pub replication_controllers: Vec<WorkloadInfo>,
}

impl WorkloadSet {
    pub fn kind_mut(&mut self, kind: WorkloadKind) -> &mut Vec<WorkloadInfo> {
        match kind {
            WorkloadKind::Deployment => &mut self.deployments,
            WorkloadKind::StatefulSet => &mut self.stateful_sets,
            WorkloadKind::DaemonSet => &mut self.daemon_sets,
            WorkloadKind::ReplicaSet => &mut self.replica_sets,
            WorkloadKind::Job => &mut self.jobs,
            WorkloadKind::CronJob => &mut self.cron_jobs,
            WorkloadKind::ReplicationController => &mut self.replication_controllers,
        }
    }

    pub fn kind(&self, kind: WorkloadKind) -> &[WorkloadInfo] {
        match kind {
            WorkloadKind::Deployment => &self.deployments,
            WorkloadKind::StatefulSet => &self.stateful_sets,
            WorkloadKind::DaemonSet => &self.daemon_sets,
            WorkloadKind::ReplicaSet => &self.replica_sets,
            WorkloadKind::Job => &self.jobs,
            WorkloadKind::CronJob => &self.cron_jobs,
            WorkloadKind::ReplicationController => &self.replication_controllers,
        }
    }
}

// ============================================================================
// Pods
// ============================================================================

/// Pod information
#[derive(Clone, Debug, Serialize)]
pub struct PodInfo {
    pub name: String,
    pub namespace: String,
    pub status: PodStatus,
    pub containers: Vec<ContainerInfo>,
    pub node_name: Option<String>,
    pub pod_ip: Option<String>,
    pub labels: BTreeMap<String, String>,
    pub created: Option<DateTime<Utc>>,
    pub resources: ResourceBounds,
    /// Live usage from the metrics API, when available
    pub usage: Option<ResourceUsage>,
    pub cpu_ratio: Option<f64>,
    pub memory_ratio: Option<f64>,
}

impl PodInfo {
    pub fn new(name: String, namespace: String) -> Self {
        Self {
            name,
            namespace,
            status: PodStatus::Unknown,
            containers: Vec::new(),
            node_name: None,
            pod_ip: None,
            labels: BTreeMap::new(),
            created: None,
            resources: ResourceBounds::default(),
            usage: None,
            cpu_ratio: None,
            memory_ratio: None,
        }
    }

    pub fn restarts(&self) -> u32 {
        self.containers
            .iter()
            .map(|c| c.restart_count.max(0) as u32)
            .sum()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum PodStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

impl From<&str> for PodStatus {
    fn from(s: &str) -> Self {
        match s {
            "Pending" => Self::Pending,
            "Running" => Self::Running,
            "Succeeded" => Self::Succeeded,
            "Failed" => Self::Failed,
            _ => Self::Unknown,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct ContainerInfo {
    pub name: String,
    pub image: Option<String>,
    pub ready: bool,
    pub restart_count: i32,
    /// "running", "terminated", or the waiting reason (e.g. "CrashLoopBackOff")
    pub state: Option<String>,
    pub resources: ResourceBounds,
}

impl ContainerInfo {
    pub fn new(name: String) -> Self {
        Self {
            name,
            image: None,
            ready: false,
            restart_count: 0,
            state: None,
            resources: ResourceBounds::default(),
        }
    }
}

/// Requests and limits in cores and bytes
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct ResourceBounds {
    pub cpu_request: Option<f64>,
    pub cpu_limit: Option<f64>,
    pub memory_request: Option<f64>,
    pub memory_limit: Option<f64>,
}

impl ResourceBounds {
    /// Pod-level bounds from its containers. Requests sum over the containers
    /// that set one. A limit is only known when every container sets it; one
    /// unlimited container leaves the pod unlimited.
    pub fn total<'a, I>(containers: I) -> ResourceBounds
    where
        I: IntoIterator<Item = &'a ResourceBounds>,
    {
        fn request(a: Option<f64>, b: Option<f64>) -> Option<f64> {
            match (a, b) {
                (Some(a), Some(b)) => Some(a + b),
                (a, b) => a.or(b),
            }
        }

        fn limit(a: Option<f64>, b: Option<f64>) -> Option<f64> {
            Some(a? + b?)
        }

        let mut iter = containers.into_iter();
        let Some(first) = iter.next() else {
            return ResourceBounds::default();
        };
        iter.fold(*first, |acc, c| ResourceBounds {
            cpu_request: request(acc.cpu_request, c.cpu_request),
            cpu_limit: limit(acc.cpu_limit, c.cpu_limit),
            memory_request: request(acc.memory_request, c.memory_request),
            memory_limit: limit(acc.memory_limit, c.memory_limit),
        })
    }
}

/// Live CPU (cores) and memory (bytes) usage
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct ResourceUsage {
    pub cpu_cores: f64,
    pub memory_bytes: f64,
}

/// A pod together with the events that mention it
#[derive(Clone, Debug, Serialize)]
pub struct PodDetail {
    pub pod: PodInfo,
    pub events: Vec<EventInfo>,
}

// ============================================================================
// Events
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum EventType {
    Normal,
    Warning,
}

impl From<&str> for EventType {
    fn from(s: &str) -> Self {
        match s {
            "Warning" => Self::Warning,
            _ => Self::Normal,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct EventInfo {
    pub event_type: EventType,
    pub reason: String,
    pub message: String,
    pub object_kind: String,
    pub object_name: String,
    pub count: i32,
    pub last_seen: Option<DateTime<Utc>>,
}

// ============================================================================
// Networking
// ============================================================================

#[derive(Clone, Debug, Serialize)]
pub struct ServiceInfo {
    pub name: String,
    pub namespace: String,
    pub service_type: String,
    pub cluster_ip: Option<String>,
    /// "80/TCP", "443:8443/TCP"
    pub ports: Vec<String>,
    pub selector: BTreeMap<String, String>,
    /// Pods behind the service, filled in by enrichment
    pub target_pods: Vec<String>,
    /// Heuristic latency estimate, filled in by enrichment
    pub latency: Option<LatencyEstimate>,
}

/// Estimated (not measured) request latency of a service
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct LatencyEstimate {
    pub p50_secs: f64,
    pub p95_secs: f64,
    pub samples: usize,
}

#[derive(Clone, Debug, Serialize)]
pub struct IngressInfo {
    pub name: String,
    pub namespace: String,
    pub class: Option<String>,
    pub hosts: Vec<String>,
    /// Backend service names
    pub services: Vec<String>,
}

// ============================================================================
// Storage, RBAC & Config
// ============================================================================

#[derive(Clone, Debug, Serialize)]
pub struct VolumeClaimInfo {
    pub name: String,
    pub namespace: String,
    pub phase: String,
    pub storage_class: Option<String>,
    pub volume_name: Option<String>,
    pub access_modes: Vec<String>,
    pub requested_bytes: Option<f64>,
    pub capacity_bytes: Option<f64>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ServiceAccountInfo {
    pub name: String,
    pub namespace: String,
    pub created: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, Serialize)]
pub struct RoleInfo {
    pub name: String,
    pub namespace: String,
    pub rule_count: usize,
    pub created: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, Serialize)]
pub struct RoleBindingInfo {
    pub name: String,
    pub namespace: String,
    pub role_kind: String,
    pub role_name: String,
    /// "User/jane", "ServiceAccount/default"
    pub subjects: Vec<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum ConfigKind {
    ConfigMap,
    Secret,
    ResourceQuota,
    LimitRange,
}

impl ConfigKind {
    pub const ALL: [ConfigKind; 4] = [
        Self::ConfigMap,
        Self::Secret,
        Self::ResourceQuota,
        Self::LimitRange,
    ];

    pub fn resource(&self) -> &'static str {
        match self {
            Self::ConfigMap => "configmaps",
            Self::Secret => "secrets",
            Self::ResourceQuota => "resourcequotas",
            Self::LimitRange => "limitranges",
        }
    }
}

/// Config maps, secrets, quotas and limit ranges share this shape
#[derive(Clone, Debug, Serialize)]
pub struct ConfigResourceInfo {
    pub kind: ConfigKind,
    pub name: String,
    pub namespace: String,
    /// Data keys, or constrained resource names for quotas and limit ranges
    pub keys: Vec<String>,
    /// Secret type, e.g. "kubernetes.io/tls"
    pub secret_type: Option<String>,
    pub created: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct ConfigSet {
    pub config_maps: Vec<ConfigResourceInfo>,
    pub secrets: Vec<ConfigResourceInfo>,
    pub resource_quotas: Vec<ConfigResourceInfo>,
    pub limit_ranges: Vec<ConfigResourceInfo>,
}

impl ConfigSet {
    pub fn kind_mut(&mut self, kind: ConfigKind) -> &mut Vec<ConfigResourceInfo> {
        match kind {
            ConfigKind::ConfigMap => &mut self.config_maps,
            ConfigKind::Secret => &mut self.secrets,
            ConfigKind::ResourceQuota => &mut self.resource_quotas,
            ConfigKind::LimitRange => &mut self.limit_ranges,
        }
    }
}

/// Whether the current user may read a secret
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SecretPermission {
    pub name: String,
    pub namespace: String,
    pub can_read: bool,
}

// ============================================================================
// Nodes
// ============================================================================

#[derive(Clone, Debug, Serialize)]
pub struct NodeInfo {
    pub name: String,
    pub ready: bool,
    pub unschedulable: bool,
    pub roles: Vec<String>,
    pub kubelet_version: Option<String>,
    pub os_image: Option<String>,
    pub internal_ip: Option<String>,
    pub created: Option<DateTime<Utc>>,
    pub cpu_capacity: Option<f64>,
    pub cpu_allocatable: Option<f64>,
    pub memory_capacity: Option<f64>,
    pub memory_allocatable: Option<f64>,
    pub pod_count: usize,
    /// Sum of the requests of pods scheduled here
    pub cpu_requested: Option<f64>,
    pub memory_requested: Option<f64>,
    pub usage: Option<ResourceUsage>,
    pub cpu_ratio: Option<f64>,
    pub memory_ratio: Option<f64>,
    pub stats: Option<NodeStats>,
}

impl NodeInfo {
    pub fn new(name: String) -> Self {
        Self {
            name,
            ready: false,
            unschedulable: false,
            roles: Vec::new(),
            kubelet_version: None,
            os_image: None,
            internal_ip: None,
            created: None,
            cpu_capacity: None,
            cpu_allocatable: None,
            memory_capacity: None,
            memory_allocatable: None,
            pod_count: 0,
            cpu_requested: None,
            memory_requested: None,
            usage: None,
            cpu_ratio: None,
            memory_ratio: None,
            stats: None,
        }
    }
}

/// Filesystem and network counters reported by the kubelet
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct NodeStats {
    pub fs_used_bytes: Option<f64>,
    pub fs_capacity_bytes: Option<f64>,
    pub network_rx_bytes: Option<f64>,
    pub network_tx_bytes: Option<f64>,
}

// ============================================================================
// Helm
// ============================================================================

/// A release as reported by `helm list -o json`
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct HelmRelease {
    pub name: String,
    pub namespace: String,
    #[serde(default)]
    pub revision: String,
    #[serde(default)]
    pub updated: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub chart: String,
    #[serde(default)]
    pub app_version: String,
}

// ============================================================================
// Snapshots
// ============================================================================

/// Everything in one namespace
#[derive(Clone, Debug, Default, Serialize)]
pub struct NamespaceSnapshot {
    pub context: String,
    pub namespace: String,
    pub workloads: WorkloadSet,
    pub pods: Vec<PodInfo>,
    pub events: Vec<EventInfo>,
    pub config: ConfigSet,
    pub services: Vec<ServiceInfo>,
    pub ingresses: Vec<IngressInfo>,
    pub volume_claims: Vec<VolumeClaimInfo>,
    pub service_accounts: Vec<ServiceAccountInfo>,
    pub roles: Vec<RoleInfo>,
    pub role_bindings: Vec<RoleBindingInfo>,
}

/// Cluster-level overview of one context
#[derive(Clone, Debug, Serialize)]
pub struct ClusterSnapshot {
    pub context: String,
    pub context_id: Uuid,
    pub namespaces: Vec<NamespaceInfo>,
    pub nodes: Vec<NodeInfo>,
    pub releases: Vec<HelmRelease>,
}
