//! Pure enrichment applied after every sub-query of a snapshot has resolved

use std::collections::HashMap;

use kubesnap_metrics::{
    event_latency_secs, mean_pressure, percentile, pod_latency_secs, sorted_samples, usage_ratio,
};
use kubesnap_types::{
    EventInfo, EventType, LatencyEstimate, NodeInfo, NodeStats, PodInfo, PodStatus, ServiceInfo,
};

use crate::convert::{NodeMetrics, PodMetrics};

// ============================================================================
// Pods
// ============================================================================

/// Attach live usage and usage ratios to pods reported by the metrics API
pub(crate) fn apply_pod_metrics(pods: &mut [PodInfo], metrics: &[PodMetrics]) {
    let usage: HashMap<&str, _> = metrics
        .iter()
        .filter_map(|m| Some((m.metadata.name.as_str(), m.usage()?)))
        .collect();

    for pod in pods {
        let Some(usage) = usage.get(pod.name.as_str()).copied() else {
            continue;
        };
        pod.cpu_ratio = usage_ratio(
            usage.cpu_cores,
            pod.resources.cpu_request,
            pod.resources.cpu_limit,
        );
        pod.memory_ratio = usage_ratio(
            usage.memory_bytes,
            pod.resources.memory_request,
            pod.resources.memory_limit,
        );
        pod.usage = Some(usage);
    }
}

/// Events whose involved object is the pod
pub(crate) fn events_for_pod<'a>(
    events: &'a [EventInfo],
    pod: &'a str,
) -> impl Iterator<Item = &'a EventInfo> + 'a {
    events
        .iter()
        .filter(move |e| e.object_kind == "Pod" && e.object_name == pod)
}

// ============================================================================
// Services
// ============================================================================

fn selector_matches(selector: &std::collections::BTreeMap<String, String>, pod: &PodInfo) -> bool {
    !selector.is_empty()
        && selector
            .iter()
            .all(|(k, v)| pod.labels.get(k).is_some_and(|label| label == v))
}

/// Fill in each service's target pods from its endpoints, falling back to
/// matching the selector against pod labels
pub(crate) fn attach_targets(
    services: &mut [ServiceInfo],
    endpoints: &HashMap<String, Vec<String>>,
    pods: &[PodInfo],
) {
    for service in services {
        let mut targets = match endpoints.get(&service.name) {
            Some(targets) if !targets.is_empty() => targets.clone(),
            _ => pods
                .iter()
                .filter(|pod| selector_matches(&service.selector, pod))
                .map(|pod| pod.name.clone())
                .collect(),
        };
        targets.sort();
        targets.dedup();
        service.target_pods = targets;
    }
}

/// Heuristic latency for one service from its pods and the namespace events
pub(crate) fn estimate_latency(
    service: &ServiceInfo,
    pods: &[PodInfo],
    events: &[EventInfo],
) -> Option<LatencyEstimate> {
    let pod_samples = pods
        .iter()
        .filter(|pod| service.target_pods.contains(&pod.name))
        .filter_map(|pod| {
            let pressure = mean_pressure(&[pod.cpu_ratio, pod.memory_ratio])?;
            let warnings = events_for_pod(events, &pod.name)
                .filter(|e| e.event_type == EventType::Warning)
                .count() as u32;
            Some(pod_latency_secs(pressure, warnings, pod.restarts()))
        });
    let event_samples = events
        .iter()
        .filter_map(|e| event_latency_secs(&e.message, &service.name));

    let samples = sorted_samples(pod_samples.chain(event_samples).collect());
    Some(LatencyEstimate {
        p50_secs: percentile(&samples, 0.5)?,
        p95_secs: percentile(&samples, 0.95)?,
        samples: samples.len(),
    })
}

pub(crate) fn apply_latency(services: &mut [ServiceInfo], pods: &[PodInfo], events: &[EventInfo]) {
    for service in services {
        service.latency = estimate_latency(service, pods, events);
    }
}

// ============================================================================
// Nodes
// ============================================================================

fn sum_known(values: impl Iterator<Item = Option<f64>>) -> Option<f64> {
    values.flatten().fold(None, |acc, v| Some(acc.unwrap_or(0.0) + v))
}

/// Pod counts and summed requests of the pods still occupying each node
pub(crate) fn apply_allocation(nodes: &mut [NodeInfo], pods: &[PodInfo]) {
    let mut by_node: HashMap<&str, Vec<&PodInfo>> = HashMap::new();
    for pod in pods {
        if matches!(pod.status, PodStatus::Succeeded | PodStatus::Failed) {
            continue;
        }
        if let Some(node) = pod.node_name.as_deref() {
            by_node.entry(node).or_default().push(pod);
        }
    }

    for node in nodes {
        let scheduled = by_node.get(node.name.as_str()).map(Vec::as_slice).unwrap_or(&[]);
        node.pod_count = scheduled.len();
        node.cpu_requested = sum_known(scheduled.iter().map(|p| p.resources.cpu_request));
        node.memory_requested = sum_known(scheduled.iter().map(|p| p.resources.memory_request));
    }
}

/// Attach live usage and usage against allocatable capacity
pub(crate) fn apply_node_metrics(nodes: &mut [NodeInfo], metrics: &[NodeMetrics]) {
    let usage: HashMap<&str, _> = metrics
        .iter()
        .filter_map(|m| Some((m.metadata.name.as_str(), m.usage()?)))
        .collect();

    for node in nodes {
        let Some(usage) = usage.get(node.name.as_str()).copied() else {
            continue;
        };
        node.cpu_ratio = usage_ratio(usage.cpu_cores, None, node.cpu_allocatable);
        node.memory_ratio = usage_ratio(usage.memory_bytes, None, node.memory_allocatable);
        node.usage = Some(usage);
    }
}

pub(crate) fn apply_node_stats(nodes: &mut [NodeInfo], stats: &HashMap<String, NodeStats>) {
    for node in nodes {
        node.stats = stats.get(&node.name).copied();
    }
}
