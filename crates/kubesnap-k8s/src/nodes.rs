//! Node inventory and per-node kubelet statistics

use std::collections::HashMap;

use futures::future::join_all;
use k8s_openapi::api::core::v1::Pod;
use tracing::warn;

use kubesnap_exec::ExecError;
use kubesnap_types::{NodeInfo, NodeStats};

use crate::cache::TtlCache;
use crate::client::{KubeClient, degrade};
use crate::convert::{self, NodeMetrics, StatsSummary};
use crate::enrich;

/// Node statistics are cached per (context, node)
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct NodeKey {
    pub context: String,
    pub node: String,
}

impl NodeKey {
    pub fn new(context: &str, node: &str) -> Self {
        Self {
            context: context.to_string(),
            node: node.to_string(),
        }
    }
}

pub(crate) type NodeStatsCache = TtlCache<NodeKey, NodeStats>;

impl KubeClient {
    /// Nodes with allocation, live usage and kubelet statistics.
    ///
    /// The node list is required. Pods, node metrics and statistics are
    /// optional and leave their fields empty when unavailable.
    pub async fn node_inventory(&self, context: &str) -> Result<Vec<NodeInfo>, ExecError> {
        let (nodes, pods, metrics) = tokio::join!(
            self.nodes(context),
            degrade(
                "pods",
                self.list_sorted(context, "pods", None, |p: Pod| convert::pod_info(p)),
            ),
            degrade("node metrics", self.node_metrics(context)),
        );
        self.check_cancelled()?;
        let mut nodes = nodes?;

        let names: Vec<String> = nodes.iter().map(|n| n.name.clone()).collect();
        let stats = self.node_stats(context, &names).await;
        self.check_cancelled()?;

        enrich::apply_allocation(&mut nodes, &pods);
        enrich::apply_node_metrics(&mut nodes, &metrics);
        enrich::apply_node_stats(&mut nodes, &stats);
        Ok(nodes)
    }

    async fn node_metrics(&self, context: &str) -> Result<Vec<NodeMetrics>, ExecError> {
        self.raw(context, "/apis/metrics.k8s.io/v1beta1/nodes", "/items")
            .await
    }

    async fn node_summary(&self, key: &NodeKey) -> Result<NodeStats, ExecError> {
        let path = format!("/api/v1/nodes/{}/proxy/stats/summary", key.node);
        let summary: StatsSummary = self.raw(&key.context, &path, "").await?;
        Ok(summary.into())
    }

    /// Cache fetcher: one summary per node, concurrently. Failed nodes are
    /// left out and retried on the next lookup.
    pub(crate) async fn fetch_node_stats(
        &self,
        keys: Vec<NodeKey>,
    ) -> HashMap<NodeKey, NodeStats> {
        let results = join_all(keys.into_iter().map(|key| async move {
            let result = self.node_summary(&key).await;
            (key, result)
        }))
        .await;

        results
            .into_iter()
            .filter_map(|(key, result)| match result {
                Ok(stats) => Some((key, stats)),
                Err(err) => {
                    warn!(node = %key.node, error = %err, "node statistics unavailable");
                    None
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use kubesnap_exec::ExecError;

    use crate::cache::ManualClock;
    use crate::testing::{ScriptedRunner, client_with_clock};

    const NODES: &str = r#"{"items":[
        {"apiVersion":"v1","kind":"Node","metadata":{"name":"node-b"},
         "status":{"allocatable":{"cpu":"2","memory":"4Gi"},"conditions":[{"type":"Ready","status":"True"}]}},
        {"apiVersion":"v1","kind":"Node","metadata":{"name":"node-a"},
         "status":{"allocatable":{"cpu":"4","memory":"8Gi"},"conditions":[{"type":"Ready","status":"False"}]}}
    ]}"#;

    const PODS: &str = r#"{"items":[
        {"apiVersion":"v1","kind":"Pod","metadata":{"name":"web-0","namespace":"apps"},
         "spec":{"nodeName":"node-a","containers":[{"name":"app","resources":{"requests":{"cpu":"500m"}}}]},
         "status":{"phase":"Running"}},
        {"apiVersion":"v1","kind":"Pod","metadata":{"name":"dns-0","namespace":"kube-system"},
         "spec":{"nodeName":"node-a","containers":[{"name":"dns","resources":{"requests":{"cpu":"100m","memory":"70Mi"}}}]},
         "status":{"phase":"Running"}}
    ]}"#;

    const NODE_METRICS: &str = r#"{"items":[
        {"metadata":{"name":"node-a"},"usage":{"cpu":"1","memory":"2Gi"}}
    ]}"#;

    const SUMMARY: &str = r#"{"node":{"nodeName":"node-a",
        "fs":{"usedBytes":2048,"capacityBytes":8192},
        "network":{"rxBytes":100,"txBytes":200}}}"#;

    fn scripted() -> ScriptedRunner {
        ScriptedRunner::new()
            .respond("get nodes", NODES)
            .respond("get pods", PODS)
            .respond("metrics.k8s.io/v1beta1/nodes", NODE_METRICS)
            .respond("/api/v1/nodes/node-a/proxy/stats/summary", SUMMARY)
            .fail(
                "/api/v1/nodes/node-b/proxy/stats/summary",
                ExecError::failed("kubelet unreachable"),
            )
    }

    #[tokio::test]
    async fn test_node_inventory() {
        let clock = Arc::new(ManualClock::new());
        let client = client_with_clock(scripted(), clock);

        let nodes = client.node_inventory("dev").await.unwrap();
        let names: Vec<&str> = nodes.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, ["node-a", "node-b"]);

        let a = &nodes[0];
        assert!(!a.ready);
        assert_eq!(a.pod_count, 2);
        assert!((a.cpu_requested.unwrap() - 0.6).abs() < 1e-9);
        assert_eq!(a.memory_requested, Some(70.0 * 1024.0 * 1024.0));
        assert_eq!(a.cpu_ratio, Some(0.25));
        assert_eq!(a.memory_ratio, Some(0.25));
        assert_eq!(a.stats.unwrap().fs_used_bytes, Some(2048.0));

        let b = &nodes[1];
        assert_eq!(b.pod_count, 0);
        assert!(b.usage.is_none());
        assert!(b.stats.is_none());
    }

    #[tokio::test]
    async fn test_node_stats_are_cached() {
        let clock = Arc::new(ManualClock::new());
        let runner = scripted();
        let client = client_with_clock(runner.clone(), clock.clone());
        let summaries = |runner: &ScriptedRunner| {
            runner
                .calls()
                .iter()
                .filter(|args| args.iter().any(|a| a.ends_with("/stats/summary")))
                .count()
        };

        client.node_inventory("dev").await.unwrap();
        assert_eq!(summaries(&runner), 2);

        // node-a is cached; only the failed node-b is asked again
        clock.advance(Duration::from_secs(2));
        client.node_inventory("dev").await.unwrap();
        assert_eq!(summaries(&runner), 3);

        clock.advance(Duration::from_secs(5));
        client.node_inventory("dev").await.unwrap();
        assert_eq!(summaries(&runner), 5);
    }

    #[tokio::test]
    async fn test_node_inventory_requires_node_list() {
        let runner = ScriptedRunner::new()
            .fail("get nodes", ExecError::failed("nodes is forbidden"))
            .respond("get pods", PODS);
        let client = client_with_clock(runner, Arc::new(ManualClock::new()));

        let err = client.node_inventory("dev").await.unwrap_err();
        assert_eq!(err.message(), "nodes is forbidden");
    }
}
