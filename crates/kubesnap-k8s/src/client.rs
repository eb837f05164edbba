//! kubectl and helm client for kubesnap

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use k8s_openapi::api::core::v1::Namespace;
use kube::config::Kubeconfig;
use serde::de::DeserializeOwned;
use tracing::warn;

use kubesnap_exec::{
    CancellationToken, CommandRunner, ExecError, Invocation, ProcessRunner, Tool, decode_at,
    run_json,
};
use kubesnap_types::{
    ClusterSnapshot, ContextInfo, HelmRelease, Named, NamespaceInfo, NodeInfo, SecretPermission,
    sort_by_name,
};

use crate::cache::{Clock, SystemClock, TtlCache};
use crate::config::ClientConfig;
use crate::convert;
use crate::ids::ContextIds;
use crate::nodes::{NodeKey, NodeStatsCache};
use crate::permissions::{PermissionCache, SecretKey};

/// Turn a failed optional sub-query into an empty result, logging why
pub(crate) async fn degrade<T, F>(label: &str, query: F) -> T
where
    T: Default,
    F: Future<Output = Result<T, ExecError>>,
{
    match query.await {
        Ok(value) => value,
        Err(err) => {
            warn!(query = label, error = %err, "sub-query failed, leaving it empty");
            T::default()
        }
    }
}

/// Kubernetes client built on the kubectl and helm command-line tools
pub struct KubeClient {
    runner: Arc<dyn CommandRunner>,
    kubectl: Tool,
    helm: Tool,
    kubeconfig: Option<PathBuf>,
    request_timeout: Duration,
    cancel: CancellationToken,
    ids: ContextIds,
    stats_cache: NodeStatsCache,
    permission_cache: PermissionCache,
}

impl KubeClient {
    /// Create a client that runs real subprocesses
    pub fn new(config: &ClientConfig) -> Self {
        let policy = config.retry.policy();
        let kubectl = Tool::resolve(&config.kubectl, &config.search_paths);
        let helm = Tool::resolve(&config.helm, &config.search_paths);

        Self::from_parts(
            config,
            Arc::new(ProcessRunner::new(policy)),
            kubectl,
            helm,
            Arc::new(SystemClock),
        )
    }

    /// Create a client from explicit parts
    pub fn from_parts(
        config: &ClientConfig,
        runner: Arc<dyn CommandRunner>,
        kubectl: Tool,
        helm: Tool,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            runner,
            kubectl,
            helm,
            kubeconfig: config.kubeconfig.clone(),
            request_timeout: config.retry.policy().timeout,
            cancel: CancellationToken::new(),
            ids: ContextIds::new(),
            stats_cache: TtlCache::new(config.cache.node_stats_ttl(), Arc::clone(&clock)),
            permission_cache: TtlCache::new(config.cache.permission_ttl(), clock),
        }
    }

    /// Token that cancels every in-flight and future command of this client
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Stable identifier for a context name
    pub fn context_id(&self, context: &str) -> uuid::Uuid {
        self.ids.id_for(context)
    }

    /// Drop cached node statistics and secret permissions
    pub fn invalidate_caches(&self) {
        self.stats_cache.invalidate();
        self.permission_cache.invalidate();
    }

    // ========================================================================
    // Command plumbing
    // ========================================================================

    fn with_env(&self, invocation: Invocation) -> Invocation {
        match &self.kubeconfig {
            Some(path) => invocation.env("KUBECONFIG", path.display().to_string()),
            None => invocation,
        }
    }

    pub(crate) fn kubectl<I, S>(&self, args: I) -> Result<Invocation, ExecError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Ok(self.with_env(self.kubectl.invocation(args)?))
    }

    fn helm<I, S>(&self, args: I) -> Result<Invocation, ExecError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Ok(self.with_env(self.helm.invocation(args)?))
    }

    pub(crate) fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    pub(crate) fn request_timeout_arg(&self) -> String {
        format!("--request-timeout={}s", self.request_timeout.as_secs().max(1))
    }

    /// `--context CTX get RESOURCE (-n NS | --all-namespaces) -o json`
    fn get_args(&self, context: &str, resource: &str, namespace: Option<&str>) -> Vec<String> {
        let mut args = vec![
            "--context".to_string(),
            context.to_string(),
            "get".to_string(),
            resource.to_string(),
        ];
        match namespace {
            Some(ns) => args.extend(["-n".to_string(), ns.to_string()]),
            None => args.push("--all-namespaces".to_string()),
        }
        args.extend(["-o".to_string(), "json".to_string(), self.request_timeout_arg()]);
        args
    }

    pub(crate) async fn run(&self, invocation: Invocation) -> Result<Vec<u8>, ExecError> {
        self.runner.run(&invocation, &self.cancel).await
    }

    /// Fail with the cancelled error if the client was cancelled
    pub(crate) fn check_cancelled(&self) -> Result<(), ExecError> {
        if self.cancel.is_cancelled() {
            Err(ExecError::Cancelled { output: None })
        } else {
            Ok(())
        }
    }

    /// Fetch a resource list and decode its items
    pub(crate) async fn list<T: DeserializeOwned>(
        &self,
        context: &str,
        resource: &str,
        namespace: Option<&str>,
    ) -> Result<Vec<T>, ExecError> {
        let invocation = self.kubectl(self.get_args(context, resource, namespace))?;
        let stdout = self.run(invocation).await?;
        decode_at(&stdout, "/items")
    }

    /// Fetch a resource list, convert each item and sort by name
    pub(crate) async fn list_sorted<T, U, F>(
        &self,
        context: &str,
        resource: &str,
        namespace: Option<&str>,
        convert: F,
    ) -> Result<Vec<U>, ExecError>
    where
        T: DeserializeOwned,
        U: Named,
        F: Fn(T) -> U,
    {
        let items: Vec<T> = self.list(context, resource, namespace).await?;
        let mut converted: Vec<U> = items.into_iter().map(convert).collect();
        sort_by_name(&mut converted);
        Ok(converted)
    }

    /// GET a raw API path through kubectl and decode the value at `pointer`
    /// ("" for the whole document)
    pub(crate) async fn raw<T: DeserializeOwned>(
        &self,
        context: &str,
        path: &str,
        pointer: &str,
    ) -> Result<T, ExecError> {
        let invocation = self.kubectl([
            "--context".to_string(),
            context.to_string(),
            "get".to_string(),
            "--raw".to_string(),
            path.to_string(),
            self.request_timeout_arg(),
        ])?;
        let stdout = self.run(invocation).await?;
        decode_at(&stdout, pointer)
    }

    // ========================================================================
    // Contexts, namespaces, releases
    // ========================================================================

    /// Get all available contexts from the kubeconfig kubectl sees
    pub async fn contexts(&self) -> Result<Vec<ContextInfo>, ExecError> {
        let invocation = self.kubectl(["config", "view", "-o", "json"])?;
        let kubeconfig: Kubeconfig =
            run_json(self.runner.as_ref(), &invocation, &self.cancel).await?;

        let mut contexts: Vec<ContextInfo> = kubeconfig
            .contexts
            .iter()
            .map(|ctx| {
                let context = ctx.context.as_ref();
                let mut info = ContextInfo::new(
                    ctx.name.clone(),
                    context.map(|c| c.cluster.clone()).unwrap_or_default(),
                    context.and_then(|c| c.user.clone()).unwrap_or_default(),
                    context.and_then(|c| c.namespace.clone()),
                    Some(&ctx.name) == kubeconfig.current_context.as_ref(),
                );
                info.id = self.ids.id_for(&ctx.name);
                info
            })
            .collect();

        sort_by_name(&mut contexts);
        Ok(contexts)
    }

    /// Fetch all namespaces from the cluster
    pub async fn namespaces(&self, context: &str) -> Result<Vec<NamespaceInfo>, ExecError> {
        self.list_sorted(context, "namespaces", None, |ns: Namespace| {
            convert::namespace_info(ns)
        })
        .await
    }

    /// Fetch helm releases across all namespaces
    pub async fn helm_releases(&self, context: &str) -> Result<Vec<HelmRelease>, ExecError> {
        let invocation = self.helm([
            "list",
            "--kube-context",
            context,
            "--all-namespaces",
            "-o",
            "json",
        ])?;
        let mut releases: Vec<HelmRelease> =
            run_json(self.runner.as_ref(), &invocation, &self.cancel).await?;
        sort_by_name(&mut releases);
        Ok(releases)
    }

    /// Namespaces, nodes and helm releases of one context. Only the namespace
    /// list is required; the rest degrade to empty.
    pub async fn cluster_snapshot(&self, context: &str) -> Result<ClusterSnapshot, ExecError> {
        let (namespaces, nodes, releases) = tokio::join!(
            self.namespaces(context),
            degrade("nodes", self.nodes(context)),
            degrade("helm releases", self.helm_releases(context)),
        );
        self.check_cancelled()?;

        Ok(ClusterSnapshot {
            context: context.to_string(),
            context_id: self.ids.id_for(context),
            namespaces: namespaces?,
            nodes,
            releases,
        })
    }

    /// Fetch the node list without usage or statistics
    pub async fn nodes(&self, context: &str) -> Result<Vec<NodeInfo>, ExecError> {
        self.list_sorted(context, "nodes", None, convert::node_info)
            .await
    }

    /// Whether the current user may read each of the given secrets.
    ///
    /// Answers come from the permission cache where possible. Secrets whose
    /// check failed are left out of the result.
    pub async fn secret_permissions(
        &self,
        context: &str,
        namespace: &str,
        secrets: &[String],
    ) -> Result<Vec<SecretPermission>, ExecError> {
        let keys: Vec<SecretKey> = secrets
            .iter()
            .map(|name| SecretKey::new(context, namespace, name))
            .collect();

        let answers = self
            .permission_cache
            .lookup(&keys, |missing| self.fetch_permissions(missing))
            .await;
        self.check_cancelled()?;

        let mut permissions: Vec<SecretPermission> = answers
            .into_iter()
            .map(|(key, can_read)| SecretPermission {
                name: key.name,
                namespace: key.namespace,
                can_read,
            })
            .collect();
        sort_by_name(&mut permissions);
        Ok(permissions)
    }

    /// Statistics for the given nodes, from the node statistics cache
    pub async fn node_stats(
        &self,
        context: &str,
        nodes: &[String],
    ) -> std::collections::HashMap<String, kubesnap_types::NodeStats> {
        let keys: Vec<NodeKey> = nodes.iter().map(|n| NodeKey::new(context, n)).collect();
        self.stats_cache
            .lookup(&keys, |missing| self.fetch_node_stats(missing))
            .await
            .into_iter()
            .map(|(key, stats)| (key.node, stats))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedRunner, client_with};

    const KUBECONFIG: &str = r#"{
        "kind": "Config",
        "apiVersion": "v1",
        "current-context": "dev",
        "clusters": [],
        "users": [],
        "contexts": [
            {"name": "staging", "context": {"cluster": "stage", "user": "ci"}},
            {"name": "dev", "context": {"cluster": "dev-cluster", "user": "dev-user", "namespace": "apps"}},
            {"name": "Prod", "context": {"cluster": "prod", "user": "admin"}}
        ]
    }"#;

    #[tokio::test]
    async fn test_contexts_sorted_with_stable_ids() {
        let runner = ScriptedRunner::new().respond("config view", KUBECONFIG);
        let client = client_with(runner);

        let contexts = client.contexts().await.unwrap();
        let names: Vec<&str> = contexts.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["dev", "Prod", "staging"]);

        let dev = &contexts[0];
        assert!(dev.is_current);
        assert_eq!(dev.cluster, "dev-cluster");
        assert_eq!(dev.namespace.as_deref(), Some("apps"));

        let again = client.contexts().await.unwrap();
        assert_eq!(again[0].id, dev.id);
        assert_eq!(client.context_id("dev"), dev.id);
    }

    #[tokio::test]
    async fn test_get_args_shape() {
        let runner = ScriptedRunner::new().respond(
            "get namespaces",
            r#"{"items":[{"apiVersion":"v1","kind":"Namespace","metadata":{"name":"default"},"status":{"phase":"Active"}}]}"#,
        );
        let client = client_with(runner.clone());

        let namespaces = client.namespaces("dev").await.unwrap();
        assert_eq!(namespaces[0].status, "Active");

        let calls = runner.calls();
        assert_eq!(
            calls[0],
            [
                "--context",
                "dev",
                "get",
                "namespaces",
                "--all-namespaces",
                "-o",
                "json",
                "--request-timeout=20s"
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_helm_is_not_found() {
        let runner = ScriptedRunner::new();
        let client = crate::testing::client_with_tools(
            runner.clone(),
            Tool::at("kubectl", "/usr/bin/kubectl"),
            Tool::missing("helm"),
        );

        let err = client.helm_releases("dev").await.unwrap_err();
        assert!(matches!(err, ExecError::NotFound { .. }));
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_cluster_snapshot_degrades_optional_parts() {
        let runner = ScriptedRunner::new()
            .respond(
                "get namespaces",
                r#"{"items":[
                    {"apiVersion":"v1","kind":"Namespace","metadata":{"name":"kube-system"},"status":{"phase":"Active"}},
                    {"apiVersion":"v1","kind":"Namespace","metadata":{"name":"apps"},"status":{"phase":"Active"}}
                ]}"#,
            )
            .fail("get nodes", ExecError::failed("nodes is forbidden"))
            .respond(
                "list --kube-context",
                r#"[{"name":"ingress","namespace":"infra","revision":"2","status":"deployed","chart":"ingress-nginx-4.9.0","app_version":"1.9.5","updated":""}]"#,
            );
        let client = client_with(runner);

        let snapshot = client.cluster_snapshot("dev").await.unwrap();
        assert_eq!(snapshot.namespaces[0].name, "apps");
        assert!(snapshot.nodes.is_empty());
        assert_eq!(snapshot.releases.len(), 1);
        assert_eq!(snapshot.context_id, client.context_id("dev"));
    }

    #[tokio::test]
    async fn test_cluster_snapshot_fails_without_namespaces() {
        let runner = ScriptedRunner::new()
            .fail("get namespaces", ExecError::failed("Unable to connect to the server"))
            .respond("get nodes", r#"{"items":[]}"#)
            .respond("list --kube-context", "[]");
        let client = client_with(runner);

        let err = client.cluster_snapshot("dev").await.unwrap_err();
        assert_eq!(err.message(), "Unable to connect to the server");
    }

    #[tokio::test]
    async fn test_kubeconfig_override_is_exported() {
        let runner = ScriptedRunner::new().respond("config view", KUBECONFIG);
        let config = ClientConfig {
            kubeconfig: Some(PathBuf::from("/tmp/kubeconfig")),
            ..ClientConfig::default()
        };
        let client = crate::testing::client_with_config(runner.clone(), &config);

        client.contexts().await.unwrap();
        let envs = runner.envs();
        assert_eq!(
            envs[0].get("KUBECONFIG").map(String::as_str),
            Some("/tmp/kubeconfig")
        );
    }
}
