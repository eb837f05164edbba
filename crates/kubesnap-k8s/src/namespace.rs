//! Namespace snapshots and pod detail

use std::collections::HashMap;

use futures::future::join_all;
use k8s_openapi::api::core::v1::{Endpoints, Event, PersistentVolumeClaim, Pod, ServiceAccount};
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::api::rbac::v1::{Role, RoleBinding};

use kubesnap_exec::ExecError;
use kubesnap_types::{
    ConfigKind, ConfigResourceInfo, ConfigSet, EventInfo, NamespaceSnapshot, PodDetail, PodInfo,
    WorkloadInfo, WorkloadKind,
};

use crate::client::{KubeClient, degrade};
use crate::convert::{self, ConfigObject, PodMetrics, WorkloadObject};
use crate::enrich;

impl KubeClient {
    /// Everything in one namespace.
    ///
    /// Every sub-query runs concurrently and degrades to empty on failure, so
    /// this only fails when the client is cancelled.
    pub async fn namespace_snapshot(
        &self,
        context: &str,
        namespace: &str,
    ) -> Result<NamespaceSnapshot, ExecError> {
        let workloads = join_all(WorkloadKind::ALL.map(|kind| async move {
            (
                kind,
                degrade(kind.resource(), self.workloads(context, namespace, kind)).await,
            )
        }));
        let config = join_all(ConfigKind::ALL.map(|kind| async move {
            (
                kind,
                degrade(kind.resource(), self.config_resources(context, namespace, kind)).await,
            )
        }));

        let (
            workloads,
            config,
            pods,
            events,
            services,
            endpoints,
            ingresses,
            volume_claims,
            service_accounts,
            roles,
            role_bindings,
            pod_metrics,
        ) = tokio::join!(
            workloads,
            config,
            degrade("pods", self.pods(context, namespace)),
            degrade("events", self.events(context, namespace)),
            degrade(
                "services",
                self.list_sorted(context, "services", Some(namespace), convert::service_info),
            ),
            degrade("endpoints", self.endpoints(context, namespace)),
            degrade(
                "ingresses",
                self.list_sorted(context, "ingresses", Some(namespace), |i: Ingress| {
                    convert::ingress_info(i)
                }),
            ),
            degrade(
                "persistentvolumeclaims",
                self.list_sorted(
                    context,
                    "persistentvolumeclaims",
                    Some(namespace),
                    |pvc: PersistentVolumeClaim| convert::volume_claim_info(pvc),
                ),
            ),
            degrade(
                "serviceaccounts",
                self.list_sorted(
                    context,
                    "serviceaccounts",
                    Some(namespace),
                    |sa: ServiceAccount| convert::service_account_info(sa),
                ),
            ),
            degrade(
                "roles",
                self.list_sorted(context, "roles", Some(namespace), |r: Role| {
                    convert::role_info(r)
                }),
            ),
            degrade(
                "rolebindings",
                self.list_sorted(context, "rolebindings", Some(namespace), |rb: RoleBinding| {
                    convert::role_binding_info(rb)
                }),
            ),
            degrade("pod metrics", self.pod_metrics(context, namespace)),
        );
        self.check_cancelled()?;

        let mut snapshot = NamespaceSnapshot {
            context: context.to_string(),
            namespace: namespace.to_string(),
            pods,
            events,
            services,
            ingresses,
            volume_claims,
            service_accounts,
            roles,
            role_bindings,
            ..Default::default()
        };
        for (kind, items) in workloads {
            *snapshot.workloads.kind_mut(kind) = items;
        }
        snapshot.config = config
            .into_iter()
            .fold(ConfigSet::default(), |mut set, (kind, items)| {
                *set.kind_mut(kind) = items;
                set
            });

        enrich::apply_pod_metrics(&mut snapshot.pods, &pod_metrics);
        enrich::attach_targets(&mut snapshot.services, &endpoints, &snapshot.pods);
        enrich::apply_latency(&mut snapshot.services, &snapshot.pods, &snapshot.events);

        Ok(snapshot)
    }

    /// One pod with its events and live usage. The pod list is required and a
    /// pod missing from it is an error.
    pub async fn pod_detail(
        &self,
        context: &str,
        namespace: &str,
        name: &str,
    ) -> Result<PodDetail, ExecError> {
        let (pods, events, pod_metrics) = tokio::join!(
            self.pods(context, namespace),
            degrade("events", self.events(context, namespace)),
            degrade("pod metrics", self.pod_metrics(context, namespace)),
        );
        self.check_cancelled()?;

        let mut pod = pods?
            .into_iter()
            .find(|p| p.name == name)
            .ok_or_else(|| {
                ExecError::failed(format!("pod {name} not found in namespace {namespace}"))
            })?;
        enrich::apply_pod_metrics(std::slice::from_mut(&mut pod), &pod_metrics);

        let events = enrich::events_for_pod(&events, name).cloned().collect();
        Ok(PodDetail { pod, events })
    }

    // ========================================================================
    // Sub-queries
    // ========================================================================

    async fn workloads(
        &self,
        context: &str,
        namespace: &str,
        kind: WorkloadKind,
    ) -> Result<Vec<WorkloadInfo>, ExecError> {
        self.list_sorted(context, kind.resource(), Some(namespace), |o: WorkloadObject| {
            convert::workload_info(kind, o)
        })
        .await
    }

    async fn config_resources(
        &self,
        context: &str,
        namespace: &str,
        kind: ConfigKind,
    ) -> Result<Vec<ConfigResourceInfo>, ExecError> {
        self.list_sorted(context, kind.resource(), Some(namespace), |o: ConfigObject| {
            convert::config_info(kind, o)
        })
        .await
    }

    pub(crate) async fn pods(
        &self,
        context: &str,
        namespace: &str,
    ) -> Result<Vec<PodInfo>, ExecError> {
        self.list_sorted(context, "pods", Some(namespace), |p: Pod| convert::pod_info(p))
            .await
    }

    async fn events(&self, context: &str, namespace: &str) -> Result<Vec<EventInfo>, ExecError> {
        let items: Vec<Event> = self.list(context, "events", Some(namespace)).await?;
        let mut events: Vec<EventInfo> = items.into_iter().map(convert::event_info).collect();
        convert::sort_events(&mut events);
        Ok(events)
    }

    /// Service name to the pods its endpoints point at
    async fn endpoints(
        &self,
        context: &str,
        namespace: &str,
    ) -> Result<HashMap<String, Vec<String>>, ExecError> {
        let items: Vec<Endpoints> = self.list(context, "endpoints", Some(namespace)).await?;
        Ok(items.into_iter().map(convert::endpoint_targets).collect())
    }

    async fn pod_metrics(
        &self,
        context: &str,
        namespace: &str,
    ) -> Result<Vec<PodMetrics>, ExecError> {
        let path = format!("/apis/metrics.k8s.io/v1beta1/namespaces/{namespace}/pods");
        self.raw(context, &path, "/items").await
    }
}
