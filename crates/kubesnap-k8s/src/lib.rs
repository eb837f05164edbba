//! Cluster snapshots for kubesnap
//!
//! Fans out kubectl and helm queries concurrently and merges their results
//! into sorted snapshot types. Optional sub-queries degrade to empty; only
//! the queries a result cannot exist without fail the whole call.

mod cache;
mod client;
mod config;
mod convert;
mod enrich;
mod ids;
mod namespace;
mod nodes;
mod permissions;
#[cfg(test)]
mod testing;

pub use cache::{Clock, ManualClock, SystemClock, TtlCache};
pub use client::KubeClient;
pub use config::{CacheSettings, ClientConfig, RetrySettings};
pub use ids::ContextIds;
pub use nodes::NodeKey;
pub use permissions::SecretKey;

// Re-export types that are used in our public API
pub use kubesnap_exec::{CancellationToken, ErrorKind, ExecError};
pub use kubesnap_types::{
    ClusterSnapshot, ContextInfo, HelmRelease, NamespaceInfo, NamespaceSnapshot, NodeInfo,
    PodDetail, SecretPermission,
};
