use std::path::PathBuf;
use std::time::Duration;

use kubesnap_exec::RetryPolicy;
use serde::Deserialize;

/// Settings for [`crate::KubeClient`]. Every field has a default, so an
/// empty config file is valid.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// kubectl executable name or path
    pub kubectl: String,
    /// helm executable name or path
    pub helm: String,
    /// Directories searched before PATH
    pub search_paths: Vec<PathBuf>,
    /// Exported as KUBECONFIG to every command
    pub kubeconfig: Option<PathBuf>,
    pub retry: RetrySettings,
    pub cache: CacheSettings,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            kubectl: "kubectl".to_string(),
            helm: "helm".to_string(),
            search_paths: vec![
                PathBuf::from("/opt/homebrew/bin"),
                PathBuf::from("/usr/local/bin"),
                PathBuf::from("/usr/bin"),
            ],
            kubeconfig: None,
            retry: RetrySettings::default(),
            cache: CacheSettings::default(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub timeout_secs: u64,
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub retryable_exit_codes: Vec<i32>,
    pub retryable_messages: Vec<String>,
}

impl Default for RetrySettings {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            timeout_secs: policy.timeout.as_secs(),
            max_attempts: policy.max_attempts,
            base_delay_ms: policy.base_delay.as_millis() as u64,
            retryable_exit_codes: Vec::new(),
            retryable_messages: Vec::new(),
        }
    }
}

impl RetrySettings {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            timeout: Duration::from_secs(self.timeout_secs.max(1)),
            max_attempts: self.max_attempts.max(1),
            base_delay: Duration::from_millis(self.base_delay_ms),
            retryable_exit_codes: self.retryable_exit_codes.iter().copied().collect(),
            retryable_messages: self.retryable_messages.clone(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Filesystem and network counters change constantly
    pub node_stats_ttl_secs: u64,
    /// Authorization rarely changes within a session
    pub permission_ttl_secs: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            node_stats_ttl_secs: 5,
            permission_ttl_secs: 30,
        }
    }
}

impl CacheSettings {
    pub fn node_stats_ttl(&self) -> Duration {
        Duration::from_secs(self.node_stats_ttl_secs)
    }

    pub fn permission_ttl(&self) -> Duration {
        Duration::from_secs(self.permission_ttl_secs)
    }
}
