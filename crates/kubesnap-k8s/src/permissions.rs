//! Secret read permissions, answered by `kubectl auth can-i`

use std::collections::HashMap;

use futures::future::join_all;
use tracing::{debug, warn};

use kubesnap_exec::{ExecError, RetryPolicy};

use crate::cache::TtlCache;
use crate::client::KubeClient;

/// Permission answers are cached per (context, namespace, secret)
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SecretKey {
    pub context: String,
    pub namespace: String,
    pub name: String,
}

impl SecretKey {
    pub fn new(context: &str, namespace: &str, name: &str) -> Self {
        Self {
            context: context.to_string(),
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }
}

pub(crate) type PermissionCache = TtlCache<SecretKey, bool>;

/// `can-i` exits 1 and prints "no", or "no - <reason>", when the answer is
/// a denial
fn is_denial(err: &ExecError) -> bool {
    err.exit_code() == Some(1)
        && err.output().is_some_and(|out| {
            out.lines()
                .map(str::trim)
                .any(|line| line == "no" || line.starts_with("no - "))
        })
}

impl KubeClient {
    /// Ask the API server whether the current user may read one secret.
    /// Runs once; a denial is an answer, not a failure.
    pub async fn can_read_secret(&self, key: &SecretKey) -> Result<bool, ExecError> {
        let invocation = self
            .kubectl([
                "--context".to_string(),
                key.context.clone(),
                "auth".to_string(),
                "can-i".to_string(),
                "get".to_string(),
                format!("secrets/{}", key.name),
                "-n".to_string(),
                key.namespace.clone(),
                self.request_timeout_arg(),
            ])?
            .with_policy(RetryPolicy::single_attempt(self.request_timeout()));

        match self.run(invocation).await {
            Ok(stdout) => Ok(String::from_utf8_lossy(&stdout).trim() == "yes"),
            Err(err) if is_denial(&err) => {
                debug!(secret = %key.name, namespace = %key.namespace, "secret read denied");
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }

    /// Cache fetcher: one `can-i` per secret, concurrently. Failed checks are
    /// left out and retried on the next lookup.
    pub(crate) async fn fetch_permissions(
        &self,
        keys: Vec<SecretKey>,
    ) -> HashMap<SecretKey, bool> {
        let results = join_all(keys.into_iter().map(|key| async move {
            let result = self.can_read_secret(&key).await;
            (key, result)
        }))
        .await;

        results
            .into_iter()
            .filter_map(|(key, result)| match result {
                Ok(allowed) => Some((key, allowed)),
                Err(err) => {
                    warn!(secret = %key.name, error = %err, "permission check failed");
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

    fn denied() -> ExecError {
        ExecError::Failed {
            message: "no".to_string(),
            output: Some("no".to_string()),
            exit_code: Some(1),
        }
    }

    fn denied_with_reason(reason: &str) -> ExecError {
        let output = format!("no - {reason}");
        ExecError::Failed {
            message: output.clone(),
            output: Some(output),
            exit_code: Some(1),
        }
    }

    fn scripted() -> ScriptedRunner {
        ScriptedRunner::new()
            .respond("can-i get secrets/tls", "yes\n")
            .fail("can-i get secrets/db-password", denied())
            .fail(
                "can-i get secrets/broken",
                ExecError::failed("Unable to connect to the server"),
            )
    }

    fn secrets(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[tokio::test]
    async fn test_permissions_allowed_denied_and_failed() {
        let client = client_with_clock(scripted(), Arc::new(ManualClock::new()));

        let permissions = client
            .secret_permissions("dev", "apps", &secrets(&["tls", "db-password", "broken"]))
            .await
            .unwrap();

        assert_eq!(permissions.len(), 2);
        assert_eq!(permissions[0].name, "db-password");
        assert!(!permissions[0].can_read);
        assert_eq!(permissions[1].name, "tls");
        assert!(permissions[1].can_read);
    }

    #[tokio::test]
    async fn test_denial_with_reason_is_cached_as_denied() {
        let runner = ScriptedRunner::new()
            .fail("can-i get secrets/vault", denied_with_reason("RBAC: access denied"));
        let client = client_with_clock(runner.clone(), Arc::new(ManualClock::new()));

        let permissions = client
            .secret_permissions("dev", "apps", &secrets(&["vault"]))
            .await
            .unwrap();
        assert_eq!(permissions.len(), 1);
        assert_eq!(permissions[0].name, "vault");
        assert!(!permissions[0].can_read);

        client
            .secret_permissions("dev", "apps", &secrets(&["vault"]))
            .await
            .unwrap();
        assert_eq!(runner.calls().len(), 1);
    }

    #[test]
    fn test_is_denial_needs_exit_one() {
        let other_exit = ExecError::Failed {
            message: "no - forbidden".to_string(),
            output: Some("no - forbidden".to_string()),
            exit_code: Some(2),
        };
        assert!(!super::is_denial(&other_exit));
        assert!(super::is_denial(&denied()));
        assert!(super::is_denial(&denied_with_reason("no RBAC policy matched")));
        assert!(!super::is_denial(&ExecError::failed("nothing")));
    }

    #[tokio::test]
    async fn test_can_i_runs_once() {
        let runner = scripted();
        let client = client_with_clock(runner.clone(), Arc::new(ManualClock::new()));

        client
            .secret_permissions("dev", "apps", &secrets(&["tls"]))
            .await
            .unwrap();

        assert_eq!(runner.attempt_limits(), [Some(1)]);
        assert_eq!(
            runner.calls()[0],
            [
                "--context",
                "dev",
                "auth",
                "can-i",
                "get",
                "secrets/tls",
                "-n",
                "apps",
                "--request-timeout=20s"
            ]
        );
    }

    #[tokio::test]
    async fn test_permission_cache_fetches_only_new_secrets() {
        let clock = Arc::new(ManualClock::new());
        let runner = scripted();
        let client = client_with_clock(runner.clone(), clock.clone());

        client
            .secret_permissions("dev", "apps", &secrets(&["tls", "db-password"]))
            .await
            .unwrap();
        assert_eq!(runner.calls().len(), 2);

        clock.advance(Duration::from_secs(10));
        let permissions = client
            .secret_permissions("dev", "apps", &secrets(&["tls", "broken"]))
            .await
            .unwrap();
        assert_eq!(runner.calls().len(), 3);
        assert_eq!(permissions.len(), 1);

        clock.advance(Duration::from_secs(30));
        client
            .secret_permissions("dev", "apps", &secrets(&["tls"]))
            .await
            .unwrap();
        assert_eq!(runner.calls().len(), 4);
    }

    #[tokio::test]
    async fn test_invalidate_forces_recheck() {
        let runner = scripted();
        let client = client_with_clock(runner.clone(), Arc::new(ManualClock::new()));

        client
            .secret_permissions("dev", "apps", &secrets(&["tls"]))
            .await
            .unwrap();
        client.invalidate_caches();
        client
            .secret_permissions("dev", "apps", &secrets(&["tls"]))
            .await
            .unwrap();
        assert_eq!(runner.calls().len(), 2);
    }
}
