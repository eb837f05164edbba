use std::collections::BTreeSet;
use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::{ErrorKind, ExecError};

/// Timeout and retry behaviour for command execution.
///
/// A failure is retryable when it timed out, when its exit code is listed, or
/// when its message contains one of the listed substrings. With both lists
/// empty, every execution failure is retryable. Resolution, decode and
/// cancellation failures never are.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Wall-clock limit for a single attempt
    pub timeout: Duration,
    /// Total attempts including the first one
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles after each failure
    pub base_delay: Duration,
    pub retryable_exit_codes: BTreeSet<i32>,
    pub retryable_messages: Vec<String>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(20),
            max_attempts: 3,
            base_delay: Duration::from_millis(250),
            retryable_exit_codes: BTreeSet::new(),
            retryable_messages: Vec::new(),
        }
    }
}

impl RetryPolicy {
    /// Policy that runs a command exactly once
    pub fn single_attempt(timeout: Duration) -> Self {
        Self {
            timeout,
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before retrying after the failed attempt with index `attempt`
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
    }

    pub fn is_retryable(&self, err: &ExecError) -> bool {
        if err.kind() != ErrorKind::Execution {
            return false;
        }
        if matches!(err, ExecError::TimedOut { .. }) {
            return true;
        }
        if self.retryable_exit_codes.is_empty() && self.retryable_messages.is_empty() {
            return true;
        }

        let code_matches = err
            .exit_code()
            .is_some_and(|code| self.retryable_exit_codes.contains(&code));
        let message = err.message().to_lowercase();
        let message_matches = self
            .retryable_messages
            .iter()
            .any(|needle| message.contains(&needle.to_lowercase()));

        code_matches || message_matches
    }

    /// Whether another attempt should follow `attempts_made` failed ones
    pub fn should_retry(&self, attempts_made: u32, err: &ExecError) -> bool {
        attempts_made < self.max_attempts.max(1) && self.is_retryable(err)
    }
}

/// Run `operation` until it succeeds or `policy` gives up.
///
/// The operation receives the zero-based attempt index. The last failure is
/// returned. Cancellation during a backoff sleep ends the loop immediately.
pub async fn retry<T, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    label: &str,
    mut operation: F,
) -> Result<T, ExecError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, ExecError>>,
{
    let mut attempt = 0;

    loop {
        let err = match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        let attempts_made = attempt + 1;
        if !policy.should_retry(attempts_made, &err) {
            return Err(err);
        }

        let delay = policy.backoff(attempt);
        warn!(
            command = label,
            attempt = attempts_made,
            max_attempts = policy.max_attempts,
            error = %err,
            ?delay,
            "command failed, retrying"
        );

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = cancel.cancelled() => return Err(ExecError::Cancelled { output: None }),
        }

        attempt += 1;
    }
}
