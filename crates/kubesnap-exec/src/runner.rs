use std::collections::BTreeMap;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::decode::decode_json;
use crate::error::{ExecError, raw_payload};
use crate::invocation::Invocation;
use crate::policy::{RetryPolicy, retry};

/// How long to wait for output readers after the process is gone
const DRAIN_GRACE: Duration = Duration::from_millis(250);

/// Something that can run an [`Invocation`] and return its stdout.
///
/// [`ProcessRunner`] is the real implementation; tests provide scripted ones.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(
        &self,
        invocation: &Invocation,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, ExecError>;
}

/// Run an invocation and decode its stdout as JSON
pub async fn run_json<T: DeserializeOwned>(
    runner: &dyn CommandRunner,
    invocation: &Invocation,
    cancel: &CancellationToken,
) -> Result<T, ExecError> {
    let stdout = runner.run(invocation, cancel).await?;
    decode_json(&stdout)
}

// ============================================================================
// Process results
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Termination {
    /// The process exited on its own with this code
    Exited(i32),
    /// The process was killed by a signal
    Signaled,
}

impl From<ExitStatus> for Termination {
    fn from(status: ExitStatus) -> Self {
        match status.code() {
            Some(code) => Self::Exited(code),
            None => Self::Signaled,
        }
    }
}

/// Everything one attempt produced
#[derive(Clone, Debug)]
pub struct ProcessOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub termination: Termination,
}

impl ProcessOutput {
    pub fn exit_code(&self) -> Option<i32> {
        match self.termination {
            Termination::Exited(code) => Some(code),
            Termination::Signaled => None,
        }
    }

    /// Exit code zero from a normal exit is the only success
    pub fn success(&self) -> bool {
        self.termination == Termination::Exited(0)
    }

    pub fn into_result(self) -> Result<Vec<u8>, ExecError> {
        if self.success() {
            return Ok(self.stdout);
        }

        let stderr = String::from_utf8_lossy(&self.stderr).trim().to_string();
        let stdout = String::from_utf8_lossy(&self.stdout).trim().to_string();
        let message = if !stderr.is_empty() {
            stderr
        } else if !stdout.is_empty() {
            stdout
        } else {
            match self.termination {
                Termination::Exited(code) => format!("command failed with exit code {code}"),
                Termination::Signaled => "command terminated by signal".to_string(),
            }
        };

        Err(ExecError::Failed {
            message,
            output: raw_payload(&self.stdout, &self.stderr),
            exit_code: self.exit_code(),
        })
    }
}

// ============================================================================
// Forced stops
// ============================================================================

/// Why an attempt was stopped from the outside
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ForcedStop {
    TimedOut,
    Cancelled,
}

/// Write-once record of the first forced stop of an attempt
#[derive(Debug, Default)]
pub struct ForcedStopCell(OnceLock<ForcedStop>);

impl ForcedStopCell {
    /// Record a stop; returns false if one was already recorded
    pub fn record(&self, stop: ForcedStop) -> bool {
        self.0.set(stop).is_ok()
    }

    pub fn get(&self) -> Option<ForcedStop> {
        self.0.get().copied()
    }
}

/// Turn an attempt's output into its result. A recorded forced stop wins
/// over whatever the process itself reported.
pub fn settle(
    forced: &ForcedStopCell,
    output: ProcessOutput,
    timeout: Duration,
) -> Result<Vec<u8>, ExecError> {
    match forced.get() {
        Some(ForcedStop::TimedOut) => Err(ExecError::TimedOut {
            timeout,
            output: raw_payload(&output.stdout, &output.stderr),
        }),
        Some(ForcedStop::Cancelled) => Err(ExecError::Cancelled {
            output: raw_payload(&output.stdout, &output.stderr),
        }),
        None => output.into_result(),
    }
}

// ============================================================================
// Output capture
// ============================================================================

/// Incrementally collected output of one pipe
struct Capture {
    buffer: Arc<Mutex<Vec<u8>>>,
    task: Option<JoinHandle<()>>,
}

impl Capture {
    fn start<R>(reader: Option<R>) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let task = reader.map(|mut reader| {
            let buffer = Arc::clone(&buffer);
            tokio::spawn(async move {
                let mut chunk = [0u8; 8192];
                loop {
                    match reader.read(&mut chunk).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => buffer.lock().extend_from_slice(&chunk[..n]),
                    }
                }
            })
        });

        Self { buffer, task }
    }

    /// Wait briefly for the reader to hit EOF, then take what was collected
    async fn finish(self) -> Vec<u8> {
        if let Some(mut task) = self.task {
            if tokio::time::timeout(DRAIN_GRACE, &mut task).await.is_err() {
                // A grandchild may still hold the pipe open
                task.abort();
            }
        }
        std::mem::take(&mut *self.buffer.lock())
    }
}

// ============================================================================
// Runner
// ============================================================================

/// Runs invocations as real subprocesses
pub struct ProcessRunner {
    policy: Arc<RetryPolicy>,
    env: BTreeMap<String, String>,
}

impl ProcessRunner {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy: Arc::new(policy),
            env: BTreeMap::new(),
        }
    }

    /// Environment applied to every invocation; the invocation's own
    /// variables take precedence
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Spawn the invocation once and wait for it, its timeout, or cancellation
    async fn run_once(
        &self,
        invocation: &Invocation,
        policy: &RetryPolicy,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, ExecError> {
        if cancel.is_cancelled() {
            return Err(ExecError::Cancelled { output: None });
        }

        let mut command = Command::new(invocation.program());
        command
            .args(invocation.get_args())
            .envs(&self.env)
            .envs(invocation.get_env())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = invocation.working_dir() {
            command.current_dir(dir);
        }

        let mut child = command.spawn().map_err(|e| {
            ExecError::failed(format!(
                "failed to start {}: {e}",
                invocation.program().display()
            ))
        })?;

        let stdout = Capture::start(child.stdout.take());
        let stderr = Capture::start(child.stderr.take());
        let forced = ForcedStopCell::default();

        let waited = tokio::select! {
            status = child.wait() => Some(status),
            _ = tokio::time::sleep(policy.timeout) => {
                forced.record(ForcedStop::TimedOut);
                None
            }
            _ = cancel.cancelled() => {
                forced.record(ForcedStop::Cancelled);
                None
            }
        };

        let waited = match waited {
            Some(status) => status,
            None => {
                let _ = child.start_kill();
                child.wait().await
            }
        };

        let stdout = stdout.finish().await;
        let stderr = stderr.finish().await;

        let termination = match waited {
            Ok(status) => Termination::from(status),
            Err(_) if forced.get().is_some() => Termination::Signaled,
            Err(e) => {
                return Err(ExecError::Failed {
                    message: format!("failed to wait for {}: {e}", invocation.display()),
                    output: raw_payload(&stdout, &stderr),
                    exit_code: None,
                });
            }
        };

        let output = ProcessOutput {
            stdout,
            stderr,
            termination,
        };
        debug!(
            command = %invocation.display(),
            termination = ?output.termination,
            forced = ?forced.get(),
            "command finished"
        );

        settle(&forced, output, policy.timeout)
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(
        &self,
        invocation: &Invocation,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, ExecError> {
        let policy = invocation.policy().unwrap_or(&self.policy);
        let label = invocation.display();

        retry(policy, cancel, &label, |attempt| {
            debug!(command = %label, attempt, "running command");
            self.run_once(invocation, policy, cancel)
        })
        .await
    }
}
