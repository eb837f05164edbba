use std::time::Duration;

use thiserror::Error;

/// Error produced by running an external command
#[derive(Debug, Clone, Error)]
pub enum ExecError {
    /// The executable could not be located; never retried
    #[error("{program} not found in search paths or PATH")]
    NotFound { program: String },

    /// Non-zero exit, termination by signal, or failure to spawn
    #[error("{message}")]
    Failed {
        message: String,
        output: Option<String>,
        exit_code: Option<i32>,
    },

    /// The process outlived its timeout and was killed
    #[error("command timed out after {timeout:?}")]
    TimedOut {
        timeout: Duration,
        output: Option<String>,
    },

    /// The caller cancelled the operation; never retried
    #[error("command cancelled")]
    Cancelled { output: Option<String> },

    /// The process succeeded but its output could not be decoded; never retried
    #[error("failed to decode command output: {message}")]
    Decode {
        message: String,
        output: Option<String>,
    },
}

/// Coarse classification used by retry policies and callers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Resolution,
    Execution,
    Cancelled,
    Decode,
}

impl ExecError {
    /// Build an execution failure with just a message
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
            output: None,
            exit_code: None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::Resolution,
            Self::Failed { .. } | Self::TimedOut { .. } => ErrorKind::Execution,
            Self::Cancelled { .. } => ErrorKind::Cancelled,
            Self::Decode { .. } => ErrorKind::Decode,
        }
    }

    /// Human-readable message, one line
    pub fn message(&self) -> String {
        self.to_string()
    }

    /// Raw output captured from the process, for diagnostics
    pub fn output(&self) -> Option<&str> {
        match self {
            Self::NotFound { .. } => None,
            Self::Failed { output, .. }
            | Self::TimedOut { output, .. }
            | Self::Cancelled { output }
            | Self::Decode { output, .. } => output.as_deref(),
        }
    }

    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::Failed { exit_code, .. } => *exit_code,
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

/// Combine stdout and stderr into one diagnostic payload
pub(crate) fn raw_payload(stdout: &[u8], stderr: &[u8]) -> Option<String> {
    let stdout = String::from_utf8_lossy(stdout);
    let stderr = String::from_utf8_lossy(stderr);
    let parts: Vec<&str> = [stdout.trim(), stderr.trim()]
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect();

    if parts.is_empty() {
        None
    } else {
        Some(parts.join("\n"))
    }
}
