//! Process execution for kubesnap
//!
//! Runs external tools (kubectl, helm) as subprocesses with a wall-clock
//! timeout, cooperative cancellation and retry with exponential backoff.
//! Every failure is reported as a single [`ExecError`].

mod decode;
mod error;
mod invocation;
mod policy;
mod runner;
mod tool;

pub use decode::{decode_at, decode_json};
pub use error::{ErrorKind, ExecError};
pub use invocation::Invocation;
pub use policy::{RetryPolicy, retry};
pub use runner::{
    CommandRunner, ForcedStop, ForcedStopCell, ProcessOutput, ProcessRunner, Termination,
    run_json, settle,
};
pub use tool::Tool;

// Re-export so callers don't need a direct tokio-util dependency
pub use tokio_util::sync::CancellationToken;
