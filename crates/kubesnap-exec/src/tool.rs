use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::ExecError;
use crate::invocation::Invocation;

/// An external executable, located once when the tool is created.
///
/// Resolution tries the configured search paths first, then `PATH`. A tool
/// that could not be found still exists, but every invocation built from it
/// fails immediately with [`ExecError::NotFound`].
#[derive(Clone, Debug)]
pub struct Tool {
    name: String,
    path: Option<PathBuf>,
}

impl Tool {
    pub fn resolve(name: &str, search_paths: &[PathBuf]) -> Self {
        let path = locate(name, search_paths);
        match &path {
            Some(path) => debug!(tool = name, path = %path.display(), "resolved tool"),
            None => debug!(tool = name, "tool not found"),
        }

        Self {
            name: name.to_string(),
            path,
        }
    }

    /// A tool at a known path, skipping resolution
    pub fn at(name: &str, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.to_string(),
            path: Some(path.into()),
        }
    }

    /// A tool known to be missing
    pub fn missing(name: &str) -> Self {
        Self {
            name: name.to_string(),
            path: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Start building an invocation of this tool
    pub fn invocation<I, S>(&self, args: I) -> Result<Invocation, ExecError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let path = self.path.as_ref().ok_or_else(|| ExecError::NotFound {
            program: self.name.clone(),
        })?;
        Ok(Invocation::new(path).args(args))
    }
}

/// Only executable files count; a non-executable file in a search path does
/// not shadow the real tool on `PATH`.
fn locate(name: &str, search_paths: &[PathBuf]) -> Option<PathBuf> {
    let configured = match (std::env::join_paths(search_paths), std::env::current_dir()) {
        (Ok(paths), Ok(cwd)) if !search_paths.is_empty() => {
            which::which_in(name, Some(paths), cwd).ok()
        }
        _ => None,
    };
    configured.or_else(|| which::which(name).ok())
}
