//! Config file loading

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use kubesnap_k8s::ClientConfig;

/// `~/.kubesnap/config.toml`
pub fn default_path() -> Option<PathBuf> {
    let home = dirs::home_dir()?;
    Some(home.join(".kubesnap").join("config.toml"))
}

/// Load the client config. A missing file means defaults; a file that
/// exists but does not parse is an error.
pub fn load(path: &Path) -> Result<ClientConfig> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(ClientConfig::default()),
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to read config {}", path.display()));
        }
    };

    toml::from_str(&content).with_context(|| format!("Invalid config {}", path.display()))
}
