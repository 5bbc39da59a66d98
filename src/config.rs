use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::client::DEFAULT_BATCH_SIZE;
use crate::patch::DEFAULT_API_VERSION;

#[derive(Debug, Deserialize, Default)]
pub struct AppConfig {
    pub server: Option<ClientConfig>,
}

/// Connection settings for one collection/project.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ClientConfig {
    pub server_url: String,
    /// `Collection` or `Collection/Project`.
    pub project: String,
    pub personal_access_token: Option<String>,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    pub timeout_secs: Option<u64>,
}

fn default_api_version() -> String {
    DEFAULT_API_VERSION.to_string()
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".workitems")
}

pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

pub fn load_config() -> Result<AppConfig> {
    load_config_from(&config_path())
}

/// A missing file is an empty config.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    if !path.exists() {
        return Ok(AppConfig::default());
    }
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config from {}", path.display()))?;
    let config: AppConfig = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    if let Some(server) = &config.server {
        anyhow::ensure!(server.batch_size > 0, "batch_size must be greater than zero");
    }
    Ok(config)
}
