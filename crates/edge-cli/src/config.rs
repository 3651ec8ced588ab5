//! Configuration file handling for edgebulk

use anyhow::{Context, Result};
use edge_client::config::DEFAULT_ENDPOINT;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration for the CLI tool
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Default endpoint URL
    pub endpoint: Option<String>,
    /// Session token to reuse between runs
    pub session: Option<String>,
    /// Path to a YAML client configuration (retries, iteration, timeouts)
    pub client_config: Option<PathBuf>,
    /// Disable colored output
    pub no_color: Option<bool>,
}

impl Config {
    /// Load configuration from the default config file
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Get the default config file path
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?
            .join("edgebulk");

        Ok(config_dir.join("config.toml"))
    }

    /// Merge CLI arguments over config file values
    pub fn merge_with_args(
        &self,
        endpoint: Option<&str>,
        session: Option<&str>,
        no_color: bool,
    ) -> MergedConfig {
        MergedConfig {
            endpoint: endpoint
                .map(String::from)
                .or_else(|| self.endpoint.clone())
                .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            session: session.map(String::from).or_else(|| self.session.clone()),
            client_config: self.client_config.clone(),
            no_color: no_color || self.no_color.unwrap_or(false),
        }
    }
}

/// Fully resolved configuration after merging CLI args
#[derive(Debug, Clone)]
pub struct MergedConfig {
    pub endpoint: String,
    pub session: Option<String>,
    pub client_config: Option<PathBuf>,
    pub no_color: bool,
}
