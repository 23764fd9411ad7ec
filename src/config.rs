//! Server configuration.
//!
//! Loaded from the YAML file named by `HERALD_CONFIG` when set, defaults
//! otherwise. `LISTEN` overrides the listen address either way.

use anyhow::Context;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub static_files: StaticFilesConfig,
    pub broadcast: BroadcastConfig,
    pub logging: LoggingConfig,
    pub limits: LimitsConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8080".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StaticFilesConfig {
    /// Directory the request url is appended to
    pub document_root: PathBuf,
    /// Body of every 404 answer; must exist
    pub not_found_page: PathBuf,
}

impl Default for StaticFilesConfig {
    fn default() -> Self {
        Self {
            document_root: PathBuf::from("htdocs"),
            not_found_page: PathBuf::from("htdocs/404.html"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BroadcastConfig {
    pub log_path: PathBuf,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            log_path: PathBuf::from("broadcast.log"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub access_log: PathBuf,
    pub error_log: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            access_log: PathBuf::from("access.log"),
            error_log: PathBuf::from("error.log"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Storage every connection buffer starts with
    pub initial_buffer: usize,
    /// Hard cap on a connection buffer
    pub max_buffer: usize,
    /// Connection slots reserved up front in the readiness table
    pub initial_slots: usize,
    /// Unused slots tolerated before the table is reallocated smaller
    pub slot_shrink_slack: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            initial_buffer: 1024,
            max_buffer: 1024 * 1024,
            initial_slots: 16,
            slot_shrink_slack: 32,
        }
    }
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let mut cfg = match std::env::var("HERALD_CONFIG") {
            Ok(path) => Self::from_file(path)?,
            Err(_) => Self::default(),
        };

        if let Ok(listen_addr) = std::env::var("LISTEN") {
            cfg.server.listen_addr = listen_addr;
        }

        Ok(cfg)
    }

    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        Self::from_yaml_str(&contents)
            .with_context(|| format!("parsing config file {}", path.display()))
    }

    pub fn from_yaml_str(contents: &str) -> anyhow::Result<Self> {
        let cfg: Config = serde_yaml::from_str(contents)?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> anyhow::Result<()> {
        let limits = &self.limits;
        if limits.initial_buffer == 0 || limits.initial_buffer > limits.max_buffer {
            anyhow::bail!(
                "limits.initial_buffer must be between 1 and limits.max_buffer ({})",
                limits.max_buffer
            );
        }
        if limits.initial_slots == 0 {
            anyhow::bail!("limits.initial_slots must be at least 1");
        }
        Ok(())
    }
}
