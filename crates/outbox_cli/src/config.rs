//! Config file loading.

use outbox_engine::{RetryConfig, SyncConfig};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors raised while loading the config file.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config {}: {source}", .path.display())]
    Read {
        /// Config file path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The file is not valid JSON for this schema.
    #[error("invalid config {}: {source}", .path.display())]
    Parse {
        /// Config file path.
        path: PathBuf,
        /// Underlying error.
        source: serde_json::Error,
    },
}

/// Contents of a JSON config file. Every field is optional.
#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct FileConfig {
    /// Backend base URL.
    pub server_url: Option<String>,
    /// Storage namespace.
    pub namespace: Option<String>,
    /// Retry budget.
    pub max_attempts: Option<u32>,
    /// Probe interval in seconds; `0` disables the probe.
    pub probe_interval_secs: Option<u64>,
    /// Probe path.
    pub health_path: Option<String>,
    /// Periodic drain interval in seconds.
    pub sync_interval_secs: Option<u64>,
    /// Pause between dispatches in milliseconds.
    pub inter_mutation_delay_ms: Option<u64>,
    /// Request timeout in seconds.
    pub timeout_secs: Option<u64>,
    /// Recent error capacity.
    pub max_recent_errors: Option<usize>,
    /// Bearer token.
    pub auth_token: Option<String>,
}

impl FileConfig {
    /// Reads a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Parses config JSON.
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// Applies the file on top of the defaults.
    pub fn into_sync_config(self) -> SyncConfig {
        let mut config = match self.server_url {
            Some(url) => SyncConfig::new(url),
            None => SyncConfig::default(),
        };

        if let Some(namespace) = self.namespace {
            config = config.with_namespace(namespace);
        }
        if let Some(max_attempts) = self.max_attempts {
            config = config.with_retry(RetryConfig::new(max_attempts));
        }
        match self.probe_interval_secs {
            Some(0) => config = config.without_probe(),
            Some(secs) => config = config.with_probe_interval(Duration::from_secs(secs)),
            None => {}
        }
        if let Some(path) = self.health_path {
            config = config.with_health_path(path);
        }
        if let Some(secs) = self.sync_interval_secs {
            config = config.with_sync_interval(Duration::from_secs(secs.max(1)));
        }
        if let Some(ms) = self.inter_mutation_delay_ms {
            config = config.with_inter_mutation_delay(Duration::from_millis(ms));
        }
        if let Some(secs) = self.timeout_secs {
            config = config.with_timeout(Duration::from_secs(secs));
        }
        if let Some(max) = self.max_recent_errors {
            config = config.with_max_recent_errors(max);
        }
        if let Some(token) = self.auth_token {
            config = config.with_auth_token(token);
        }
        config
    }
}
