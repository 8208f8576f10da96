//! Exporter configuration file.
//!
//! Loaded once at startup; any failure to read or parse it is fatal.

use std::fs;
use std::num::{NonZeroU64, NonZeroUsize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::batch::{DEFAULT_BATCH_SIZE, DEFAULT_TIME_SPAN_MINUTES};
use crate::newrelic::DEFAULT_TIMEOUT;

/// Possible failure while loading the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Read config; path={path}; err={source}")]
    Read { path: PathBuf, source: std::io::Error },
    #[error("Parse config; path={path}; err={source}")]
    Parse { path: PathBuf, source: serde_yaml::Error },
}

/// A monitored application.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Target {
    pub id: i64,
    pub name: String,
}

/// What `up` means.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpPolicy {
    /// Probe the API first; `up` is 0 and nothing else is collected if the
    /// probe fails.
    #[default]
    Probe,
    /// `up` is always 1; failed targets are absent from the output.
    BestEffort,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    #[serde(default)]
    pub applications: Vec<Target>,
    /// Minutes covered by apdex metric requests; 0 selects the default.
    #[serde(default)]
    pub time_span: u32,
    #[serde(default = "default_true")]
    pub key_transactions: bool,
    #[serde(default)]
    pub apdex_metrics: bool,
    #[serde(default = "default_batch_size")]
    pub batch_size: NonZeroUsize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: NonZeroU64,
    #[serde(default)]
    pub up_policy: UpPolicy,
    #[serde(default)]
    pub retry_target_fetches: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            applications: Vec::default(),
            time_span: 0,
            key_transactions: default_true(),
            apdex_metrics: false,
            batch_size: default_batch_size(),
            timeout_secs: default_timeout_secs(),
            up_policy: UpPolicy::default(),
            retry_target_fetches: false,
        }
    }
}

impl Config {
    /// Reads and parses the YAML file at `path`.
    ///
    /// # Errors
    ///
    /// Errors if the file cannot be read or is not a valid configuration.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;

        serde_yaml::from_str(&raw)
            .map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })
    }

    #[must_use]
    pub const fn time_span_minutes(&self) -> u32 {
        match self.time_span {
            0 => DEFAULT_TIME_SPAN_MINUTES,
            minutes => minutes,
        }
    }

    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.get())
    }
}

const fn default_true() -> bool {
    true
}

const fn default_batch_size() -> NonZeroUsize {
    DEFAULT_BATCH_SIZE
}

const fn default_timeout_secs() -> NonZeroU64 {
    match NonZeroU64::new(DEFAULT_TIMEOUT.as_secs()) {
        Some(secs) => secs,
        None => NonZeroU64::MIN,
    }
}
