//! Configuration structures
//!
//! Every section deserializes with defaults so a partial TOML or JSON file is
//! enough. Loading from the environment and from disk lives in
//! `courier-infra::config`.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_BACKOFF_MS, DEFAULT_LOG_LEVEL, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_CAPACITY,
    DEFAULT_POOL_SIZE, DEFAULT_PROBE_INTERVAL_SECS, DEFAULT_PROBE_TIMEOUT_SECS,
};
use crate::errors::{QueueError, Result};

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CourierConfig {
    pub queue: QueueConfig,
    pub network: NetworkConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

impl CourierConfig {
    pub fn validate(&self) -> Result<()> {
        self.queue.validate()?;
        self.network.validate()?;
        self.storage.validate()
    }
}

/// Queue sizing and retry policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Maximum number of stored items.
    pub max_capacity: usize,
    /// Backoff table in milliseconds, indexed by retry count.
    pub backoff_ms: Vec<u64>,
    /// Failed attempts before dead-lettering; zero retries forever.
    pub max_attempts: u32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_capacity: DEFAULT_MAX_CAPACITY,
            backoff_ms: DEFAULT_BACKOFF_MS.to_vec(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl QueueConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_capacity == 0 {
            return Err(QueueError::Config("max_capacity must be greater than 0".into()));
        }
        if self.backoff_ms.is_empty() {
            return Err(QueueError::Config("backoff_ms must not be empty".into()));
        }
        if self.backoff_ms.windows(2).any(|pair| pair[1] < pair[0]) {
            return Err(QueueError::Config("backoff_ms must be non-decreasing".into()));
        }
        Ok(())
    }

    pub fn backoff(&self) -> Vec<Duration> {
        self.backoff_ms.iter().copied().map(Duration::from_millis).collect()
    }
}

/// Connectivity probing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Endpoint probed with `HEAD`; probing is disabled when unset.
    pub health_url: Option<String>,
    pub probe_interval_secs: u64,
    pub probe_timeout_secs: u64,
    /// Initial connectivity state before the first signal or probe.
    pub start_online: bool,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            health_url: None,
            probe_interval_secs: DEFAULT_PROBE_INTERVAL_SECS,
            probe_timeout_secs: DEFAULT_PROBE_TIMEOUT_SECS,
            start_online: false,
        }
    }
}

impl NetworkConfig {
    pub fn validate(&self) -> Result<()> {
        if self.probe_interval_secs == 0 {
            return Err(QueueError::Config("probe_interval_secs must be greater than 0".into()));
        }
        if self.probe_timeout_secs == 0 {
            return Err(QueueError::Config("probe_timeout_secs must be greater than 0".into()));
        }
        Ok(())
    }

    pub const fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_secs)
    }

    pub const fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

/// Persistent store location
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database file; the in-memory store is used when unset.
    pub path: Option<PathBuf>,
    pub pool_size: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { path: None, pool_size: DEFAULT_POOL_SIZE }
    }
}

impl StorageConfig {
    pub fn validate(&self) -> Result<()> {
        if self.pool_size == 0 {
            return Err(QueueError::Config("pool_size must be greater than 0".into()));
        }
        Ok(())
    }
}

/// Tracing subscriber settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` takes precedence.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: DEFAULT_LOG_LEVEL.to_string(), json: false }
    }
}
