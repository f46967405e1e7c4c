//! Configuration structures
//!
//! Every field carries a serde default, so a config file only needs the
//! values it wants to override.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_BASE_RETRY_DELAY_MS, DEFAULT_DRAIN_INTERVAL_MS, DEFAULT_MAX_RETRIES,
    DEFAULT_MAX_RETRY_DELAY_MS, DEFAULT_PROBE_INTERVAL_MS, DEFAULT_PROBE_TIMEOUT_MS,
    DEFAULT_QUEUE_CAPACITY, DEFAULT_SLOW_LATENCY_THRESHOLD_MS, DEFAULT_STORAGE_DIR,
    DEFAULT_STORAGE_KEY,
};
use crate::errors::{FieldSyncError, Result};
use crate::impl_domain_enum_conversions;

/// Top-level application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub queue: QueueConfig,
    pub network: NetworkConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Validate every section.
    ///
    /// # Errors
    /// Returns `FieldSyncError::Config` describing the first invalid value.
    pub fn validate(&self) -> Result<()> {
        self.queue.validate()?;
        self.network.validate()?;
        self.storage.validate()?;
        Ok(())
    }
}

/// Queue and retry settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub max_capacity: usize,
    pub default_max_retries: u32,
    pub base_retry_delay_ms: u64,
    pub max_retry_delay_ms: u64,
    /// 0.0 disables jitter; 1.0 spreads retries across the full delay.
    pub jitter_factor: f64,
    pub drain_interval_ms: u64,
    pub storage_key: String,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_capacity: DEFAULT_QUEUE_CAPACITY,
            default_max_retries: DEFAULT_MAX_RETRIES,
            base_retry_delay_ms: DEFAULT_BASE_RETRY_DELAY_MS,
            max_retry_delay_ms: DEFAULT_MAX_RETRY_DELAY_MS,
            jitter_factor: 0.0,
            drain_interval_ms: DEFAULT_DRAIN_INTERVAL_MS,
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
        }
    }
}

impl QueueConfig {
    pub fn base_retry_delay(&self) -> Duration {
        Duration::from_millis(self.base_retry_delay_ms)
    }

    pub fn max_retry_delay(&self) -> Duration {
        Duration::from_millis(self.max_retry_delay_ms)
    }

    pub fn drain_interval(&self) -> Duration {
        Duration::from_millis(self.drain_interval_ms)
    }

    fn validate(&self) -> Result<()> {
        if self.max_capacity == 0 {
            return Err(config_error("queue.max_capacity must be greater than 0"));
        }
        if self.default_max_retries == 0 {
            return Err(config_error("queue.default_max_retries must be at least 1"));
        }
        if self.base_retry_delay_ms == 0 {
            return Err(config_error("queue.base_retry_delay_ms must be greater than 0"));
        }
        if self.base_retry_delay_ms > self.max_retry_delay_ms {
            return Err(config_error(format!(
                "queue.base_retry_delay_ms ({}) cannot exceed queue.max_retry_delay_ms ({})",
                self.base_retry_delay_ms, self.max_retry_delay_ms
            )));
        }
        if !(0.0..=1.0).contains(&self.jitter_factor) {
            return Err(config_error("queue.jitter_factor must be between 0.0 and 1.0"));
        }
        if self.drain_interval_ms == 0 {
            return Err(config_error("queue.drain_interval_ms must be greater than 0"));
        }
        if self.storage_key.trim().is_empty() {
            return Err(config_error("queue.storage_key cannot be empty"));
        }
        Ok(())
    }
}

/// Connectivity probing settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Endpoint probed to decide online/offline. No probing when absent.
    pub probe_url: Option<String>,
    pub probe_interval_ms: u64,
    pub probe_timeout_ms: u64,
    pub slow_latency_threshold_ms: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            probe_url: None,
            probe_interval_ms: DEFAULT_PROBE_INTERVAL_MS,
            probe_timeout_ms: DEFAULT_PROBE_TIMEOUT_MS,
            slow_latency_threshold_ms: DEFAULT_SLOW_LATENCY_THRESHOLD_MS,
        }
    }
}

impl NetworkConfig {
    pub fn probe_interval(&self) -> Duration {
        Duration::from_millis(self.probe_interval_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    fn validate(&self) -> Result<()> {
        if self.probe_url.as_deref().is_some_and(|url| url.trim().is_empty()) {
            return Err(config_error("network.probe_url cannot be empty when set"));
        }
        if self.probe_interval_ms == 0 || self.probe_timeout_ms == 0 {
            return Err(config_error("network probe interval and timeout must be positive"));
        }
        Ok(())
    }
}

/// Which durable store backs the queue
///
/// `Memory` does not survive a restart and must be chosen explicitly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    #[default]
    File,
    Sqlite,
}

impl_domain_enum_conversions!(StorageBackend {
    Memory => "memory",
    File => "file",
    Sqlite => "sqlite",
});

/// Durable storage settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Directory for `file`, database file for `sqlite`
    pub path: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { backend: StorageBackend::File, path: Some(PathBuf::from(DEFAULT_STORAGE_DIR)) }
    }
}

impl StorageConfig {
    fn validate(&self) -> Result<()> {
        match self.backend {
            StorageBackend::Memory => Ok(()),
            StorageBackend::File | StorageBackend::Sqlite if self.path.is_none() => {
                Err(config_error(format!("storage.path is required for the {} backend", self.backend)))
            }
            StorageBackend::File | StorageBackend::Sqlite => Ok(()),
        }
    }
}

/// Log output settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` takes precedence.
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), json: false }
    }
}

fn config_error(message: impl Into<String>) -> FieldSyncError {
    FieldSyncError::Config(message.into())
}
