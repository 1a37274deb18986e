//! Configuration loading for sync-server.
//!
//! Configuration is loaded from a TOML file (default: `unicloud.toml`).

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration for sync-server.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// HTTP server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Storage configuration.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Background job configuration.
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// Event lifecycle configuration.
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address for the HTTP server (default: 0.0.0.0:8080).
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

/// Storage configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Path to SQLite database file.
    #[serde(default = "default_database_path")]
    pub database: PathBuf,
}

/// Longest accepted job interval, in seconds (one year).
pub const MAX_INTERVAL_SECS: u64 = 366 * 24 * 60 * 60;

/// Background job configuration.
///
/// An interval of zero disables that job. Intervals above
/// [`MAX_INTERVAL_SECS`] are rejected by [`SchedulerConfig::validate`].
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    /// Run background jobs at all (default: true).
    #[serde(default = "default_scheduler_enabled")]
    pub enabled: bool,
    /// Sync-status refresh interval in seconds (default: 60).
    #[serde(default = "default_status_interval")]
    pub status_interval_secs: u64,
    /// Share size refresh interval in seconds (default: 6 hours).
    #[serde(default = "default_size_interval")]
    pub size_interval_secs: u64,
    /// Log retention interval in seconds (default: 12 hours).
    #[serde(default = "default_retention_interval")]
    pub retention_interval_secs: u64,
    /// Number of most recent event ids whose log text is kept (default: 5000).
    #[serde(default = "default_max_log_events")]
    pub max_log_events: u64,
}

/// Event lifecycle configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LifecycleConfig {
    /// Mark every still-open event as interrupted when the engine starts
    /// (default: true).
    #[serde(default = "default_recover_on_start")]
    pub recover_on_start: bool,
}

// Default value functions
fn default_bind_address() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_database_path() -> PathBuf {
    PathBuf::from("unicloud.db")
}

fn default_scheduler_enabled() -> bool {
    true
}

fn default_status_interval() -> u64 {
    60
}

fn default_size_interval() -> u64 {
    6 * 60 * 60
}

fn default_retention_interval() -> u64 {
    12 * 60 * 60
}

fn default_max_log_events() -> u64 {
    5000
}

fn default_recover_on_start() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database: default_database_path(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: default_scheduler_enabled(),
            status_interval_secs: default_status_interval(),
            size_interval_secs: default_size_interval(),
            retention_interval_secs: default_retention_interval(),
            max_log_events: default_max_log_events(),
        }
    }
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            recover_on_start: default_recover_on_start(),
        }
    }
}

impl SchedulerConfig {
    /// Sync-status refresh period, `None` when disabled.
    pub fn status_interval(&self) -> Option<Duration> {
        non_zero_secs(self.status_interval_secs)
    }

    /// Share size refresh period, `None` when disabled.
    pub fn size_interval(&self) -> Option<Duration> {
        non_zero_secs(self.size_interval_secs)
    }

    /// Log retention period, `None` when disabled.
    pub fn retention_interval(&self) -> Option<Duration> {
        non_zero_secs(self.retention_interval_secs)
    }

    /// Check that every interval is in range.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] naming the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let intervals = [
            ("scheduler.status_interval_secs", self.status_interval_secs),
            ("scheduler.size_interval_secs", self.size_interval_secs),
            ("scheduler.retention_interval_secs", self.retention_interval_secs),
        ];
        for (field, secs) in intervals {
            if secs > MAX_INTERVAL_SECS {
                return Err(ConfigError::InvalidValue {
                    field,
                    reason: format!("{secs}s exceeds the maximum of {MAX_INTERVAL_SECS}s"),
                });
            }
        }
        Ok(())
    }
}

fn non_zero_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or holds an
    /// out-of-range value.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })?;
        config.scheduler.validate()?;
        Ok(config)
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
    /// A value parsed but is out of range.
    #[error("invalid {field}: {reason}")]
    InvalidValue {
        /// Dotted name of the offending field.
        field: &'static str,
        /// Why it was rejected.
        reason: String,
    },
}
