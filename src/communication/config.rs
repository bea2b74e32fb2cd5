//! TOML configuration for the communication manager
//!
//! Every field has a default, so an empty file (or no file at all) yields a
//! working configuration. Keys are kebab-case:
//!
//! ```toml
//! [mbus]
//! port = 19100
//! max-pending-count = 1024
//! max-pending-size = 16777216
//! protocol-version = 1
//!
//! [rpc]
//! port = 19101
//!
//! [queue]
//! reply-priority = 1
//! poll-interval-ms = 100
//!
//! [generations]
//! grace-period-secs = 300
//!
//! [metrics]
//! interval-secs = 10
//!
//! [logging]
//! level = "info"
//! ```

use crate::communication::error::ConfigError;
use crate::queue::{Priority, FIXED_REPLY_PRIORITY};
use crate::transport::BusLimits;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

const MAX_POLL_INTERVAL_MS: u64 = 10_000;
const LOG_LEVELS: [&str; 6] = ["trace", "debug", "info", "warn", "error", "off"];

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct MbusConfig {
    pub port: u16,
    pub max_pending_count: u32,
    pub max_pending_size: u64,
    pub protocol_version: u32,
}

impl Default for MbusConfig {
    fn default() -> Self {
        Self {
            port: 19100,
            max_pending_count: 1024,
            max_pending_size: 16 * 1024 * 1024,
            protocol_version: crate::core::version::default_wire_protocol_version(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct RpcConfig {
    pub port: u16,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self { port: 19101 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct QueueConfig {
    pub reply_priority: Priority,
    pub poll_interval_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            reply_priority: FIXED_REPLY_PRIORITY,
            poll_interval_ms: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct GenerationConfig {
    pub grace_period_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            grace_period_secs: 300,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct MetricsConfig {
    pub interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: 10 }
    }
}

/// Log level of the running process; the command line takes precedence at
/// startup, later edits are applied live
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct LoggingConfig {
    pub level: Option<String>,
}

/// Complete communication manager configuration
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct CommunicationConfig {
    pub mbus: MbusConfig,
    pub rpc: RpcConfig,
    pub queue: QueueConfig,
    pub generations: GenerationConfig,
    pub metrics: MetricsConfig,
    pub logging: LoggingConfig,
}

impl CommunicationConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(contents).map_err(|e| ConfigError::Parse {
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a configuration file
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_toml_str(&contents)
    }

    /// `<config dir>/storcomm/storcomm.toml`, when the platform has a config dir
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("storcomm").join("storcomm.toml"))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mbus.max_pending_count == 0 {
            return Err(invalid("mbus.max-pending-count", "must be greater than zero"));
        }
        if self.mbus.max_pending_size == 0 {
            return Err(invalid("mbus.max-pending-size", "must be greater than zero"));
        }
        if self.mbus.protocol_version == 0 {
            return Err(invalid("mbus.protocol-version", "must be at least 1"));
        }
        if !(1..=MAX_POLL_INTERVAL_MS).contains(&self.queue.poll_interval_ms) {
            return Err(ConfigError::Invalid {
                field: "queue.poll-interval-ms",
                reason: format!("must be between 1 and {}", MAX_POLL_INTERVAL_MS),
            });
        }
        if self.metrics.interval_secs == 0 {
            return Err(invalid("metrics.interval-secs", "must be at least 1"));
        }
        if let Some(level) = &self.logging.level {
            if !LOG_LEVELS.contains(&level.as_str()) {
                return Err(ConfigError::Invalid {
                    field: "logging.level",
                    reason: format!("'{}' is not one of {}", level, LOG_LEVELS.join(", ")),
                });
            }
        }
        Ok(())
    }

    pub fn bus_limits(&self) -> BusLimits {
        BusLimits {
            max_pending_count: self.mbus.max_pending_count,
            max_pending_size: self.mbus.max_pending_size,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.queue.poll_interval_ms)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.generations.grace_period_secs)
    }

    pub fn metrics_interval(&self) -> Duration {
        Duration::from_secs(self.metrics.interval_secs)
    }
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.to_string(),
    }
}

/// A configuration snapshot tagged with a monotonically increasing generation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigUpdate {
    pub generation: u64,
    pub config: CommunicationConfig,
}

impl ConfigUpdate {
    pub fn new(generation: u64, config: CommunicationConfig) -> Self {
        Self { generation, config }
    }
}
