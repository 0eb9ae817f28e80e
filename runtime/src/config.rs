//! Store configuration.
//!
//! Loaded from environment variables with defaults for anything unset.
//!
//! | Variable | Default |
//! |----------|---------|
//! | `QUEUE_LOG_LEVEL` | `info` |
//! | `QUEUE_SHUTDOWN_TIMEOUT_SECS` | `30` |
//! | `QUEUE_METRICS_ENABLED` | `false` |
//! | `QUEUE_METRICS_ADDR` | `0.0.0.0:9090` |

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

/// Invalid configuration value
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid value for {variable}: '{value}'")]
pub struct ConfigError {
    /// Environment variable name
    pub variable: &'static str,
    /// Rejected value
    pub value: String,
}

/// Configuration for [`QueueStore`](crate::QueueStore) instances
///
/// # Example
///
/// ```ignore
/// let config = StoreConfig::default()
///     .with_shutdown_timeout(Duration::from_secs(10))
///     .with_metrics_addr("127.0.0.1:9100".parse()?);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Log filter used when `RUST_LOG` is unset (trace, debug, info, warn, error)
    pub log_level: String,
    /// Default timeout for graceful shutdown
    pub shutdown_timeout: Duration,
    /// Whether to install the Prometheus exporter
    pub metrics_enabled: bool,
    /// Prometheus exporter address
    pub metrics_addr: SocketAddr,
}

impl StoreConfig {
    /// Load configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a variable is set to an unparseable value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through `lookup` instead of the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a variable is set to an unparseable value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let log_level = lookup("QUEUE_LOG_LEVEL").unwrap_or(defaults.log_level);
        let shutdown_timeout = parse(&lookup, "QUEUE_SHUTDOWN_TIMEOUT_SECS")?
            .map_or(defaults.shutdown_timeout, Duration::from_secs);
        let metrics_enabled =
            parse(&lookup, "QUEUE_METRICS_ENABLED")?.unwrap_or(defaults.metrics_enabled);
        let metrics_addr = parse(&lookup, "QUEUE_METRICS_ADDR")?.unwrap_or(defaults.metrics_addr);

        Ok(Self {
            log_level,
            shutdown_timeout,
            metrics_enabled,
            metrics_addr,
        })
    }

    /// Set the log level
    #[must_use]
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Set the default shutdown timeout
    #[must_use]
    pub const fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Enable the Prometheus exporter on `addr`
    #[must_use]
    pub const fn with_metrics_addr(mut self, addr: SocketAddr) -> Self {
        self.metrics_enabled = true;
        self.metrics_addr = addr;
        self
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            shutdown_timeout: Duration::from_secs(30),
            metrics_enabled: false,
            metrics_addr: SocketAddr::from(([0, 0, 0, 0], 9090)),
        }
    }
}

fn parse<T, F>(lookup: &F, variable: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    lookup(variable)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError { variable, value })
        })
        .transpose()
}
