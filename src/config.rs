//! Configuration management
//!
//! TOML configuration file support with environment variable overrides and
//! defaults suitable for a standard collection run.
//!
//! ```toml
//! [discovery]
//! cluster_name = "prod-eu"
//! max_scrape_interval = "1m15s"
//!
//! [logging]
//! level = "info"
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::range::Range;
use crate::rearrange::Discovery;

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Config {
    /// Collection window settings
    #[serde(default)]
    pub discovery: DiscoveryConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Collection window settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DiscoveryConfig {
    /// Cluster name attached to every discovery
    #[serde(default)]
    pub cluster_name: String,

    /// Jitter tolerance at the window edges
    #[serde(
        default = "default_max_scrape_interval",
        skip_serializing_if = "Option::is_none",
        with = "crate::duration::serde_opt"
    )]
    pub max_scrape_interval: Option<Duration>,
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level or filter directive (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Include the event target in log lines
    #[serde(default = "default_true")]
    pub with_target: bool,
}

fn default_max_scrape_interval() -> Option<Duration> {
    Some(Duration::from_secs(75))
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_true() -> bool {
    true
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            cluster_name: String::new(),
            max_scrape_interval: default_max_scrape_interval(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            with_target: true,
        }
    }
}

impl DiscoveryConfig {
    /// Discovery for a collection run over `range`
    pub fn discovery(&self, range: Range) -> Discovery {
        Discovery::new(self.cluster_name.clone(), range, self.max_scrape_interval)
    }
}

impl Config {
    /// Load configuration from TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;

        toml::from_str(&contents).map_err(|e| {
            Error::Configuration(format!(
                "Failed to parse config file {}: {}",
                path.display(),
                e
            ))
        })
    }

    /// Load configuration with environment variable overrides
    pub fn from_file_with_env(path: impl AsRef<Path>) -> Result<Self> {
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from environment variables only
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    /// Apply environment variable overrides
    ///
    /// - `KUBA_LABELS_CLUSTER_NAME`
    /// - `KUBA_LABELS_MAX_SCRAPE_INTERVAL_SECS` (`0` disables edge snapping)
    /// - `RUST_LOG`
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from `lookup`, keyed by environment variable name
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(name) = lookup("KUBA_LABELS_CLUSTER_NAME") {
            self.discovery.cluster_name = name;
        }
        if let Some(secs) = lookup("KUBA_LABELS_MAX_SCRAPE_INTERVAL_SECS") {
            if let Ok(s) = secs.parse::<u64>() {
                self.discovery.max_scrape_interval = Some(Duration::from_secs(s));
            }
        }

        if let Some(log_level) = lookup("RUST_LOG") {
            self.logging.level = log_level;
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.logging.level.trim().is_empty() {
            return Err(Error::Configuration("Log level cannot be empty".to_string()));
        }
        if let Some(d) = self.discovery.max_scrape_interval {
            if d > Duration::from_secs(24 * 3600) {
                return Err(Error::Configuration(
                    "Max scrape interval cannot exceed 24h".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Save configuration to TOML file
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Serialization(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, contents)?;
        Ok(())
    }
}
