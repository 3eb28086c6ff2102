//! # Configuration Management Module
//!
//! ## Purpose
//! Centralized configuration for the dashboard client core: the remote API
//! endpoint, cache and rate-limit windows, mirror storage, search cooldowns
//! and polling cadence, with validation and type-safe access.
//!
//! ## Input/Output Specification
//! - **Input**: Configuration files (TOML), environment variables
//! - **Output**: Validated configuration structs with defaults and overrides
//! - **Validation**: Range checks and dependency verification
//!
//! ## Configuration Sources (in order of precedence)
//! 1. Environment variables (`NODEWATCH_*`)
//! 2. Configuration file
//! 3. Default values

use crate::errors::{DashboardError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure containing all system settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Remote node API settings
    pub api: ApiConfig,
    /// Rate-limited cache behavior
    pub cache: CacheConfig,
    /// Durable mirror storage
    pub mirror: MirrorConfig,
    /// Search / lookup orchestration
    pub search: SearchConfig,
    /// Polling cadence
    pub polling: PollingConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Remote node API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the node network API
    pub base_url: String,
    /// Request timeout in seconds for data fetches
    pub request_timeout_seconds: u64,
    /// Timeout in seconds for the lightweight heartbeat probe
    pub heartbeat_timeout_seconds: u64,
}

/// Rate-limited cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// How long a cached payload counts as fresh, in seconds
    pub ttl_seconds: u64,
    /// Minimum interval between network calls to the same key, in seconds
    pub rate_limit_seconds: u64,
}

/// Durable mirror configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MirrorConfig {
    /// Sled database path for mirrored datasets and query history
    pub db_path: PathBuf,
    /// Default TTL for mirrored datasets, in seconds
    pub default_ttl_seconds: u64,
    /// Gzip-compress mirrored records on disk
    pub enable_compression: bool,
}

/// Search / lookup orchestration configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Client-side anti-spam cooldown per normalized query, in seconds
    pub cooldown_seconds: u64,
    /// Automatic retries for a dependent call that times out
    pub timeout_retries: u32,
    /// Fixed delay between timeout retries, in seconds
    pub retry_delay_seconds: u64,
    /// Maximum persisted query-history entries
    pub history_limit: usize,
}

/// Polling cadence configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Heartbeat probe interval, in seconds
    pub heartbeat_interval_seconds: u64,
    /// Dashboard overview refresh interval, in seconds
    pub refresh_interval_seconds: u64,
    /// Whether the refresh loop runs at all
    pub auto_refresh: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Enable structured JSON logging
    pub json_format: bool,
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        Self::from_file("nodewatch.toml")
    }

    /// Load configuration from a specific file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::warn!("Configuration file not found: {:?}, using defaults", path);
            let mut config = Self::default();
            config.apply_env_overrides()?;
            config.validate()?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(path).map_err(|e| DashboardError::Config {
            message: format!("Failed to read config file {:?}: {}", path, e),
        })?;

        let mut config: Config = toml::from_str(&content)?;

        config.apply_env_overrides()?;
        config.validate()?;

        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(base_url) = std::env::var("NODEWATCH_BASE_URL") {
            self.api.base_url = base_url;
        }
        if let Ok(db_path) = std::env::var("NODEWATCH_DB_PATH") {
            self.mirror.db_path = PathBuf::from(db_path);
        }
        if let Ok(level) = std::env::var("NODEWATCH_LOG_LEVEL") {
            self.logging.level = level;
        }
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.api.base_url.is_empty() {
            return Err(DashboardError::Config {
                message: "api.base_url cannot be empty".to_string(),
            });
        }

        if self.api.request_timeout_seconds == 0 {
            return Err(DashboardError::Config {
                message: "api.request_timeout_seconds must be greater than zero".to_string(),
            });
        }

        if self.cache.ttl_seconds < self.cache.rate_limit_seconds {
            return Err(DashboardError::Config {
                message: "cache.ttl_seconds cannot be shorter than cache.rate_limit_seconds"
                    .to_string(),
            });
        }

        if self.search.history_limit == 0 {
            return Err(DashboardError::Config {
                message: "search.history_limit must be greater than zero".to_string(),
            });
        }

        Ok(())
    }

    /// Request timeout as a [`Duration`]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.api.request_timeout_seconds)
    }

    /// Heartbeat timeout as a [`Duration`]
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_secs(self.api.heartbeat_timeout_seconds)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiConfig {
                base_url: "https://node.netrumlabs.dev".to_string(),
                request_timeout_seconds: 30,
                heartbeat_timeout_seconds: 5,
            },
            cache: CacheConfig {
                ttl_seconds: 30,
                rate_limit_seconds: 5,
            },
            mirror: MirrorConfig {
                db_path: PathBuf::from("./data/nodewatch.db"),
                default_ttl_seconds: 30,
                enable_compression: false,
            },
            search: SearchConfig {
                cooldown_seconds: 30,
                timeout_retries: 3,
                retry_delay_seconds: 2,
                history_limit: 10,
            },
            polling: PollingConfig {
                heartbeat_interval_seconds: 30,
                refresh_interval_seconds: 300,
                auto_refresh: true,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                json_format: false,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.cache.ttl_seconds, 30);
        assert_eq!(config.cache.rate_limit_seconds, 5);
        assert_eq!(config.search.cooldown_seconds, 30);
        assert_eq!(config.search.history_limit, 10);
    }

    #[test]
    fn ttl_shorter_than_rate_limit_is_rejected() {
        let mut config = Config::default();
        config.cache.ttl_seconds = 2;
        assert!(config.validate().is_err());
    }

    #[test]
    fn empty_base_url_is_rejected() {
        let mut config = Config::default();
        config.api.base_url.clear();
        assert!(config.validate().is_err());
    }
}
