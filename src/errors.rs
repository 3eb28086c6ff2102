//! # Error Handling Module
//!
//! ## Purpose
//! Centralized error handling for the dashboard client core, providing the
//! error taxonomy shared by the cache, mirror, resolver and lookup layers.
//!
//! ## Input/Output Specification
//! - **Input**: Error conditions from network calls, storage, configuration
//! - **Output**: Structured error types with context and error chains
//! - **Error Categories**: Network, Cache, Storage, Lookup, Configuration
//!
//! ## Key Features
//! - Distinction between retryable and terminal failures
//! - Automatic conversion from transport and storage error types
//! - Rate-limit errors carry the remaining wait in whole seconds
//! - Structured logging integration

use thiserror::Error;

/// Result type used throughout the application
pub type Result<T> = std::result::Result<T, DashboardError>;

/// Error types for the dashboard client core
#[derive(Debug, Error)]
pub enum DashboardError {
    /// A call was attempted inside the per-key rate-limit window and no
    /// cached payload existed to fall back on
    #[error("Rate limit: please wait {retry_after_seconds}s before calling '{key}' again")]
    RateLimited {
        key: String,
        retry_after_seconds: u64,
    },

    /// A network call exceeded its bounded timeout
    #[error("Request timeout: '{key}' took too long to respond")]
    Timeout { key: String },

    /// Connectivity or transport failure other than a timeout
    #[error("Network error: {details}")]
    Network { details: String },

    /// The remote endpoint answered with a non-success HTTP status
    #[error("HTTP {status} from '{key}': {body}")]
    Http {
        key: String,
        status: u16,
        body: String,
    },

    /// Response body could not be decoded as JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Durable mirror / history storage failure
    #[error("Storage error: {0}")]
    Storage(#[from] sled::Error),

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Empty or invalid user query, rejected before any network activity
    #[error("Malformed input: {reason}")]
    MalformedInput { reason: String },

    /// Identifier could not be mapped between the id and address spaces
    #[error("Resolution failed for '{query}': {details}")]
    Resolution { query: String, details: String },

    /// TOML parsing errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Internal invariant violations
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DashboardError {
    /// Whether the failure is transient and worth retrying.
    ///
    /// The lookup orchestrator auto-retries timeouts only; rate limits are
    /// retryable by the user after the surfaced wait, everything else gets
    /// a dismiss-only affordance.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DashboardError::Timeout { .. } | DashboardError::RateLimited { .. }
        )
    }

    /// Whether this is the timeout variant (the only auto-retried kind)
    pub fn is_timeout(&self) -> bool {
        matches!(self, DashboardError::Timeout { .. })
    }

    /// Error category for metrics and logging
    pub fn category(&self) -> &'static str {
        match self {
            DashboardError::RateLimited { .. } | DashboardError::Timeout { .. } => "throttle",
            DashboardError::Network { .. } | DashboardError::Http { .. } => "network",
            DashboardError::Json(_) => "decode",
            DashboardError::Storage(_) => "storage",
            DashboardError::Config { .. } | DashboardError::Toml(_) => "configuration",
            DashboardError::MalformedInput { .. } | DashboardError::Resolution { .. } => "lookup",
            DashboardError::Internal { .. } => "internal",
        }
    }
}

impl From<std::io::Error> for DashboardError {
    fn from(err: std::io::Error) -> Self {
        DashboardError::Internal {
            message: format!("IO error: {}", err),
        }
    }
}

impl From<reqwest::Error> for DashboardError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            DashboardError::Timeout {
                key: err
                    .url()
                    .map(|u| u.path().to_string())
                    .unwrap_or_else(|| "<unknown>".to_string()),
            }
        } else {
            DashboardError::Network {
                details: err.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeouts_and_rate_limits_are_retryable() {
        let timeout = DashboardError::Timeout {
            key: "/mining/status/n1".to_string(),
        };
        assert!(timeout.is_retryable());
        assert!(timeout.is_timeout());

        let limited = DashboardError::RateLimited {
            key: "/lite/nodes/stats".to_string(),
            retry_after_seconds: 3,
        };
        assert!(limited.is_retryable());
        assert!(!limited.is_timeout());

        let network = DashboardError::Network {
            details: "connection refused".to_string(),
        };
        assert!(!network.is_retryable());
    }

    #[test]
    fn categories_cover_the_taxonomy() {
        let err = DashboardError::MalformedInput {
            reason: "empty query".to_string(),
        };
        assert_eq!(err.category(), "lookup");
        assert_eq!(
            DashboardError::Network {
                details: String::new()
            }
            .category(),
            "network"
        );
    }
}
