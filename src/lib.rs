//! # Node Network Dashboard Core
//!
//! ## Overview
//! This library implements the request-governance core of a dashboard for a
//! distributed node network: every outbound call to the remote JSON API is
//! deduplicated and throttled, stale-but-valid responses are served when
//! fresh calls are disallowed or fail, and per-node lookups are coordinated
//! as small state machines with retries and cooldowns.
//!
//! ## Architecture
//! The system is composed of several key modules:
//! - `api`: HTTP client for the fixed set of remote endpoints
//! - `cache`: rate-limited TTL cache fronting every outbound call
//! - `mirror`: durable dataset mirror for instant repaints across restarts
//! - `resolver`: node-id / wallet-address cross-matching over the snapshot
//! - `lookup`: per-search orchestration with retries and cooldowns
//! - `poller`: heartbeat and overview refresh loops
//! - `history`: bounded, persisted query history
//! - `config`: configuration management and settings
//! - `errors`: centralized error handling and types
//!
//! ## Usage
//! ```rust,no_run
//! use std::sync::Arc;
//! use nodewatch::{ApiClient, Config, SystemClock};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_file("nodewatch.toml")?;
//!     let client = ApiClient::new(&config, Arc::new(SystemClock))?;
//!     let stats = client.network_stats().await?;
//!     println!("network stats: {stats}");
//!     Ok(())
//! }
//! ```

// Core modules
pub mod api;
pub mod cache;
pub mod clock;
pub mod config;
pub mod errors;
pub mod history;
pub mod lookup;
pub mod mirror;
pub mod poller;
pub mod resolver;
pub mod retry;

// Utilities
pub mod utils;

// Re-exports for convenience
pub use api::{ApiClient, Transport};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use errors::{DashboardError, Result};
pub use lookup::{FieldState, LookupOrchestrator, NodeReport, SearchOutcome, SessionState};
pub use mirror::DurableMirror;
pub use poller::DashboardPoller;
pub use resolver::{EntityResolver, ResolvedIdentity};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One record of the active-node snapshot.
///
/// The remote API is loose about field names; a record may carry its
/// identifier under `nodeId` or `id` and its wallet under `wallet`,
/// `address` or `walletAddress`. All fields are optional and unknown
/// fields are ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ActiveNode {
    pub node_id: Option<String>,
    pub id: Option<String>,
    pub wallet: Option<String>,
    pub address: Option<String>,
    pub wallet_address: Option<String>,
    pub node_status: Option<String>,
    pub status: Option<Value>,
    pub task_count: Option<u64>,
    pub last_polled_at: Option<String>,
    pub last_updated: Option<String>,
}

impl ActiveNode {
    /// The node identifier, preferring the `nodeId` spelling
    pub fn identifier(&self) -> Option<&str> {
        self.node_id.as_deref().or(self.id.as_deref())
    }

    /// The wallet address, preferring the `wallet` spelling
    pub fn best_address(&self) -> Option<&str> {
        self.wallet
            .as_deref()
            .or(self.address.as_deref())
            .or(self.wallet_address.as_deref())
    }

    /// Case-insensitive match of `query_lower` against either id field
    pub fn matches_id(&self, query_lower: &str) -> bool {
        [self.node_id.as_deref(), self.id.as_deref()]
            .into_iter()
            .flatten()
            .any(|v| v.to_lowercase() == query_lower)
    }

    /// Case-insensitive match of `query_lower` against any address field
    pub fn matches_address(&self, query_lower: &str) -> bool {
        [
            self.wallet.as_deref(),
            self.address.as_deref(),
            self.wallet_address.as_deref(),
        ]
        .into_iter()
        .flatten()
        .any(|v| v.to_lowercase() == query_lower)
    }
}
