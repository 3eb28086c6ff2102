//! # Rate-Limited Cache Module
//!
//! ## Purpose
//! Front every outbound call to a named remote endpoint with a two-tier
//! policy: a short TTL cache for the warm path, then a per-key rate-limit
//! window that serves stale data instead of hammering the remote service.
//!
//! ## Input/Output Specification
//! - **Input**: Endpoint key (path plus embedded parameters) and a network
//!   call to run when one is allowed
//! - **Output**: The freshest usable JSON payload, or a throttle error when
//!   no usable data exists
//! - **Policy**: TTL hit → cached; inside rate window → stale-if-any else
//!   `RateLimited`; otherwise call, falling back to any-age cache on failure
//!
//! ## Key Features
//! - Per-key payload and call-timestamp bookkeeping
//! - Stale-on-error fallback so prior data always beats a hard failure
//! - Injectable clock for deterministic tests
//! - Hit/miss statistics for logging

use crate::clock::Clock;
use crate::errors::{DashboardError, Result};
use dashmap::DashMap;
use serde_json::Value;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Most recent successfully fetched payload for one endpoint key
#[derive(Debug, Clone)]
struct CacheEntry {
    payload: Value,
    fetched_at: i64,
}

/// Cache hit/miss counters
#[derive(Debug, Default)]
pub struct CacheStats {
    pub fresh_hits: AtomicU64,
    pub stale_served: AtomicU64,
    pub network_calls: AtomicU64,
    pub rate_limited: AtomicU64,
}

impl CacheStats {
    pub fn snapshot(&self) -> (u64, u64, u64, u64) {
        (
            self.fresh_hits.load(Ordering::Relaxed),
            self.stale_served.load(Ordering::Relaxed),
            self.network_calls.load(Ordering::Relaxed),
            self.rate_limited.load(Ordering::Relaxed),
        )
    }
}

/// Rate-limited TTL cache keyed by endpoint path
pub struct RateLimitedCache {
    entries: DashMap<String, CacheEntry>,
    last_call: DashMap<String, i64>,
    ttl_ms: i64,
    rate_limit_ms: i64,
    clock: Arc<dyn Clock>,
    stats: CacheStats,
}

impl RateLimitedCache {
    /// Create a cache with the given windows (both in milliseconds)
    pub fn new(ttl_ms: i64, rate_limit_ms: i64, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            last_call: DashMap::new(),
            ttl_ms,
            rate_limit_ms,
            clock,
            stats: CacheStats::default(),
        }
    }

    /// Fetch the payload for `key`, running `call` only when policy allows.
    ///
    /// Concurrent fetches for the same key are not deduplicated; each one
    /// sees the policy independently.
    pub async fn fetch<F, Fut>(&self, key: &str, call: F) -> Result<Value>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value>>,
    {
        let now = self.clock.now_ms();

        // Warm path: fresh cached payload wins before anything else.
        if let Some(entry) = self.entries.get(key) {
            if now - entry.fetched_at < self.ttl_ms {
                self.stats.fresh_hits.fetch_add(1, Ordering::Relaxed);
                return Ok(entry.payload.clone());
            }
        }

        if let Some(called_at) = self.last_call.get(key).map(|v| *v.value()) {
            let elapsed = now - called_at;
            if elapsed < self.rate_limit_ms {
                if let Some(entry) = self.entries.get(key) {
                    debug!(key, "rate window open, serving stale payload");
                    self.stats.stale_served.fetch_add(1, Ordering::Relaxed);
                    return Ok(entry.payload.clone());
                }
                let retry_after_seconds = div_ceil_ms(self.rate_limit_ms - elapsed);
                self.stats.rate_limited.fetch_add(1, Ordering::Relaxed);
                return Err(DashboardError::RateLimited {
                    key: key.to_string(),
                    retry_after_seconds,
                });
            }
        }

        // The attempt reaches the network, so it counts against the rate
        // window whether or not it succeeds.
        self.last_call.insert(key.to_string(), now);
        self.stats.network_calls.fetch_add(1, Ordering::Relaxed);

        match call().await {
            Ok(payload) => {
                let fetched_at = self.clock.now_ms();
                self.last_call.insert(key.to_string(), fetched_at);
                self.entries.insert(
                    key.to_string(),
                    CacheEntry {
                        payload: payload.clone(),
                        fetched_at,
                    },
                );
                Ok(payload)
            }
            Err(err) => {
                if let Some(entry) = self.entries.get(key) {
                    warn!(key, error = %err, "fetch failed, serving cached payload");
                    self.stats.stale_served.fetch_add(1, Ordering::Relaxed);
                    return Ok(entry.payload.clone());
                }
                Err(err)
            }
        }
    }

    /// Whether any payload (fresh or stale) exists for `key`
    pub fn has_entry(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }
}

/// Remaining milliseconds rounded up to whole seconds
fn div_ceil_ms(remaining_ms: i64) -> u64 {
    ((remaining_ms + 999) / 1000).max(1) as u64
}
