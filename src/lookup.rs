//! # Lookup Orchestration Module
//!
//! ## Purpose
//! Drive one node lookup end to end: validate the query, enforce the
//! per-query client cooldown, resolve identifiers, then fan out the
//! dependent detail calls with bounded retries. A cooldown the node itself
//! reports in its settled result blocks resubmissions of that query until
//! it lapses. Concurrent lookups supersede each other; only the newest
//! search may publish its result.
//!
//! ## Input/Output Specification
//! - **Input**: A raw user query (node id or wallet address)
//! - **Output**: A `SearchOutcome` carrying either a field-by-field
//!   `NodeReport`, a cooldown rejection, or a superseded marker
//! - **Guarantee**: A cooldown rejection performs no network calls
//!
//! ## Key Features
//! - Per-normalized-query cooldown, stamped on fresh submissions only
//! - Node-reported cooldowns, read off the settled cooldown field, outrank
//!   the client window on resubmission
//! - Each detail call retries timeouts on a fixed budget and settles as
//!   Failed afterwards; one dead field never aborts the report
//! - Secondary claim/log batch when the address only surfaces in the
//!   status payload

use crate::api::{endpoints, Transport};
use crate::clock::Clock;
use crate::config::Config;
use crate::errors::{DashboardError, Result};
use crate::history::QueryHistory;
use crate::resolver::EntityResolver;
use crate::retry::{retry_on, timeout_only, RetryPolicy};
use crate::utils::normalize_query;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Lifecycle of one lookup session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Resolving,
    Fetching,
    Settled,
    CoolingDown,
}

/// Terminal state of one detail field within a report
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldState {
    /// Not yet fetched
    Pending,
    /// Fetched successfully
    Loaded(Value),
    /// Fetch failed after the retry budget; carries the error text
    Failed(String),
    /// The identifier this field depends on was never established
    Skipped,
}

impl FieldState {
    pub fn is_loaded(&self) -> bool {
        matches!(self, FieldState::Loaded(_))
    }
}

/// Everything one settled lookup produced, field by field
#[derive(Debug, Clone)]
pub struct NodeReport {
    pub session_id: Uuid,
    pub state: SessionState,
    pub query: String,
    pub node_id: Option<String>,
    pub address: Option<String>,
    pub status: FieldState,
    pub mining: FieldState,
    pub cooldown: FieldState,
    pub claim: FieldState,
    pub log: FieldState,
    /// Seconds of node-reported cooldown carried by the settled cooldown
    /// field, when it reported one
    pub entity_cooldown_seconds: Option<u64>,
    pub settled_at: i64,
}

impl NodeReport {
    /// True when not a single field came back
    pub fn is_fully_failed(&self) -> bool {
        [
            &self.status,
            &self.mining,
            &self.cooldown,
            &self.claim,
            &self.log,
        ]
        .iter()
        .all(|f| !f.is_loaded())
    }
}

/// What one call to [`LookupOrchestrator::search`] produced
#[derive(Debug, Clone)]
pub enum SearchOutcome {
    /// The lookup settled; every field is terminal
    Report(NodeReport),
    /// Rejected before any network activity: the same query was submitted
    /// too recently
    CoolingDown { remaining_seconds: u64 },
    /// An earlier lookup of this query saw the node report its own
    /// cooldown; resubmission is rejected offline until it lapses
    NodeCoolingDown {
        node_id: String,
        remaining_seconds: u64,
    },
    /// A newer search started while this one was in flight; its result
    /// was discarded unpublished
    Superseded,
}

/// Coordinates lookups against the governed transport
pub struct LookupOrchestrator {
    transport: Arc<dyn Transport>,
    resolver: EntityResolver,
    clock: Arc<dyn Clock>,
    history: Option<QueryHistory>,
    retry: RetryPolicy,
    cooldown_ms: i64,
    /// normalized query -> cooldown expiry, epoch ms
    cooldowns: Mutex<HashMap<String, i64>>,
    /// normalized query -> (node id, node-reported cooldown expiry)
    node_cooldowns: Mutex<HashMap<String, (String, i64)>>,
    generation: AtomicU64,
    current: RwLock<Option<NodeReport>>,
}

impl LookupOrchestrator {
    pub fn new(
        transport: Arc<dyn Transport>,
        clock: Arc<dyn Clock>,
        config: &Config,
        history: Option<QueryHistory>,
    ) -> Result<Self> {
        let retry = RetryPolicy::new(
            config.search.timeout_retries,
            Duration::from_secs(config.search.retry_delay_seconds),
        );
        Ok(Self {
            resolver: EntityResolver::new(Arc::clone(&transport))?,
            transport,
            clock,
            history,
            retry,
            cooldown_ms: config.search.cooldown_seconds as i64 * 1000,
            cooldowns: Mutex::new(HashMap::new()),
            node_cooldowns: Mutex::new(HashMap::new()),
            generation: AtomicU64::new(0),
            current: RwLock::new(None),
        })
    }

    /// The most recently published report, if any
    pub fn current(&self) -> Option<NodeReport> {
        self.current.read().clone()
    }

    /// Run one lookup. Empty input fails before any network activity.
    pub async fn search(&self, query: &str) -> Result<SearchOutcome> {
        let trimmed = query.trim();
        if trimmed.is_empty() {
            return Err(DashboardError::MalformedInput {
                reason: "empty search query".to_string(),
            });
        }

        let normalized = normalize_query(trimmed);

        // A node-reported cooldown outranks the client-side anti-spam one.
        if let Some((node_id, remaining)) = self.tracked_node_cooldown(&normalized) {
            debug!(query = %normalized, %node_id, remaining, "node cooldown still active");
            return Ok(SearchOutcome::NodeCoolingDown {
                node_id,
                remaining_seconds: remaining,
            });
        }

        if let Some(remaining) = self.check_cooldown_window(&normalized) {
            debug!(query = %normalized, remaining, "lookup rejected by client cooldown");
            return Ok(SearchOutcome::CoolingDown {
                remaining_seconds: remaining,
            });
        }

        let session_id = Uuid::new_v4();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        info!(%session_id, query = %trimmed, "lookup started");

        if let Some(history) = &self.history {
            if let Err(e) = history.record(trimmed) {
                warn!(error = %e, "query history not recorded");
            }
        }

        // Resolving: snapshot failures degrade inside the resolver.
        let identity = self.resolver.resolve(trimmed).await?;
        debug!(?identity, "identity resolved");

        // Publish the session with every field pending so consumers can
        // paint partial progress while the calls are in flight.
        self.publish(
            generation,
            NodeReport {
                session_id,
                state: SessionState::Fetching,
                query: trimmed.to_string(),
                node_id: identity.node_id.clone(),
                address: identity.address.clone(),
                status: FieldState::Pending,
                mining: FieldState::Pending,
                cooldown: FieldState::Pending,
                claim: FieldState::Pending,
                log: FieldState::Pending,
                entity_cooldown_seconds: None,
                settled_at: self.clock.now_ms(),
            },
        );

        // Fetching: the id-keyed and address-keyed details run concurrently.
        let (status, mining, cooldown) = match &identity.node_id {
            Some(id) => tokio::join!(
                self.fetch_field(endpoints::polling_node_stats(id)),
                self.fetch_field(endpoints::mining_status(id)),
                self.fetch_field(endpoints::mining_cooldown(id)),
            ),
            None => (FieldState::Skipped, FieldState::Skipped, FieldState::Skipped),
        };

        // The address may only surface in the status payload.
        let address = identity
            .address
            .clone()
            .or_else(|| address_from_status(&status));

        let (claim, log) = match &address {
            Some(addr) => tokio::join!(
                self.fetch_field(endpoints::claim_status(addr)),
                self.fetch_field(endpoints::live_log(addr)),
            ),
            None => (FieldState::Skipped, FieldState::Skipped),
        };

        // The node's own cooldown arrives inside the cooldown result; when
        // active it blocks resubmissions of this query until it lapses.
        let entity_cooldown_seconds = entity_cooldown(&cooldown);
        if let Some(remaining) = entity_cooldown_seconds {
            if let Some(node_id) = &identity.node_id {
                info!(%node_id, remaining, "node reports an active cooldown");
                self.node_cooldowns.lock().insert(
                    normalized,
                    (node_id.clone(), self.clock.now_ms() + remaining as i64 * 1000),
                );
            }
        }

        let report = NodeReport {
            session_id,
            state: SessionState::Settled,
            query: trimmed.to_string(),
            node_id: identity.node_id,
            address,
            status,
            mining,
            cooldown,
            claim,
            log,
            entity_cooldown_seconds,
            settled_at: self.clock.now_ms(),
        };

        if !self.publish(generation, report.clone()) {
            info!(%session_id, "lookup superseded, result discarded");
            return Ok(SearchOutcome::Superseded);
        }

        if report.is_fully_failed() {
            warn!(%session_id, "lookup settled with every field failed or skipped");
        }
        Ok(SearchOutcome::Report(report))
    }

    /// Stamp the cooldown for a fresh submission, or report the seconds
    /// left on an active one. Expired entries are pruned in bulk.
    fn check_cooldown_window(&self, normalized: &str) -> Option<u64> {
        let now = self.clock.now_ms();
        let mut cooldowns = self.cooldowns.lock();
        cooldowns.retain(|_, expiry| *expiry > now);

        if let Some(expiry) = cooldowns.get(normalized) {
            let remaining_ms = expiry - now;
            return Some(((remaining_ms + 999) / 1000).max(1) as u64);
        }
        cooldowns.insert(normalized.to_string(), now + self.cooldown_ms);
        None
    }

    /// Seconds left on a previously observed node-reported cooldown for
    /// this query, with lapsed entries pruned
    fn tracked_node_cooldown(&self, normalized: &str) -> Option<(String, u64)> {
        let now = self.clock.now_ms();
        let mut node_cooldowns = self.node_cooldowns.lock();
        node_cooldowns.retain(|_, (_, expiry)| *expiry > now);
        node_cooldowns.get(normalized).map(|(node_id, expiry)| {
            (node_id.clone(), (((expiry - now) + 999) / 1000).max(1) as u64)
        })
    }

    async fn fetch_field(&self, path: String) -> FieldState {
        let result = retry_on(self.retry, timeout_only, || self.transport.get_json(&path)).await;
        match result {
            Ok(value) => FieldState::Loaded(value),
            Err(e) => {
                warn!(path, error = %e, "detail field settled as failed");
                FieldState::Failed(e.to_string())
            }
        }
    }

    /// Publish a settled report unless a newer search has started since.
    /// Returns false when the report was stale and dropped.
    fn publish(&self, generation: u64, report: NodeReport) -> bool {
        if self.generation.load(Ordering::SeqCst) != generation {
            return false;
        }
        *self.current.write() = Some(report);
        true
    }
}

/// Seconds of node-reported cooldown in a settled cooldown field, when the
/// payload flags one as active
fn entity_cooldown(cooldown: &FieldState) -> Option<u64> {
    let FieldState::Loaded(value) = cooldown else {
        return None;
    };
    let active = value
        .get("cooldownActive")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    if !active {
        return None;
    }
    Some(
        value
            .get("remainingCooldownSeconds")
            .and_then(Value::as_u64)
            .unwrap_or(0),
    )
}

/// Pull a wallet address out of a loaded status payload, if present
fn address_from_status(status: &FieldState) -> Option<String> {
    let FieldState::Loaded(value) = status else {
        return None;
    };
    ["walletAddress", "address", "wallet"]
        .iter()
        .find_map(|k| value.get(k).and_then(Value::as_str))
        .map(str::to_string)
}
