//! # Entity Resolver Module
//!
//! ## Purpose
//! Reconcile the two identifier spaces of the node network, node ids and
//! wallet-style addresses, using the active-node snapshot, so dependent
//! calls that need "the other" identifier can be issued.
//!
//! ## Input/Output Specification
//! - **Input**: A user query (node id or `0x` + 40 hex address) and,
//!   optionally, a pre-fetched snapshot
//! - **Output**: Whichever of `{node_id, address}` could be established;
//!   both absent means degraded mode for the caller
//! - **Matching**: Exact case-insensitive equality first; heuristic
//!   address-prefix fallback second (first match wins, no uniqueness
//!   guarantee)
//!
//! ## Key Features
//! - Snapshot-fetch failures degrade to "no snapshot", never abort
//! - The snapshot is treated as immutable once fetched within one lookup

use crate::api::Transport;
use crate::errors::{DashboardError, Result};
use crate::ActiveNode;
use regex::Regex;
use std::sync::Arc;
use tracing::{debug, warn};

/// How a raw query string was classified
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    /// `0x` followed by 40 hexadecimal characters
    Address,
    /// Anything else is treated as a node identifier
    NodeId,
}

/// Outcome of identifier resolution; either side may be absent
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedIdentity {
    pub node_id: Option<String>,
    pub address: Option<String>,
}

/// Cross-matcher between node ids and wallet addresses
pub struct EntityResolver {
    transport: Arc<dyn Transport>,
    address_pattern: Regex,
}

impl EntityResolver {
    pub fn new(transport: Arc<dyn Transport>) -> Result<Self> {
        let address_pattern =
            Regex::new(r"^0x[a-fA-F0-9]{40}$").map_err(|e| DashboardError::Internal {
                message: format!("address pattern failed to compile: {e}"),
            })?;
        Ok(Self {
            transport,
            address_pattern,
        })
    }

    /// Classify a query as an address or a node identifier
    pub fn classify(&self, query: &str) -> QueryKind {
        if self.address_pattern.is_match(query) {
            QueryKind::Address
        } else {
            QueryKind::NodeId
        }
    }

    /// Fetch the active-node snapshot through the governed transport.
    /// Failure degrades to an empty snapshot.
    pub async fn fetch_snapshot(&self) -> Vec<ActiveNode> {
        match self
            .transport
            .get_json(crate::api::endpoints::ACTIVE_NODES)
            .await
            .and_then(crate::api::normalize::<ActiveNode>)
        {
            Ok(nodes) => nodes,
            Err(e) => {
                warn!(error = %e, "active-node snapshot unavailable, resolving degraded");
                Vec::new()
            }
        }
    }

    /// Resolve `query` against `snapshot`.
    ///
    /// The known side of the identity is always filled from the query
    /// itself; the complementary side is filled only when a snapshot match
    /// establishes it.
    pub fn resolve_with_snapshot(
        &self,
        query: &str,
        snapshot: &[ActiveNode],
    ) -> Result<ResolvedIdentity> {
        let query_lower = query.to_lowercase();

        match self.classify(query) {
            QueryKind::Address => {
                let mut identity = ResolvedIdentity {
                    node_id: None,
                    address: Some(query.to_string()),
                };

                if let Some(node) = snapshot.iter().find(|n| n.matches_address(&query_lower)) {
                    identity.node_id = node.identifier().map(str::to_string);
                    return Ok(identity);
                }

                // Heuristic fallback: a short prefix of the address body may
                // still land on the right node. First match only; several
                // candidates are possible and no uniqueness is assumed.
                let prefix = &query_lower[2..10.min(query_lower.len())];
                if let Some(node) = snapshot.iter().find(|n| {
                    n.best_address()
                        .map(|a| a.to_lowercase().contains(prefix))
                        .unwrap_or(false)
                }) {
                    debug!(prefix, "address resolved via prefix heuristic");
                    identity.node_id = node.identifier().map(str::to_string);
                }

                Ok(identity)
            }
            QueryKind::NodeId => {
                let mut identity = ResolvedIdentity {
                    node_id: Some(query.to_string()),
                    address: None,
                };

                if let Some(node) = snapshot.iter().find(|n| n.matches_id(&query_lower)) {
                    identity.address = node.best_address().map(str::to_string);
                }

                Ok(identity)
            }
        }
    }

    /// Convenience wrapper: fetch the snapshot, then resolve against it
    pub async fn resolve(&self, query: &str) -> Result<ResolvedIdentity> {
        let snapshot = self.fetch_snapshot().await;
        self.resolve_with_snapshot(query, &snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{DashboardError, Result};
    use async_trait::async_trait;
    use serde_json::{json, Value};

    struct StaticTransport(Value);

    #[async_trait]
    impl Transport for StaticTransport {
        async fn get_json(&self, _path: &str) -> Result<Value> {
            Ok(self.0.clone())
        }
    }

    struct FailingTransport;

    #[async_trait]
    impl Transport for FailingTransport {
        async fn get_json(&self, path: &str) -> Result<Value> {
            Err(DashboardError::Timeout {
                key: path.to_string(),
            })
        }
    }

    const ADDRESS: &str = "0xAbCdEf0123456789aBcDeF0123456789ABCDEF01";

    fn resolver_with(snapshot: Value) -> EntityResolver {
        EntityResolver::new(Arc::new(StaticTransport(snapshot))).unwrap()
    }

    #[test]
    fn classification_follows_the_address_pattern() {
        let resolver = resolver_with(json!([]));
        assert_eq!(resolver.classify(ADDRESS), QueryKind::Address);
        assert_eq!(resolver.classify("0x123"), QueryKind::NodeId);
        assert_eq!(
            resolver.classify("netrum.lite.node-abc123.base.eth"),
            QueryKind::NodeId
        );
    }

    #[tokio::test]
    async fn address_query_matches_node_case_insensitively() {
        let resolver = resolver_with(json!([
            {"nodeId": "N1", "wallet": ADDRESS}
        ]));

        let identity = resolver.resolve(&ADDRESS.to_lowercase()).await.unwrap();
        assert_eq!(identity.node_id.as_deref(), Some("N1"));
        assert_eq!(identity.address.as_deref(), Some(ADDRESS.to_lowercase()).as_deref());
    }

    #[tokio::test]
    async fn node_id_query_picks_up_the_wallet() {
        let resolver = resolver_with(json!({"nodes": [
            {"id": "node-7", "address": ADDRESS}
        ]}));

        let identity = resolver.resolve("NODE-7").await.unwrap();
        assert_eq!(identity.node_id.as_deref(), Some("NODE-7"));
        assert_eq!(identity.address.as_deref(), Some(ADDRESS));
    }

    #[tokio::test]
    async fn empty_snapshot_degrades_to_the_query_side_only() {
        let resolver = resolver_with(json!([]));

        let identity = resolver.resolve("n-unknown").await.unwrap();
        assert_eq!(identity.node_id.as_deref(), Some("n-unknown"));
        assert!(identity.address.is_none());
    }

    #[tokio::test]
    async fn snapshot_fetch_failure_degrades_instead_of_aborting() {
        let resolver = EntityResolver::new(Arc::new(FailingTransport)).unwrap();

        let identity = resolver.resolve(ADDRESS).await.unwrap();
        assert_eq!(identity.address.as_deref(), Some(ADDRESS));
        assert!(identity.node_id.is_none());
    }

    #[test]
    fn prefix_fallback_returns_the_first_match_only() {
        let resolver = resolver_with(json!([]));
        let snapshot: Vec<ActiveNode> = crate::api::normalize(json!([
            {"nodeId": "other", "wallet": "0x9999999999999999999999999999999999999999"},
            {"nodeId": "first", "wallet": format!("0x00{}", &ADDRESS.to_lowercase()[2..10])},
            {"nodeId": "second", "wallet": format!("0x11{}", &ADDRESS.to_lowercase()[2..10])}
        ]))
        .unwrap();

        let identity = resolver.resolve_with_snapshot(ADDRESS, &snapshot).unwrap();
        assert_eq!(identity.node_id.as_deref(), Some("first"));
    }
}
