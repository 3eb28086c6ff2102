//! # Remote API Client Module
//!
//! ## Purpose
//! Typed client for the node network's JSON HTTP API. Every data fetch is
//! routed through the rate-limited cache keyed by endpoint path, so callers
//! get the governance policy for free.
//!
//! ## Input/Output Specification
//! - **Input**: Endpoint paths (a fixed set, some parameterized by node id
//!   or wallet address)
//! - **Output**: Opaque JSON payloads, passed through unmodified except for
//!   envelope normalization of list-shaped responses
//! - **Timeouts**: 30s per data fetch, 5s for the heartbeat probe
//!
//! ## Key Features
//! - One method per remote endpoint
//! - Envelope normalization (`[...]` vs `{nodes:[...]}` vs `{data:[...]}`)
//! - `Transport` seam so the resolver and orchestrator can be driven by a
//!   fake in tests
//! - Heartbeat probe that bypasses the cache entirely

use crate::cache::RateLimitedCache;
use crate::clock::Clock;
use crate::config::Config;
use crate::errors::{DashboardError, Result};
use crate::ActiveNode;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Path templates for the remote API
pub mod endpoints {
    pub const SERVICE_STATUS: &str = "/";
    pub const NETWORK_STATS: &str = "/lite/nodes/stats";
    pub const ACTIVE_NODES: &str = "/lite/nodes/active";
    pub const REGISTRATION_STATUS: &str = "/register/status";
    pub const REQUIREMENTS: &str = "/metrics/requirements";
    pub const SYSTEM_INFO: &str = "/system/info";
    pub const VERSION: &str = "/version";

    pub fn node_by_id(id: &str) -> String {
        format!("/lite/nodes/id/{id}")
    }

    pub fn polling_node_stats(id: &str) -> String {
        format!("/polling/node-stats/{id}")
    }

    pub fn check_cooldown(id: &str) -> String {
        format!("/metrics/check-cooldown/{id}")
    }

    pub fn node_status(id: &str) -> String {
        format!("/metrics/node-status/{id}")
    }

    pub fn mining_status(id: &str) -> String {
        format!("/mining/status/{id}")
    }

    pub fn mining_cooldown(id: &str) -> String {
        format!("/mining/cooldown/{id}")
    }

    pub fn live_log(address: &str) -> String {
        format!("/live-log/status/{address}")
    }

    pub fn claim_status(address: &str) -> String {
        format!("/claim/status/{address}")
    }

    pub fn claim_history(address: &str) -> String {
        format!("/claim/history/{address}")
    }
}

/// Seam through which the resolver and lookup orchestrator issue calls
#[async_trait]
pub trait Transport: Send + Sync {
    /// Fetch the JSON payload for one endpoint path, subject to the
    /// governance policy of the implementation
    async fn get_json(&self, path: &str) -> Result<Value>;
}

/// List-shaped response in any of the wire formats the API emits.
///
/// The bare-array variant must come first so untagged deserialization
/// prefers it.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum Envelope<T> {
    List(Vec<T>),
    Nodes { nodes: Vec<T> },
    Data { data: Vec<T> },
}

impl<T> Envelope<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            Envelope::List(items) => items,
            Envelope::Nodes { nodes } => nodes,
            Envelope::Data { data } => data,
        }
    }
}

/// Normalize any of the three envelope shapes into a plain sequence
pub fn normalize<T: DeserializeOwned>(value: Value) -> Result<Vec<T>> {
    let envelope: Envelope<T> = serde_json::from_value(value)?;
    Ok(envelope.into_vec())
}

/// HTTP client for the node network API
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    cache: Arc<RateLimitedCache>,
    heartbeat_timeout: Duration,
    retry_after_fallback: u64,
}

impl ApiClient {
    /// Build a client from configuration, sharing the injected clock with
    /// the rate-limited cache
    pub fn new(config: &Config, clock: Arc<dyn Clock>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .user_agent("nodewatch/0.1")
            .build()
            .map_err(|e| DashboardError::Network {
                details: e.to_string(),
            })?;

        let cache = Arc::new(RateLimitedCache::new(
            config.cache.ttl_seconds as i64 * 1000,
            config.cache.rate_limit_seconds as i64 * 1000,
            clock,
        ));

        Ok(Self {
            http,
            base_url: config.api.base_url.trim_end_matches('/').to_string(),
            cache,
            heartbeat_timeout: config.heartbeat_timeout(),
            retry_after_fallback: config.cache.rate_limit_seconds,
        })
    }

    /// Raw HTTP GET without cache involvement
    async fn http_get(&self, path: &str) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        debug!(%url, "issuing request");

        let response = self.http.get(&url).send().await.map_err(|e| {
            if e.is_timeout() {
                DashboardError::Timeout {
                    key: path.to_string(),
                }
            } else {
                DashboardError::Network {
                    details: e.to_string(),
                }
            }
        })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_seconds = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
                .unwrap_or(self.retry_after_fallback);
            warn!(path, retry_after_seconds, "remote rate limit hit");
            return Err(DashboardError::RateLimited {
                key: path.to_string(),
                retry_after_seconds,
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DashboardError::Http {
                key: path.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        let payload: Value = response.json().await.map_err(|e| DashboardError::Network {
            details: format!("invalid JSON body from {path}: {e}"),
        })?;
        Ok(payload)
    }

    /// Cheap connectivity probe against the service root. Bypasses the
    /// cache so the answer reflects the network right now.
    pub async fn heartbeat(&self) -> bool {
        let url = format!("{}/", self.base_url);
        match self
            .http
            .get(&url)
            .timeout(self.heartbeat_timeout)
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                warn!(status = %response.status(), "heartbeat answered with error status");
                false
            }
            Err(e) => {
                warn!(error = %e, "heartbeat failed");
                false
            }
        }
    }

    pub async fn service_status(&self) -> Result<Value> {
        Transport::get_json(self, endpoints::SERVICE_STATUS).await
    }

    pub async fn network_stats(&self) -> Result<Value> {
        Transport::get_json(self, endpoints::NETWORK_STATS).await
    }

    pub async fn node_by_id(&self, id: &str) -> Result<Value> {
        Transport::get_json(self, &endpoints::node_by_id(id)).await
    }

    /// The active-node snapshot, normalized out of its envelope
    pub async fn active_nodes(&self) -> Result<Vec<ActiveNode>> {
        let payload = Transport::get_json(self, endpoints::ACTIVE_NODES).await?;
        normalize(payload)
    }

    pub async fn registration_status(&self) -> Result<Value> {
        Transport::get_json(self, endpoints::REGISTRATION_STATUS).await
    }

    pub async fn polling_node_stats(&self, id: &str) -> Result<Value> {
        Transport::get_json(self, &endpoints::polling_node_stats(id)).await
    }

    pub async fn requirements(&self) -> Result<Value> {
        Transport::get_json(self, endpoints::REQUIREMENTS).await
    }

    pub async fn check_cooldown(&self, id: &str) -> Result<Value> {
        Transport::get_json(self, &endpoints::check_cooldown(id)).await
    }

    pub async fn node_status(&self, id: &str) -> Result<Value> {
        Transport::get_json(self, &endpoints::node_status(id)).await
    }

    pub async fn mining_status(&self, id: &str) -> Result<Value> {
        Transport::get_json(self, &endpoints::mining_status(id)).await
    }

    pub async fn mining_cooldown(&self, id: &str) -> Result<Value> {
        Transport::get_json(self, &endpoints::mining_cooldown(id)).await
    }

    pub async fn live_log(&self, address: &str) -> Result<Value> {
        Transport::get_json(self, &endpoints::live_log(address)).await
    }

    pub async fn claim_status(&self, address: &str) -> Result<Value> {
        Transport::get_json(self, &endpoints::claim_status(address)).await
    }

    pub async fn claim_history(&self, address: &str) -> Result<Value> {
        Transport::get_json(self, &endpoints::claim_history(address)).await
    }

    pub async fn system_info(&self) -> Result<Value> {
        Transport::get_json(self, endpoints::SYSTEM_INFO).await
    }

    pub async fn version_info(&self) -> Result<Value> {
        Transport::get_json(self, endpoints::VERSION).await
    }

    pub fn cache(&self) -> &RateLimitedCache {
        &self.cache
    }
}

#[async_trait]
impl Transport for ApiClient {
    async fn get_json(&self, path: &str) -> Result<Value> {
        self.cache.fetch(path, || self.http_get(path)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn normalize_accepts_bare_array() {
        let nodes: Vec<ActiveNode> =
            normalize(json!([{"nodeId": "n1", "wallet": "0xabc"}])).unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].node_id.as_deref(), Some("n1"));
    }

    #[test]
    fn normalize_accepts_nodes_wrapper() {
        let nodes: Vec<ActiveNode> =
            normalize(json!({"nodes": [{"id": "n2"}, {"id": "n3"}]})).unwrap();
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[1].id.as_deref(), Some("n3"));
    }

    #[test]
    fn normalize_accepts_data_wrapper() {
        let nodes: Vec<ActiveNode> = normalize(json!({"data": []})).unwrap();
        assert!(nodes.is_empty());
    }

    #[test]
    fn normalize_rejects_unrelated_shapes() {
        let result: Result<Vec<ActiveNode>> = normalize(json!({"stats": {"totalNodes": 3}}));
        assert!(result.is_err());
    }

    #[test]
    fn parameterized_paths_embed_the_identifier() {
        assert_eq!(endpoints::mining_status("n1"), "/mining/status/n1");
        assert_eq!(endpoints::claim_status("0xabc"), "/claim/status/0xabc");
    }

    mod http {
        use super::super::*;
        use crate::clock::ManualClock;
        use serde_json::json;
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        async fn client_against(server: &MockServer) -> (ApiClient, Arc<ManualClock>) {
            let mut config = Config::default();
            config.api.base_url = server.uri();
            let clock = ManualClock::new(1_000);
            let client = ApiClient::new(&config, clock.clone()).unwrap();
            (client, clock)
        }

        #[tokio::test]
        async fn repeated_reads_within_the_ttl_hit_upstream_once() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/lite/nodes/stats"))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({"totalNodes": 5})))
                .expect(1)
                .mount(&server)
                .await;

            let (client, clock) = client_against(&server).await;
            let first = client.network_stats().await.unwrap();
            clock.advance_ms(10_000);
            let second = client.network_stats().await.unwrap();

            assert_eq!(first, second);
            assert_eq!(first["totalNodes"], 5);
        }

        #[tokio::test]
        async fn error_statuses_map_to_typed_errors() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/register/status"))
                .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
                .mount(&server)
                .await;
            Mock::given(method("GET"))
                .and(path("/version"))
                .respond_with(ResponseTemplate::new(429))
                .mount(&server)
                .await;

            let (client, _clock) = client_against(&server).await;
            match client.registration_status().await.unwrap_err() {
                DashboardError::Http { status, body, .. } => {
                    assert_eq!(status, 500);
                    assert_eq!(body, "boom");
                }
                other => panic!("expected http error, got {other:?}"),
            }
            // No Retry-After header: the configured interval is reported.
            match client.version_info().await.unwrap_err() {
                DashboardError::RateLimited {
                    retry_after_seconds,
                    ..
                } => assert_eq!(retry_after_seconds, 5),
                other => panic!("expected rate limit error, got {other:?}"),
            }
        }

        #[tokio::test]
        async fn rate_limit_responses_honor_the_retry_after_header() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/system/info"))
                .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "7"))
                .mount(&server)
                .await;

            let (client, _clock) = client_against(&server).await;
            match client.system_info().await.unwrap_err() {
                DashboardError::RateLimited {
                    retry_after_seconds,
                    ..
                } => assert_eq!(retry_after_seconds, 7),
                other => panic!("expected rate limit error, got {other:?}"),
            }
        }

        #[tokio::test]
        async fn active_nodes_are_normalized_off_the_wire() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/lite/nodes/active"))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                    "nodes": [{"nodeId": "n1", "walletAddress": "0xabc"}]
                })))
                .mount(&server)
                .await;

            let (client, _clock) = client_against(&server).await;
            let nodes = client.active_nodes().await.unwrap();
            assert_eq!(nodes.len(), 1);
            assert_eq!(nodes[0].identifier(), Some("n1"));
            assert_eq!(nodes[0].best_address(), Some("0xabc"));
        }

        #[tokio::test]
        async fn heartbeat_bypasses_the_cache() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/"))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
                .expect(2)
                .mount(&server)
                .await;

            let (client, _clock) = client_against(&server).await;
            assert!(client.heartbeat().await);
            assert!(client.heartbeat().await);
        }
    }
}
