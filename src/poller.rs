//! # Polling Module
//!
//! ## Purpose
//! Background loops for the dashboard: a short-interval heartbeat that
//! tracks whether the remote service is reachable, and a long-interval
//! overview refresh that repaints the network-wide figures. The durable
//! mirror backs the overview so a repaint never starts from a blank
//! screen, even right after a restart.
//!
//! ## Input/Output Specification
//! - **Input**: Polling intervals and the governed API client
//! - **Output**: Online/offline state plus overview snapshots, mirrored
//!   on every successful refresh
//! - **Degradation**: A failed refresh keeps showing the mirrored data

use crate::api::ApiClient;
use crate::config::{Config, PollingConfig};
use crate::errors::Result;
use crate::mirror::DurableMirror;
use crate::retry::{retry_on, timeout_only, RetryPolicy};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Mirror dataset holding the last good overview payload
pub const OVERVIEW_DATASET: &str = "network_overview";

/// One overview paint: the payload plus whether it is fresh off the wire
#[derive(Debug, Clone)]
pub struct Overview {
    pub payload: Value,
    pub refreshed: bool,
}

/// Runs the heartbeat and overview refresh loops
pub struct DashboardPoller {
    client: Arc<ApiClient>,
    mirror: DurableMirror,
    polling: PollingConfig,
    retry: RetryPolicy,
    mirror_ttl_ms: i64,
    auto_refresh: AtomicBool,
    online: AtomicBool,
}

impl DashboardPoller {
    pub fn new(client: Arc<ApiClient>, mirror: DurableMirror, config: &Config) -> Self {
        let retry = RetryPolicy::new(
            config.search.timeout_retries,
            Duration::from_secs(config.search.retry_delay_seconds),
        );
        Self {
            client,
            mirror,
            polling: config.polling.clone(),
            retry,
            mirror_ttl_ms: config.mirror.default_ttl_seconds as i64 * 1000,
            auto_refresh: AtomicBool::new(config.polling.auto_refresh),
            online: AtomicBool::new(false),
        }
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::Relaxed)
    }

    pub fn set_auto_refresh(&self, enabled: bool) {
        self.auto_refresh.store(enabled, Ordering::Relaxed);
    }

    /// One heartbeat probe. Reachability changes are logged, never errors.
    pub async fn heartbeat_tick(&self) -> bool {
        let online = self.client.heartbeat().await;
        let was_online = self.online.swap(online, Ordering::Relaxed);
        if online != was_online {
            if online {
                info!("remote service is reachable");
            } else {
                warn!("remote service stopped responding to heartbeats");
            }
        }
        online
    }

    /// The last mirrored overview, stale-but-valid entries included
    pub fn cached_overview(&self) -> Option<Overview> {
        self.mirror.read(OVERVIEW_DATASET).map(|read| Overview {
            payload: read.record.payload,
            refreshed: false,
        })
    }

    /// Refresh the overview figures. Both halves are fetched concurrently
    /// and the bundle is mirrored on success; any failure falls back to
    /// the mirrored copy when one exists.
    pub async fn refresh_overview(&self) -> Result<Overview> {
        let (stats, requirements) = tokio::join!(
            retry_on(self.retry, timeout_only, || self.client.network_stats()),
            retry_on(self.retry, timeout_only, || self.client.requirements()),
        );

        match (stats, requirements) {
            (Ok(stats), Ok(requirements)) => {
                let payload = json!({
                    "stats": stats,
                    "requirements": requirements,
                });
                if let Err(e) =
                    self.mirror
                        .write(OVERVIEW_DATASET, payload.clone(), self.mirror_ttl_ms)
                {
                    warn!(error = %e, "overview refresh succeeded but the mirror write failed");
                }
                Ok(Overview {
                    payload,
                    refreshed: true,
                })
            }
            (stats, requirements) => {
                let error = stats.err().or(requirements.err());
                if let Some(cached) = self.cached_overview() {
                    warn!(error = ?error, "overview refresh failed, keeping the mirrored copy");
                    return Ok(cached);
                }
                // Nothing to fall back to.
                Err(error.unwrap_or(crate::errors::DashboardError::Internal {
                    message: "overview refresh failed with no error".to_string(),
                }))
            }
        }
    }

    /// Registration status with the timeout retry budget applied
    pub async fn registration_status(&self) -> Result<Value> {
        retry_on(self.retry, timeout_only, || {
            self.client.registration_status()
        })
        .await
    }

    /// Run both loops until the future is dropped
    pub async fn run(&self) {
        let mut heartbeat = tokio::time::interval(Duration::from_secs(
            self.polling.heartbeat_interval_seconds,
        ));
        let mut refresh =
            tokio::time::interval(Duration::from_secs(self.polling.refresh_interval_seconds));

        loop {
            tokio::select! {
                _ = heartbeat.tick() => {
                    self.heartbeat_tick().await;
                }
                _ = refresh.tick() => {
                    if !self.auto_refresh.load(Ordering::Relaxed) {
                        debug!("auto refresh disabled, skipping overview tick");
                        continue;
                    }
                    match self.refresh_overview().await {
                        Ok(overview) if overview.refreshed => {
                            debug!("overview refreshed");
                        }
                        Ok(_) => debug!("overview served from the mirror"),
                        Err(e) => warn!(error = %e, "overview unavailable"),
                    }
                }
            }
        }
    }
}
