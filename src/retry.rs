//! # Retry Module
//!
//! ## Purpose
//! Bounded retry with fixed backoff for the transient failures the
//! upstream is known to produce, chiefly request timeouts.
//!
//! ## Input/Output Specification
//! - **Input**: A policy (attempt budget + delay), a retryability
//!   predicate, and an async operation factory
//! - **Output**: The first success, or the last error once the budget is
//!   exhausted or the error is not retryable

use crate::errors::{DashboardError, Result};
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Retry budget and pacing for one logical operation
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Additional attempts after the first one
    pub max_retries: u32,
    /// Fixed delay between attempts
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, backoff: Duration) -> Self {
        Self {
            max_retries,
            backoff,
        }
    }

    /// No retries at all; the operation runs exactly once
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }
}

/// Run `op` until it succeeds, the error stops being retryable, or the
/// policy's attempt budget runs out. The last error is returned verbatim.
pub async fn retry_on<F, Fut, T, P>(policy: RetryPolicy, retryable: P, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    P: Fn(&DashboardError) -> bool,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < policy.max_retries && retryable(&e) => {
                attempt += 1;
                debug!(attempt, max = policy.max_retries, error = %e, "retrying after transient failure");
                tokio::time::sleep(policy.backoff).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Predicate for the timeout-only retry loops used by the lookup flow
pub fn timeout_only(e: &DashboardError) -> bool {
    e.is_timeout()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn timeout_err() -> DashboardError {
        DashboardError::Timeout {
            key: "/test".to_string(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_timeouts() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(3, Duration::from_secs(2));

        let result = retry_on(policy, timeout_only, || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(timeout_err())
            } else {
                Ok(42u32)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausts_the_budget_and_returns_the_last_error() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(3, Duration::from_secs(2));

        let result: Result<u32> = retry_on(policy, timeout_only, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(timeout_err())
        })
        .await;

        assert!(matches!(result, Err(DashboardError::Timeout { .. })));
        // one initial attempt plus three retries
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn non_retryable_errors_fail_immediately() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(3, Duration::from_secs(2));

        let result: Result<u32> = retry_on(policy, timeout_only, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(DashboardError::Network {
                details: "connection refused".to_string(),
            })
        })
        .await;

        assert!(matches!(result, Err(DashboardError::Network { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
