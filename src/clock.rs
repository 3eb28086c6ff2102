//! # Clock Module
//!
//! ## Purpose
//! Injectable time source for every component that compares timestamps
//! (cache TTLs, rate-limit windows, mirror validity, search cooldowns),
//! so policy code can be driven deterministically in tests.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// Time source handing out epoch milliseconds
pub trait Clock: Send + Sync {
    /// Current time as milliseconds since the Unix epoch
    fn now_ms(&self) -> i64;
}

/// Wall-clock implementation used in production
#[derive(Debug, Default, Clone)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Manually advanced clock for deterministic tests
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(start_ms: i64) -> Arc<Self> {
        Arc::new(Self {
            now: AtomicI64::new(start_ms),
        })
    }

    /// Move the clock forward
    pub fn advance_ms(&self, delta: i64) {
        self.now.fetch_add(delta, Ordering::SeqCst);
    }

    /// Pin the clock to an absolute instant
    pub fn set_ms(&self, now: i64) {
        self.now.store(now, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::new(1_000);
        assert_eq!(clock.now_ms(), 1_000);
        clock.advance_ms(5_000);
        assert_eq!(clock.now_ms(), 6_000);
        clock.set_ms(100);
        assert_eq!(clock.now_ms(), 100);
    }
}
