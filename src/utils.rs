//! # Utility Functions Module
//!
//! ## Purpose
//! Small shared helpers for query normalization and human-readable
//! formatting of durations and countdowns.

use std::time::Duration;

/// Canonical form of a user query for cooldown and history bookkeeping
pub fn normalize_query(query: &str) -> String {
    query.trim().to_lowercase()
}

/// Format a duration as a compact human-readable string
pub fn format_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    if total < 60 {
        return format!("{total}s");
    }
    let minutes = total / 60;
    let seconds = total % 60;
    if minutes < 60 {
        if seconds == 0 {
            return format!("{minutes}m");
        }
        return format!("{minutes}m {seconds}s");
    }
    let hours = minutes / 60;
    let minutes = minutes % 60;
    if minutes == 0 {
        format!("{hours}h")
    } else {
        format!("{hours}h {minutes}m")
    }
}

/// Render the seconds left on a cooldown as a countdown label
pub fn format_countdown(remaining_seconds: u64) -> String {
    if remaining_seconds >= 60 {
        format!("{}m {}s", remaining_seconds / 60, remaining_seconds % 60)
    } else {
        format!("{remaining_seconds}s")
    }
}

/// Milliseconds remaining until `expiry_ms`, clamped at zero
pub fn remaining_ms(now_ms: i64, expiry_ms: i64) -> i64 {
    (expiry_ms - now_ms).max(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_query() {
        assert_eq!(normalize_query("  N-1  "), "n-1");
        assert_eq!(normalize_query("0xABCdef"), "0xabcdef");
        assert_eq!(normalize_query(""), "");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(45)), "45s");
        assert_eq!(format_duration(Duration::from_secs(60)), "1m");
        assert_eq!(format_duration(Duration::from_secs(90)), "1m 30s");
        assert_eq!(format_duration(Duration::from_secs(3600)), "1h");
        assert_eq!(format_duration(Duration::from_secs(3660)), "1h 1m");
    }

    #[test]
    fn test_format_countdown() {
        assert_eq!(format_countdown(30), "30s");
        assert_eq!(format_countdown(90), "1m 30s");
        assert_eq!(format_countdown(0), "0s");
    }

    #[test]
    fn test_remaining_ms() {
        assert_eq!(remaining_ms(1_000, 4_000), 3_000);
        assert_eq!(remaining_ms(5_000, 4_000), 0);
    }
}
