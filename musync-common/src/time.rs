//! Timestamp utilities

use chrono::{DateTime, Datelike, Utc};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Current calendar year (UTC)
pub fn current_year() -> i32 {
    Utc::now().year()
}

/// Convert milliseconds to duration
pub fn millis_to_duration(millis: u64) -> std::time::Duration {
    std::time::Duration::from_millis(millis)
}

/// Age of `then` relative to `now`, clamped at zero for timestamps in the future
pub fn age(then: DateTime<Utc>, now: DateTime<Utc>) -> std::time::Duration {
    (now - then).to_std().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_now_returns_valid_timestamp() {
        let timestamp = now();
        // Should be a reasonable timestamp (after year 2000)
        assert!(timestamp.timestamp() > 946_684_800);
    }

    #[test]
    fn test_current_year_matches_now() {
        assert_eq!(current_year(), now().year());
        assert!(current_year() >= 2024);
    }

    #[test]
    fn test_millis_to_duration_one_second() {
        let duration = millis_to_duration(1000);
        assert_eq!(duration, Duration::from_secs(1));
    }

    #[test]
    fn test_age_of_past_timestamp() {
        let now = now();
        let then = now - chrono::Duration::hours(2);
        assert_eq!(age(then, now), Duration::from_secs(7200));
    }

    #[test]
    fn test_age_of_future_timestamp_is_zero() {
        let now = now();
        let later = now + chrono::Duration::minutes(5);
        assert_eq!(age(later, now), Duration::ZERO);
    }
}
