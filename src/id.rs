//! ID and time utilities for reviewq
//!
//! Provides the millisecond clock used across records, ISO date keys for shield
//! history, and identifiers for review sessions.

use chrono::{Local, NaiveDate, TimeZone};
use rand::Rng;

/// Get current timestamp in milliseconds since Unix epoch
pub fn now_ms() -> i64 {
    Local::now().timestamp_millis()
}

/// Local calendar date for a millisecond timestamp.
///
/// Falls back to today when the timestamp is outside chrono's range.
pub fn local_date(ts_ms: i64) -> NaiveDate {
    match Local.timestamp_millis_opt(ts_ms).single() {
        Some(dt) => dt.date_naive(),
        None => Local::now().date_naive(),
    }
}

/// ISO-8601 date key (`YYYY-MM-DD`) for a millisecond timestamp
pub fn iso_date(ts_ms: i64) -> String {
    local_date(ts_ms).format("%Y-%m-%d").to_string()
}

/// Human readable local time for CLI output
pub fn format_ms(ts_ms: i64) -> String {
    match Local.timestamp_millis_opt(ts_ms).single() {
        Some(dt) => dt.format("%Y-%m-%d %H:%M").to_string(),
        None => ts_ms.to_string(),
    }
}

/// Generate a unique review session ID
///
/// Format: `ses-{timestamp_ms}-{random_hex}`
/// Example: `ses-1738300800123-a1b2`
pub fn generate_session_id() -> String {
    let timestamp = now_ms();
    let random: u16 = rand::rng().random();
    format!("ses-{}-{:04x}", timestamp, random)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_ms_returns_reasonable_timestamp() {
        let ts = now_ms();
        // Should be after 2020-01-01 and before 2100-01-01
        assert!(ts > 1577836800000);
        assert!(ts < 4102444800000);
    }

    #[test]
    fn test_iso_date_format() {
        let date = iso_date(now_ms());
        let parts: Vec<&str> = date.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].len(), 4);
        assert_eq!(parts[1].len(), 2);
        assert_eq!(parts[2].len(), 2);
    }

    #[test]
    fn test_iso_date_is_stable_within_a_day() {
        let ts = now_ms();
        assert_eq!(iso_date(ts), local_date(ts).to_string());
    }

    #[test]
    fn test_generate_session_id_format() {
        let id = generate_session_id();
        let parts: Vec<&str> = id.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "ses");
        assert!(parts[1].chars().all(|c| c.is_ascii_digit()));
        assert_eq!(parts[2].len(), 4);
        assert!(parts[2].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_generate_session_id_unique() {
        let ids: std::collections::HashSet<String> = (0..50).map(|_| generate_session_id()).collect();
        // Random suffix makes collisions within one millisecond unlikely
        assert!(ids.len() > 40);
    }
}
