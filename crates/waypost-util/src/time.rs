//! Time utilities for waypost
//!
//! All stored and transmitted timestamps are UTC.
//!
//! # Mock Time for Development
//!
//! In debug builds, the `WAYPOST_MOCK_TIME` environment variable can be set
//! to override the clock used by the daemon (scan windows, feed timestamps).
//! This is useful for replaying a recorded day of samples.
//!
//! Format: `YYYY-MM-DD HH:MM:SS` in UTC (e.g., `2025-12-25 14:30:00`)

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use std::sync::OnceLock;

/// Environment variable name for mock time (debug builds only)
pub const MOCK_TIME_ENV_VAR: &str = "WAYPOST_MOCK_TIME";

/// Offset between mock time and real time, fixed at first use so mock time advances naturally.
static MOCK_TIME_OFFSET: OnceLock<Option<chrono::Duration>> = OnceLock::new();

#[allow(clippy::disallowed_methods)] // This is the internal implementation that wraps Utc::now()
fn get_mock_time_offset() -> Option<chrono::Duration> {
    *MOCK_TIME_OFFSET.get_or_init(|| {
        #[cfg(debug_assertions)]
        {
            let mock_time_str = std::env::var(MOCK_TIME_ENV_VAR).ok()?;
            match NaiveDateTime::parse_from_str(&mock_time_str, "%Y-%m-%d %H:%M:%S") {
                Ok(naive_dt) => {
                    let offset = naive_dt.and_utc().signed_duration_since(Utc::now());
                    tracing::info!(
                        mock_time = %mock_time_str,
                        offset_secs = offset.num_seconds(),
                        "Mock time enabled"
                    );
                    Some(offset)
                }
                Err(_) => {
                    tracing::warn!(
                        mock_time = %mock_time_str,
                        expected_format = "%Y-%m-%d %H:%M:%S",
                        "Invalid mock time format"
                    );
                    None
                }
            }
        }
        #[cfg(not(debug_assertions))]
        {
            None
        }
    })
}

/// Returns whether mock time is currently active.
pub fn is_mock_time_active() -> bool {
    get_mock_time_offset().is_some()
}

/// Get the current UTC time, respecting mock time settings in debug builds.
#[allow(clippy::disallowed_methods)] // This is the wrapper that provides mock time support
pub fn now() -> DateTime<Utc> {
    let real_now = Utc::now();

    match get_mock_time_offset() {
        Some(offset) => real_now + offset,
        None => real_now,
    }
}

/// Canonical text form used for persisted timestamps.
///
/// Fixed width with millisecond precision and a `Z` suffix, so lexical
/// order equals chronological order.
pub fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse a timestamp written by [`format_timestamp`] (or any RFC 3339 string).
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

/// Whole minutes in a duration, rounded down. Negative durations yield zero.
pub fn floor_minutes(duration: chrono::Duration) -> i64 {
    duration.num_minutes().max(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn timestamp_format_sorts_chronologically() {
        let early = Utc.with_ymd_and_hms(2025, 1, 2, 9, 0, 0).unwrap();
        let late = early + chrono::Duration::milliseconds(1500);

        let (a, b) = (format_timestamp(&early), format_timestamp(&late));
        assert!(a < b);
        assert_eq!(a, "2025-01-02T09:00:00.000Z");
    }

    #[test]
    fn timestamp_round_trip() {
        let dt = Utc.with_ymd_and_hms(2025, 6, 30, 23, 59, 59).unwrap();
        assert_eq!(parse_timestamp(&format_timestamp(&dt)), Some(dt));
        assert!(parse_timestamp("not a time").is_none());
    }

    #[test]
    fn floor_minutes_truncates() {
        assert_eq!(floor_minutes(chrono::Duration::seconds(35 * 60 + 59)), 35);
        assert_eq!(floor_minutes(chrono::Duration::seconds(-10)), 0);
    }

    #[test]
    fn now_is_close_to_real_time_without_mock() {
        if is_mock_time_active() {
            return;
        }
        #[allow(clippy::disallowed_methods)]
        let drift = (now() - Utc::now()).num_seconds().abs();
        assert!(drift < 2);
    }
}
