//! Clock utilities for lessonpack
//!
//! Package expiry is evaluated against wall-clock UTC time. All engine
//! operations take `now` explicitly; `now()` here is what the binaries pass in.
//!
//! # Mock Time for Development
//!
//! In debug builds, the `LESSONPACK_MOCK_TIME` environment variable can be set
//! to override the system time. This is useful for walking a package through
//! its expiry by hand.
//!
//! Format: `YYYY-MM-DD HH:MM:SS` in UTC (e.g., `2025-12-25 14:30:00`)
//!
//! Example:
//! ```bash
//! LESSONPACK_MOCK_TIME="2025-12-25 14:30:00" lessonpack sweep
//! ```

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use std::sync::OnceLock;

/// Environment variable name for mock time (debug builds only)
pub const MOCK_TIME_ENV_VAR: &str = "LESSONPACK_MOCK_TIME";

/// Format accepted by `LESSONPACK_MOCK_TIME`
pub const MOCK_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Offset between mock time and real time, captured at first use so mock
/// time advances at the real rate.
static MOCK_TIME_OFFSET: OnceLock<Option<chrono::Duration>> = OnceLock::new();

fn get_mock_time_offset() -> Option<chrono::Duration> {
    *MOCK_TIME_OFFSET.get_or_init(|| {
        #[cfg(debug_assertions)]
        {
            if let Ok(mock_time_str) = std::env::var(MOCK_TIME_ENV_VAR) {
                match parse_mock_time(&mock_time_str) {
                    Some(mock_dt) => {
                        let offset = mock_dt.signed_duration_since(Utc::now());
                        tracing::info!(
                            mock_time = %mock_time_str,
                            offset_secs = offset.num_seconds(),
                            "Mock time enabled"
                        );
                        return Some(offset);
                    }
                    None => {
                        tracing::warn!(
                            mock_time = %mock_time_str,
                            expected_format = MOCK_TIME_FORMAT,
                            "Invalid mock time format"
                        );
                    }
                }
            }
            None
        }
        #[cfg(not(debug_assertions))]
        {
            None
        }
    })
}

/// Parse a mock time string as UTC.
pub fn parse_mock_time(s: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(s, MOCK_TIME_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

/// Returns whether mock time is currently active.
pub fn is_mock_time_active() -> bool {
    get_mock_time_offset().is_some()
}

/// Current UTC time, respecting mock time settings in debug builds.
pub fn now() -> DateTime<Utc> {
    let real_now = Utc::now();

    if let Some(offset) = get_mock_time_offset() {
        real_now + offset
    } else {
        real_now
    }
}

/// Last second of the given calendar day (UTC).
///
/// Expiry dates entered as plain dates are valid through the whole day.
pub fn end_of_day(date: NaiveDate) -> DateTime<Utc> {
    let last = NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN);
    date.and_time(last).and_utc()
}

/// Whole days from `now` until `deadline`, rounded up.
///
/// A deadline later today counts as 1 day left; a passed deadline gives a
/// negative count.
pub fn days_until(deadline: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let secs = deadline.signed_duration_since(now).num_seconds();
    if secs > 0 {
        (secs + 86_399) / 86_400
    } else {
        secs / 86_400
    }
}
