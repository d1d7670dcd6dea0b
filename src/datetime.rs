//! Date/time helpers shared by the store, the Twitch client and the notifier.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use chrono_tz::Tz;

/// Storage format for timestamps: fixed-width RFC3339 in UTC, so that
/// lexical order in SQLite equals chronological order.
pub fn to_db_string(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Parse a timestamp stored in the database or returned by an API.
///
/// Accepts RFC3339 and the SQLite `YYYY-MM-DD HH:MM:SS` format.
pub fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    None
}

/// Format a UTC timestamp in the given timezone.
///
/// Unknown timezone names fall back to UTC.
pub fn format_utc_datetime(dt: &DateTime<Utc>, timezone: &str, format: &str) -> String {
    match timezone.parse::<Tz>() {
        Ok(tz) => dt.with_timezone(&tz).format(format).to_string(),
        Err(_) => dt.format(format).to_string(),
    }
}
