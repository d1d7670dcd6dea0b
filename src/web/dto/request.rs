//! Query-string DTOs.

use serde::Deserialize;

/// Default number of clips returned by list endpoints.
pub const DEFAULT_LIMIT: i64 = 50;

/// Upper bound for `limit`.
pub const MAX_LIMIT: i64 = 100;

/// `GET /api/clips` parameters.
#[derive(Debug, Default, Deserialize)]
pub struct ClipListQuery {
    /// Restrict to one broadcaster (case-insensitive).
    #[serde(default)]
    pub streamer: Option<String>,
    #[serde(default)]
    pub limit: Option<i64>,
}

/// `GET /api/clips/search` parameters.
#[derive(Debug, Default, Deserialize)]
pub struct ClipSearchQuery {
    /// Title substring to look for.
    #[serde(default)]
    pub q: Option<String>,
    #[serde(default)]
    pub limit: Option<i64>,
}

/// Clamp a requested limit into `1..=MAX_LIMIT`, defaulting when absent.
pub fn effective_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
}
