//! Value types handed between the poller and the worker pool.

use std::time::Duration;

use chrono::{DateTime, Utc};

/// A broadcaster whose clips are watched.
///
/// Built once from configuration at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitoredSource {
    /// Broadcaster login (lowercase).
    pub name: String,
    /// Discord webhook receiving this broadcaster's clips.
    pub webhook_url: String,
    /// Time between two poll cycles.
    pub poll_interval: Duration,
}

impl MonitoredSource {
    /// Create a new monitored source.
    pub fn new(
        name: impl Into<String>,
        webhook_url: impl Into<String>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            webhook_url: webhook_url.into(),
            poll_interval,
        }
    }
}

/// A clip returned by the upstream API that may or may not be new.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredClip {
    /// Broadcaster login the clip was discovered for.
    pub source: String,
    /// Twitch clip ID.
    pub id: String,
    pub title: String,
    pub url: String,
    pub created_at: DateTime<Utc>,
}
