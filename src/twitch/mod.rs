//! Twitch clip discovery.

mod client;
mod types;

pub use client::HelixClient;
pub use types::{HelixClip, HelixPage, HelixUser, Pagination, TokenResponse};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::pipeline::DiscoveredClip;
use crate::Result;

/// Upstream API the pollers discover clips from.
#[async_trait]
pub trait ClipSource: Send + Sync {
    /// Resolve a broadcaster login to its Twitch user ID.
    async fn resolve_identity(&self, name: &str) -> Result<String>;

    /// List clips of a broadcaster created at or after `since`, oldest
    /// first. `source` is copied into every returned clip.
    async fn list_clips_since(
        &self,
        source: &str,
        broadcaster_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<DiscoveredClip>>;
}
