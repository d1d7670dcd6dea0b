//! Store abstraction consumed by the ingestion pipeline.
//!
//! The pipeline only needs three operations from persistence. Keeping them
//! behind a trait lets the pipeline run against the SQLite repository in
//! production and against in-process fakes in tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::Clip;
use crate::Result;

/// Persistence operations used by pollers and ingestion tasks.
///
/// Each call is atomic on its own; callers never span a transaction across
/// several calls.
#[async_trait]
pub trait ItemStore: Send + Sync {
    /// Whether a clip with this ID has already been stored.
    async fn exists(&self, clip_id: &str) -> Result<bool>;

    /// Creation time of the newest stored clip of a source, if any.
    async fn latest_timestamp(&self, source: &str) -> Result<Option<DateTime<Utc>>>;

    /// Store a clip.
    ///
    /// Returns `false` when a clip with the same ID already exists; the
    /// existing row is left untouched.
    async fn insert(&self, clip: &Clip) -> Result<bool>;
}
