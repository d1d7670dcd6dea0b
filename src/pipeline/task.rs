//! Processing of one discovered clip inside the worker pool.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use metrics::{counter, histogram};
use tracing::{debug, error, info, warn};

use super::DiscoveredClip;
use crate::db::{Clip, ItemStore};
use crate::discord::{NotificationDispatcher, NotifyOutcome};
use crate::Result;

/// What happened to a discovered clip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Already stored; nothing was written or sent.
    Skipped,
    /// Stored. `notified` tells whether the announcement went out.
    Ingested { notified: bool },
}

/// Deduplicates, stores and announces discovered clips.
pub struct ClipProcessor {
    store: Arc<dyn ItemStore>,
    dispatcher: Arc<NotificationDispatcher>,
}

impl ClipProcessor {
    pub fn new(store: Arc<dyn ItemStore>, dispatcher: Arc<NotificationDispatcher>) -> Self {
        Self { store, dispatcher }
    }

    /// Process one clip.
    ///
    /// A store error ends processing before anything is sent. A failed
    /// notification does not undo the insert.
    pub async fn process(&self, clip: DiscoveredClip, webhook_url: &str) -> Result<IngestOutcome> {
        let started = Instant::now();
        let result = self.ingest(clip, webhook_url).await;
        histogram!("clip_processing_duration_seconds").record(started.elapsed().as_secs_f64());

        match &result {
            Ok(IngestOutcome::Skipped) => {
                counter!("clips_skipped_total").increment(1);
            }
            Ok(IngestOutcome::Ingested { .. }) => {
                counter!("clips_processed_total").increment(1);
            }
            Err(e) => {
                counter!("clips_failed_total").increment(1);
                error!("Failed to process clip: {}", e);
            }
        }
        result
    }

    async fn ingest(&self, clip: DiscoveredClip, webhook_url: &str) -> Result<IngestOutcome> {
        if self.store.exists(&clip.id).await? {
            debug!(clip_id = %clip.id, "Clip already stored, skipping");
            return Ok(IngestOutcome::Skipped);
        }

        let stored = Clip::from_discovered(clip, Utc::now());
        if !self.store.insert(&stored).await? {
            debug!(clip_id = %stored.id, "Clip stored concurrently, skipping");
            return Ok(IngestOutcome::Skipped);
        }
        info!(
            clip_id = %stored.id,
            streamer = %stored.streamer_name,
            "Stored new clip: {}",
            stored.title
        );

        let notified = match self.dispatcher.notify(&stored, webhook_url).await {
            NotifyOutcome::Delivered { .. } => true,
            NotifyOutcome::Failed {
                attempts,
                last_error,
            } => {
                warn!(
                    clip_id = %stored.id,
                    attempts,
                    "Clip stored but notification failed: {}",
                    last_error
                );
                false
            }
        };

        Ok(IngestOutcome::Ingested { notified })
    }
}
