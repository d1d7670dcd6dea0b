//! Per-source polling loop.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use metrics::counter;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::{
    ClipProcessor, DiscoveredClip, MonitoredSource, RejectReason, ShutdownSignal, SubmitResult,
    Task, TaskError, WorkerPool,
};
use crate::db::ItemStore;
use crate::rate_limit::RateLimiter;
use crate::twitch::ClipSource;
use crate::Result;

/// Default look-back for a source with nothing stored yet.
pub const DEFAULT_BACKFILL: Duration = Duration::from_secs(24 * 60 * 60);

/// Poller lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerState {
    Idle,
    Polling,
    Stopped,
}

/// Events driving the poller, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PollerEvent {
    Cancelled,
    Shutdown,
    Tick,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollerConfig {
    /// How far back the first cycle of a source with no stored clips looks.
    pub backfill: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            backfill: DEFAULT_BACKFILL,
        }
    }
}

/// Collaborators shared by every poller of a pipeline.
#[derive(Clone)]
pub struct PipelineDeps {
    pub upstream: Arc<dyn ClipSource>,
    /// Upstream limiter, shared across all sources.
    pub limiter: Arc<RateLimiter>,
    pub store: Arc<dyn ItemStore>,
    pub pool: Arc<WorkerPool>,
    pub processor: Arc<ClipProcessor>,
}

/// Counts from one poll cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Clips returned by the upstream API.
    pub discovered: usize,
    /// Clips handed to the worker pool.
    pub submitted: usize,
    /// Clips not handed over; they are picked up again next cycle.
    pub rejected: usize,
}

/// Watches one broadcaster.
pub struct SourcePoller {
    source: MonitoredSource,
    deps: PipelineDeps,
    config: PollerConfig,
    state: PollerState,
}

impl SourcePoller {
    pub fn new(source: MonitoredSource, deps: PipelineDeps, config: PollerConfig) -> Self {
        Self {
            source,
            deps,
            config,
            state: PollerState::Idle,
        }
    }

    pub fn source(&self) -> &MonitoredSource {
        &self.source
    }

    pub fn state(&self) -> PollerState {
        self.state
    }

    /// Poll until `cancel` or `shutdown` fires. The first cycle starts
    /// immediately; cycles never overlap.
    pub async fn run(mut self, cancel: ShutdownSignal, shutdown: ShutdownSignal) -> PollerState {
        info!(
            source = %self.source.name,
            "Poller started (interval: {:?})",
            self.source.poll_interval
        );

        let mut ticker = interval(self.source.poll_interval.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while self.state != PollerState::Stopped {
            let event = tokio::select! {
                biased;
                _ = cancel.cancelled() => PollerEvent::Cancelled,
                _ = shutdown.cancelled() => PollerEvent::Shutdown,
                _ = ticker.tick() => PollerEvent::Tick,
            };
            self.handle(event, &cancel, &shutdown).await;
        }

        info!(source = %self.source.name, "Poller stopped");
        self.state
    }

    async fn handle(&mut self, event: PollerEvent, cancel: &ShutdownSignal, shutdown: &ShutdownSignal) {
        match event {
            PollerEvent::Cancelled | PollerEvent::Shutdown => {
                debug!(source = %self.source.name, ?event, "Poller stopping");
                self.state = PollerState::Stopped;
            }
            PollerEvent::Tick => {
                self.state = PollerState::Polling;
                let result = tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => None,
                    result = self.poll_once(cancel) => Some(result),
                };
                match result {
                    None => {
                        self.state = PollerState::Stopped;
                        return;
                    }
                    Some(Ok(report)) => {
                        counter!("poll_cycles_total", "outcome" => "ok").increment(1);
                        if report.discovered > 0 {
                            info!(
                                source = %self.source.name,
                                discovered = report.discovered,
                                submitted = report.submitted,
                                rejected = report.rejected,
                                "Poll cycle complete"
                            );
                        }
                    }
                    Some(Err(e)) => {
                        counter!("poll_cycles_total", "outcome" => "error").increment(1);
                        warn!(source = %self.source.name, "Poll cycle failed: {}", e);
                    }
                }
                self.state = PollerState::Idle;
            }
        }
    }

    /// Run one discovery cycle.
    ///
    /// Fails without submitting anything if the limiter wait is cancelled or
    /// an upstream or store call fails.
    pub async fn poll_once(&self, cancel: &ShutdownSignal) -> Result<CycleReport> {
        self.deps.limiter.acquire(cancel).await?;

        let broadcaster_id = self.deps.upstream.resolve_identity(&self.source.name).await?;
        let since = match self.deps.store.latest_timestamp(&self.source.name).await? {
            Some(latest) => latest,
            None => self.backfill_start(),
        };
        debug!(source = %self.source.name, %since, "Listing clips");

        let listed = self
            .deps
            .upstream
            .list_clips_since(&self.source.name, &broadcaster_id, since)
            .await?;

        // The listing includes `since` itself, so clips sharing the stored
        // maximum's second come back until each of them is stored.
        let mut clips = Vec::with_capacity(listed.len());
        for clip in listed {
            if clip.created_at <= since && self.deps.store.exists(&clip.id).await? {
                continue;
            }
            clips.push(clip);
        }

        let mut report = CycleReport {
            discovered: clips.len(),
            ..CycleReport::default()
        };

        for clip in clips {
            // Once one clip is refused, later (newer) clips are held back too
            // so the stored latest timestamp cannot move past the refused one.
            if report.rejected > 0 {
                report.rejected += 1;
                continue;
            }

            let clip_id = clip.id.clone();
            match self.deps.pool.submit(self.ingest_task(clip)) {
                SubmitResult::Accepted => report.submitted += 1,
                SubmitResult::Rejected(reason) => {
                    report.rejected += 1;
                    let label = match reason {
                        RejectReason::NotRunning => "not_running",
                        RejectReason::QueueFull => "queue_full",
                    };
                    counter!("clips_rejected_total", "reason" => label).increment(1);
                    warn!(
                        source = %self.source.name,
                        clip_id = %clip_id,
                        ?reason,
                        "Worker pool refused clip; it will be retried next cycle"
                    );
                }
            }
        }

        Ok(report)
    }

    fn ingest_task(&self, clip: DiscoveredClip) -> Task {
        let processor = Arc::clone(&self.deps.processor);
        let webhook_url = self.source.webhook_url.clone();
        Box::pin(async move {
            processor
                .process(clip, &webhook_url)
                .await
                .map(|_| ())
                .map_err(TaskError::from)
        })
    }

    fn backfill_start(&self) -> DateTime<Utc> {
        let now = Utc::now();
        chrono::Duration::from_std(self.config.backfill)
            .ok()
            .and_then(|backfill| now.checked_sub_signed(backfill))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}
