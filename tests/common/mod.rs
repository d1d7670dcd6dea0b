//! Test helpers for pipeline integration tests.
//!
//! Provides an in-memory upstream, a recording webhook transport, and a
//! harness that wires them to a real store and worker pool.

#![allow(dead_code)]

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Semaphore;

use clipwatch::db::{ClipStore, Database, ItemStore};
use clipwatch::discord::{NotificationDispatcher, RetryPolicy, WebhookMessage, WebhookTransport};
use clipwatch::pipeline::{
    ClipProcessor, DiscoveredClip, MonitoredSource, PipelineDeps, PollerConfig, SourcePoller,
    WorkerPool,
};
use clipwatch::rate_limit::{LimiterConfig, RateLimiter};
use clipwatch::twitch::ClipSource;
use clipwatch::{ClipwatchError, Result};

/// Default timeout for test operations.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Build a discovered clip.
pub fn clip_at(source: &str, id: &str, created_at: DateTime<Utc>) -> DiscoveredClip {
    DiscoveredClip {
        source: source.to_string(),
        id: id.to_string(),
        title: format!("clip {id}"),
        url: format!("https://clips.twitch.tv/{id}"),
        created_at,
    }
}

/// A limiter that never gets in the way.
pub fn fast_limiter() -> Arc<RateLimiter> {
    Arc::new(RateLimiter::new(LimiterConfig::new(10_000.0, 1_000)))
}

/// Poll `check` every few milliseconds until it holds or the timeout hits.
pub async fn wait_until<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + DEFAULT_TIMEOUT;
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

/// In-memory upstream returning every known clip created at or after `since`.
#[derive(Default)]
pub struct FakeUpstream {
    clips: Mutex<Vec<DiscoveredClip>>,
    list_calls: AtomicUsize,
    /// Serve the whole catalogue regardless of `since`.
    ignore_since: bool,
}

impl FakeUpstream {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// An upstream that keeps returning clips it already returned.
    pub fn repeating() -> Arc<Self> {
        Arc::new(Self {
            ignore_since: true,
            ..Self::default()
        })
    }

    pub fn publish(&self, clip: DiscoveredClip) {
        self.clips.lock().unwrap().push(clip);
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ClipSource for FakeUpstream {
    async fn resolve_identity(&self, name: &str) -> Result<String> {
        if name == "ghost" {
            return Err(ClipwatchError::NotFound(format!("broadcaster {name}")));
        }
        Ok(format!("id-{name}"))
    }

    async fn list_clips_since(
        &self,
        source: &str,
        _broadcaster_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<DiscoveredClip>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let mut clips: Vec<DiscoveredClip> = self
            .clips
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.source == source && (self.ignore_since || c.created_at >= since))
            .cloned()
            .collect();
        clips.sort_by_key(|c| c.created_at);
        Ok(clips)
    }
}

/// Webhook transport that records every post.
///
/// When built with [`RecordingTransport::gated`], each post first takes a
/// permit from the gate, so tests can hold deliveries.
#[derive(Default)]
pub struct RecordingTransport {
    posts: Mutex<Vec<(String, WebhookMessage)>>,
    gate: Option<Arc<Semaphore>>,
}

impl RecordingTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn gated(gate: Arc<Semaphore>) -> Arc<Self> {
        Arc::new(Self {
            posts: Mutex::new(Vec::new()),
            gate: Some(gate),
        })
    }

    pub fn post_count(&self) -> usize {
        self.posts.lock().unwrap().len()
    }

    /// Embed titles in delivery order.
    pub fn titles(&self) -> Vec<String> {
        self.posts
            .lock()
            .unwrap()
            .iter()
            .filter_map(|(_, msg)| msg.embeds.first().map(|e| e.title.clone()))
            .collect()
    }

    pub fn endpoints(&self) -> Vec<String> {
        self.posts
            .lock()
            .unwrap()
            .iter()
            .map(|(endpoint, _)| endpoint.clone())
            .collect()
    }
}

#[async_trait]
impl WebhookTransport for RecordingTransport {
    async fn post(&self, endpoint: &str, message: &WebhookMessage) -> Result<u16> {
        if let Some(gate) = &self.gate {
            let permit = gate
                .acquire()
                .await
                .map_err(|e| ClipwatchError::Webhook(e.to_string()))?;
            permit.forget();
        }
        self.posts
            .lock()
            .unwrap()
            .push((endpoint.to_string(), message.clone()));
        Ok(204)
    }
}

/// A store, upstream, transport and pool wired together.
pub struct Harness {
    pub db: Database,
    pub store: ClipStore,
    pub upstream: Arc<FakeUpstream>,
    pub transport: Arc<RecordingTransport>,
    pub deps: PipelineDeps,
}

impl Harness {
    pub async fn new(workers: usize, capacity: usize) -> Self {
        Self::with_parts(
            Database::open_in_memory().await.unwrap(),
            FakeUpstream::new(),
            RecordingTransport::new(),
            workers,
            capacity,
        )
    }

    pub fn with_parts(
        db: Database,
        upstream: Arc<FakeUpstream>,
        transport: Arc<RecordingTransport>,
        workers: usize,
        capacity: usize,
    ) -> Self {
        let store = ClipStore::new(db.pool().clone());
        let item_store: Arc<dyn ItemStore> = Arc::new(store.clone());
        let dispatcher = Arc::new(
            NotificationDispatcher::new(
                transport.clone(),
                fast_limiter(),
                RetryPolicy {
                    max_attempts: 3,
                    backoff_base: Duration::from_millis(1),
                    rate_limit_cooldown: Duration::from_millis(5),
                },
            )
            .with_username("TestBot"),
        );
        let pool = Arc::new(WorkerPool::new(workers).with_queue_capacity(capacity));
        let processor = Arc::new(ClipProcessor::new(item_store.clone(), dispatcher));

        let deps = PipelineDeps {
            upstream: upstream.clone(),
            limiter: fast_limiter(),
            store: item_store,
            pool,
            processor,
        };

        Self {
            db,
            store,
            upstream,
            transport,
            deps,
        }
    }

    pub fn source(name: &str) -> MonitoredSource {
        MonitoredSource::new(
            name,
            format!("https://discord.test/api/webhooks/{name}"),
            Duration::from_millis(50),
        )
    }

    pub fn poller(&self, name: &str) -> SourcePoller {
        SourcePoller::new(Self::source(name), self.deps.clone(), PollerConfig::default())
    }

    pub fn pool(&self) -> &Arc<WorkerPool> {
        &self.deps.pool
    }

    pub async fn stored(&self, name: &str) -> i64 {
        self.store.count(Some(name)).await.unwrap()
    }
}
