//! Process wiring: builds every component from [`Config`] and runs them
//! until shutdown.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use metrics_exporter_prometheus::PrometheusHandle;
use tracing::{error, info};

use crate::config::Config;
use crate::db::{ClipStore, Database, ItemStore};
use crate::discord::{HttpWebhookTransport, NotificationDispatcher, RetryPolicy};
use crate::pipeline::{
    ClipProcessor, IngestionPipeline, PipelineDeps, PollerConfig, ShutdownTrigger, WorkerPool,
};
use crate::rate_limit::{LimiterConfig, RateLimiter};
use crate::telemetry;
use crate::twitch::HelixClient;
use crate::web::WebServer;
use crate::Result;

/// A fully wired clipwatch instance.
pub struct Application {
    config: Config,
    db: Database,
    store: ClipStore,
    pipeline: IngestionPipeline,
    metrics: Option<PrometheusHandle>,
}

impl Application {
    /// Open the database and construct the pipeline. Nothing runs yet.
    pub async fn build(config: Config) -> Result<Self> {
        let db = Database::open(&config.database.path).await?;
        let store = ClipStore::new(db.pool().clone());
        let item_store: Arc<dyn ItemStore> = Arc::new(store.clone());

        let upstream_limiter = Arc::new(RateLimiter::new(LimiterConfig::per_minute(
            config.twitch.requests_per_minute,
        )));
        let webhook_limiter = Arc::new(RateLimiter::new(LimiterConfig::new(
            f64::from(config.discord.rate_limit),
            1,
        )));

        let upstream = Arc::new(HelixClient::new(&config.twitch)?);
        let transport = Arc::new(HttpWebhookTransport::new(Duration::from_secs(
            config.discord.timeout_secs,
        ))?);
        let dispatcher = Arc::new(
            NotificationDispatcher::new(
                transport,
                webhook_limiter,
                RetryPolicy::from(&config.discord),
            )
            .with_username(config.discord.username.clone())
            .with_timezone(config.discord.timezone.clone()),
        );

        let pool = Arc::new(
            WorkerPool::new(config.worker.workers).with_queue_capacity(config.queue_capacity()),
        );
        let processor = Arc::new(ClipProcessor::new(item_store.clone(), dispatcher));

        let deps = PipelineDeps {
            upstream,
            limiter: upstream_limiter,
            store: item_store,
            pool,
            processor,
        };
        let poller_config = PollerConfig {
            backfill: config.backfill(),
        };
        let pipeline = IngestionPipeline::new(config.sources(), deps, poller_config);

        Ok(Self {
            config,
            db,
            store,
            pipeline,
            metrics: None,
        })
    }

    /// Serve `/metrics` with this handle while running.
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    pub fn store(&self) -> &ClipStore {
        &self.store
    }

    /// Run until `shutdown` resolves, then stop pollers, drain the worker
    /// pool, and close the database.
    pub async fn run<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let (trigger, signal) = ShutdownTrigger::new();

        if let Some(handle) = self.metrics.clone() {
            let metrics_config = self.config.metrics.clone();
            tokio::spawn(async move {
                if let Err(e) = telemetry::serve(&metrics_config, handle).await {
                    error!("Metrics endpoint failed: {}", e);
                }
            });
        }

        let web_task = if self.config.web.enabled {
            let server = WebServer::new(&self.config.web, self.store.clone())?;
            let web_signal = signal.clone();
            Some(tokio::spawn(async move {
                if let Err(e) = server.run(web_signal).await {
                    error!("Web server failed: {}", e);
                }
            }))
        } else {
            None
        };

        self.pipeline.start(signal)?;
        info!(
            "clipwatch running: {} sources, {} workers",
            self.pipeline.sources().len(),
            self.pipeline.pool().size()
        );

        shutdown.await;
        info!("Shutdown requested");
        trigger.trigger();

        self.pipeline.stop().await?;
        if let Some(task) = web_task {
            if let Err(e) = task.await {
                error!("Web server task failed: {}", e);
            }
        }
        self.db.close().await;
        info!("Shutdown complete");
        Ok(())
    }
}
