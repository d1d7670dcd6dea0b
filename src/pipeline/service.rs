//! Pipeline orchestration: one poller task per source plus the worker pool.

use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;
use tracing::{error, info};

use super::{
    MonitoredSource, PipelineDeps, PollerConfig, PollerState, ShutdownSignal, ShutdownTrigger,
    SourcePoller, WorkerPool,
};
use crate::{ClipwatchError, Result};

/// Handles of a running pipeline.
struct Running {
    shutdown: ShutdownTrigger,
    pollers: Vec<(String, JoinHandle<PollerState>)>,
}

/// Owns the pollers and the worker pool and starts/stops them together.
pub struct IngestionPipeline {
    sources: Vec<MonitoredSource>,
    deps: PipelineDeps,
    config: PollerConfig,
    running: Mutex<Option<Running>>,
}

impl IngestionPipeline {
    pub fn new(sources: Vec<MonitoredSource>, deps: PipelineDeps, config: PollerConfig) -> Self {
        Self {
            sources,
            deps,
            config,
            running: Mutex::new(None),
        }
    }

    pub fn sources(&self) -> &[MonitoredSource] {
        &self.sources
    }

    pub fn pool(&self) -> &Arc<WorkerPool> {
        &self.deps.pool
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().map(|r| r.is_some()).unwrap_or(false)
    }

    /// Start the worker pool and one poller per source.
    ///
    /// Pollers also stop on their own when `cancel` fires; [`stop`] must
    /// still be called to drain the pool.
    ///
    /// [`stop`]: IngestionPipeline::stop
    pub fn start(&self, cancel: ShutdownSignal) -> Result<()> {
        let mut running = self
            .running
            .lock()
            .map_err(|_| ClipwatchError::Validation("pipeline state poisoned".to_string()))?;
        if running.is_some() {
            return Err(ClipwatchError::Validation(
                "pipeline is already running".to_string(),
            ));
        }

        self.deps.pool.start();

        let (shutdown, shutdown_signal) = ShutdownTrigger::new();
        let pollers = self
            .sources
            .iter()
            .map(|source| {
                let poller = SourcePoller::new(source.clone(), self.deps.clone(), self.config);
                let handle = tokio::spawn(poller.run(cancel.clone(), shutdown_signal.clone()));
                (source.name.clone(), handle)
            })
            .collect();

        *running = Some(Running { shutdown, pollers });
        info!("Ingestion pipeline started ({} sources)", self.sources.len());
        Ok(())
    }

    /// Stop every poller, wait for them, then drain the worker pool.
    ///
    /// Returns once every accepted task has finished. Calling this on a
    /// stopped pipeline does nothing.
    pub async fn stop(&self) -> Result<()> {
        let running = self
            .running
            .lock()
            .map_err(|_| ClipwatchError::Validation("pipeline state poisoned".to_string()))?
            .take();
        let Some(running) = running else {
            return Ok(());
        };

        info!("Stopping ingestion pipeline");
        running.shutdown.trigger();
        for (name, handle) in running.pollers {
            if let Err(e) = handle.await {
                error!(source = %name, "Poller task failed: {}", e);
            }
        }

        self.deps.pool.stop().await;
        info!("Ingestion pipeline stopped");
        Ok(())
    }
}
