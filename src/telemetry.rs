//! Prometheus metrics.
//!
//! Metric names follow the `*_total` / `*_seconds` conventions. All of them
//! are emitted through the `metrics` facade; without an installed recorder
//! they are no-ops.

use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge, describe_histogram, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::info;

use crate::config::MetricsConfig;
use crate::{ClipwatchError, Result};

/// Register descriptions for every metric clipwatch emits.
pub fn describe() {
    describe_counter!("clips_processed_total", "Clips stored for the first time");
    describe_counter!("clips_skipped_total", "Discovered clips that were already stored");
    describe_counter!("clips_failed_total", "Clips whose processing failed with an error");
    describe_counter!(
        "clips_rejected_total",
        "Discovered clips refused by the worker pool, by reason"
    );
    describe_histogram!(
        "clip_processing_duration_seconds",
        Unit::Seconds,
        "Time spent processing one clip, notification included"
    );
    describe_counter!("poll_cycles_total", "Poll cycles by outcome");
    describe_counter!(
        "api_requests_total",
        "Twitch API requests by endpoint and HTTP status"
    );
    describe_histogram!(
        "api_request_duration_seconds",
        Unit::Seconds,
        "Twitch API request latency"
    );
    describe_counter!("notifications_total", "Clip notifications by final outcome");
    describe_counter!(
        "rate_limit_hits_total",
        "HTTP 429 responses received, by endpoint"
    );
    describe_counter!(
        "retry_attempts_total",
        "Delivery retries scheduled, by endpoint"
    );
    describe_gauge!("worker_queue_size", "Tasks waiting in the worker pool queue");
    describe_gauge!(
        "worker_utilization",
        "Fraction of pool workers currently running a task"
    );
}

/// Install the Prometheus recorder when metrics are enabled.
///
/// Returns the handle used to render the exposition text.
pub fn init(config: &MetricsConfig) -> Result<Option<PrometheusHandle>> {
    if !config.enabled {
        return Ok(None);
    }

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| ClipwatchError::Config(format!("failed to install metrics recorder: {e}")))?;
    describe();
    info!("Metrics recorder installed");
    Ok(Some(handle))
}

/// Router exposing `GET /metrics`.
pub fn router(handle: PrometheusHandle) -> Router {
    Router::new().route(
        "/metrics",
        get(move || {
            let handle = handle.clone();
            async move { handle.render() }
        }),
    )
}

/// Serve the metrics endpoint on the configured address until the process
/// exits.
pub async fn serve(config: &MetricsConfig, handle: PrometheusHandle) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(&config.listen).await?;
    info!("Metrics endpoint listening on http://{}/metrics", config.listen);
    axum::serve(listener, router(handle)).await?;
    Ok(())
}
