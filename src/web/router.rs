//! Router configuration for the query API.

use std::sync::Arc;

use axum::{routing::get, Router};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use super::handlers::{get_clip, health, list_clips, search_clips, AppState};
use super::middleware::create_cors_layer;

/// Create the API router (`/api/...`).
pub fn create_router(app_state: Arc<AppState>, cors_origins: &[String]) -> Router {
    let clip_routes = Router::new()
        .route("/", get(list_clips))
        .route("/search", get(search_clips))
        .route("/:id", get(get_clip));

    Router::new()
        .nest("/api/clips", clip_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(create_cors_layer(cors_origins)),
        )
        .with_state(app_state)
}

/// Create a health check router.
pub fn create_health_router() -> Router {
    Router::new().route("/health", get(health))
}
