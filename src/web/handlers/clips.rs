//! Clip handlers.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};

use super::AppState;
use crate::web::dto::{
    effective_limit, ApiResponse, ClipListQuery, ClipListResponse, ClipResponse, ClipSearchQuery,
    HealthResponse,
};
use crate::web::error::ApiError;

/// GET /api/clips - List the most recent clips, newest first.
pub async fn list_clips(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ClipListQuery>,
) -> Result<Json<ClipListResponse>, ApiError> {
    let limit = effective_limit(query.limit);
    let streamer = query
        .streamer
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());

    let clips = state.store.list_recent(streamer, limit).await?;
    Ok(Json(ClipListResponse::new(clips, limit)))
}

/// GET /api/clips/search - Case-insensitive title search.
pub async fn search_clips(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ClipSearchQuery>,
) -> Result<Json<ClipListResponse>, ApiError> {
    let q = query
        .q
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::bad_request("query parameter 'q' is required"))?;

    let limit = effective_limit(query.limit);
    let clips = state.store.search(q, limit).await?;
    Ok(Json(ClipListResponse::new(clips, limit)))
}

/// GET /api/clips/:id - Get a single clip.
pub async fn get_clip(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<ClipResponse>>, ApiError> {
    let clip = state
        .store
        .get_by_id(&id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("clip {id} not found")))?;
    Ok(Json(ApiResponse::new(ClipResponse::from(clip))))
}

/// GET /health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}
