//! Response DTOs for the query API.

use serde::Serialize;

use crate::db::Clip;

/// Generic API response wrapper.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    /// Response data.
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    /// Create a new API response.
    pub fn new(data: T) -> Self {
        Self { data }
    }
}

/// List wrapper carrying the applied limit.
#[derive(Debug, Serialize)]
pub struct ClipListResponse {
    pub data: Vec<ClipResponse>,
    pub meta: ListMeta,
}

#[derive(Debug, Serialize)]
pub struct ListMeta {
    /// Number of clips returned.
    pub count: usize,
    /// Limit applied to the query.
    pub limit: i64,
}

impl ClipListResponse {
    pub fn new(clips: Vec<Clip>, limit: i64) -> Self {
        let data: Vec<ClipResponse> = clips.into_iter().map(ClipResponse::from).collect();
        Self {
            meta: ListMeta {
                count: data.len(),
                limit,
            },
            data,
        }
    }
}

/// Clip as returned by the API.
#[derive(Debug, Serialize)]
pub struct ClipResponse {
    pub id: String,
    pub streamer_name: String,
    pub title: String,
    pub url: String,
    /// RFC3339.
    pub created_at: String,
    /// RFC3339.
    pub posted_at: String,
}

impl From<Clip> for ClipResponse {
    fn from(clip: Clip) -> Self {
        Self {
            id: clip.id,
            streamer_name: clip.streamer_name,
            title: clip.title,
            url: clip.url,
            created_at: clip.created_at.to_rfc3339(),
            posted_at: clip.posted_at.to_rfc3339(),
        }
    }
}

/// `GET /health` body.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}
