//! CORS configuration.

use axum::http::header::{ACCEPT, CONTENT_TYPE};
use axum::http::{HeaderValue, Method};
use tower_http::cors::{Any, CorsLayer};

/// Create a CORS layer for the read-only API.
///
/// An empty origin list (or one with no parseable entry) allows any origin.
pub fn create_cors_layer(origins: &[String]) -> CorsLayer {
    let methods = [Method::GET, Method::OPTIONS];

    let parsed: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();
    if parsed.is_empty() {
        CorsLayer::new()
            .allow_methods(methods)
            .allow_headers(Any)
            .allow_origin(Any)
    } else {
        CorsLayer::new()
            .allow_methods(methods)
            .allow_headers([CONTENT_TYPE, ACCEPT])
            .allow_origin(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request, routing::get, Router};
    use tower::ServiceExt;

    async fn allow_origin_for(origins: &[String], origin: &str) -> Option<String> {
        let app = Router::new()
            .route("/", get(|| async { "ok" }))
            .layer(create_cors_layer(origins));
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/")
                    .header("origin", origin)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        response
            .headers()
            .get("access-control-allow-origin")
            .map(|v| v.to_str().unwrap().to_string())
    }

    #[tokio::test]
    async fn test_empty_origins_allow_any() {
        let value = allow_origin_for(&[], "http://example.com").await;
        assert_eq!(value.as_deref(), Some("*"));
    }

    #[tokio::test]
    async fn test_configured_origin() {
        let origins = vec!["http://localhost:3000".to_string()];
        let value = allow_origin_for(&origins, "http://localhost:3000").await;
        assert_eq!(value.as_deref(), Some("http://localhost:3000"));

        let value = allow_origin_for(&origins, "http://evil.example").await;
        assert!(value.is_none());
    }
}
