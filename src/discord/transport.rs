//! HTTP transport for webhook messages.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use super::WebhookMessage;
use crate::{ClipwatchError, Result};

/// Posts a message to a webhook endpoint.
///
/// Returns the HTTP status code of any response that arrived; an `Err` means
/// no response was received at all. Status interpretation is up to the
/// caller.
#[async_trait]
pub trait WebhookTransport: Send + Sync {
    async fn post(&self, endpoint: &str, message: &WebhookMessage) -> Result<u16>;
}

/// Webhook transport backed by reqwest.
#[derive(Clone)]
pub struct HttpWebhookTransport {
    client: Client,
    timeout: Duration,
}

impl HttpWebhookTransport {
    /// Create a transport with the given per-request timeout.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("clipwatch/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| ClipwatchError::Webhook(format!("failed to create HTTP client: {e}")))?;
        Ok(Self { client, timeout })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait]
impl WebhookTransport for HttpWebhookTransport {
    async fn post(&self, endpoint: &str, message: &WebhookMessage) -> Result<u16> {
        let response = self
            .client
            .post(endpoint)
            .json(message)
            .send()
            .await
            .map_err(|e| ClipwatchError::Webhook(format!("request failed: {e}")))?;

        let status = response.status().as_u16();
        debug!(status, "Webhook responded");
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discord::WebhookMessage;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn message() -> WebhookMessage {
        WebhookMessage {
            username: Some("bot".to_string()),
            content: Some("hello".to_string()),
            embeds: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_post_returns_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(body_partial_json(serde_json::json!({ "content": "hello" })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let transport = HttpWebhookTransport::new(Duration::from_secs(5)).unwrap();
        let status = transport
            .post(&format!("{}/hook", server.uri()), &message())
            .await
            .unwrap();
        assert_eq!(status, 204);
    }

    #[tokio::test]
    async fn test_post_passes_error_status_through() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let transport = HttpWebhookTransport::new(Duration::from_secs(5)).unwrap();
        let status = transport.post(&server.uri(), &message()).await.unwrap();
        assert_eq!(status, 429);
    }

    #[tokio::test]
    async fn test_post_connection_error() {
        let transport = HttpWebhookTransport::new(Duration::from_millis(500)).unwrap();
        let result = transport.post("http://127.0.0.1:1/hook", &message()).await;
        assert!(matches!(result, Err(ClipwatchError::Webhook(_))));
    }
}
