//! Twitch Helix client.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::types::{HelixClip, HelixPage, HelixUser, TokenResponse};
use super::ClipSource;
use crate::config::TwitchConfig;
use crate::datetime::{parse_datetime, to_db_string};
use crate::pipeline::DiscoveredClip;
use crate::{ClipwatchError, Result};

/// Clips requested per page (Helix maximum).
const PAGE_SIZE: &str = "100";

/// Upper bound on pages fetched in one listing.
const MAX_PAGES: usize = 10;

/// Tokens are renewed this long before they expire.
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Cached app access token.
struct AppToken {
    access_token: String,
    expires_at: Instant,
}

impl AppToken {
    fn is_fresh(&self) -> bool {
        Instant::now() + TOKEN_REFRESH_MARGIN < self.expires_at
    }
}

/// Helix API client authenticated with an app access token.
pub struct HelixClient {
    client: Client,
    base_url: String,
    auth_url: String,
    client_id: String,
    client_secret: String,
    token: Mutex<Option<AppToken>>,
}

impl HelixClient {
    /// Create a client from the Twitch configuration.
    pub fn new(config: &TwitchConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("clipwatch/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ClipwatchError::Upstream(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            auth_url: config.auth_url.clone(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            token: Mutex::new(None),
        })
    }

    /// Get a valid app access token, requesting a new one when needed.
    async fn access_token(&self) -> Result<String> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref().filter(|t| t.is_fresh()) {
            return Ok(token.access_token.clone());
        }

        debug!("Requesting Twitch app access token");
        let response = self
            .client
            .post(&self.auth_url)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("grant_type", "client_credentials"),
            ])
            .send()
            .await
            .map_err(|e| ClipwatchError::Upstream(format!("token request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClipwatchError::Upstream(format!(
                "token request returned HTTP {status}"
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| ClipwatchError::Upstream(format!("invalid token response: {e}")))?;
        info!("Obtained Twitch app access token (expires in {}s)", token.expires_in);

        let access_token = token.access_token.clone();
        *cached = Some(AppToken {
            access_token: token.access_token,
            expires_at: Instant::now() + Duration::from_secs(token.expires_in),
        });
        Ok(access_token)
    }

    /// Send an authenticated GET and decode the JSON body.
    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &'static str,
        query: &[(&str, &str)],
    ) -> Result<T> {
        let token = self.access_token().await?;
        let request = self
            .client
            .get(format!("{}/{}", self.base_url, endpoint))
            .query(query);

        let started = Instant::now();
        let result = self.authorize(request, &token).send().await;
        histogram!("api_request_duration_seconds", "endpoint" => endpoint)
            .record(started.elapsed().as_secs_f64());

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                counter!("api_requests_total", "endpoint" => endpoint, "status" => "error")
                    .increment(1);
                return Err(ClipwatchError::Upstream(format!("{endpoint} request failed: {e}")));
            }
        };

        let status = response.status();
        counter!(
            "api_requests_total",
            "endpoint" => endpoint,
            "status" => status.as_u16().to_string()
        )
        .increment(1);

        if status == StatusCode::UNAUTHORIZED {
            warn!("Twitch rejected the access token; it will be renewed");
            *self.token.lock().await = None;
        }
        if status == StatusCode::TOO_MANY_REQUESTS {
            counter!("rate_limit_hits_total", "endpoint" => "twitch_api").increment(1);
        }
        if !status.is_success() {
            return Err(ClipwatchError::Upstream(format!(
                "{endpoint} returned HTTP {status}"
            )));
        }

        response
            .json()
            .await
            .map_err(|e| ClipwatchError::Upstream(format!("invalid {endpoint} response: {e}")))
    }

    fn authorize(&self, request: RequestBuilder, token: &str) -> RequestBuilder {
        request
            .header("Client-Id", &self.client_id)
            .bearer_auth(token)
    }
}

#[async_trait]
impl ClipSource for HelixClient {
    async fn resolve_identity(&self, name: &str) -> Result<String> {
        let page: HelixPage<HelixUser> = self.get_json("users", &[("login", name)]).await?;
        page.data
            .into_iter()
            .next()
            .map(|user| {
                debug!(login = %user.login, id = %user.id, "Resolved broadcaster");
                user.id
            })
            .ok_or_else(|| ClipwatchError::NotFound(format!("broadcaster {name}")))
    }

    async fn list_clips_since(
        &self,
        source: &str,
        broadcaster_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<DiscoveredClip>> {
        // Helix defaults ended_at to one week after started_at.
        let started_at = to_db_string(&since);
        let ended_at = to_db_string(&Utc::now());

        let mut clips = Vec::new();
        let mut cursor: Option<String> = None;
        for _ in 0..MAX_PAGES {
            let page: HelixPage<HelixClip> = {
                let mut query = vec![
                    ("broadcaster_id", broadcaster_id),
                    ("started_at", started_at.as_str()),
                    ("ended_at", ended_at.as_str()),
                    ("first", PAGE_SIZE),
                ];
                if let Some(after) = cursor.as_deref() {
                    query.push(("after", after));
                }
                self.get_json("clips", &query).await?
            };
            for clip in page.data {
                let Some(created_at) = parse_datetime(&clip.created_at) else {
                    warn!(clip_id = %clip.id, "Skipping clip with invalid created_at {:?}", clip.created_at);
                    continue;
                };
                if created_at < since {
                    continue;
                }
                clips.push(DiscoveredClip {
                    source: source.to_string(),
                    id: clip.id,
                    title: clip.title,
                    url: clip.url,
                    created_at,
                });
            }

            match page.pagination.cursor.filter(|c| !c.is_empty()) {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        clips.sort_by_key(|c| c.created_at);
        Ok(clips)
    }
}
