//! Clip notification delivery with rate limiting and retries.

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use tracing::{debug, info, warn};

use super::{WebhookMessage, WebhookTransport};
use crate::config::DiscordConfig;
use crate::db::Clip;
use crate::rate_limit::RateLimiter;

/// HTTP status Discord returns when a webhook is being rate limited.
const STATUS_TOO_MANY_REQUESTS: u16 = 429;

/// Attempt budget and waits between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Wait after the first generic failure; doubled for each further one.
    pub backoff_base: Duration,
    /// Fixed wait after a rate-limited response.
    pub rate_limit_cooldown: Duration,
}

impl RetryPolicy {
    /// Wait after the `n`th generic failure (0-based).
    pub fn backoff(&self, n: u32) -> Duration {
        1u32.checked_shl(n)
            .map(|factor| self.backoff_base.saturating_mul(factor))
            .unwrap_or(Duration::MAX)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: Duration::from_secs(1),
            rate_limit_cooldown: Duration::from_secs(5),
        }
    }
}

impl From<&DiscordConfig> for RetryPolicy {
    fn from(config: &DiscordConfig) -> Self {
        Self {
            max_attempts: config.retry_attempts.max(1),
            backoff_base: Duration::from_millis(config.backoff_base_ms),
            rate_limit_cooldown: Duration::from_millis(config.rate_limit_cooldown_ms),
        }
    }
}

/// Final result of one notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyOutcome {
    Delivered { attempts: u32 },
    Failed { attempts: u32, last_error: String },
}

impl NotifyOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, NotifyOutcome::Delivered { .. })
    }
}

/// Result of a single delivery attempt.
enum Attempt {
    Delivered,
    RateLimited,
    Failed(String),
}

/// Sends one announcement per stored clip.
pub struct NotificationDispatcher {
    transport: Arc<dyn WebhookTransport>,
    limiter: Arc<RateLimiter>,
    policy: RetryPolicy,
    username: String,
    timezone: String,
}

impl NotificationDispatcher {
    pub fn new(
        transport: Arc<dyn WebhookTransport>,
        limiter: Arc<RateLimiter>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            transport,
            limiter,
            policy,
            username: String::new(),
            timezone: "UTC".to_string(),
        }
    }

    /// Set the bot username shown on messages.
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = username.into();
        self
    }

    /// Set the timezone used to display creation times.
    pub fn with_timezone(mut self, timezone: impl Into<String>) -> Self {
        self.timezone = timezone.into();
        self
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Announce a clip on a webhook.
    ///
    /// Takes one token from the downstream limiter, then tries up to
    /// `max_attempts` times. Never returns an error: exhaustion is reported
    /// as [`NotifyOutcome::Failed`].
    pub async fn notify(&self, clip: &Clip, webhook_url: &str) -> NotifyOutcome {
        let message = WebhookMessage::for_clip(clip, &self.username, &self.timezone);
        self.limiter.wait().await;

        let max_attempts = self.policy.max_attempts.max(1);
        let mut generic_failures = 0u32;
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            let wait = match self.attempt(webhook_url, &message).await {
                Attempt::Delivered => {
                    counter!("notifications_total", "outcome" => "delivered").increment(1);
                    debug!(clip_id = %clip.id, attempt, "Notification delivered");
                    return NotifyOutcome::Delivered { attempts: attempt };
                }
                Attempt::RateLimited => {
                    counter!("rate_limit_hits_total", "endpoint" => "discord_webhook").increment(1);
                    last_error = "rate limited (HTTP 429)".to_string();
                    self.policy.rate_limit_cooldown
                }
                Attempt::Failed(error) => {
                    let wait = self.policy.backoff(generic_failures);
                    generic_failures += 1;
                    last_error = error;
                    wait
                }
            };

            if attempt == max_attempts {
                break;
            }
            counter!("retry_attempts_total", "endpoint" => "discord_webhook").increment(1);
            info!(
                clip_id = %clip.id,
                attempt,
                error = %last_error,
                "Notification attempt failed, retrying in {:?}",
                wait
            );
            tokio::time::sleep(wait).await;
        }

        counter!("notifications_total", "outcome" => "failed").increment(1);
        warn!(
            clip_id = %clip.id,
            attempts = max_attempts,
            error = %last_error,
            "Notification failed"
        );
        NotifyOutcome::Failed {
            attempts: max_attempts,
            last_error,
        }
    }

    async fn attempt(&self, webhook_url: &str, message: &WebhookMessage) -> Attempt {
        match self.transport.post(webhook_url, message).await {
            Ok(status) if (200..300).contains(&status) => Attempt::Delivered,
            Ok(STATUS_TOO_MANY_REQUESTS) => Attempt::RateLimited,
            Ok(status) => Attempt::Failed(format!("webhook returned HTTP {status}")),
            Err(e) => Attempt::Failed(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limit::LimiterConfig;
    use crate::ClipwatchError;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tokio::time::Instant;

    /// Replays scripted responses and records when each post happened.
    struct ScriptedTransport {
        responses: Mutex<VecDeque<crate::Result<u16>>>,
        calls: Mutex<Vec<Instant>>,
    }

    impl ScriptedTransport {
        fn new(responses: Vec<crate::Result<u16>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn gaps(&self) -> Vec<Duration> {
            let calls = self.calls.lock().unwrap();
            calls.windows(2).map(|w| w[1] - w[0]).collect()
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl WebhookTransport for ScriptedTransport {
        async fn post(&self, _endpoint: &str, _message: &WebhookMessage) -> crate::Result<u16> {
            self.calls.lock().unwrap().push(Instant::now());
            self.responses.lock().unwrap().pop_front().unwrap_or(Ok(204))
        }
    }

    fn clip() -> Clip {
        Clip {
            id: "clip1".to_string(),
            streamer_name: "alice".to_string(),
            title: "title".to_string(),
            url: "https://clips.twitch.tv/clip1".to_string(),
            created_at: Utc::now(),
            posted_at: Utc::now(),
        }
    }

    fn dispatcher(transport: Arc<ScriptedTransport>) -> NotificationDispatcher {
        // Generous limiter so the wall-clock bucket never interferes with
        // the paused test clock.
        let limiter = Arc::new(RateLimiter::new(LimiterConfig::new(1000.0, 100)));
        NotificationDispatcher::new(transport, limiter, RetryPolicy::default())
    }

    fn network_error() -> crate::Result<u16> {
        Err(ClipwatchError::Webhook("connection reset".to_string()))
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(0), Duration::from_secs(1));
        assert_eq!(policy.backoff(1), Duration::from_secs(2));
        assert_eq!(policy.backoff(2), Duration::from_secs(4));
        assert_eq!(policy.backoff(64), Duration::MAX);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delivered_first_try() {
        let transport = ScriptedTransport::new(vec![Ok(204)]);
        let outcome = dispatcher(transport.clone()).notify(&clip(), "http://hook").await;
        assert_eq!(outcome, NotifyOutcome::Delivered { attempts: 1 });
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fail_fail_succeed_is_delivered() {
        let transport = ScriptedTransport::new(vec![network_error(), Ok(500), Ok(200)]);
        let outcome = dispatcher(transport.clone()).notify(&clip(), "http://hook").await;

        assert_eq!(outcome, NotifyOutcome::Delivered { attempts: 3 });
        let gaps = transport.gaps();
        assert_eq!(gaps, vec![Duration::from_secs(1), Duration::from_secs(2)]);
        assert!(gaps[0] < gaps[1]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_waits_fixed_cooldown() {
        let transport = ScriptedTransport::new(vec![Ok(429), Ok(503), Ok(204)]);
        let outcome = dispatcher(transport.clone()).notify(&clip(), "http://hook").await;

        assert_eq!(outcome, NotifyOutcome::Delivered { attempts: 3 });
        // The 429 does not advance the exponential schedule.
        assert_eq!(
            transport.gaps(),
            vec![Duration::from_secs(5), Duration::from_secs(1)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_attempts_fail_without_trailing_wait() {
        let transport = ScriptedTransport::new(vec![Ok(500), Ok(500), Ok(404)]);
        let start = Instant::now();
        let outcome = dispatcher(transport.clone()).notify(&clip(), "http://hook").await;

        assert_eq!(
            outcome,
            NotifyOutcome::Failed {
                attempts: 3,
                last_error: "webhook returned HTTP 404".to_string(),
            }
        );
        assert_eq!(transport.call_count(), 3);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(3) && elapsed < Duration::from_secs(4));
    }

    #[test]
    fn test_policy_from_config() {
        let config = DiscordConfig {
            retry_attempts: 0,
            backoff_base_ms: 250,
            rate_limit_cooldown_ms: 2000,
            ..DiscordConfig::default()
        };
        let policy = RetryPolicy::from(&config);
        assert_eq!(policy.max_attempts, 1);
        assert_eq!(policy.backoff(1), Duration::from_millis(500));
        assert_eq!(policy.rate_limit_cooldown, Duration::from_secs(2));
    }
}
