//! Token-bucket rate limiting for outbound API calls.
//!
//! One limiter guards the Twitch Helix API and another guards the Discord
//! webhook client. Both are shared between tasks through an `Arc`.

use std::num::NonZeroU32;
use std::time::Duration;

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota,
};

use crate::pipeline::ShutdownSignal;
use crate::ClipwatchError;

/// Direct (unkeyed) governor limiter.
type DirectLimiter = governor::RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Configuration for a token bucket.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LimiterConfig {
    /// Sustained refill rate in tokens per second. May be fractional
    /// (e.g. 0.5 for one request every two seconds).
    pub rate_per_sec: f64,
    /// Bucket capacity; the number of calls allowed back to back.
    pub burst: u32,
}

impl LimiterConfig {
    /// Create a new limiter configuration.
    pub fn new(rate_per_sec: f64, burst: u32) -> Self {
        Self {
            rate_per_sec,
            burst,
        }
    }

    /// Build a configuration from a per-minute budget with a burst of one.
    pub fn per_minute(requests: u32) -> Self {
        Self::new(f64::from(requests) / 60.0, 1)
    }

    fn quota(&self) -> Quota {
        let rate = if self.rate_per_sec.is_finite() && self.rate_per_sec > 0.0 {
            self.rate_per_sec
        } else {
            1.0
        };
        let period = Duration::from_secs_f64(1.0 / rate).max(Duration::from_nanos(1));
        let burst = NonZeroU32::new(self.burst).unwrap_or(NonZeroU32::MIN);
        Quota::with_period(period)
            .unwrap_or_else(|| Quota::per_second(NonZeroU32::MIN))
            .allow_burst(burst)
    }
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self::new(1.0, 1)
    }
}

/// Token-bucket rate limiter.
///
/// Fairness between waiters is not guaranteed.
///
/// # Example
///
/// ```
/// use clipwatch::rate_limit::{LimiterConfig, RateLimiter};
///
/// let limiter = RateLimiter::new(LimiterConfig::new(5.0, 1));
/// assert!(limiter.try_acquire());
/// assert!(!limiter.try_acquire());
/// ```
pub struct RateLimiter {
    config: LimiterConfig,
    inner: DirectLimiter,
}

impl RateLimiter {
    /// Create a new rate limiter. The bucket starts full.
    pub fn new(config: LimiterConfig) -> Self {
        Self {
            inner: DirectLimiter::direct(config.quota()),
            config,
        }
    }

    /// Get the limiter configuration.
    pub fn config(&self) -> LimiterConfig {
        self.config
    }

    /// Wait for a token, giving up when the shutdown signal fires.
    ///
    /// No token is consumed when the wait is cancelled.
    pub async fn acquire(&self, shutdown: &ShutdownSignal) -> Result<(), ClipwatchError> {
        if shutdown.is_triggered() {
            return Err(ClipwatchError::Cancelled);
        }
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => Err(ClipwatchError::Cancelled),
            _ = self.inner.until_ready() => Ok(()),
        }
    }

    /// Wait for a token without cancellation.
    pub async fn wait(&self) {
        self.inner.until_ready().await;
    }

    /// Take a token if one is available right now.
    pub fn try_acquire(&self) -> bool {
        self.inner.check().is_ok()
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::ShutdownTrigger;
    use std::time::Instant;

    #[test]
    fn test_burst_then_empty() {
        let limiter = RateLimiter::new(LimiterConfig::new(1.0, 3));
        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
    }

    #[test]
    fn test_per_minute_config() {
        let config = LimiterConfig::per_minute(30);
        assert!((config.rate_per_sec - 0.5).abs() < f64::EPSILON);
        assert_eq!(config.burst, 1);
    }

    #[test]
    fn test_invalid_config_is_clamped() {
        let limiter = RateLimiter::new(LimiterConfig::new(0.0, 0));
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
    }

    #[tokio::test]
    async fn test_refill_rate() {
        let limiter = RateLimiter::new(LimiterConfig::new(20.0, 1));
        let start = Instant::now();
        limiter.wait().await;
        limiter.wait().await;
        limiter.wait().await;
        // Two refills at 50ms each.
        assert!(start.elapsed() >= Duration::from_millis(90));
    }

    #[tokio::test]
    async fn test_acquire_available_token() {
        let (_trigger, signal) = ShutdownTrigger::new();
        let limiter = RateLimiter::new(LimiterConfig::new(10.0, 2));
        assert!(limiter.acquire(&signal).await.is_ok());
        assert!(limiter.acquire(&signal).await.is_ok());
    }

    #[tokio::test]
    async fn test_acquire_cancelled_by_shutdown() {
        let (trigger, signal) = ShutdownTrigger::new();
        let limiter = RateLimiter::new(LimiterConfig::new(0.1, 1));
        assert!(limiter.try_acquire());

        let waiter = {
            let signal = signal.clone();
            async move { limiter.acquire(&signal).await }
        };
        let handle = tokio::spawn(waiter);
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.trigger();

        let result = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(result, Err(ClipwatchError::Cancelled)));
    }

    #[tokio::test]
    async fn test_acquire_after_shutdown_fails_fast() {
        let (trigger, signal) = ShutdownTrigger::new();
        trigger.trigger();
        let limiter = RateLimiter::new(LimiterConfig::new(10.0, 1));
        assert!(matches!(
            limiter.acquire(&signal).await,
            Err(ClipwatchError::Cancelled)
        ));
        // The token was not consumed.
        assert!(limiter.try_acquire());
    }
}
