//! Configuration module for clipwatch.

use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use crate::pipeline::MonitoredSource;
use crate::{ClipwatchError, Result};

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: String,
}

fn default_db_path() -> String {
    "data/clipwatch.db".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Twitch Helix API configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct TwitchConfig {
    /// Application client ID.
    #[serde(default)]
    pub client_id: String,
    /// Application client secret.
    #[serde(default)]
    pub client_secret: String,
    /// Base URL of the Helix API.
    #[serde(default = "default_twitch_api_base_url")]
    pub api_base_url: String,
    /// OAuth token endpoint.
    #[serde(default = "default_twitch_auth_url")]
    pub auth_url: String,
    /// Default polling interval per source in seconds.
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,
    /// Upstream request budget (poll cycles per minute, shared by all sources).
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,
    /// How far back to look for clips of a source with nothing stored yet.
    #[serde(default = "default_backfill_hours")]
    pub backfill_hours: u64,
    /// Total request timeout in seconds.
    #[serde(default = "default_twitch_timeout")]
    pub timeout_secs: u64,
}

fn default_twitch_api_base_url() -> String {
    "https://api.twitch.tv/helix".to_string()
}

fn default_twitch_auth_url() -> String {
    "https://id.twitch.tv/oauth2/token".to_string()
}

fn default_check_interval() -> u64 {
    60
}

fn default_requests_per_minute() -> u32 {
    30
}

fn default_backfill_hours() -> u64 {
    24
}

fn default_twitch_timeout() -> u64 {
    10
}

impl Default for TwitchConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            api_base_url: default_twitch_api_base_url(),
            auth_url: default_twitch_auth_url(),
            check_interval_secs: default_check_interval(),
            requests_per_minute: default_requests_per_minute(),
            backfill_hours: default_backfill_hours(),
            timeout_secs: default_twitch_timeout(),
        }
    }
}

/// Discord webhook configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DiscordConfig {
    /// Username shown on webhook messages.
    #[serde(default = "default_discord_username")]
    pub username: String,
    /// Webhook requests per second (shared by all sources).
    #[serde(default = "default_discord_rate_limit")]
    pub rate_limit: u32,
    /// Delivery attempts per notification.
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    /// Base delay of the exponential backoff in milliseconds.
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    /// Fixed wait after a 429 response in milliseconds.
    #[serde(default = "default_rate_limit_cooldown_ms")]
    pub rate_limit_cooldown_ms: u64,
    /// Request timeout in seconds.
    #[serde(default = "default_discord_timeout")]
    pub timeout_secs: u64,
    /// Timezone for the "Created At" field (e.g., "UTC", "Europe/Berlin").
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

fn default_discord_username() -> String {
    "TwitchClipBot".to_string()
}

fn default_discord_rate_limit() -> u32 {
    5
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    1000
}

fn default_rate_limit_cooldown_ms() -> u64 {
    5000
}

fn default_discord_timeout() -> u64 {
    10
}

fn default_timezone() -> String {
    "UTC".to_string()
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            username: default_discord_username(),
            rate_limit: default_discord_rate_limit(),
            retry_attempts: default_retry_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            rate_limit_cooldown_ms: default_rate_limit_cooldown_ms(),
            timeout_secs: default_discord_timeout(),
            timezone: default_timezone(),
        }
    }
}

/// Worker pool configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    /// Number of concurrent executors.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Queue capacity (0 = 100 per worker).
    #[serde(default)]
    pub queue_capacity: usize,
}

/// Upper bound on `worker.workers`.
pub const MAX_WORKERS: usize = 1024;

/// Upper bound on the effective queue capacity.
pub const MAX_QUEUE_CAPACITY: usize = 1_000_000;

fn default_workers() -> usize {
    5
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_capacity: 0,
        }
    }
}

/// Query API configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct WebConfig {
    /// Whether the query API is enabled.
    #[serde(default)]
    pub enabled: bool,
    /// Host address to bind.
    #[serde(default = "default_web_host")]
    pub host: String,
    /// Port number.
    #[serde(default = "default_web_port")]
    pub port: u16,
    /// CORS allowed origins.
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

fn default_web_host() -> String {
    "0.0.0.0".to_string()
}

fn default_web_port() -> u16 {
    8080
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: default_web_host(),
            port: default_web_port(),
            cors_origins: vec![],
        }
    }
}

/// Metrics exporter configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    /// Whether the Prometheus exporter is enabled.
    #[serde(default)]
    pub enabled: bool,
    /// Listen address of the exporter.
    #[serde(default = "default_metrics_listen")]
    pub listen: String,
}

fn default_metrics_listen() -> String {
    "0.0.0.0:9090".to_string()
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen: default_metrics_listen(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Path to the log file.
    #[serde(default = "default_log_file")]
    pub file: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_file() -> String {
    "logs/clipwatch.log".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: default_log_file(),
        }
    }
}

/// A broadcaster to watch.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    /// Twitch login name.
    pub name: String,
    /// Discord webhook that receives this broadcaster's clips.
    pub webhook_url: String,
    /// Polling interval override in seconds.
    #[serde(default)]
    pub check_interval_secs: Option<u64>,
}

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Twitch configuration.
    #[serde(default)]
    pub twitch: TwitchConfig,
    /// Discord configuration.
    #[serde(default)]
    pub discord: DiscordConfig,
    /// Worker pool configuration.
    #[serde(default)]
    pub worker: WorkerConfig,
    /// Query API configuration.
    #[serde(default)]
    pub web: WebConfig,
    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Watched broadcasters.
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(ClipwatchError::Io)?;
        Self::parse(&content)
    }

    /// Load configuration from a TOML file and apply environment variable overrides.
    pub fn load_with_env<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| ClipwatchError::Config(format!("config parse error: {e}")))
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Supported environment variables:
    /// - `CLIPWATCH_TWITCH_CLIENT_ID`
    /// - `CLIPWATCH_TWITCH_CLIENT_SECRET`
    pub fn apply_env_overrides(&mut self) {
        if let Ok(client_id) = std::env::var("CLIPWATCH_TWITCH_CLIENT_ID") {
            if !client_id.is_empty() {
                self.twitch.client_id = client_id;
            }
        }
        if let Ok(secret) = std::env::var("CLIPWATCH_TWITCH_CLIENT_SECRET") {
            if !secret.is_empty() {
                self.twitch.client_secret = secret;
            }
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.twitch.client_id.is_empty() || self.twitch.client_secret.is_empty() {
            return Err(ClipwatchError::Validation(
                "twitch client_id and client_secret are required. \
                 Set them in the config file or via CLIPWATCH_TWITCH_CLIENT_ID / \
                 CLIPWATCH_TWITCH_CLIENT_SECRET."
                    .to_string(),
            ));
        }
        if self.sources.is_empty() {
            return Err(ClipwatchError::Validation(
                "at least one [[sources]] entry is required".to_string(),
            ));
        }
        if self.twitch.check_interval_secs == 0 {
            return Err(ClipwatchError::Validation(
                "twitch.check_interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.worker.workers == 0 {
            return Err(ClipwatchError::Validation(
                "worker.workers must be at least 1".to_string(),
            ));
        }
        if self.worker.workers > MAX_WORKERS || self.queue_capacity() > MAX_QUEUE_CAPACITY {
            return Err(ClipwatchError::Validation(format!(
                "worker pool too large (at most {MAX_WORKERS} workers and a queue of {MAX_QUEUE_CAPACITY})"
            )));
        }
        if self.twitch.requests_per_minute == 0 || self.discord.rate_limit == 0 {
            return Err(ClipwatchError::Validation(
                "rate limits must be greater than zero".to_string(),
            ));
        }
        if self.discord.retry_attempts == 0 {
            return Err(ClipwatchError::Validation(
                "discord.retry_attempts must be at least 1".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for source in &self.sources {
            if source.name.trim().is_empty() {
                return Err(ClipwatchError::Validation(
                    "source name must not be empty".to_string(),
                ));
            }
            if !seen.insert(source.name.to_lowercase()) {
                return Err(ClipwatchError::Validation(format!(
                    "duplicate source: {}",
                    source.name
                )));
            }
            validate_webhook_url(&source.webhook_url)?;
            if source.check_interval_secs == Some(0) {
                return Err(ClipwatchError::Validation(format!(
                    "check_interval_secs of {} must be greater than zero",
                    source.name
                )));
            }
        }
        Ok(())
    }

    /// Build the immutable list of monitored sources.
    pub fn sources(&self) -> Vec<MonitoredSource> {
        self.sources
            .iter()
            .map(|s| MonitoredSource {
                name: s.name.to_lowercase(),
                webhook_url: s.webhook_url.clone(),
                poll_interval: Duration::from_secs(
                    s.check_interval_secs
                        .unwrap_or(self.twitch.check_interval_secs),
                ),
            })
            .collect()
    }

    /// First-run look-back window.
    pub fn backfill(&self) -> Duration {
        Duration::from_secs(self.twitch.backfill_hours.saturating_mul(3600))
    }

    /// Effective queue capacity of the worker pool.
    pub fn queue_capacity(&self) -> usize {
        if self.worker.queue_capacity == 0 {
            self.worker.workers.saturating_mul(100)
        } else {
            self.worker.queue_capacity
        }
    }
}

fn validate_webhook_url(raw: &str) -> Result<()> {
    let parsed = url::Url::parse(raw)
        .map_err(|e| ClipwatchError::Validation(format!("invalid webhook URL {raw}: {e}")))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        scheme => Err(ClipwatchError::Validation(format!(
            "unsupported webhook URL scheme: {scheme}"
        ))),
    }
}
