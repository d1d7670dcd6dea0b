//! clipwatch - Twitch clip notifier
//!
//! Polls the Twitch Helix API for new clips of configured broadcasters,
//! records each clip once in SQLite, and announces it on a Discord webhook.

pub mod app;
pub mod config;
pub mod datetime;
pub mod db;
pub mod discord;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod rate_limit;
pub mod telemetry;
pub mod twitch;
pub mod web;

pub use app::Application;
pub use config::Config;
pub use db::{Clip, ClipStore, Database, ItemStore};
pub use error::{ClipwatchError, Result};
pub use pipeline::{IngestionPipeline, MonitoredSource, ShutdownSignal, ShutdownTrigger};
