//! Discord webhook notifications.
//!
//! - `message`: webhook payload built from a stored clip
//! - `transport`: HTTP delivery behind the `WebhookTransport` trait
//! - `dispatcher`: rate limiting and retry policy around the transport

mod dispatcher;
mod message;
mod transport;

pub use dispatcher::{NotificationDispatcher, NotifyOutcome, RetryPolicy};
pub use message::{Embed, EmbedField, WebhookMessage, EMBED_COLOR};
pub use transport::{HttpWebhookTransport, WebhookTransport};
