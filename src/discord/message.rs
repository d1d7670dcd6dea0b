//! Discord webhook payloads.

use serde::Serialize;

use crate::datetime::{format_utc_datetime, to_db_string};
use crate::db::Clip;

/// Embed colour (Twitch purple).
pub const EMBED_COLOR: u32 = 0x6441A4;

/// Display format for the "Created At" field.
const CREATED_AT_FORMAT: &str = "%b %d, %Y %H:%M:%S %Z";

/// Body of a webhook execution request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WebhookMessage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub embeds: Vec<Embed>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Embed {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub url: String,
    pub color: u32,
    /// ISO 8601 timestamp shown in the embed footer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<EmbedField>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub inline: bool,
}

impl EmbedField {
    fn inline(name: &str, value: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            value: value.into(),
            inline: true,
        }
    }
}

impl WebhookMessage {
    /// Build the announcement for a newly stored clip.
    ///
    /// `timezone` is an IANA name used for the "Created At" field.
    pub fn for_clip(clip: &Clip, username: &str, timezone: &str) -> Self {
        let embed = Embed {
            title: clip.title.clone(),
            description: Some(format!("New clip from {}!", clip.streamer_name)),
            url: clip.url.clone(),
            color: EMBED_COLOR,
            timestamp: Some(to_db_string(&clip.created_at)),
            fields: vec![
                EmbedField::inline("Streamer", &clip.streamer_name),
                EmbedField::inline(
                    "Created At",
                    format_utc_datetime(&clip.created_at, timezone, CREATED_AT_FORMAT),
                ),
            ],
        };

        Self {
            username: (!username.is_empty()).then(|| username.to_string()),
            content: None,
            embeds: vec![embed],
        }
    }
}
