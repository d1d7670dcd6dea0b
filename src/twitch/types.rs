//! Helix API response types.
//!
//! Only the fields clipwatch reads are declared; serde ignores the rest.

use serde::Deserialize;

/// Envelope shared by Helix list endpoints.
#[derive(Debug, Deserialize)]
pub struct HelixPage<T> {
    pub data: Vec<T>,
    #[serde(default)]
    pub pagination: Pagination,
}

#[derive(Debug, Default, Deserialize)]
pub struct Pagination {
    #[serde(default)]
    pub cursor: Option<String>,
}

/// Entry of `GET /users`.
#[derive(Debug, Deserialize)]
pub struct HelixUser {
    pub id: String,
    pub login: String,
    #[serde(default)]
    pub display_name: String,
}

/// Entry of `GET /clips`.
#[derive(Debug, Deserialize)]
pub struct HelixClip {
    pub id: String,
    pub url: String,
    #[serde(default)]
    pub broadcaster_id: String,
    #[serde(default)]
    pub broadcaster_name: String,
    pub title: String,
    /// RFC3339 creation time.
    pub created_at: String,
    #[serde(default)]
    pub view_count: u64,
}

/// Client-credentials token response.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    /// Lifetime in seconds.
    pub expires_in: u64,
    #[serde(default)]
    pub token_type: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_clips_page() {
        let body = r#"{
            "data": [{
                "id": "AwkwardHelplessSalamanderSwiftRage",
                "url": "https://clips.twitch.tv/AwkwardHelplessSalamanderSwiftRage",
                "embed_url": "https://clips.twitch.tv/embed?clip=AwkwardHelplessSalamanderSwiftRage",
                "broadcaster_id": "67955580",
                "broadcaster_name": "ChewieMelodies",
                "creator_id": "53834192",
                "title": "babymetal",
                "view_count": 10,
                "created_at": "2017-11-30T22:34:18Z",
                "duration": 60
            }],
            "pagination": { "cursor": "eyJiIjpudWxs" }
        }"#;

        let page: HelixPage<HelixClip> = serde_json::from_str(body).unwrap();
        assert_eq!(page.data.len(), 1);
        assert_eq!(page.data[0].title, "babymetal");
        assert_eq!(page.data[0].created_at, "2017-11-30T22:34:18Z");
        assert_eq!(page.pagination.cursor.as_deref(), Some("eyJiIjpudWxs"));
    }

    #[test]
    fn test_parse_page_without_pagination() {
        let body = r#"{ "data": [{ "id": "141981764", "login": "twitchdev", "display_name": "TwitchDev" }] }"#;
        let page: HelixPage<HelixUser> = serde_json::from_str(body).unwrap();
        assert_eq!(page.data[0].id, "141981764");
        assert!(page.pagination.cursor.is_none());
    }
}
