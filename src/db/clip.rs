//! Clip records and their SQLite repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{DbPool, ItemStore};
use crate::datetime::{parse_datetime, to_db_string};
use crate::pipeline::DiscoveredClip;
use crate::Result;

/// A stored clip.
///
/// Written once by an ingestion task and never modified afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Clip {
    /// Twitch clip ID (unique key).
    pub id: String,
    /// Broadcaster login the clip belongs to.
    pub streamer_name: String,
    /// Clip title.
    pub title: String,
    /// Public clip URL.
    pub url: String,
    /// When the clip was created on Twitch.
    pub created_at: DateTime<Utc>,
    /// When the clip was stored.
    pub posted_at: DateTime<Utc>,
}

impl Clip {
    /// Build the stored record for a freshly discovered clip.
    pub fn from_discovered(clip: DiscoveredClip, posted_at: DateTime<Utc>) -> Self {
        Self {
            id: clip.id,
            streamer_name: clip.source,
            title: clip.title,
            url: clip.url,
            created_at: clip.created_at,
            posted_at,
        }
    }
}

/// Row type for clips from database.
#[derive(Debug, Clone, sqlx::FromRow)]
struct ClipRow {
    id: String,
    streamer_name: String,
    title: String,
    url: String,
    created_at: String,
    posted_at: String,
}

impl From<ClipRow> for Clip {
    fn from(row: ClipRow) -> Self {
        Clip {
            id: row.id,
            streamer_name: row.streamer_name,
            title: row.title,
            url: row.url,
            created_at: parse_datetime(&row.created_at).unwrap_or_default(),
            posted_at: parse_datetime(&row.posted_at).unwrap_or_else(Utc::now),
        }
    }
}

/// Repository for clips.
///
/// Owns a handle to the pool (pools are reference counted), so one
/// instance can be shared by every poller and worker.
#[derive(Clone)]
pub struct ClipStore {
    pool: DbPool,
}

impl ClipStore {
    /// Create a new repository instance.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Get a clip by ID.
    pub async fn get_by_id(&self, id: &str) -> Result<Option<Clip>> {
        let row = sqlx::query_as::<_, ClipRow>(
            r#"
            SELECT id, streamer_name, title, url, created_at, posted_at
            FROM clips
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Clip::from))
    }

    /// List the newest clips, optionally restricted to one streamer.
    pub async fn list_recent(&self, streamer: Option<&str>, limit: i64) -> Result<Vec<Clip>> {
        let rows = match streamer {
            Some(name) => {
                sqlx::query_as::<_, ClipRow>(
                    r#"
                    SELECT id, streamer_name, title, url, created_at, posted_at
                    FROM clips
                    WHERE streamer_name = $1
                    ORDER BY created_at DESC
                    LIMIT $2
                    "#,
                )
                .bind(name.to_lowercase())
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, ClipRow>(
                    r#"
                    SELECT id, streamer_name, title, url, created_at, posted_at
                    FROM clips
                    ORDER BY created_at DESC
                    LIMIT $1
                    "#,
                )
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
        };

        Ok(rows.into_iter().map(Clip::from).collect())
    }

    /// Search clip titles (case-insensitive substring match), newest first.
    pub async fn search(&self, query: &str, limit: i64) -> Result<Vec<Clip>> {
        let pattern = format!("%{}%", escape_like(&query.to_lowercase()));
        let rows = sqlx::query_as::<_, ClipRow>(
            r#"
            SELECT id, streamer_name, title, url, created_at, posted_at
            FROM clips
            WHERE LOWER(title) LIKE $1 ESCAPE '\'
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(pattern)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Clip::from).collect())
    }

    /// Count stored clips, optionally for one streamer.
    pub async fn count(&self, streamer: Option<&str>) -> Result<i64> {
        let count: i64 = match streamer {
            Some(name) => {
                sqlx::query_scalar("SELECT COUNT(*) FROM clips WHERE streamer_name = $1")
                    .bind(name.to_lowercase())
                    .fetch_one(&self.pool)
                    .await?
            }
            None => {
                sqlx::query_scalar("SELECT COUNT(*) FROM clips")
                    .fetch_one(&self.pool)
                    .await?
            }
        };
        Ok(count)
    }
}

#[async_trait]
impl ItemStore for ClipStore {
    async fn exists(&self, clip_id: &str) -> Result<bool> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM clips WHERE id = $1)")
            .bind(clip_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }

    async fn latest_timestamp(&self, source: &str) -> Result<Option<DateTime<Utc>>> {
        let latest: Option<String> =
            sqlx::query_scalar("SELECT MAX(created_at) FROM clips WHERE streamer_name = $1")
                .bind(source)
                .fetch_one(&self.pool)
                .await?;
        Ok(latest.as_deref().and_then(parse_datetime))
    }

    async fn insert(&self, clip: &Clip) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO clips (id, streamer_name, title, url, created_at, posted_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT(id) DO NOTHING
            "#,
        )
        .bind(&clip.id)
        .bind(&clip.streamer_name)
        .bind(&clip.title)
        .bind(&clip.url)
        .bind(to_db_string(&clip.created_at))
        .bind(to_db_string(&clip.posted_at))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

fn escape_like(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use chrono::TimeZone;

    fn clip(id: &str, streamer: &str, title: &str, minute: u32) -> Clip {
        let created_at = Utc.with_ymd_and_hms(2024, 3, 1, 12, minute, 0).unwrap();
        Clip {
            id: id.to_string(),
            streamer_name: streamer.to_string(),
            title: title.to_string(),
            url: format!("https://clips.twitch.tv/{id}"),
            created_at,
            posted_at: created_at,
        }
    }

    async fn setup() -> ClipStore {
        let db = Database::open_in_memory().await.unwrap();
        ClipStore::new(db.pool().clone())
    }

    #[tokio::test]
    async fn test_insert_and_exists() {
        let store = setup().await;
        assert!(!store.exists("abc").await.unwrap());

        assert!(store.insert(&clip("abc", "alice", "Nice shot", 1)).await.unwrap());
        assert!(store.exists("abc").await.unwrap());

        let stored = store.get_by_id("abc").await.unwrap().unwrap();
        assert_eq!(stored, clip("abc", "alice", "Nice shot", 1));
    }

    #[tokio::test]
    async fn test_insert_duplicate_is_ignored() {
        let store = setup().await;
        assert!(store.insert(&clip("abc", "alice", "First", 1)).await.unwrap());
        assert!(!store.insert(&clip("abc", "alice", "Second", 2)).await.unwrap());

        let stored = store.get_by_id("abc").await.unwrap().unwrap();
        assert_eq!(stored.title, "First");
        assert_eq!(store.count(None).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_latest_timestamp_per_source() {
        let store = setup().await;
        assert_eq!(store.latest_timestamp("alice").await.unwrap(), None);

        store.insert(&clip("a1", "alice", "one", 5)).await.unwrap();
        store.insert(&clip("a2", "alice", "two", 30)).await.unwrap();
        store.insert(&clip("a3", "alice", "three", 10)).await.unwrap();
        store.insert(&clip("b1", "bob", "other", 59)).await.unwrap();

        let latest = store.latest_timestamp("alice").await.unwrap();
        assert_eq!(latest, Some(Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap()));
    }

    #[tokio::test]
    async fn test_list_recent() {
        let store = setup().await;
        store.insert(&clip("a1", "alice", "one", 5)).await.unwrap();
        store.insert(&clip("a2", "alice", "two", 30)).await.unwrap();
        store.insert(&clip("b1", "bob", "other", 59)).await.unwrap();

        let all = store.list_recent(None, 10).await.unwrap();
        let ids: Vec<_> = all.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["b1", "a2", "a1"]);

        let alice = store.list_recent(Some("Alice"), 1).await.unwrap();
        assert_eq!(alice.len(), 1);
        assert_eq!(alice[0].id, "a2");
        assert_eq!(store.count(Some("alice")).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_search_is_case_insensitive() {
        let store = setup().await;
        store.insert(&clip("a1", "alice", "Insane Clutch", 5)).await.unwrap();
        store.insert(&clip("a2", "alice", "funny fail", 6)).await.unwrap();
        store.insert(&clip("a3", "alice", "100% luck", 7)).await.unwrap();

        let found = store.search("CLUTCH", 10).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "a1");

        let found = store.search("100%", 10).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "a3");

        assert!(store.search("nothing", 10).await.unwrap().is_empty());
    }

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
    }
}
