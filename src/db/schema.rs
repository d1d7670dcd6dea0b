//! Database schema and migrations for clipwatch.
//!
//! Migrations are applied in order when the database is opened; the
//! schema_version table records which ones have run.

/// Database migrations.
pub const MIGRATIONS: &[&str] = &[
    // v1: clips table
    r#"
CREATE TABLE clips (
    id              TEXT PRIMARY KEY,
    streamer_name   TEXT NOT NULL,
    title           TEXT NOT NULL,
    url             TEXT NOT NULL,
    created_at      TEXT NOT NULL,   -- RFC3339 UTC, fixed width
    posted_at       TEXT NOT NULL
);

CREATE INDEX idx_clips_streamer_created ON clips(streamer_name, created_at);
"#,
    // v2: listing across all streamers orders by created_at
    r#"
CREATE INDEX idx_clips_created ON clips(created_at);
"#,
];
