use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use thiserror::Error;

use crate::catalog::RawComment;

#[derive(Debug, Error)]
pub(crate) enum CacheError {
    #[error("comment cache query failed: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("cached comments are not valid JSON: {0}")]
    Payload(#[from] serde_json::Error),
    #[error("cached timestamp `{0}` is not RFC 3339")]
    Timestamp(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CacheEntry {
    pub(crate) episode_id: i64,
    pub(crate) comment_count: i64,
    pub(crate) fetched_at: String,
}

/// Raw catalog comments keyed by episode id.
pub(crate) struct CommentCache {
    conn: Connection,
}

impl CommentCache {
    pub(crate) fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create cache directory {}", parent.display())
            })?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open comment cache at {}", path.display()))?;
        Ok(Self { conn })
    }

    #[cfg(test)]
    pub(crate) fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("failed to open in-memory cache")?;
        Ok(Self { conn })
    }

    pub(crate) fn migrate(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS comment_cache (
                episode_id INTEGER PRIMARY KEY,
                payload TEXT NOT NULL,
                comment_count INTEGER NOT NULL,
                fetched_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_comment_cache_fetched_at ON comment_cache(fetched_at DESC);
            "#,
        )?;
        Ok(())
    }

    pub(crate) fn store(&self, episode_id: i64, comments: &[RawComment]) -> Result<(), CacheError> {
        self.store_at(episode_id, comments, Utc::now())
    }

    fn store_at(
        &self,
        episode_id: i64,
        comments: &[RawComment],
        fetched_at: DateTime<Utc>,
    ) -> Result<(), CacheError> {
        let payload = serde_json::to_string(comments)?;
        self.conn.execute(
            r#"
            INSERT INTO comment_cache (episode_id, payload, comment_count, fetched_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(episode_id) DO UPDATE SET
                payload = excluded.payload,
                comment_count = excluded.comment_count,
                fetched_at = excluded.fetched_at
            "#,
            params![
                episode_id,
                payload,
                comments.len() as i64,
                fetched_at.to_rfc3339()
            ],
        )?;
        Ok(())
    }

    /// Cached comments for `episode_id` fetched less than `max_age` ago.
    pub(crate) fn load_fresh(
        &self,
        episode_id: i64,
        max_age: Duration,
    ) -> Result<Option<Vec<RawComment>>, CacheError> {
        self.load_fresh_at(episode_id, max_age, Utc::now())
    }

    fn load_fresh_at(
        &self,
        episode_id: i64,
        max_age: Duration,
        now: DateTime<Utc>,
    ) -> Result<Option<Vec<RawComment>>, CacheError> {
        let row: Option<(String, String)> = self
            .conn
            .query_row(
                "SELECT payload, fetched_at FROM comment_cache WHERE episode_id = ?1",
                params![episode_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let Some((payload, fetched_at)) = row else {
            return Ok(None);
        };

        let fetched = DateTime::parse_from_rfc3339(&fetched_at)
            .map_err(|_| CacheError::Timestamp(fetched_at.clone()))?
            .with_timezone(&Utc);
        let age = now.signed_duration_since(fetched).to_std().unwrap_or_default();
        if age >= max_age {
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(&payload)?))
    }

    pub(crate) fn list(&self) -> Result<Vec<CacheEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT episode_id, comment_count, fetched_at FROM comment_cache ORDER BY fetched_at DESC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(CacheEntry {
                episode_id: row.get(0)?,
                comment_count: row.get(1)?,
                fetched_at: row.get(2)?,
            })
        })?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub(crate) fn clear(&self) -> Result<usize> {
        Ok(self.conn.execute("DELETE FROM comment_cache", [])?)
    }
}
