//! Track catalog lookups
//!
//! The catalog is a pre-built SQLite `music` table; ids are ROWIDs.

use crate::error::{Error, Result};
use crate::track::Track;
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use tracing::debug;

/// Maximum rows returned by a search
pub const SEARCH_LIMIT: i64 = 25;

/// Read-only access to the local track catalog
#[async_trait]
pub trait TrackCatalog: Send + Sync {
    /// Look up a track; ids outside `1..=max_id` are `TrackNotFound`
    async fn lookup_by_id(&self, id: i64) -> Result<Track>;

    /// Up to `count` random ids; empty for an empty catalog
    async fn random_ids(&self, count: usize) -> Result<Vec<i64>>;

    async fn max_id(&self) -> Result<i64>;

    /// Formatted rows matching `query` against "artist title"
    async fn search(&self, _query: &str) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
}

#[derive(Clone)]
pub struct SqliteCatalog {
    pool: SqlitePool,
}

impl SqliteCatalog {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TrackCatalog for SqliteCatalog {
    async fn lookup_by_id(&self, id: i64) -> Result<Track> {
        if id < 1 || id > self.max_id().await? {
            return Err(Error::TrackNotFound(id.to_string()));
        }

        let row = sqlx::query("SELECT path, artist, title FROM music WHERE ROWID = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::TrackNotFound(id.to_string()))?;

        let path: String = row.get("path");
        let artist: String = row.get("artist");
        let title: String = row.get("title");

        debug!(id, %path, "Catalog lookup");
        Ok(Track::new(path, format!("{} - {}", artist, title)))
    }

    async fn random_ids(&self, count: usize) -> Result<Vec<i64>> {
        if count == 0 {
            return Ok(Vec::new());
        }

        let ids = sqlx::query_scalar::<_, i64>("SELECT ROWID FROM music ORDER BY random() LIMIT ?")
            .bind(count as i64)
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }

    async fn max_id(&self) -> Result<i64> {
        let max = sqlx::query_scalar::<_, Option<i64>>("SELECT max(ROWID) FROM music")
            .fetch_one(&self.pool)
            .await?;
        Ok(max.unwrap_or(0))
    }

    async fn search(&self, query: &str) -> Result<Vec<String>> {
        let pattern = format!("%{}%", query);
        let rows = sqlx::query(
            r#"
            SELECT ROWID AS id, artist, album, title FROM music
            WHERE (artist || ' ' || title) LIKE ?
            LIMIT ?
            "#,
        )
        .bind(pattern)
        .bind(SEARCH_LIMIT)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let id: i64 = row.get("id");
                let artist: String = row.get("artist");
                let album: String = row.get("album");
                let title: String = row.get("title");
                format!("#{} | {} - {} ({})", id, artist, title, album)
            })
            .collect())
    }
}
