//! Database initialization
//!
//! Opens (or creates) the SQLite track catalog and makes sure the `music`
//! table exists. Catalog ids are SQLite ROWIDs.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new catalog database: {}", db_path.display());
    } else {
        info!("Opened existing catalog database: {}", db_path.display());
    }

    sqlx::query("PRAGMA busy_timeout = 5000")
        .execute(&pool)
        .await?;

    create_music_table(&pool).await?;

    Ok(pool)
}

/// Open an in-memory catalog (tests and dry runs)
pub async fn init_memory_database() -> Result<SqlitePool> {
    // A single connection: every pooled connection to `:memory:` is its own database
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;

    create_music_table(&pool).await?;
    Ok(pool)
}

async fn create_music_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS music (
            artist TEXT NOT NULL DEFAULT '',
            album TEXT NOT NULL DEFAULT '',
            title TEXT NOT NULL DEFAULT '',
            path TEXT NOT NULL UNIQUE
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Insert one catalog row, returning its id
pub async fn insert_track(
    pool: &SqlitePool,
    artist: &str,
    album: &str,
    title: &str,
    path: &str,
) -> Result<i64> {
    let result = sqlx::query("INSERT INTO music (artist, album, title, path) VALUES (?, ?, ?, ?)")
        .bind(artist)
        .bind(album)
        .bind(title)
        .bind(path)
        .execute(pool)
        .await?;

    Ok(result.last_insert_rowid())
}
