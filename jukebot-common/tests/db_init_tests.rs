//! Unit tests for catalog database initialization

use jukebot_common::db::init::{init_database, init_memory_database, insert_track};
use tempfile::TempDir;

#[tokio::test]
async fn test_database_creation_when_missing() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("catalog").join("media.db");

    let result = init_database(&db_path).await;
    assert!(result.is_ok(), "Database initialization failed: {:?}", result.err());
    assert!(db_path.exists(), "Database file was not created");
}

#[tokio::test]
async fn test_database_opens_existing() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("media.db");

    let pool1 = init_database(&db_path).await.unwrap();
    insert_track(&pool1, "Artist", "Album", "Title", "/music/a.flac")
        .await
        .unwrap();
    pool1.close().await;

    let pool2 = init_database(&db_path).await.unwrap();
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM music")
        .fetch_one(&pool2)
        .await
        .unwrap();
    assert_eq!(count, 1, "Existing rows must survive re-initialization");
}

#[tokio::test]
async fn test_insert_track_returns_rowid() {
    let pool = init_memory_database().await.unwrap();

    let first = insert_track(&pool, "A", "B", "C", "/music/1.mp3").await.unwrap();
    let second = insert_track(&pool, "D", "E", "F", "/music/2.mp3").await.unwrap();
    assert_eq!(first, 1);
    assert_eq!(second, 2);

    // Paths are unique
    assert!(insert_track(&pool, "A", "B", "C", "/music/1.mp3").await.is_err());
}
