//! Database initialization
//!
//! Creates the catalog database on first run and brings up the schema with
//! idempotent `CREATE TABLE IF NOT EXISTS` statements.

use crate::Result;
use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};
use std::path::Path;
use tracing::info;

/// Initialize database connection and create tables if needed.
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new catalog database: {}", db_path.display());
    } else {
        info!("Opened existing catalog database: {}", db_path.display());
    }

    configure_connection(&pool).await?;
    create_schema(&pool).await?;

    Ok(pool)
}

/// Apply connection pragmas: foreign keys on, WAL for concurrent readers
/// during a sync pass, bounded busy wait.
pub async fn configure_connection(pool: &SqlitePool) -> Result<()> {
    sqlx::query("PRAGMA foreign_keys = ON").execute(pool).await?;
    sqlx::query("PRAGMA journal_mode = WAL").execute(pool).await?;
    sqlx::query("PRAGMA busy_timeout = 5000").execute(pool).await?;
    Ok(())
}

/// Create all catalog tables (idempotent, safe to call on every startup).
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_categories_table(pool).await?;
    create_media_table(pool).await?;
    create_files_table(pool).await?;
    create_tags_table(pool).await?;
    create_media_tags_table(pool).await?;
    Ok(())
}

pub async fn create_categories_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS categories (
            name TEXT PRIMARY KEY
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn create_media_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS media (
            content_hash TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            mime_type TEXT NOT NULL,
            mediainfo TEXT NOT NULL,
            metadata TEXT NOT NULL,
            last_modified TEXT NOT NULL,
            last_indexed TEXT NOT NULL,
            category TEXT NOT NULL REFERENCES categories(name),
            views INTEGER NOT NULL DEFAULT 0,
            score INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn create_files_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS files (
            path TEXT PRIMARY KEY,
            content_hash TEXT NOT NULL REFERENCES media(content_hash),
            last_modified TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_files_hash ON files(content_hash)")
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn create_tags_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tags (
            name TEXT PRIMARY KEY
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

/// Medium-tag association with a net-vote score. The association itself is
/// an entity, not a plain many-to-many link.
pub async fn create_media_tags_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS media_tags (
            content_hash TEXT NOT NULL REFERENCES media(content_hash),
            tag_name TEXT NOT NULL REFERENCES tags(name),
            score INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (content_hash, tag_name)
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}
