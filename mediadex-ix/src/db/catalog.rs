//! Catalog store operations
//!
//! Media are keyed by content hash; file paths reference their Medium's
//! hash; categories and tags are separate keyed entities and the
//! medium-tag association carries a vote score. Deleting the last file
//! path of a Medium cascades to the Medium itself.

use chrono::{DateTime, Utc};
use mediadex_common::model::{
    CatalogEntry, ContentHash, DescriptiveMetadata, MediaTag, Medium, TechnicalMetadata,
};
use mediadex_common::{Error, Result};
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use std::collections::HashMap;

/// A new file path together with the (possibly pre-existing) Medium that
/// owns it.
#[derive(Debug, Clone)]
pub struct FileUpsert {
    pub path: String,
    pub last_modified: DateTime<Utc>,
    pub medium: Medium,
}

/// A file path moving from one location to another, same content.
#[derive(Debug, Clone)]
pub struct FileMove {
    pub from: String,
    pub to: String,
    pub last_modified: DateTime<Utc>,
    pub medium: Medium,
}

/// A file path whose bytes changed: the path is re-pointed from the old
/// hash to the new Medium.
#[derive(Debug, Clone)]
pub struct FileChange {
    pub path: String,
    pub old_hash: ContentHash,
    pub last_modified: DateTime<Utc>,
    pub medium: Medium,
}

/// Everything one sync pass wants to commit, applied atomically in the
/// order deletes, inserts, renames, changes.
#[derive(Debug, Default)]
pub struct ApplyPlan {
    pub deletes: Vec<String>,
    pub inserts: Vec<FileUpsert>,
    pub renames: Vec<FileMove>,
    pub changes: Vec<FileChange>,
}

impl ApplyPlan {
    pub fn is_empty(&self) -> bool {
        self.deletes.is_empty()
            && self.inserts.is_empty()
            && self.renames.is_empty()
            && self.changes.is_empty()
    }
}

#[derive(Clone)]
pub struct CatalogStore {
    pool: SqlitePool,
}

impl CatalogStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// The catalog's last-known file set, for delta computation.
    pub async fn read_snapshot(&self) -> Result<Vec<CatalogEntry>> {
        let rows = sqlx::query("SELECT path, content_hash, last_modified FROM files")
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| {
                Ok(CatalogEntry {
                    path: row.get("path"),
                    content_hash: parse_hash(row.get("content_hash"))?,
                    last_modified: parse_timestamp(row.get("last_modified"))?,
                })
            })
            .collect()
    }

    /// Load one Medium with its paths and tags attached.
    pub async fn load_medium(&self, hash: &ContentHash) -> Result<Option<Medium>> {
        let row = sqlx::query(
            r#"
            SELECT content_hash, name, mime_type, mediainfo, metadata,
                   last_modified, last_indexed, category, views, score
            FROM media
            WHERE content_hash = ?
            "#,
        )
        .bind(hash.to_string())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let mut medium = medium_from_row(&row)?;
        self.attach_paths_and_tags(std::slice::from_mut(&mut medium))
            .await?;
        Ok(Some(medium))
    }

    /// Load every Medium with paths and tags attached. The search engine
    /// evaluates its predicate tree in-process over this set.
    pub async fn all_media(&self) -> Result<Vec<Medium>> {
        let rows = sqlx::query(
            r#"
            SELECT content_hash, name, mime_type, mediainfo, metadata,
                   last_modified, last_indexed, category, views, score
            FROM media
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut media = rows
            .iter()
            .map(medium_from_row)
            .collect::<Result<Vec<_>>>()?;
        self.attach_paths_and_tags(&mut media).await?;
        Ok(media)
    }

    async fn attach_paths_and_tags(&self, media: &mut [Medium]) -> Result<()> {
        let mut paths: HashMap<String, Vec<String>> = HashMap::new();
        let path_rows = sqlx::query("SELECT content_hash, path FROM files ORDER BY path")
            .fetch_all(&self.pool)
            .await?;
        for row in &path_rows {
            paths
                .entry(row.get("content_hash"))
                .or_default()
                .push(row.get("path"));
        }

        let mut tags: HashMap<String, Vec<MediaTag>> = HashMap::new();
        let tag_rows =
            sqlx::query("SELECT content_hash, tag_name, score FROM media_tags ORDER BY tag_name")
                .fetch_all(&self.pool)
                .await?;
        for row in &tag_rows {
            tags.entry(row.get("content_hash")).or_default().push(MediaTag {
                name: row.get("tag_name"),
                score: row.get("score"),
            });
        }

        for medium in media {
            let key = medium.content_hash.to_string();
            medium.paths = paths.remove(&key).unwrap_or_default();
            medium.tags = tags.remove(&key).unwrap_or_default();
        }
        Ok(())
    }

    /// Apply one sync pass atomically. Any failure rolls the whole pass
    /// back; the run is then safe to retry from a fresh delta.
    pub async fn apply(&self, plan: &ApplyPlan) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for path in &plan.deletes {
            delete_path(&mut tx, path).await?;
        }

        for insert in &plan.inserts {
            ensure_category(&mut tx, &insert.medium.category).await?;
            upsert_medium(&mut tx, &insert.medium).await?;
            upsert_file(
                &mut tx,
                &insert.path,
                &insert.medium.content_hash,
                insert.last_modified,
            )
            .await?;
        }

        for rename in &plan.renames {
            ensure_category(&mut tx, &rename.medium.category).await?;
            upsert_medium(&mut tx, &rename.medium).await?;
            sqlx::query("DELETE FROM files WHERE path = ?")
                .bind(&rename.from)
                .execute(&mut *tx)
                .await?;
            upsert_file(
                &mut tx,
                &rename.to,
                &rename.medium.content_hash,
                rename.last_modified,
            )
            .await?;
        }

        for change in &plan.changes {
            ensure_category(&mut tx, &change.medium.category).await?;
            upsert_medium(&mut tx, &change.medium).await?;
            upsert_file(
                &mut tx,
                &change.path,
                &change.medium.content_hash,
                change.last_modified,
            )
            .await?;

            if change.old_hash != change.medium.content_hash {
                // Tag associations follow the content to its new identity.
                sqlx::query(
                    r#"
                    INSERT OR IGNORE INTO media_tags (content_hash, tag_name, score)
                    SELECT ?, tag_name, score FROM media_tags WHERE content_hash = ?
                    "#,
                )
                .bind(change.medium.content_hash.to_string())
                .bind(change.old_hash.to_string())
                .execute(&mut *tx)
                .await?;

                delete_medium_if_orphaned(&mut tx, &change.old_hash).await?;
            }
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn ensure_tag(&self, name: &str) -> Result<()> {
        sqlx::query("INSERT OR IGNORE INTO tags (name) VALUES (?)")
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Attach a tag to a Medium with an initial score of zero.
    pub async fn tag_medium(&self, hash: &ContentHash, tag: &str) -> Result<()> {
        self.ensure_tag(tag).await?;
        sqlx::query(
            "INSERT OR IGNORE INTO media_tags (content_hash, tag_name, score) VALUES (?, ?, 0)",
        )
        .bind(hash.to_string())
        .bind(tag)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// Remove a file path; when it was the Medium's last path, the Medium and
/// its tag associations go with it.
async fn delete_path(tx: &mut Transaction<'_, Sqlite>, path: &str) -> Result<()> {
    let hash: Option<String> = sqlx::query_scalar("SELECT content_hash FROM files WHERE path = ?")
        .bind(path)
        .fetch_optional(&mut **tx)
        .await?;

    let Some(hash) = hash else {
        tracing::debug!("Delete of unknown path {} ignored", path);
        return Ok(());
    };

    sqlx::query("DELETE FROM files WHERE path = ?")
        .bind(path)
        .execute(&mut **tx)
        .await?;

    delete_medium_if_orphaned(tx, &parse_hash(hash)?).await?;
    Ok(())
}

async fn delete_medium_if_orphaned(
    tx: &mut Transaction<'_, Sqlite>,
    hash: &ContentHash,
) -> Result<()> {
    let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM files WHERE content_hash = ?")
        .bind(hash.to_string())
        .fetch_one(&mut **tx)
        .await?;

    if remaining == 0 {
        sqlx::query("DELETE FROM media_tags WHERE content_hash = ?")
            .bind(hash.to_string())
            .execute(&mut **tx)
            .await?;
        sqlx::query("DELETE FROM media WHERE content_hash = ?")
            .bind(hash.to_string())
            .execute(&mut **tx)
            .await?;
        tracing::debug!("Removed orphaned medium {}", hash);
    }
    Ok(())
}

async fn ensure_category(tx: &mut Transaction<'_, Sqlite>, name: &str) -> Result<()> {
    sqlx::query("INSERT OR IGNORE INTO categories (name) VALUES (?)")
        .bind(name)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

/// Insert or refresh a Medium. View and vote counters are written on first
/// insert only; later refreshes never clobber them.
async fn upsert_medium(tx: &mut Transaction<'_, Sqlite>, medium: &Medium) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO media (content_hash, name, mime_type, mediainfo, metadata,
                           last_modified, last_indexed, category, views, score)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(content_hash) DO UPDATE SET
            name = excluded.name,
            mime_type = excluded.mime_type,
            mediainfo = excluded.mediainfo,
            metadata = excluded.metadata,
            last_modified = excluded.last_modified,
            last_indexed = excluded.last_indexed,
            category = excluded.category
        "#,
    )
    .bind(medium.content_hash.to_string())
    .bind(&medium.name)
    .bind(&medium.mime_type)
    .bind(serde_json::to_string(&medium.technical).map_err(internal)?)
    .bind(serde_json::to_string(&medium.descriptive).map_err(internal)?)
    .bind(medium.last_modified.to_rfc3339())
    .bind(medium.last_indexed.to_rfc3339())
    .bind(&medium.category)
    .bind(medium.views)
    .bind(medium.score)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn upsert_file(
    tx: &mut Transaction<'_, Sqlite>,
    path: &str,
    hash: &ContentHash,
    last_modified: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO files (path, content_hash, last_modified)
        VALUES (?, ?, ?)
        ON CONFLICT(path) DO UPDATE SET
            content_hash = excluded.content_hash,
            last_modified = excluded.last_modified
        "#,
    )
    .bind(path)
    .bind(hash.to_string())
    .bind(last_modified.to_rfc3339())
    .execute(&mut **tx)
    .await?;
    Ok(())
}

fn medium_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Medium> {
    let mediainfo: String = row.get("mediainfo");
    let metadata: String = row.get("metadata");

    Ok(Medium {
        content_hash: parse_hash(row.get("content_hash"))?,
        name: row.get("name"),
        mime_type: row.get("mime_type"),
        technical: serde_json::from_str::<TechnicalMetadata>(&mediainfo).map_err(internal)?,
        descriptive: serde_json::from_str::<DescriptiveMetadata>(&metadata).map_err(internal)?,
        last_modified: parse_timestamp(row.get("last_modified"))?,
        last_indexed: parse_timestamp(row.get("last_indexed"))?,
        category: row.get("category"),
        views: row.get("views"),
        score: row.get("score"),
        paths: Vec::new(),
        tags: Vec::new(),
    })
}

fn parse_hash(raw: String) -> Result<ContentHash> {
    raw.parse()
        .map_err(|_| Error::Internal(format!("invalid content hash in catalog: {}", raw)))
}

fn parse_timestamp(raw: String) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("invalid timestamp in catalog: {}", e)))
}

fn internal(e: impl std::fmt::Display) -> Error {
    Error::Internal(e.to_string())
}
