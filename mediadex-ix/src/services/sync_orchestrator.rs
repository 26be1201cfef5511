//! Sync pass orchestration
//!
//! Wires the pipeline together: scan the media roots, read the catalog's
//! last-known file set, compute the four-way delta, enrich affected
//! content (probe, categorize, guess, thumbnail), and commit everything
//! as one atomic catalog transaction. Returns a per-run report.
//!
//! Enrichment runs once per distinct content hash on blocking worker
//! threads; a probe failure degrades that Medium to empty technical
//! metadata and never aborts the pass.

use crate::db::{ApplyPlan, CatalogStore, FileChange, FileMove, FileUpsert};
use crate::probe::{MediaProber, MetadataGuesser, Thumbnailer};
use crate::services::categorizer::Categorizer;
use crate::services::content_hasher::ContentHasher;
use crate::services::delta_computer::{Delta, DeltaComputer};
use crate::services::file_scanner::FileScanner;
use crate::services::metadata_merger;
use chrono::{DateTime, Utc};
use mediadex_common::config::EngineConfig;
use mediadex_common::model::{ContentHash, FileRecord, Medium, MimeKind, TechnicalMetadata};
use mediadex_common::{Error, Result};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// What one sync pass did, by partition.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub run_id: Uuid,
    /// Media files seen on disk.
    pub scanned: usize,
    pub inserted: usize,
    pub deleted: usize,
    pub renamed: usize,
    pub changed: usize,
    /// Files skipped this pass because hashing failed.
    pub failed: usize,
}

/// One enrichment unit: a distinct content hash and a representative path.
#[derive(Clone)]
struct EnrichJob {
    hash: ContentHash,
    path: PathBuf,
    kind: MimeKind,
}

/// Per-hash enrichment output.
struct Enrichment {
    technical: TechnicalMetadata,
    category: String,
    guessed: BTreeMap<String, serde_json::Value>,
}

pub struct SyncOrchestrator {
    store: CatalogStore,
    scanner: Arc<FileScanner>,
    computer: Arc<DeltaComputer>,
    categorizer: Arc<Categorizer>,
    prober: Arc<dyn MediaProber>,
    thumbnailer: Arc<dyn Thumbnailer>,
    guesser: Arc<dyn MetadataGuesser>,
    media_roots: Vec<PathBuf>,
    workers: usize,
}

impl SyncOrchestrator {
    pub fn new(
        config: &EngineConfig,
        store: CatalogStore,
        prober: Arc<dyn MediaProber>,
        thumbnailer: Arc<dyn Thumbnailer>,
        guesser: Arc<dyn MetadataGuesser>,
    ) -> Result<Self> {
        let categorizer = Categorizer::new(&config.category_rules, config.movie_threshold_secs)?;
        Ok(Self {
            store,
            scanner: Arc::new(FileScanner::new()),
            computer: Arc::new(DeltaComputer::new(ContentHasher::new())),
            categorizer: Arc::new(categorizer),
            prober,
            thumbnailer,
            guesser,
            media_roots: config.media_roots.clone(),
            workers: config.workers.unwrap_or_else(num_cpus::get).max(1),
        })
    }

    /// Run one full sync pass and commit it atomically.
    pub async fn run(&self) -> Result<SyncReport> {
        let run_id = Uuid::new_v4();
        let now = Utc::now();
        info!(%run_id, roots = self.media_roots.len(), "Starting sync pass");

        let scanner = Arc::clone(&self.scanner);
        let roots = self.media_roots.clone();
        let snapshot = tokio::task::spawn_blocking(move || scanner.scan(&roots))
            .await
            .map_err(join_error)??;
        let scanned = snapshot.len();

        let catalog = self.store.read_snapshot().await?;

        let computer = Arc::clone(&self.computer);
        let delta = tokio::task::spawn_blocking(move || computer.compute(&catalog, &snapshot))
            .await
            .map_err(join_error)?;

        info!(
            %run_id,
            inserts = delta.to_insert.len(),
            deletes = delta.to_delete.len(),
            renames = delta.renamed.len(),
            changes = delta.content_changed.len(),
            failed = delta.failed.len(),
            "Delta computed"
        );

        let enriched = self.enrich(enrichment_jobs(&delta)).await?;
        let plan = self.build_plan(&delta, &enriched, now).await?;

        let report = SyncReport {
            run_id,
            scanned,
            inserted: plan.inserts.len(),
            deleted: plan.deletes.len(),
            renamed: plan.renames.len(),
            changed: plan.changes.len(),
            failed: delta.failed.len(),
        };

        if plan.is_empty() {
            info!(%run_id, "Catalog already in sync");
            return Ok(report);
        }

        self.store.apply(&plan).await?;
        info!(
            %run_id,
            inserted = report.inserted,
            deleted = report.deleted,
            renamed = report.renamed,
            changed = report.changed,
            "Sync pass committed"
        );
        Ok(report)
    }

    /// Enrich every distinct hash on the blocking pool, split across the
    /// configured worker count.
    async fn enrich(&self, jobs: Vec<EnrichJob>) -> Result<HashMap<ContentHash, Enrichment>> {
        let mut results = HashMap::with_capacity(jobs.len());
        if jobs.is_empty() {
            return Ok(results);
        }

        let chunk_size = jobs.len().div_ceil(self.workers);
        let mut handles = Vec::new();
        for batch in jobs.chunks(chunk_size) {
            let batch = batch.to_vec();
            let prober = Arc::clone(&self.prober);
            let thumbnailer = Arc::clone(&self.thumbnailer);
            let guesser = Arc::clone(&self.guesser);
            let categorizer = Arc::clone(&self.categorizer);

            handles.push(tokio::task::spawn_blocking(move || {
                batch
                    .into_iter()
                    .map(|job| {
                        let enrichment = enrich_one(
                            prober.as_ref(),
                            thumbnailer.as_ref(),
                            guesser.as_ref(),
                            &categorizer,
                            &job,
                        );
                        (job.hash, enrichment)
                    })
                    .collect::<Vec<_>>()
            }));
        }

        for handle in handles {
            results.extend(handle.await.map_err(join_error)?);
        }
        Ok(results)
    }

    async fn build_plan(
        &self,
        delta: &Delta,
        enriched: &HashMap<ContentHash, Enrichment>,
        now: DateTime<Utc>,
    ) -> Result<ApplyPlan> {
        let mut plan = ApplyPlan {
            deletes: delta.to_delete.clone(),
            ..Default::default()
        };

        for new_file in &delta.to_insert {
            let enrichment = expect_enrichment(enriched, &new_file.hash)?;
            // A known hash at a new path is a duplicate file: the existing
            // Medium keeps its descriptive fields and counters.
            let existing = self.store.load_medium(&new_file.hash).await?;
            plan.inserts.push(FileUpsert {
                path: new_file.record.path.clone(),
                last_modified: new_file.record.last_modified,
                medium: build_medium(&new_file.record, new_file.hash, enrichment, existing, false, now),
            });
        }

        for rename in &delta.renamed {
            let enrichment = expect_enrichment(enriched, &rename.hash)?;
            let previous = self.store.load_medium(&rename.hash).await?;
            if previous.is_none() {
                return Err(Error::Internal(format!(
                    "rename source medium {} missing from catalog",
                    rename.hash
                )));
            }
            // The new path may fall under different category rules.
            plan.renames.push(FileMove {
                from: rename.from.clone(),
                to: rename.to.path.clone(),
                last_modified: rename.to.last_modified,
                medium: build_medium(&rename.to, rename.hash, enrichment, previous, true, now),
            });
        }

        for change in &delta.content_changed {
            let enrichment = expect_enrichment(enriched, &change.new_hash)?;
            // Descriptive fields, category, and counters follow the content
            // from its old identity to the new one.
            let previous = self.store.load_medium(&change.old_hash).await?;
            plan.changes.push(FileChange {
                path: change.record.path.clone(),
                old_hash: change.old_hash,
                last_modified: change.record.last_modified,
                medium: build_medium(&change.record, change.new_hash, enrichment, previous, false, now),
            });
        }

        Ok(plan)
    }
}

/// Distinct hashes needing enrichment: inserts, renames, and content
/// changes. The first record seen for a hash is its representative path.
fn enrichment_jobs(delta: &Delta) -> Vec<EnrichJob> {
    let mut seen: HashSet<ContentHash> = HashSet::new();
    let mut jobs = Vec::new();

    let records = delta
        .to_insert
        .iter()
        .map(|f| (f.hash, &f.record))
        .chain(delta.renamed.iter().map(|r| (r.hash, &r.to)))
        .chain(delta.content_changed.iter().map(|c| (c.new_hash, &c.record)));

    for (hash, record) in records {
        if seen.insert(hash) {
            jobs.push(EnrichJob {
                hash,
                path: PathBuf::from(&record.path),
                kind: record.kind,
            });
        }
    }
    jobs
}

fn enrich_one(
    prober: &dyn MediaProber,
    thumbnailer: &dyn Thumbnailer,
    guesser: &dyn MetadataGuesser,
    categorizer: &Categorizer,
    job: &EnrichJob,
) -> Enrichment {
    let technical = match prober.probe(&job.path) {
        Ok(technical) => technical,
        Err(e) => {
            warn!("Probing {} failed, storing degraded medium: {}", job.path.display(), e);
            TechnicalMetadata::empty()
        }
    };

    let category = categorizer
        .categorize(
            &job.path.to_string_lossy(),
            job.kind,
            technical.duration_seconds,
        )
        .to_string();

    let guessed = guesser.guess(&job.path, &category);

    if job.kind == MimeKind::Video {
        if let Err(e) = thumbnailer.ensure_thumbnail(&job.hash, &job.path) {
            warn!("Thumbnail for {} skipped: {}", job.path.display(), e);
        }
    }

    Enrichment {
        technical,
        category,
        guessed,
    }
}

/// Assemble the Medium for one partition entry. When a previous identity
/// exists, its user-entered fields and counters carry over and fresh
/// guesses only fill the rest. Renames pass `recategorize` since category
/// rules depend on the path; content changes keep their category.
fn build_medium(
    record: &FileRecord,
    hash: ContentHash,
    enrichment: &Enrichment,
    previous: Option<Medium>,
    recategorize: bool,
    now: DateTime<Utc>,
) -> Medium {
    let (descriptive_base, category, views, score) = match previous {
        Some(medium) => (
            medium.descriptive,
            if recategorize {
                enrichment.category.clone()
            } else {
                medium.category
            },
            medium.views,
            medium.score,
        ),
        None => (Default::default(), enrichment.category.clone(), 0, 0),
    };

    Medium {
        content_hash: hash,
        name: display_name(&record.path),
        mime_type: record.mime_type.clone(),
        technical: enrichment.technical.clone(),
        descriptive: metadata_merger::merge(&descriptive_base, &enrichment.guessed),
        last_modified: record.last_modified,
        last_indexed: now,
        category,
        views,
        score,
        paths: Vec::new(),
        tags: Vec::new(),
    }
}

/// Display title for a path: its file stem, falling back to the full name.
fn display_name(path: &str) -> String {
    let path = Path::new(path);
    path.file_stem()
        .or_else(|| path.file_name())
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

fn expect_enrichment<'a>(
    enriched: &'a HashMap<ContentHash, Enrichment>,
    hash: &ContentHash,
) -> Result<&'a Enrichment> {
    enriched
        .get(hash)
        .ok_or_else(|| Error::Internal(format!("no enrichment computed for {}", hash)))
}

fn join_error(e: tokio::task::JoinError) -> Error {
    Error::Internal(format!("worker task failed: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mediadex_common::config::CategoryRule;
    use mediadex_common::model::StreamInfo;
    use std::time::{Duration, SystemTime};

    struct StubProber {
        duration: Option<f64>,
    }

    impl MediaProber for StubProber {
        fn probe(&self, _path: &Path) -> Result<TechnicalMetadata> {
            Ok(TechnicalMetadata {
                duration_seconds: self.duration,
                streams: vec![StreamInfo {
                    codec_name: Some("h264".to_string()),
                    width: Some(1280),
                    height: Some(720),
                    duration_seconds: self.duration,
                }],
            })
        }
    }

    struct NoThumbnails;

    impl Thumbnailer for NoThumbnails {
        fn ensure_thumbnail(&self, _hash: &ContentHash, _path: &Path) -> Result<()> {
            Ok(())
        }
    }

    struct NoGuesses;

    impl MetadataGuesser for NoGuesses {
        fn guess(&self, _path: &Path, _category: &str) -> BTreeMap<String, serde_json::Value> {
            BTreeMap::new()
        }
    }

    async fn orchestrator(root: &Path) -> SyncOrchestrator {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        mediadex_common::db::init::create_schema(&pool).await.unwrap();

        let config = EngineConfig {
            media_roots: vec![root.to_path_buf()],
            category_rules: vec![CategoryRule {
                name: "trailers".to_string(),
                patterns: vec!["trailer".to_string()],
            }],
            workers: Some(2),
            ..Default::default()
        };
        SyncOrchestrator::new(
            &config,
            CatalogStore::new(pool),
            Arc::new(StubProber {
                duration: Some(120.0),
            }),
            Arc::new(NoThumbnails),
            Arc::new(NoGuesses),
        )
        .unwrap()
    }

    fn bump_mtime(path: &Path, secs_forward: u64) {
        let file = std::fs::File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() + Duration::from_secs(secs_forward))
            .unwrap();
    }

    #[tokio::test]
    async fn test_first_pass_inserts_everything() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("clip.mp4"), b"video bytes").unwrap();
        std::fs::write(dir.path().join("song.mp3"), b"audio bytes").unwrap();

        let orchestrator = orchestrator(dir.path()).await;
        let report = orchestrator.run().await.unwrap();

        assert_eq!(report.scanned, 2);
        assert_eq!(report.inserted, 2);
        assert_eq!(report.deleted + report.renamed + report.changed, 0);

        let media = orchestrator.store.all_media().await.unwrap();
        assert_eq!(media.len(), 2);
        let song = media.iter().find(|m| m.name == "song").unwrap();
        assert_eq!(song.category, "music");
        let clip = media.iter().find(|m| m.name == "clip").unwrap();
        assert_eq!(clip.technical.streams.len(), 1);
    }

    #[tokio::test]
    async fn test_second_pass_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("clip.mp4"), b"video bytes").unwrap();

        let orchestrator = orchestrator(dir.path()).await;
        orchestrator.run().await.unwrap();
        let report = orchestrator.run().await.unwrap();

        assert_eq!(report.scanned, 1);
        assert_eq!(
            report.inserted + report.deleted + report.renamed + report.changed,
            0
        );
    }

    #[tokio::test]
    async fn test_rename_keeps_the_medium() {
        let dir = tempfile::tempdir().unwrap();
        let old = dir.path().join("old name.mp4");
        std::fs::write(&old, b"same bytes").unwrap();

        let orchestrator = orchestrator(dir.path()).await;
        orchestrator.run().await.unwrap();
        let before = orchestrator.store.all_media().await.unwrap();

        std::fs::rename(&old, dir.path().join("new name.mp4")).unwrap();
        let report = orchestrator.run().await.unwrap();

        assert_eq!(report.renamed, 1);
        assert_eq!(report.inserted, 0);
        assert_eq!(report.deleted, 0);

        let after = orchestrator.store.all_media().await.unwrap();
        assert_eq!(after.len(), 1);
        assert_eq!(after[0].content_hash, before[0].content_hash);
        assert_eq!(after[0].name, "new name");
    }

    #[tokio::test]
    async fn test_rename_recategorizes_against_the_new_path() {
        let dir = tempfile::tempdir().unwrap();
        let old = dir.path().join("clip.mp4");
        std::fs::write(&old, b"promo bytes").unwrap();

        let orchestrator = orchestrator(dir.path()).await;
        orchestrator.run().await.unwrap();
        let before = orchestrator.store.all_media().await.unwrap();
        assert_eq!(before[0].category, "uncategorized");

        std::fs::rename(&old, dir.path().join("clip trailer.mp4")).unwrap();
        orchestrator.run().await.unwrap();

        let after = orchestrator.store.all_media().await.unwrap();
        assert_eq!(after[0].category, "trailers");
    }

    #[tokio::test]
    async fn test_content_change_rekeys_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.mp4");
        std::fs::write(&path, b"first cut").unwrap();

        let orchestrator = orchestrator(dir.path()).await;
        orchestrator.run().await.unwrap();
        let before = orchestrator.store.all_media().await.unwrap();

        std::fs::write(&path, b"director's cut").unwrap();
        bump_mtime(&path, 10);
        let report = orchestrator.run().await.unwrap();

        assert_eq!(report.changed, 1);
        let after = orchestrator.store.all_media().await.unwrap();
        assert_eq!(after.len(), 1);
        assert_ne!(after[0].content_hash, before[0].content_hash);
        assert_eq!(after[0].paths, vec![path.to_string_lossy().into_owned()]);
    }

    #[tokio::test]
    async fn test_touch_without_content_change_still_reprocesses() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.mp4");
        std::fs::write(&path, b"stable bytes").unwrap();

        let orchestrator = orchestrator(dir.path()).await;
        orchestrator.run().await.unwrap();
        let before = orchestrator.store.all_media().await.unwrap();

        bump_mtime(&path, 10);
        let report = orchestrator.run().await.unwrap();

        // Same bytes, new mtime: counted as a change, same identity.
        assert_eq!(report.changed, 1);
        let after = orchestrator.store.all_media().await.unwrap();
        assert_eq!(after.len(), 1);
        assert_eq!(after[0].content_hash, before[0].content_hash);
    }

    #[tokio::test]
    async fn test_deleted_file_leaves_the_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.mp4");
        std::fs::write(&path, b"video bytes").unwrap();

        let orchestrator = orchestrator(dir.path()).await;
        orchestrator.run().await.unwrap();

        std::fs::remove_file(&path).unwrap();
        let report = orchestrator.run().await.unwrap();

        assert_eq!(report.deleted, 1);
        assert!(orchestrator.store.all_media().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_content_shares_one_medium() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.mp4"), b"same bytes").unwrap();
        std::fs::write(dir.path().join("b.mp4"), b"same bytes").unwrap();

        let orchestrator = orchestrator(dir.path()).await;
        let report = orchestrator.run().await.unwrap();

        assert_eq!(report.inserted, 2);
        let media = orchestrator.store.all_media().await.unwrap();
        assert_eq!(media.len(), 1);
        assert_eq!(media[0].paths.len(), 2);
    }
}
