//! Snapshot delta computation
//!
//! Reconciles the catalog's last-known file set against the current
//! filesystem set and produces the four-way partition
//! {insert, delete, rename, content-changed}.
//!
//! Paths present in both snapshots with an unchanged mtime reuse the
//! stored hash and are not touched. A changed mtime always yields a
//! content-changed record, even when the re-hash turns out identical
//! (literal source behavior, kept on purpose). Unmatched filesystem
//! entries are hashed in parallel and paired against vacated catalog
//! hashes: a hash match is a rename, leftovers are inserts and deletes.
//!
//! Tie-break when several files could claim one vacated hash: both sides
//! are consumed in lexicographic path order, so the smallest new path
//! pairs with the smallest old path.
//!
//! When any new file's hash failed, its content identity is unknown and
//! it could be the rename target of any vacated path. Deletes are then
//! deferred to the next pass rather than risk destroying a Medium (and
//! its user-entered metadata) that was merely renamed.

use crate::services::content_hasher::ContentHasher;
use mediadex_common::model::{CatalogEntry, ContentHash, FileRecord};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

/// A filesystem entry new to the catalog.
#[derive(Debug, Clone)]
pub struct NewFile {
    pub record: FileRecord,
    pub hash: ContentHash,
}

/// A vacated catalog path whose content reappeared elsewhere.
#[derive(Debug, Clone)]
pub struct Rename {
    pub from: String,
    pub to: FileRecord,
    pub hash: ContentHash,
}

/// A known path whose mtime changed since the last pass.
#[derive(Debug, Clone)]
pub struct ChangedFile {
    pub record: FileRecord,
    pub old_hash: ContentHash,
    pub new_hash: ContentHash,
}

/// The four disjoint partitions, plus the files whose hash failed and
/// which are therefore skipped until the next pass.
#[derive(Debug, Default)]
pub struct Delta {
    pub to_insert: Vec<NewFile>,
    pub to_delete: Vec<String>,
    pub renamed: Vec<Rename>,
    pub content_changed: Vec<ChangedFile>,
    pub failed: Vec<String>,
}

impl Delta {
    pub fn is_empty(&self) -> bool {
        self.to_insert.is_empty()
            && self.to_delete.is_empty()
            && self.renamed.is_empty()
            && self.content_changed.is_empty()
    }
}

pub struct DeltaComputer {
    hasher: ContentHasher,
}

impl DeltaComputer {
    pub fn new(hasher: ContentHasher) -> Self {
        Self { hasher }
    }

    /// Compute the delta between the catalog snapshot and the filesystem
    /// snapshot, hashing whatever needs hashing on the worker pool.
    pub fn compute(&self, catalog: &[CatalogEntry], snapshot: &[FileRecord]) -> Delta {
        let catalog_by_path: HashMap<&str, &CatalogEntry> =
            catalog.iter().map(|e| (e.path.as_str(), e)).collect();

        // Everything without a reusable stored hash gets re-hashed: new
        // paths, and known paths whose mtime moved.
        let to_hash: Vec<PathBuf> = snapshot
            .iter()
            .filter(|record| match catalog_by_path.get(record.path.as_str()) {
                Some(entry) => entry.last_modified != record.last_modified,
                None => true,
            })
            .map(|record| PathBuf::from(&record.path))
            .collect();

        tracing::debug!(
            catalog = catalog.len(),
            filesystem = snapshot.len(),
            to_hash = to_hash.len(),
            "Computing snapshot delta"
        );

        let mut hashes: HashMap<String, ContentHash> = HashMap::new();
        let mut failed = Vec::new();
        for (path, result) in self.hasher.hash_many(&to_hash) {
            let path = path.to_string_lossy().into_owned();
            match result {
                Ok(hash) => {
                    hashes.insert(path, hash);
                }
                Err(e) => {
                    tracing::warn!("Hashing {} failed, skipping this pass: {}", path, e);
                    failed.push(path);
                }
            }
        }

        let mut delta = partition(catalog, snapshot, &hashes);
        delta.failed = failed;
        delta
    }
}

/// Pure matching core: classifies every path given the resolved hashes.
/// Paths that needed a hash but have none (hash failure) are left out of
/// every partition.
fn partition(
    catalog: &[CatalogEntry],
    snapshot: &[FileRecord],
    hashes: &HashMap<String, ContentHash>,
) -> Delta {
    let catalog_by_path: HashMap<&str, &CatalogEntry> =
        catalog.iter().map(|e| (e.path.as_str(), e)).collect();

    let mut delta = Delta::default();
    // Filesystem entries with no catalog path, hashed and sorted by path
    // for the deterministic rename tie-break.
    let mut unmatched_fs: BTreeMap<&str, (&FileRecord, ContentHash)> = BTreeMap::new();
    let mut unresolved_new = false;

    for record in snapshot {
        match catalog_by_path.get(record.path.as_str()) {
            Some(entry) if entry.last_modified == record.last_modified => {
                // Unchanged: reuse the stored hash, nothing to do.
            }
            Some(entry) => {
                if let Some(new_hash) = hashes.get(&record.path) {
                    delta.content_changed.push(ChangedFile {
                        record: record.clone(),
                        old_hash: entry.content_hash,
                        new_hash: *new_hash,
                    });
                }
            }
            None => {
                if let Some(hash) = hashes.get(&record.path) {
                    unmatched_fs.insert(record.path.as_str(), (record, *hash));
                } else {
                    unresolved_new = true;
                }
            }
        }
    }

    // Catalog entries whose path vanished, indexed by hash. Old paths
    // sharing one hash are consumed smallest-first.
    let fs_paths: HashMap<&str, ()> = snapshot.iter().map(|r| (r.path.as_str(), ())).collect();
    let mut vacated_by_hash: BTreeMap<ContentHash, Vec<&str>> = BTreeMap::new();
    for entry in catalog {
        if !fs_paths.contains_key(entry.path.as_str()) {
            vacated_by_hash
                .entry(entry.content_hash)
                .or_default()
                .push(entry.path.as_str());
        }
    }
    for paths in vacated_by_hash.values_mut() {
        paths.sort_unstable();
    }

    // Pair unmatched filesystem entries against vacated hashes: equal hash
    // means rename, each vacated path claimed at most once.
    for (_, (record, hash)) in unmatched_fs {
        let matched = vacated_by_hash
            .get_mut(&hash)
            .filter(|old| !old.is_empty())
            .map(|old| old.remove(0));

        match matched {
            Some(old_path) => delta.renamed.push(Rename {
                from: old_path.to_string(),
                to: record.clone(),
                hash,
            }),
            None => delta.to_insert.push(NewFile {
                record: record.clone(),
                hash,
            }),
        }
    }

    // Whatever is still vacated is gone for good, unless a new file with
    // an unknown hash might still claim it: then the delete waits for the
    // next pass.
    if unresolved_new {
        let withheld: usize = vacated_by_hash.values().map(Vec::len).sum();
        if withheld > 0 {
            tracing::warn!(
                withheld,
                "Deferring deletes: unhashed new files may be rename targets"
            );
        }
    } else {
        for paths in vacated_by_hash.values() {
            for path in paths {
                delta.to_delete.push(path.to_string());
            }
        }
        delta.to_delete.sort_unstable();
    }

    delta
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use std::collections::HashSet;

    fn hash(byte: u8) -> ContentHash {
        ContentHash::from_bytes([byte; 32])
    }

    fn mtime(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn record(path: &str, modified: i64) -> FileRecord {
        FileRecord {
            path: path.to_string(),
            mime_type: "video/mp4".to_string(),
            kind: mediadex_common::model::MimeKind::Video,
            last_modified: mtime(modified),
        }
    }

    fn entry(path: &str, h: u8, modified: i64) -> CatalogEntry {
        CatalogEntry {
            path: path.to_string(),
            content_hash: hash(h),
            last_modified: mtime(modified),
        }
    }

    fn hashes(pairs: &[(&str, u8)]) -> HashMap<String, ContentHash> {
        pairs
            .iter()
            .map(|(p, h)| (p.to_string(), hash(*h)))
            .collect()
    }

    #[test]
    fn test_unchanged_mtime_is_untouched() {
        let catalog = vec![entry("/m/a.mp4", 1, 100)];
        let snapshot = vec![record("/m/a.mp4", 100)];
        let delta = partition(&catalog, &snapshot, &HashMap::new());
        assert!(delta.is_empty());
    }

    #[test]
    fn test_new_path_is_insert() {
        let delta = partition(&[], &[record("/m/new.mp4", 1)], &hashes(&[("/m/new.mp4", 9)]));
        assert_eq!(delta.to_insert.len(), 1);
        assert_eq!(delta.to_insert[0].hash, hash(9));
        assert!(delta.to_delete.is_empty() && delta.renamed.is_empty());
    }

    #[test]
    fn test_vanished_path_is_delete() {
        let delta = partition(&[entry("/m/gone.mp4", 1, 100)], &[], &HashMap::new());
        assert_eq!(delta.to_delete, vec!["/m/gone.mp4".to_string()]);
    }

    #[test]
    fn test_rename_detected_by_hash() {
        let catalog = vec![entry("/m/old.mp4", 7, 100)];
        let snapshot = vec![record("/m/new.mp4", 100)];
        let delta = partition(&catalog, &snapshot, &hashes(&[("/m/new.mp4", 7)]));

        assert_eq!(delta.renamed.len(), 1);
        assert_eq!(delta.renamed[0].from, "/m/old.mp4");
        assert_eq!(delta.renamed[0].to.path, "/m/new.mp4");
        assert!(delta.to_insert.is_empty());
        assert!(delta.to_delete.is_empty());
    }

    #[test]
    fn test_changed_mtime_is_content_changed_even_if_hash_identical() {
        let catalog = vec![entry("/m/a.mp4", 5, 100)];
        let snapshot = vec![record("/m/a.mp4", 200)];
        let delta = partition(&catalog, &snapshot, &hashes(&[("/m/a.mp4", 5)]));

        assert_eq!(delta.content_changed.len(), 1);
        assert_eq!(delta.content_changed[0].old_hash, hash(5));
        assert_eq!(delta.content_changed[0].new_hash, hash(5));
    }

    #[test]
    fn test_changed_content_records_both_hashes() {
        let catalog = vec![entry("/m/a.mp4", 5, 100)];
        let snapshot = vec![record("/m/a.mp4", 200)];
        let delta = partition(&catalog, &snapshot, &hashes(&[("/m/a.mp4", 6)]));

        assert_eq!(delta.content_changed.len(), 1);
        assert_eq!(delta.content_changed[0].new_hash, hash(6));
    }

    #[test]
    fn test_rename_tie_breaks_lexicographically() {
        // One vacated hash, two candidate new paths: the smaller path wins
        // the rename, the other becomes an insert.
        let catalog = vec![entry("/m/old.mp4", 7, 100)];
        let snapshot = vec![record("/m/b.mp4", 100), record("/m/a.mp4", 100)];
        let delta = partition(
            &catalog,
            &snapshot,
            &hashes(&[("/m/a.mp4", 7), ("/m/b.mp4", 7)]),
        );

        assert_eq!(delta.renamed.len(), 1);
        assert_eq!(delta.renamed[0].to.path, "/m/a.mp4");
        assert_eq!(delta.to_insert.len(), 1);
        assert_eq!(delta.to_insert[0].record.path, "/m/b.mp4");
    }

    #[test]
    fn test_duplicate_old_paths_consumed_smallest_first() {
        // Two vacated paths shared one hash; only one new path claims it.
        let catalog = vec![entry("/m/z.mp4", 7, 100), entry("/m/a.mp4", 7, 100)];
        let snapshot = vec![record("/m/new.mp4", 100)];
        let delta = partition(&catalog, &snapshot, &hashes(&[("/m/new.mp4", 7)]));

        assert_eq!(delta.renamed.len(), 1);
        assert_eq!(delta.renamed[0].from, "/m/a.mp4");
        assert_eq!(delta.to_delete, vec!["/m/z.mp4".to_string()]);
    }

    #[test]
    fn test_hash_failure_leaves_path_out_of_all_partitions() {
        // New file whose hash is missing from the resolved map: skipped.
        let delta = partition(&[], &[record("/m/unreadable.mp4", 1)], &HashMap::new());
        assert!(delta.is_empty());
    }

    #[test]
    fn test_deletes_deferred_while_a_new_file_hash_is_unresolved() {
        // The vanished path's content may live on under the new path whose
        // hash could not be computed; deleting now would destroy a possibly
        // renamed medium, so nothing happens this pass.
        let catalog = vec![entry("/m/old.mp4", 7, 100)];
        let snapshot = vec![record("/m/new.mp4", 100)];
        let delta = partition(&catalog, &snapshot, &HashMap::new());

        assert!(delta.to_delete.is_empty());
        assert!(delta.renamed.is_empty());
        assert!(delta.to_insert.is_empty());

        // Once the hash resolves on a later pass, the rename pairs up.
        let delta = partition(&catalog, &snapshot, &hashes(&[("/m/new.mp4", 7)]));
        assert_eq!(delta.renamed.len(), 1);
        assert!(delta.to_delete.is_empty());
    }

    #[test]
    fn test_partitions_are_disjoint_over_random_snapshots() {
        // Cheap deterministic pseudo-random generator; no shared state
        // with the real hasher needed since partition() is pure.
        let mut state: u64 = 0x9e37_79b9;
        let mut next = move || {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            (state >> 33) as u32
        };

        for _ in 0..200 {
            let mut catalog = Vec::new();
            let mut snapshot = Vec::new();
            let mut resolved = HashMap::new();

            for i in 0..20u32 {
                let path = format!("/m/{:02}.mp4", i);
                let h = (next() % 6) as u8;
                let in_catalog = next() % 2 == 0;
                let in_fs = next() % 2 == 0;
                let same_mtime = next() % 2 == 0;

                if in_catalog {
                    catalog.push(entry(&path, h, 100));
                }
                if in_fs {
                    let modified = if in_catalog && same_mtime { 100 } else { 200 };
                    snapshot.push(record(&path, modified));
                    if !(in_catalog && same_mtime) {
                        resolved.insert(path.clone(), hash((next() % 6) as u8));
                    }
                }
            }

            let delta = partition(&catalog, &snapshot, &resolved);

            let mut seen: HashSet<String> = HashSet::new();
            let mut check = |path: &str| {
                assert!(seen.insert(path.to_string()), "path {} in two partitions", path);
            };
            for f in &delta.to_insert {
                check(&f.record.path);
            }
            for p in &delta.to_delete {
                check(p);
            }
            for r in &delta.renamed {
                check(&r.from);
                check(&r.to.path);
            }
            for c in &delta.content_changed {
                check(&c.record.path);
            }
        }
    }

    #[test]
    fn test_compute_hashes_real_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.mp4");
        std::fs::write(&path, b"same bytes").unwrap();

        let old_path = dir.path().join("old.mp4").to_string_lossy().into_owned();
        let computer = DeltaComputer::new(ContentHasher::new());

        // Catalog knows the same content under a path that no longer
        // exists: compute() must report a rename, not delete+insert.
        use sha2::{Digest, Sha256};
        let stored: ContentHash = format!("{:x}", Sha256::digest(b"same bytes"))
            .parse()
            .unwrap();
        let catalog = vec![CatalogEntry {
            path: old_path.clone(),
            content_hash: stored,
            last_modified: mtime(100),
        }];
        let snapshot = vec![record(&path.to_string_lossy(), 200)];

        let delta = computer.compute(&catalog, &snapshot);
        assert_eq!(delta.renamed.len(), 1);
        assert_eq!(delta.renamed[0].from, old_path);
        assert!(delta.to_insert.is_empty());
        assert!(delta.to_delete.is_empty());
    }
}
