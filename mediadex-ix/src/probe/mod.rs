//! External enrichment collaborators
//!
//! The sync engine treats probing, thumbnailing, and content-metadata
//! guessing as black boxes behind these traits. All three are best-effort:
//! a failure degrades the affected Medium and never aborts the batch.
//! Implementations are synchronous; the orchestrator runs enrichment
//! batches on blocking worker threads.

pub mod ffprobe;
pub mod guesser;
pub mod thumbnailer;

pub use ffprobe::FfprobeProber;
pub use guesser::FilenameGuesser;
pub use thumbnailer::FfmpegThumbnailer;

use mediadex_common::model::{ContentHash, TechnicalMetadata};
use mediadex_common::Result;
use std::collections::BTreeMap;
use std::path::Path;

/// Probes a file for its technical metadata document.
pub trait MediaProber: Send + Sync {
    fn probe(&self, path: &Path) -> Result<TechnicalMetadata>;
}

/// Produces and caches a thumbnail image for a Medium.
pub trait Thumbnailer: Send + Sync {
    fn ensure_thumbnail(&self, hash: &ContentHash, path: &Path) -> Result<()>;
}

/// Derives descriptive fields from a file name and its category.
/// Returns an empty map when nothing could be guessed.
pub trait MetadataGuesser: Send + Sync {
    fn guess(&self, path: &Path, category: &str) -> BTreeMap<String, serde_json::Value>;
}
