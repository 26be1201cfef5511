//! Core engine services
//!
//! The sync pipeline (scan, hash, delta, enrich, apply) and the faceted
//! search engine. Each stage is its own module with a narrow interface;
//! the orchestrator is the only place that wires them together.

pub mod categorizer;
pub mod content_hasher;
pub mod delta_computer;
pub mod file_scanner;
pub mod metadata_merger;
pub mod search_engine;
pub mod sync_orchestrator;

pub use categorizer::Categorizer;
pub use content_hasher::ContentHasher;
pub use delta_computer::DeltaComputer;
pub use file_scanner::FileScanner;
pub use search_engine::{SearchEngine, SearchOrder, SearchPage, SearchRequest};
pub use sync_orchestrator::{SyncOrchestrator, SyncReport};
