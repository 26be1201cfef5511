//! Catalog persistence
//!
//! The SQLite-backed catalog store. The sync engine is the only writer
//! and applies each run as one transaction; search reads concurrently.

pub mod catalog;

pub use catalog::{ApplyPlan, CatalogStore, FileChange, FileMove, FileUpsert};
