//! mediadex-ix library interface
//!
//! The indexer service: keeps the catalog consistent with the filesystem
//! (sync engine) and answers faceted queries over it (search engine). The
//! HTTP request layer consuming this crate lives outside it.

pub mod db;
pub mod probe;
pub mod services;
