//! # mediadex common library
//!
//! Shared code for the mediadex catalog engine:
//! - Error type and result alias
//! - Configuration loading
//! - SQLite pool and schema initialization
//! - Core catalog data model (media, file paths, categories, tags)

pub mod config;
pub mod db;
pub mod error;
pub mod model;

pub use error::{Error, Result};
