//! Database module
//!
//! Pool construction and schema initialization for the SQLite catalog.

pub mod init;

pub use init::init_database;
