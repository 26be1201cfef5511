//! Content hashing
//!
//! Computes the SHA-256 content fingerprint that identifies a Medium.
//! Files are streamed through the hasher in fixed-size blocks, never
//! buffered whole.

use mediadex_common::model::ContentHash;
use mediadex_common::{Error, Result};
use rayon::prelude::*;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

const BLOCK_SIZE: usize = 1024 * 1024; // 1MB blocks

/// Stateless, CPU-bound content hasher.
#[derive(Debug, Default, Clone, Copy)]
pub struct ContentHasher;

impl ContentHasher {
    pub fn new() -> Self {
        Self
    }

    /// Hash one file's bytes.
    ///
    /// An I/O error is fatal for this file only: the caller logs it, skips
    /// the file for this sync pass, and retries on the next pass.
    pub fn hash_file(&self, path: &Path) -> Result<ContentHash> {
        let mut file = File::open(path).map_err(|e| {
            Error::Io(std::io::Error::new(
                e.kind(),
                format!("failed to open {} for hashing: {}", path.display(), e),
            ))
        })?;

        let mut hasher = Sha256::new();
        let mut buffer = vec![0u8; BLOCK_SIZE];

        loop {
            let bytes_read = file.read(&mut buffer).map_err(|e| {
                Error::Io(std::io::Error::new(
                    e.kind(),
                    format!("failed to read {} for hashing: {}", path.display(), e),
                ))
            })?;

            if bytes_read == 0 {
                break;
            }

            hasher.update(&buffer[..bytes_read]);
        }

        Ok(ContentHash::from_bytes(hasher.finalize().into()))
    }

    /// Hash a batch of independent files on a worker pool sized to the
    /// available CPU cores. Per-file failures are isolated; completion
    /// order is irrelevant since results carry their path.
    pub fn hash_many(&self, paths: &[PathBuf]) -> Vec<(PathBuf, Result<ContentHash>)> {
        paths
            .par_iter()
            .map(|path| (path.clone(), self.hash_file(path)))
            .collect()
    }
}
