//! ffprobe-backed media prober
//!
//! Shells out to `ffprobe -print_format json` and lifts the result into
//! the catalog's technical metadata document.

use super::MediaProber;
use mediadex_common::model::TechnicalMetadata;
use mediadex_common::{Error, Result};
use std::path::Path;
use std::process::Command;

#[derive(Debug, Default, Clone, Copy)]
pub struct FfprobeProber;

impl FfprobeProber {
    pub fn new() -> Self {
        Self
    }
}

impl MediaProber for FfprobeProber {
    fn probe(&self, path: &Path) -> Result<TechnicalMetadata> {
        let output = Command::new("ffprobe")
            .args([
                "-v",
                "quiet",
                "-show_format",
                "-show_streams",
                "-print_format",
                "json",
            ])
            .arg(path)
            .output()
            .map_err(|e| Error::Internal(format!("failed to run ffprobe: {}", e)))?;

        if !output.status.success() {
            return Err(Error::Internal(format!(
                "ffprobe exited with {} for {}",
                output.status,
                path.display()
            )));
        }

        let doc: serde_json::Value = serde_json::from_slice(&output.stdout)
            .map_err(|e| Error::Internal(format!("ffprobe output is not JSON: {}", e)))?;

        Ok(TechnicalMetadata::from_ffprobe(&doc))
    }
}
