//! ffmpeg-backed thumbnailer
//!
//! Extracts one 320px-wide frame per video into `<dir>/<hash>.jpg`.
//! The seek offset depends on the clip length: long features skip the
//! intro (5 minutes in), short clips seek 10 seconds in, and anything
//! under 30 seconds is not worth a thumbnail.

use super::{MediaProber, Thumbnailer};
use mediadex_common::model::ContentHash;
use mediadex_common::{Error, Result};
use std::path::{Path, PathBuf};
use std::process::Command;

pub struct FfmpegThumbnailer<P: MediaProber> {
    thumbnail_dir: PathBuf,
    prober: P,
}

impl<P: MediaProber> FfmpegThumbnailer<P> {
    pub fn new(thumbnail_dir: PathBuf, prober: P) -> Self {
        Self {
            thumbnail_dir,
            prober,
        }
    }

    fn seek_offset(duration_seconds: f64) -> Option<u64> {
        if duration_seconds >= 600.0 {
            Some(300)
        } else if duration_seconds >= 30.0 {
            Some(10)
        } else {
            None
        }
    }
}

impl<P: MediaProber> Thumbnailer for FfmpegThumbnailer<P> {
    fn ensure_thumbnail(&self, hash: &ContentHash, path: &Path) -> Result<()> {
        let target = self.thumbnail_dir.join(format!("{}.jpg", hash));
        if target.exists() {
            tracing::debug!("Thumbnail exists for {}", hash);
            return Ok(());
        }

        let duration = self
            .prober
            .probe(path)?
            .duration_seconds
            .ok_or_else(|| Error::Internal(format!("no duration for {}", path.display())))?;

        let offset = Self::seek_offset(duration).ok_or_else(|| {
            Error::Internal(format!(
                "{} too short for a thumbnail ({:.1}s)",
                path.display(),
                duration
            ))
        })?;

        std::fs::create_dir_all(&self.thumbnail_dir)?;

        let status = Command::new("ffmpeg")
            .args(["-v", "quiet", "-ss", &offset.to_string(), "-i"])
            .arg(path)
            .args(["-vf", "scale=320:-1", "-vframes", "1", "-f", "image2"])
            .arg(&target)
            .status()
            .map_err(|e| Error::Internal(format!("failed to run ffmpeg: {}", e)))?;

        if !status.success() {
            // Leave no half-written file behind for the exists() check.
            let _ = std::fs::remove_file(&target);
            return Err(Error::Internal(format!(
                "ffmpeg exited with {} for {}",
                status,
                path.display()
            )));
        }

        tracing::debug!("Wrote thumbnail {}", target.display());
        Ok(())
    }
}
