//! Core catalog data model
//!
//! A `Medium` is one distinct piece of content, identified by the SHA-256
//! digest of its bytes. A `FilePath` maps a concrete on-disk location to a
//! Medium, so byte-identical files at different paths share one record.

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// 256-bit content fingerprint (SHA-256 of the file bytes).
///
/// Primary key of a Medium. Rendered as 64 lowercase hex characters.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", self)
    }
}

impl FromStr for ContentHash {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.len() != 64 {
            return Err(Error::InvalidInput(format!(
                "content hash must be 64 hex characters, got {}",
                s.len()
            )));
        }
        let bytes = hex::decode(s)
            .map_err(|e| Error::InvalidInput(format!("content hash is not hex: {}", e)))?;
        let mut out = [0u8; 32];
        out.copy_from_slice(&bytes);
        Ok(Self(out))
    }
}

impl TryFrom<String> for ContentHash {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<ContentHash> for String {
    fn from(hash: ContentHash) -> Self {
        hash.to_string()
    }
}

/// Coarse media kind derived from the top-level part of a mime type.
///
/// The scanner only admits files of these kinds into the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MimeKind {
    Video,
    Audio,
    Image,
}

impl MimeKind {
    /// Classify a full mime type string ("video/mp4" -> Video).
    pub fn from_mime(mime: &str) -> Option<Self> {
        match mime.split('/').next() {
            Some("video") => Some(Self::Video),
            Some("audio") => Some(Self::Audio),
            Some("image") => Some(Self::Image),
            _ => None,
        }
    }
}

/// One file seen on disk during a scan pass.
#[derive(Debug, Clone, PartialEq)]
pub struct FileRecord {
    /// Absolute path of the file.
    pub path: String,
    /// Full mime type guessed from the file name.
    pub mime_type: String,
    pub kind: MimeKind,
    pub last_modified: DateTime<Utc>,
}

/// One file path as last recorded in the catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogEntry {
    pub path: String,
    pub content_hash: ContentHash,
    pub last_modified: DateTime<Utc>,
}

/// One container stream as reported by the prober.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct StreamInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub codec_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
}

/// Probed technical metadata for a Medium.
///
/// Either well-formed enough to expose duration and per-stream
/// codec/width/height, or empty when probing failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TechnicalMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
    #[serde(default)]
    pub streams: Vec<StreamInfo>,
}

impl TechnicalMetadata {
    /// The degraded document stored when probing fails.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.duration_seconds.is_none() && self.streams.is_empty()
    }

    /// Build from an ffprobe `-print_format json` document.
    ///
    /// ffprobe reports numbers like `duration` as strings inside `format`;
    /// missing or malformed fields are tolerated and simply left unset.
    pub fn from_ffprobe(doc: &serde_json::Value) -> Self {
        let duration_seconds = doc
            .get("format")
            .and_then(|f| f.get("duration"))
            .and_then(value_as_f64);

        let streams = doc
            .get("streams")
            .and_then(|s| s.as_array())
            .map(|streams| {
                streams
                    .iter()
                    .map(|s| StreamInfo {
                        codec_name: s
                            .get("codec_name")
                            .and_then(|c| c.as_str())
                            .map(str::to_string),
                        width: s.get("width").and_then(|w| w.as_u64()).map(|w| w as u32),
                        height: s.get("height").and_then(|h| h.as_u64()).map(|h| h as u32),
                        duration_seconds: s.get("duration").and_then(value_as_f64),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self {
            duration_seconds,
            streams,
        }
    }

    /// Codec names across all streams.
    pub fn codec_names(&self) -> impl Iterator<Item = &str> {
        self.streams.iter().filter_map(|s| s.codec_name.as_deref())
    }
}

fn value_as_f64(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Descriptive metadata for a Medium: a flat field map plus a parallel
/// record of which fields were entered by a user and must survive re-sync.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct DescriptiveMetadata {
    #[serde(default)]
    pub data: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub entered_by_user: BTreeMap<String, bool>,
}

impl DescriptiveMetadata {
    pub fn is_user_entered(&self, field: &str) -> bool {
        self.entered_by_user.get(field).copied().unwrap_or(false)
    }
}

/// A tag association, carrying the net vote score for this Medium.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaTag {
    pub name: String,
    pub score: i64,
}

/// One distinct piece of content in the catalog.
#[derive(Debug, Clone)]
pub struct Medium {
    pub content_hash: ContentHash,
    /// Display title, taken from the file stem of the path that created it.
    pub name: String,
    pub mime_type: String,
    pub technical: TechnicalMetadata,
    pub descriptive: DescriptiveMetadata,
    /// Filesystem mtime of whichever path last updated this Medium.
    pub last_modified: DateTime<Utc>,
    /// Set whenever the sync engine processes this Medium.
    pub last_indexed: DateTime<Utc>,
    pub category: String,
    pub views: i64,
    pub score: i64,
    /// Paths currently owned by this Medium.
    pub paths: Vec<String>,
    pub tags: Vec<MediaTag>,
}
