//! Configuration loading and config file resolution
//!
//! Engine-wide settings (media roots, category rules, thresholds) are an
//! explicit value handed to the sync and search engines, never read from
//! process-wide state.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// One ordered categorization rule: the first rule whose any pattern
/// matches a path (case-insensitively) assigns its category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryRule {
    pub name: String,
    pub patterns: Vec<String>,
}

/// Engine configuration, loaded from `mediadex.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// SQLite catalog location.
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// Filesystem roots scanned for media.
    #[serde(default)]
    pub media_roots: Vec<PathBuf>,

    /// Where generated thumbnails are cached (`<hash>.jpg`).
    #[serde(default = "default_thumbnail_dir")]
    pub thumbnail_dir: PathBuf,

    /// Ordered category rules, evaluated before the duration fallback.
    #[serde(default)]
    pub category_rules: Vec<CategoryRule>,

    /// Uncategorized video at or above this duration becomes a movie.
    #[serde(default = "default_movie_threshold_secs")]
    pub movie_threshold_secs: f64,

    /// Worker count for the hash and enrichment stages.
    /// Defaults to the number of available CPU cores when unset.
    #[serde(default)]
    pub workers: Option<usize>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            media_roots: Vec::new(),
            thumbnail_dir: default_thumbnail_dir(),
            category_rules: Vec::new(),
            movie_threshold_secs: default_movie_threshold_secs(),
            workers: None,
        }
    }
}

fn data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("mediadex"))
        .unwrap_or_else(|| PathBuf::from("/var/lib/mediadex"))
}

fn default_database_path() -> PathBuf {
    data_dir().join("catalog.db")
}

fn default_thumbnail_dir() -> PathBuf {
    data_dir().join("thumbnails")
}

fn default_movie_threshold_secs() -> f64 {
    3600.0
}

impl EngineConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("cannot parse {}: {}", path.display(), e)))
    }

    /// Load from the resolved config path, or fall back to defaults when no
    /// config file exists anywhere in the chain.
    pub fn load_or_default(cli_arg: Option<&Path>) -> Result<Self> {
        match resolve_config_path(cli_arg) {
            Some(path) => Self::load(&path),
            None => Ok(Self::default()),
        }
    }
}

/// Resolve the config file location, in priority order:
/// 1. Command-line argument (highest priority)
/// 2. `MEDIADEX_CONFIG` environment variable
/// 3. Platform config dir (`~/.config/mediadex/mediadex.toml` on Linux)
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var("MEDIADEX_CONFIG") {
        return Some(PathBuf::from(path));
    }

    let default = dirs::config_dir().map(|d| d.join("mediadex").join("mediadex.toml"))?;
    default.exists().then_some(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert!(config.media_roots.is_empty());
        assert!(config.category_rules.is_empty());
        assert_eq!(config.movie_threshold_secs, 3600.0);
        assert_eq!(config.workers, None);
    }

    #[test]
    fn test_load_full_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
database_path = "/srv/mediadex/catalog.db"
media_roots = ["/srv/media/movies", "/srv/media/music"]
thumbnail_dir = "/srv/mediadex/thumbs"
movie_threshold_secs = 2700.0
workers = 4

[[category_rules]]
name = "series"
patterns = ["(?i)s\\d+e\\d+", "season"]

[[category_rules]]
name = "trailers"
patterns = ["trailer"]
"#
        )
        .unwrap();

        let config = EngineConfig::load(file.path()).unwrap();
        assert_eq!(config.media_roots.len(), 2);
        assert_eq!(config.movie_threshold_secs, 2700.0);
        assert_eq!(config.workers, Some(4));
        assert_eq!(config.category_rules[0].name, "series");
        assert_eq!(config.category_rules[1].patterns, vec!["trailer"]);
    }

    #[test]
    fn test_load_missing_file_is_config_error() {
        let err = EngineConfig::load(Path::new("/nonexistent/mediadex.toml")).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_cli_argument_wins_resolution() {
        let path = resolve_config_path(Some(Path::new("/tmp/explicit.toml"))).unwrap();
        assert_eq!(path, PathBuf::from("/tmp/explicit.toml"));
    }
}
