//! Deterministic categorization
//!
//! Maps (path, mime kind, duration) to a category name with ordered rules:
//! audio and images get fixed categories, then the configured path rules
//! are tried in order (first rule with any matching pattern wins), then
//! long uncategorized video becomes a movie, and everything else falls
//! through to "uncategorized".

use mediadex_common::config::CategoryRule;
use mediadex_common::model::MimeKind;
use mediadex_common::{Error, Result};
use regex::RegexSet;

pub const MUSIC_CATEGORY: &str = "music";
pub const IMAGE_CATEGORY: &str = "image";
pub const MOVIE_CATEGORY: &str = "movie";
pub const UNCATEGORIZED: &str = "uncategorized";

struct CompiledRule {
    name: String,
    patterns: RegexSet,
}

/// Pure, total categorizer. Construction validates the rule patterns;
/// `categorize` itself never fails.
pub struct Categorizer {
    rules: Vec<CompiledRule>,
    movie_threshold_secs: f64,
}

impl Categorizer {
    pub fn new(rules: &[CategoryRule], movie_threshold_secs: f64) -> Result<Self> {
        let rules = rules
            .iter()
            .map(|rule| {
                let patterns = RegexSet::new(
                    rule.patterns.iter().map(|p| format!("(?i){}", p)),
                )
                .map_err(|e| {
                    Error::Config(format!(
                        "invalid pattern in category rule '{}': {}",
                        rule.name, e
                    ))
                })?;
                Ok(CompiledRule {
                    name: rule.name.clone(),
                    patterns,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            rules,
            movie_threshold_secs,
        })
    }

    /// Assign a category name for one file.
    pub fn categorize(&self, path: &str, kind: MimeKind, duration_seconds: Option<f64>) -> &str {
        match kind {
            MimeKind::Audio => return MUSIC_CATEGORY,
            MimeKind::Image => return IMAGE_CATEGORY,
            MimeKind::Video => {}
        }

        for rule in &self.rules {
            if rule.patterns.is_match(path) {
                return &rule.name;
            }
        }

        if duration_seconds.unwrap_or(0.0) >= self.movie_threshold_secs {
            return MOVIE_CATEGORY;
        }

        UNCATEGORIZED
    }
}
