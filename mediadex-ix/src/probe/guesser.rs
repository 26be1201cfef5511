//! Filename-based metadata guesser
//!
//! Best-effort heuristics over the file name: release year, SxxEyy
//! episode markers, artist/title splits for music. Produces a flat
//! field map; anything it cannot read it simply leaves out.

use super::MetadataGuesser;
use crate::services::categorizer::MUSIC_CATEGORY;
use regex::Regex;
use serde_json::json;
use std::collections::BTreeMap;
use std::path::Path;

pub struct FilenameGuesser {
    episode: Regex,
    year: Regex,
}

impl FilenameGuesser {
    pub fn new() -> Self {
        Self {
            episode: Regex::new(r"(?i)\bs(\d{1,2})\s*e(\d{1,3})\b").unwrap(),
            year: Regex::new(r"\b(19\d{2}|20\d{2})\b").unwrap(),
        }
    }

    /// Turn dot/underscore separators into spaces and collapse runs.
    fn clean(stem: &str) -> String {
        let spaced: String = stem
            .chars()
            .map(|c| if c == '.' || c == '_' { ' ' } else { c })
            .collect();
        spaced.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}

impl Default for FilenameGuesser {
    fn default() -> Self {
        Self::new()
    }
}

impl MetadataGuesser for FilenameGuesser {
    fn guess(&self, path: &Path, category: &str) -> BTreeMap<String, serde_json::Value> {
        let mut fields = BTreeMap::new();

        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            return fields;
        };
        let cleaned = Self::clean(stem);
        if cleaned.is_empty() {
            return fields;
        }

        if category == MUSIC_CATEGORY {
            // "Artist - Title" is the dominant convention for loose tracks.
            if let Some((artist, title)) = cleaned.split_once(" - ") {
                fields.insert("artist".to_string(), json!(artist.trim()));
                fields.insert("title".to_string(), json!(title.trim()));
            } else {
                fields.insert("title".to_string(), json!(cleaned));
            }
            return fields;
        }

        let mut title_end = cleaned.len();

        if let Some(captures) = self.episode.captures(&cleaned) {
            let all = captures.get(0).unwrap();
            if let (Ok(season), Ok(episode)) =
                (captures[1].parse::<u32>(), captures[2].parse::<u32>())
            {
                fields.insert("season".to_string(), json!(season));
                fields.insert("episode".to_string(), json!(episode));
            }
            title_end = title_end.min(all.start());
        }

        if let Some(m) = self.year.find(&cleaned) {
            if let Ok(year) = m.as_str().parse::<u32>() {
                fields.insert("year".to_string(), json!(year));
            }
            title_end = title_end.min(m.start());
        }

        let title = cleaned[..title_end]
            .trim_end_matches(['-', '(', '['])
            .trim();
        if !title.is_empty() {
            fields.insert("title".to_string(), json!(title));
        }

        fields
    }
}
