//! Faceted media search
//!
//! Translates a raw search request into a typed predicate tree and
//! evaluates it over decoded catalog records: free text, codec groups
//! (OR of ANDs), minimum stream dimensions, category, tag set, mime set,
//! and exact content hash, combined with AND across facet kinds. Results
//! are ordered, counted before pagination, and paged.
//!
//! Input validation happens before any catalog access: negative numeric
//! arguments and malformed hashes are rejected outright, and the page
//! size is clamped to a hard maximum.

use crate::db::CatalogStore;
use mediadex_common::model::{ContentHash, Medium};
use mediadex_common::{Error, Result};
use serde::{Deserialize, Serialize};

/// Hard upper bound on one result page.
pub const MAX_PAGE_SIZE: i64 = 100;
pub const DEFAULT_PAGE_SIZE: i64 = 20;

/// Raw, wire-shaped search arguments as an external request layer would
/// hand them over. Validated into a [`MediaFilter`] before querying.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SearchRequest {
    /// Whitespace-tokenized free text; every token must substring-match
    /// the medium's name or one of its paths.
    pub text: Option<String>,
    /// OR of ANDs: a medium matches when any group's codecs are all
    /// present among its stream codec names.
    pub codec_groups: Vec<Vec<String>>,
    pub min_width: Option<i64>,
    pub min_height: Option<i64>,
    pub category: Option<String>,
    /// The medium must carry every listed tag.
    pub tags: Vec<String>,
    /// The medium's mime type must be any of these.
    pub mime: Vec<String>,
    pub content_hash: Option<String>,
    pub order: SearchOrder,
    pub offset: i64,
    pub limit: i64,
}

impl Default for SearchRequest {
    fn default() -> Self {
        Self {
            text: None,
            codec_groups: Vec::new(),
            min_width: None,
            min_height: None,
            category: None,
            tags: Vec::new(),
            mime: Vec::new(),
            content_hash: None,
            order: SearchOrder::default(),
            offset: 0,
            limit: DEFAULT_PAGE_SIZE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchOrder {
    #[default]
    PathAsc,
    PathDesc,
    LastIndexedAsc,
    LastIndexedDesc,
}

/// Validated predicate tree.
#[derive(Debug, Clone)]
pub struct MediaFilter {
    text_tokens: Vec<String>,
    codec_groups: Vec<Vec<String>>,
    min_width: Option<u32>,
    min_height: Option<u32>,
    category: Option<String>,
    tags: Vec<String>,
    mime: Vec<String>,
    content_hash: Option<ContentHash>,
}

impl MediaFilter {
    /// Validate raw arguments. Rejections here never touch the catalog.
    pub fn validate(request: &SearchRequest) -> Result<Self> {
        let min_width = validate_dimension(request.min_width, "min_width")?;
        let min_height = validate_dimension(request.min_height, "min_height")?;

        let content_hash = request
            .content_hash
            .as_deref()
            .map(|raw| raw.parse::<ContentHash>())
            .transpose()?;

        let text_tokens = request
            .text
            .as_deref()
            .unwrap_or("")
            .split_whitespace()
            .map(str::to_lowercase)
            .collect();

        let codec_groups = request
            .codec_groups
            .iter()
            .map(|group| group.iter().map(|codec| codec.to_lowercase()).collect())
            .collect();

        Ok(Self {
            text_tokens,
            codec_groups,
            min_width,
            min_height,
            category: request.category.clone(),
            tags: request.tags.clone(),
            mime: request.mime.clone(),
            content_hash,
        })
    }

    pub fn content_hash(&self) -> Option<&ContentHash> {
        self.content_hash.as_ref()
    }

    /// Evaluate the whole tree against one decoded medium.
    pub fn matches(&self, medium: &Medium) -> bool {
        self.matches_text(medium)
            && self.matches_codecs(medium)
            && self.matches_dimensions(medium)
            && self.matches_category(medium)
            && self.matches_tags(medium)
            && self.matches_mime(medium)
            && self.matches_hash(medium)
    }

    fn matches_text(&self, medium: &Medium) -> bool {
        self.text_tokens.iter().all(|token| {
            medium.name.to_lowercase().contains(token)
                || medium
                    .paths
                    .iter()
                    .any(|path| path.to_lowercase().contains(token))
        })
    }

    fn matches_codecs(&self, medium: &Medium) -> bool {
        if self.codec_groups.is_empty() {
            return true;
        }
        let codecs: Vec<String> = medium
            .technical
            .codec_names()
            .map(str::to_lowercase)
            .collect();
        self.codec_groups.iter().any(|group| {
            group
                .iter()
                .all(|wanted| codecs.iter().any(|c| c == wanted))
        })
    }

    fn matches_dimensions(&self, medium: &Medium) -> bool {
        let wide_enough = match self.min_width {
            Some(min) => medium
                .technical
                .streams
                .iter()
                .any(|s| s.width.unwrap_or(0) >= min),
            None => true,
        };
        let tall_enough = match self.min_height {
            Some(min) => medium
                .technical
                .streams
                .iter()
                .any(|s| s.height.unwrap_or(0) >= min),
            None => true,
        };
        wide_enough && tall_enough
    }

    fn matches_category(&self, medium: &Medium) -> bool {
        match &self.category {
            Some(category) => &medium.category == category,
            None => true,
        }
    }

    fn matches_tags(&self, medium: &Medium) -> bool {
        self.tags
            .iter()
            .all(|wanted| medium.tags.iter().any(|t| &t.name == wanted))
    }

    fn matches_mime(&self, medium: &Medium) -> bool {
        self.mime.is_empty() || self.mime.iter().any(|m| m == &medium.mime_type)
    }

    fn matches_hash(&self, medium: &Medium) -> bool {
        match &self.content_hash {
            Some(hash) => &medium.content_hash == hash,
            None => true,
        }
    }
}

fn validate_dimension(value: Option<i64>, name: &str) -> Result<Option<u32>> {
    match value {
        Some(v) if v < 0 => Err(Error::InvalidInput(format!(
            "{} must not be negative, got {}",
            name, v
        ))),
        Some(v) => Ok(Some(v as u32)),
        None => Ok(None),
    }
}

/// One page of results plus the total match count before pagination.
#[derive(Debug)]
pub struct SearchPage {
    pub total: usize,
    pub items: Vec<Medium>,
}

pub struct SearchEngine {
    store: CatalogStore,
}

impl SearchEngine {
    pub fn new(store: CatalogStore) -> Self {
        Self { store }
    }

    pub async fn search(&self, request: &SearchRequest) -> Result<SearchPage> {
        if request.limit < 0 {
            return Err(Error::InvalidInput(format!(
                "limit must not be negative, got {}",
                request.limit
            )));
        }
        if request.offset < 0 {
            return Err(Error::InvalidInput(format!(
                "offset must not be negative, got {}",
                request.offset
            )));
        }
        let filter = MediaFilter::validate(request)?;

        let limit = request.limit.min(MAX_PAGE_SIZE) as usize;
        let offset = request.offset as usize;

        // Exact-hash lookups skip the catalog scan entirely.
        let candidates = match filter.content_hash() {
            Some(hash) => self.store.load_medium(hash).await?.into_iter().collect(),
            None => self.store.all_media().await?,
        };

        let mut matches: Vec<Medium> = candidates
            .into_iter()
            .filter(|medium| filter.matches(medium))
            .collect();

        sort_media(&mut matches, request.order);

        let total = matches.len();
        let items = matches.into_iter().skip(offset).take(limit).collect();

        tracing::debug!(total, "Search complete");
        Ok(SearchPage { total, items })
    }
}

fn sort_media(media: &mut [Medium], order: SearchOrder) {
    // A medium's sort path is its smallest owned path; paths come from the
    // store already sorted.
    let path_key = |m: &Medium| m.paths.first().cloned().unwrap_or_else(|| m.name.clone());
    match order {
        SearchOrder::PathAsc => media.sort_by_key(path_key),
        SearchOrder::PathDesc => {
            media.sort_by(|a, b| path_key(b).cmp(&path_key(a)));
        }
        SearchOrder::LastIndexedAsc => media.sort_by_key(|m| m.last_indexed),
        SearchOrder::LastIndexedDesc => {
            media.sort_by(|a, b| b.last_indexed.cmp(&a.last_indexed));
        }
    }
}
