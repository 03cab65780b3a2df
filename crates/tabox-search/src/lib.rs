//! Search and filtering for tabox collections.
//!
//! Fuzzy matching with nucleo over three fields: the collection name, each
//! tab's title, and each tab's URL. Text is NFC-normalized with collapsed
//! whitespace before it is scored, so titles captured from different
//! platforms compare the same way.

use nucleo::pattern::{CaseMatching, Normalization, Pattern};
use nucleo::{Config, Matcher, Utf32Str};
use serde::Serialize;
use tabox_core::Collection;
use unicode_normalization::UnicodeNormalization;

/// Which field produced a hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchField {
    Name,
    Title,
    Url,
}

/// One scored match.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub collection_uid: String,
    pub collection_name: String,
    /// `None` when the collection name matched
    pub tab_uid: Option<String>,
    pub field: MatchField,
    pub text: String,
    /// Higher is better
    pub score: u32,
}

/// NFC, trimmed, inner whitespace collapsed to single spaces.
pub fn normalize_text(text: &str) -> String {
    text.nfc().collect::<String>().split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Reusable nucleo state for one query.
pub struct CollectionSearcher {
    pattern: Pattern,
    matcher: Matcher,
    buf: Vec<char>,
    empty: bool,
}

impl CollectionSearcher {
    pub fn new(query: &str) -> Self {
        let query = normalize_text(query);
        Self {
            pattern: Pattern::parse(&query, CaseMatching::Smart, Normalization::Smart),
            matcher: Matcher::new(Config::DEFAULT),
            buf: Vec::new(),
            empty: query.is_empty(),
        }
    }

    fn score_text(&mut self, text: &str) -> Option<u32> {
        let normalized = normalize_text(text);
        let haystack = Utf32Str::new(&normalized, &mut self.buf);
        let score = self.pattern.score(haystack, &mut self.matcher);
        self.buf.clear();
        score
    }

    /// Every field of `collection` that matches, unsorted.
    pub fn hits(&mut self, collection: &Collection) -> Vec<SearchHit> {
        if self.empty {
            return Vec::new();
        }
        let hit = |tab_uid: Option<&str>, field, text: &str, score| SearchHit {
            collection_uid: collection.uid.clone(),
            collection_name: collection.name.clone(),
            tab_uid: tab_uid.map(str::to_string),
            field,
            text: text.to_string(),
            score,
        };

        let mut hits = Vec::new();
        if let Some(score) = self.score_text(&collection.name) {
            hits.push(hit(None, MatchField::Name, collection.name.as_str(), score));
        }
        for tab in &collection.tabs {
            if let Some(score) = self.score_text(&tab.title) {
                hits.push(hit(Some(tab.uid.as_str()), MatchField::Title, tab.title.as_str(), score));
            }
            if let Some(score) = self.score_text(&tab.url) {
                hits.push(hit(Some(tab.uid.as_str()), MatchField::Url, tab.url.as_str(), score));
            }
        }
        hits
    }

    /// Best score over all fields of `collection`.
    pub fn best_score(&mut self, collection: &Collection) -> Option<u32> {
        self.hits(collection).into_iter().map(|h| h.score).max()
    }
}

/// All hits across `collections`, best first. Ties keep input order.
pub fn search(query: &str, collections: &[Collection]) -> Vec<SearchHit> {
    let mut searcher = CollectionSearcher::new(query);
    let mut hits: Vec<SearchHit> = collections.iter().flat_map(|c| searcher.hits(c)).collect();
    hits.sort_by(|a, b| b.score.cmp(&a.score));
    hits
}

/// Collections with at least one matching field, best first.
///
/// An empty or whitespace query filters nothing and keeps the input order.
pub fn filter_collections<'a>(query: &str, collections: &'a [Collection]) -> Vec<&'a Collection> {
    let mut searcher = CollectionSearcher::new(query);
    if searcher.empty {
        return collections.iter().collect();
    }
    let mut scored: Vec<(u32, &Collection)> = collections
        .iter()
        .filter_map(|c| searcher.best_score(c).map(|s| (s, c)))
        .collect();
    scored.sort_by(|a, b| b.0.cmp(&a.0));
    scored.into_iter().map(|(_, c)| c).collect()
}
