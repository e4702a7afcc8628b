//! Alternative-query detection
//!
//! Consulted at most once per album, only after the standard search came
//! back empty from every provider. The rewritten query is never analysed
//! again, which bounds one album to two rounds of provider calls.
//!
//! Detection order (first match wins):
//! 1. Soundtrack: "Inception (Original Soundtrack)" → album "Inception"
//! 2. Various artists: artist term dropped
//! 3. Decorative brackets: "(Disc 1)", "[Explicit]" stripped; edition
//!    markers such as "(Remastered)" are left alone
//! 4. Greatest hits: album reduced to the compilation phrase

use crate::cache::key::normalize;
use crate::scoring::EDITION_MARKERS;
use crate::types::AlbumQuery;
use regex::Regex;
use std::collections::HashSet;
use std::fmt;

const VARIOUS_ARTISTS_NAMES: [&str; 8] = [
    "various artists",
    "various",
    "va",
    "v a",
    "varios artistas",
    "verschiedene interpreten",
    "artistes divers",
    "multi interpretes",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchStrategy {
    Normal,
    Soundtrack,
    VariousArtists,
    StripBrackets,
    GreatestHits,
}

impl fmt::Display for SearchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SearchStrategy::Normal => "NORMAL",
            SearchStrategy::Soundtrack => "SOUNDTRACK",
            SearchStrategy::VariousArtists => "VARIOUS_ARTISTS",
            SearchStrategy::StripBrackets => "STRIP_BRACKETS",
            SearchStrategy::GreatestHits => "GREATEST_HITS",
        };
        f.write_str(name)
    }
}

/// Detected strategy plus the rewritten query (`None` for NORMAL)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategyDecision {
    pub strategy: SearchStrategy,
    pub query: Option<AlbumQuery>,
}

impl StrategyDecision {
    fn normal() -> Self {
        Self {
            strategy: SearchStrategy::Normal,
            query: None,
        }
    }

    fn rewrite(strategy: SearchStrategy, query: AlbumQuery) -> Self {
        Self {
            strategy,
            query: Some(query),
        }
    }
}

/// Compiled detection patterns
#[derive(Debug, Clone)]
pub struct StrategyPatterns {
    soundtrack_bracket: Regex,
    soundtrack_suffix: Regex,
    bracket: Regex,
    edition: Regex,
    compilation: Regex,
}

impl StrategyPatterns {
    pub fn compile() -> Self {
        let soundtrack_words = r"(?:original\s+)?(?:motion\s+picture\s+|film\s+|movie\s+|television\s+|tv\s+|video\s+game\s+|game\s+)?(?:soundtrack|score|ost)";
        Self {
            soundtrack_bracket: Regex::new(&format!(
                r"(?i)^\s*(.+?)\s*[\(\[][^\)\]]*(?:\b{}\b|\bmusic\s+from\b)[^\)\]]*[\)\]]\s*$",
                soundtrack_words
            ))
            .expect("soundtrack bracket pattern is valid"),
            soundtrack_suffix: Regex::new(&format!(
                r"(?i)^\s*(.+?)\s*[:\-–]\s*(?:the\s+)?{}\s*$",
                soundtrack_words
            ))
            .expect("soundtrack suffix pattern is valid"),
            bracket: Regex::new(r"\s*[\(\[\{]([^\)\]\}]*)[\)\]\}]").expect("bracket pattern is valid"),
            edition: Regex::new(&format!(r"(?i)\b(?:{})\b", EDITION_MARKERS))
                .expect("edition pattern is valid"),
            compilation: Regex::new(
                r"(?i)\b(greatest\s+hits|the\s+very\s+best\s+of|the\s+best\s+of|best\s+of|the\s+essential|anthology|definitive\s+collection|gold)\b",
            )
            .expect("compilation pattern is valid"),
        }
    }
}

pub struct SearchStrategySelector {
    patterns: StrategyPatterns,
    various_artists: HashSet<String>,
}

impl SearchStrategySelector {
    pub fn new() -> Self {
        Self {
            patterns: StrategyPatterns::compile(),
            various_artists: VARIOUS_ARTISTS_NAMES.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Recompile patterns and restore the default name list (test isolation)
    pub fn rebuild(&mut self) {
        *self = Self::new();
    }

    /// Extra names treated as "various artists"
    pub fn add_various_artists_name(&mut self, name: &str) {
        self.various_artists.insert(normalize(name));
    }

    pub fn detect(&self, artist: &str, album: &str) -> StrategyDecision {
        let p = &self.patterns;

        if let Some(title) = p
            .soundtrack_bracket
            .captures(album)
            .or_else(|| p.soundtrack_suffix.captures(album))
            .and_then(|c| c.get(1))
        {
            let title = title.as_str().trim();
            if !title.is_empty() {
                return StrategyDecision::rewrite(SearchStrategy::Soundtrack, AlbumQuery::new(artist, title));
            }
        }

        if self.various_artists.contains(&normalize(artist)) {
            return StrategyDecision::rewrite(SearchStrategy::VariousArtists, AlbumQuery::new("", album));
        }

        let stripped = self.strip_decorative_brackets(album);
        if !stripped.is_empty() && stripped != album.trim() {
            let mut query = AlbumQuery::new(artist, stripped.as_str());
            query.expects_compilation = p.compilation.is_match(&stripped);
            return StrategyDecision::rewrite(SearchStrategy::StripBrackets, query);
        }

        if let Some(phrase) = p.compilation.find(album) {
            let phrase = phrase.as_str();
            if normalize(phrase) != normalize(album) {
                let mut query = AlbumQuery::new(artist, phrase);
                query.expects_compilation = true;
                return StrategyDecision::rewrite(SearchStrategy::GreatestHits, query);
            }
        }

        StrategyDecision::normal()
    }

    /// Remove bracket groups whose content is not an edition marker
    fn strip_decorative_brackets(&self, album: &str) -> String {
        let p = &self.patterns;
        let stripped = p.bracket.replace_all(album, |caps: &regex::Captures<'_>| {
            let inner = caps.get(1).map_or("", |m| m.as_str());
            if p.edition.is_match(inner) {
                caps.get(0).map_or(String::new(), |m| m.as_str().to_string())
            } else {
                String::new()
            }
        });
        stripped.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}

impl Default for SearchStrategySelector {
    fn default() -> Self {
        Self::new()
    }
}
