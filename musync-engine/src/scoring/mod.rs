//! Release scoring
//!
//! Deterministic integer scoring of a candidate release against the
//! queried (artist, album). The winning score across every provider's
//! candidates feeds the [`decision::DecisionPolicy`].

pub mod decision;

pub use decision::{Decision, DecisionPolicy};

use crate::cache::key::normalize;
use crate::config::ResolutionConfig;
use crate::error::{SyncError, SyncResult};
use crate::types::{AlbumQuery, CandidateRelease, ConfidenceBand, Provider, ScoredRelease};
use regex::Regex;
use std::collections::HashSet;

/// Bracketed edition/reissue vocabulary shared with query reformulation
pub(crate) const EDITION_MARKERS: &str =
    r"remaster(?:ed)?|deluxe|anniversary|expanded|edition|reissue|bonus|mono|stereo|special";

/// Points awarded or deducted per signal
#[derive(Debug, Clone, PartialEq)]
pub struct ScoringWeights {
    pub exact_artist: i32,
    pub exact_album: i32,
    pub release_group_match: i32,
    pub official: i32,
    pub non_compilation: i32,
    pub major_market: i32,
    pub reissue_penalty: i32,
    pub compilation_penalty: i32,
    pub bootleg_penalty: i32,
    /// Per year between candidate and release-group reference year
    pub year_gap_per_year: i32,
    pub year_gap_cap: i32,
    /// Maximum deduction for a completely different album title
    pub title_distance_cap: i32,
    pub artist_distance_cap: i32,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            exact_artist: 20,
            exact_album: 25,
            release_group_match: 50,
            official: 10,
            non_compilation: 15,
            major_market: 5,
            reissue_penalty: 30,
            compilation_penalty: 35,
            bootleg_penalty: 50,
            year_gap_per_year: 2,
            year_gap_cap: 20,
            title_distance_cap: 40,
            artist_distance_cap: 20,
        }
    }
}

/// Compiled patterns, built once per scorer
#[derive(Debug, Clone)]
pub struct ScoringPatterns {
    edition: Regex,
}

impl ScoringPatterns {
    pub fn compile() -> Self {
        let edition = Regex::new(&format!(
            r"(?i)\s*[\(\[][^\)\]]*\b(?:{})\b[^\)\]]*[\)\]]",
            EDITION_MARKERS
        ))
        .expect("edition pattern is valid");
        Self { edition }
    }

    pub fn has_edition_marker(&self, title: &str) -> bool {
        self.edition.is_match(title)
    }

    /// Title with bracketed edition decorations removed
    pub fn strip_editions(&self, title: &str) -> String {
        self.edition.replace_all(title, "").trim().to_string()
    }
}

/// Scores candidates and picks the winner
pub struct ReleaseScorer {
    weights: ScoringWeights,
    patterns: ScoringPatterns,
    high_threshold: i32,
    low_threshold: i32,
    reissue_year_threshold: u32,
    min_year: i32,
    max_years_ahead: i32,
    major_markets: HashSet<String>,
    priority: Vec<Provider>,
}

impl ReleaseScorer {
    pub fn new(config: &ResolutionConfig, priority: &[Provider]) -> Self {
        Self::with_weights(config, priority, ScoringWeights::default())
    }

    pub fn with_weights(config: &ResolutionConfig, priority: &[Provider], weights: ScoringWeights) -> Self {
        Self {
            weights,
            patterns: ScoringPatterns::compile(),
            high_threshold: config.high_confidence_threshold,
            low_threshold: config.low_confidence_threshold,
            reissue_year_threshold: config.reissue_year_threshold,
            min_year: config.min_year,
            max_years_ahead: config.max_years_ahead,
            major_markets: config
                .major_markets
                .iter()
                .map(|m| m.to_ascii_uppercase())
                .collect(),
            priority: priority.to_vec(),
        }
    }

    /// Recompile patterns (test isolation)
    pub fn rebuild(&mut self) {
        self.patterns = ScoringPatterns::compile();
    }

    pub fn weights(&self) -> &ScoringWeights {
        &self.weights
    }

    /// Years outside [min_year, current_year + max_years_ahead] are rejected
    pub fn validate_year(&self, year: i32) -> SyncResult<()> {
        let max = musync_common::time::current_year() + self.max_years_ahead;
        if year < self.min_year || year > max {
            return Err(SyncError::Validation(format!(
                "year {} outside [{}, {}]",
                year, self.min_year, max
            )));
        }
        Ok(())
    }

    /// True when the candidate is a reissue whose group year should replace its own
    fn uses_original_year(&self, candidate: &CandidateRelease) -> bool {
        self.is_reissue(candidate)
            && candidate
                .release_group_distance()
                .is_some_and(|d| d >= self.reissue_year_threshold)
    }

    fn is_reissue(&self, candidate: &CandidateRelease) -> bool {
        candidate.is_reissue || self.patterns.has_edition_marker(&candidate.album)
    }

    /// Year to apply for this candidate
    pub fn resolved_year(&self, candidate: &CandidateRelease) -> i32 {
        match candidate.release_group_year {
            Some(original) if self.uses_original_year(candidate) => original,
            _ => candidate.year,
        }
    }

    pub fn score(&self, query: &AlbumQuery, candidate: &CandidateRelease) -> i32 {
        let w = &self.weights;
        let mut score = 0;

        if query.has_artist() {
            let wanted = normalize(&query.artist);
            let got = normalize(&candidate.artist);
            if wanted == got {
                score += w.exact_artist;
            } else {
                score -= distance_penalty(&wanted, &got, w.artist_distance_cap);
            }
        }

        let wanted_album = normalize(&self.patterns.strip_editions(&query.album));
        let got_album = normalize(&self.patterns.strip_editions(&candidate.album));
        let album_exact = wanted_album == got_album;
        if album_exact {
            score += w.exact_album;
            if candidate.release_group_id.is_some() {
                score += w.release_group_match;
            }
        } else {
            score -= distance_penalty(&wanted_album, &got_album, w.title_distance_cap);
        }

        if candidate.is_official {
            score += w.official;
        }
        if candidate.is_bootleg {
            score -= w.bootleg_penalty;
        }

        if candidate.release_type.is_studio() {
            score += w.non_compilation;
        } else if candidate.release_type.is_compilation_or_live() && !query.expects_compilation {
            score -= w.compilation_penalty;
        }

        if candidate
            .country
            .as_ref()
            .is_some_and(|c| self.major_markets.contains(&c.to_ascii_uppercase()))
        {
            score += w.major_market;
        }

        if !self.uses_original_year(candidate) {
            if self.is_reissue(candidate) {
                score -= w.reissue_penalty;
            }
            if let Some(gap) = candidate.release_group_distance() {
                let gap = i32::try_from(gap).unwrap_or(i32::MAX);
                score -= gap.saturating_mul(w.year_gap_per_year).min(w.year_gap_cap);
            }
        }

        score
    }

    /// Score every candidate, discarding those with an invalid year
    pub fn score_all(&self, query: &AlbumQuery, candidates: Vec<CandidateRelease>) -> Vec<ScoredRelease> {
        candidates
            .into_iter()
            .filter_map(|candidate| {
                let resolved_year = self.resolved_year(&candidate);
                if let Err(e) = self.validate_year(resolved_year) {
                    tracing::debug!(
                        provider = %candidate.provider,
                        album = %candidate.album,
                        error = %e,
                        "Candidate discarded"
                    );
                    return None;
                }
                let score = self.score(query, &candidate);
                Some(ScoredRelease {
                    band: ConfidenceBand::for_score(score, self.high_threshold, self.low_threshold),
                    candidate,
                    score,
                    resolved_year,
                })
            })
            .collect()
    }

    fn priority_rank(&self, provider: Provider) -> usize {
        self.priority
            .iter()
            .position(|p| *p == provider)
            .unwrap_or(self.priority.len())
    }

    /// Highest score wins; ties go to the provider listed first in the priority order,
    /// then to the earlier candidate
    pub fn select_best(&self, scored: Vec<ScoredRelease>) -> Option<ScoredRelease> {
        let mut best: Option<ScoredRelease> = None;
        for candidate in scored {
            let better = match &best {
                None => true,
                Some(current) => {
                    candidate.score > current.score
                        || (candidate.score == current.score
                            && self.priority_rank(candidate.candidate.provider)
                                < self.priority_rank(current.candidate.provider))
                }
            };
            if better {
                best = Some(candidate);
            }
        }
        best
    }
}

/// Scaled edit-distance deduction: 0 for identical strings, `cap` for unrelated ones
fn distance_penalty(a: &str, b: &str, cap: i32) -> i32 {
    let similarity = strsim::normalized_levenshtein(a, b);
    ((1.0 - similarity) * f64::from(cap)).round() as i32
}
