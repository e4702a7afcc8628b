//! Core types shared across the resolution engine
//!
//! Candidate releases are produced per provider per query, scored, and
//! discarded after the decision step. Only the winning score survives, as
//! audit metadata on the cache entry.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Providers
// ============================================================================

/// External metadata provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    MusicBrainz,
    Discogs,
    #[serde(rename = "itunes")]
    ITunes,
}

impl Provider {
    /// All providers, in default priority order
    pub const ALL: [Provider; 3] = [Provider::MusicBrainz, Provider::Discogs, Provider::ITunes];

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::MusicBrainz => "musicbrainz",
            Provider::Discogs => "discogs",
            Provider::ITunes => "itunes",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "musicbrainz" => Ok(Provider::MusicBrainz),
            "discogs" => Ok(Provider::Discogs),
            "itunes" | "applemusic" => Ok(Provider::ITunes),
            other => Err(format!("Unknown provider: {}", other)),
        }
    }
}

// ============================================================================
// Candidate releases
// ============================================================================

/// Release type as reported (or inferred) from a provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReleaseType {
    Album,
    Ep,
    Single,
    Compilation,
    Live,
    Soundtrack,
    Other,
    Unknown,
}

impl ReleaseType {
    /// Compilations and live recordings rarely carry the original release year
    pub fn is_compilation_or_live(&self) -> bool {
        matches!(self, ReleaseType::Compilation | ReleaseType::Live)
    }

    /// Studio-style releases earn the non-compilation bonus
    pub fn is_studio(&self) -> bool {
        matches!(
            self,
            ReleaseType::Album | ReleaseType::Ep | ReleaseType::Single | ReleaseType::Soundtrack
        )
    }

    /// Lenient mapping of provider vocabulary ("LP", "Compilation", "EP", ...)
    pub fn from_provider_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "album" | "lp" => ReleaseType::Album,
            "ep" => ReleaseType::Ep,
            "single" => ReleaseType::Single,
            "compilation" => ReleaseType::Compilation,
            "live" => ReleaseType::Live,
            "soundtrack" => ReleaseType::Soundtrack,
            "" => ReleaseType::Unknown,
            _ => ReleaseType::Other,
        }
    }
}

/// One provider's proposed answer for a queried (artist, album)
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateRelease {
    pub provider: Provider,
    pub artist: String,
    pub album: String,
    pub year: i32,
    pub release_type: ReleaseType,
    pub is_official: bool,
    pub is_bootleg: bool,
    pub is_reissue: bool,
    /// Provider-native grouping id (MusicBrainz release group, Discogs master)
    pub release_group_id: Option<String>,
    /// First release year of the group, when the provider reports one
    pub release_group_year: Option<i32>,
    /// ISO country code of the release, if known
    pub country: Option<String>,
}

impl CandidateRelease {
    /// Minimal candidate; providers fill in the remaining signals
    pub fn new(provider: Provider, artist: impl Into<String>, album: impl Into<String>, year: i32) -> Self {
        Self {
            provider,
            artist: artist.into(),
            album: album.into(),
            year,
            release_type: ReleaseType::Unknown,
            is_official: false,
            is_bootleg: false,
            is_reissue: false,
            release_group_id: None,
            release_group_year: None,
            country: None,
        }
    }

    /// Years between this release and its group's reference year
    pub fn release_group_distance(&self) -> Option<u32> {
        self.release_group_year
            .map(|reference| (self.year - reference).unsigned_abs())
    }
}

/// Confidence band for a score, relative to the configured thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfidenceBand {
    High,
    Medium,
    Low,
}

impl ConfidenceBand {
    pub fn for_score(score: i32, high_threshold: i32, low_threshold: i32) -> Self {
        if score >= high_threshold {
            ConfidenceBand::High
        } else if score >= low_threshold {
            ConfidenceBand::Medium
        } else {
            ConfidenceBand::Low
        }
    }
}

/// Candidate plus its score
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredRelease {
    pub candidate: CandidateRelease,
    pub score: i32,
    pub band: ConfidenceBand,
    /// Year to apply: the candidate year, or the original year for a reissue
    pub resolved_year: i32,
}

// ============================================================================
// Queries
// ============================================================================

/// What is sent to every provider for one album
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlbumQuery {
    /// Empty for various-artists rewrites (artist term dropped)
    pub artist: String,
    pub album: String,
    /// Set by the greatest-hits strategy: compilation types are not penalised
    pub expects_compilation: bool,
}

impl AlbumQuery {
    pub fn new(artist: impl Into<String>, album: impl Into<String>) -> Self {
        Self {
            artist: artist.into(),
            album: album.into(),
            expects_compilation: false,
        }
    }

    pub fn has_artist(&self) -> bool {
        !self.artist.trim().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_parse_and_display() {
        assert_eq!("MusicBrainz".parse::<Provider>().unwrap(), Provider::MusicBrainz);
        assert_eq!("itunes".parse::<Provider>().unwrap(), Provider::ITunes);
        assert!("spotify".parse::<Provider>().is_err());
        assert_eq!(Provider::Discogs.to_string(), "discogs");
    }

    #[test]
    fn test_provider_serde_names() {
        let json = serde_json::to_string(&Provider::ITunes).unwrap();
        assert_eq!(json, "\"itunes\"");
        let parsed: Provider = serde_json::from_str("\"musicbrainz\"").unwrap();
        assert_eq!(parsed, Provider::MusicBrainz);
    }

    #[test]
    fn test_release_type_labels() {
        assert_eq!(ReleaseType::from_provider_label("LP"), ReleaseType::Album);
        assert_eq!(ReleaseType::from_provider_label("Compilation"), ReleaseType::Compilation);
        assert_eq!(ReleaseType::from_provider_label("Broadcast"), ReleaseType::Other);
        assert!(ReleaseType::Live.is_compilation_or_live());
        assert!(ReleaseType::Soundtrack.is_studio());
    }

    #[test]
    fn test_release_group_distance() {
        let mut candidate = CandidateRelease::new(Provider::MusicBrainz, "Pink Floyd", "Animals", 2018);
        assert_eq!(candidate.release_group_distance(), None);
        candidate.release_group_year = Some(1977);
        assert_eq!(candidate.release_group_distance(), Some(41));
    }

    #[test]
    fn test_confidence_band_edges() {
        assert_eq!(ConfidenceBand::for_score(70, 70, 30), ConfidenceBand::High);
        assert_eq!(ConfidenceBand::for_score(69, 70, 30), ConfidenceBand::Medium);
        assert_eq!(ConfidenceBand::for_score(30, 70, 30), ConfidenceBand::Medium);
        assert_eq!(ConfidenceBand::for_score(29, 70, 30), ConfidenceBand::Low);
    }
}
