//! Album key normalization
//!
//! Every cache tier and the pending queue key albums through
//! [`AlbumKey::new`]. Two spellings that differ only in case, punctuation
//! or spacing must land on the same key, otherwise lookups silently miss.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Normalized (artist, album) pair
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AlbumKey {
    artist: String,
    album: String,
}

impl AlbumKey {
    pub fn new(artist: &str, album: &str) -> Self {
        Self {
            artist: normalize(artist),
            album: normalize(album),
        }
    }

    /// Rebuild from already-normalized parts (as stored in SQLite)
    pub fn from_normalized(artist: impl Into<String>, album: impl Into<String>) -> Self {
        Self {
            artist: artist.into(),
            album: album.into(),
        }
    }

    pub fn artist(&self) -> &str {
        &self.artist
    }

    pub fn album(&self) -> &str {
        &self.album
    }
}

impl fmt::Display for AlbumKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} / {}", self.artist, self.album)
    }
}

/// Case-fold, strip punctuation, collapse whitespace
pub fn normalize(s: &str) -> String {
    let stripped: String = s
        .chars()
        .flat_map(char::to_lowercase)
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}
