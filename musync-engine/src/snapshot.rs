//! Catalog snapshot persistence
//!
//! File layout:
//!
//! ```text
//! {"formatVersion":1,"hashAlgorithm":"sha256",...}   header, one JSON line
//! 3f5a...                                            hex SHA-256 of header line + payload
//! <gzip-compressed JSON array of SnapshotEntry>      payload
//! ```
//!
//! A snapshot is trusted only as a whole: any digest, header or payload
//! mismatch discards it, and so does a changed catalog timestamp or an age
//! over the ceiling. Writes go through a temp file and rename.

use crate::error::{SyncError, SyncResult};
use crate::library::{EntrySummary, LightEntry};
use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;
pub const HASH_ALGORITHM: &str = "sha256";

/// One catalog entry as remembered between runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotEntry {
    pub entry_id: String,
    pub date_added: Option<DateTime<Utc>>,
    pub last_modified: Option<DateTime<Utc>>,
    pub status_flag: Option<String>,
    /// Hash over the light fields, comparable against a cheap listing
    pub content_hash: String,
    // Compact metadata so a reused snapshot can serve as the catalog view
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub artist: String,
    #[serde(default)]
    pub album_artist: Option<String>,
    #[serde(default)]
    pub album: String,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub genre: Option<String>,
}

impl SnapshotEntry {
    pub fn from_summary(entry: &EntrySummary) -> Self {
        Self {
            entry_id: entry.id.clone(),
            date_added: entry.date_added,
            last_modified: entry.last_modified,
            status_flag: entry.status_flag.clone(),
            content_hash: content_hash(&entry.light()),
            name: entry.name.clone(),
            artist: entry.artist.clone(),
            album_artist: entry.album_artist.clone(),
            album: entry.album.clone(),
            year: entry.year,
            genre: entry.genre.clone(),
        }
    }

    pub fn to_summary(&self) -> EntrySummary {
        EntrySummary {
            id: self.entry_id.clone(),
            name: self.name.clone(),
            artist: self.artist.clone(),
            album_artist: self.album_artist.clone(),
            album: self.album.clone(),
            year: self.year,
            genre: self.genre.clone(),
            date_added: self.date_added,
            last_modified: self.last_modified,
            status_flag: self.status_flag.clone(),
        }
    }
}

/// Hash of the fields a cheap listing carries
pub fn content_hash(entry: &LightEntry) -> String {
    let millis = |t: Option<DateTime<Utc>>| t.map(|t| t.timestamp_millis().to_string()).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(entry.id.as_bytes());
    hasher.update(b"\x1f");
    hasher.update(millis(entry.date_added).as_bytes());
    hasher.update(b"\x1f");
    hasher.update(millis(entry.last_modified).as_bytes());
    hasher.update(b"\x1f");
    hasher.update(entry.status_flag.as_deref().unwrap_or_default().as_bytes());
    format!("{:x}", hasher.finalize())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotHeader {
    pub format_version: u32,
    pub hash_algorithm: String,
    pub generated_at: DateTime<Utc>,
    pub catalog_modified_at: DateTime<Utc>,
    pub entry_count: usize,
    /// Hash over every (entry id, content hash) pair in id order
    pub catalog_hash: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub header: SnapshotHeader,
    /// Sorted by entry id
    pub entries: Vec<SnapshotEntry>,
}

impl Snapshot {
    pub fn new(
        mut entries: Vec<SnapshotEntry>,
        catalog_modified_at: DateTime<Utc>,
        generated_at: DateTime<Utc>,
    ) -> Self {
        entries.sort_by(|a, b| a.entry_id.cmp(&b.entry_id));
        entries.dedup_by(|a, b| a.entry_id == b.entry_id);
        let header = SnapshotHeader {
            format_version: SNAPSHOT_FORMAT_VERSION,
            hash_algorithm: HASH_ALGORITHM.to_string(),
            generated_at,
            catalog_modified_at,
            entry_count: entries.len(),
            catalog_hash: catalog_hash(&entries),
        };
        Self { header, entries }
    }

    pub fn from_catalog(
        catalog: &[EntrySummary],
        catalog_modified_at: DateTime<Utc>,
        generated_at: DateTime<Utc>,
    ) -> Self {
        Self::new(
            catalog.iter().map(SnapshotEntry::from_summary).collect(),
            catalog_modified_at,
            generated_at,
        )
    }

    /// Entry id → content hash
    pub fn hashes(&self) -> BTreeMap<&str, &str> {
        self.entries
            .iter()
            .map(|e| (e.entry_id.as_str(), e.content_hash.as_str()))
            .collect()
    }

    pub fn to_catalog(&self) -> Vec<EntrySummary> {
        self.entries.iter().map(SnapshotEntry::to_summary).collect()
    }

    /// Freshness check against the catalog's current timestamp
    pub fn staleness(
        &self,
        catalog_modified_at: DateTime<Utc>,
        now: DateTime<Utc>,
        max_age: Duration,
    ) -> Option<String> {
        if self.header.catalog_modified_at != catalog_modified_at {
            return Some(format!(
                "catalog modified at {} (snapshot recorded {})",
                catalog_modified_at, self.header.catalog_modified_at
            ));
        }
        let age = musync_common::time::age(self.header.generated_at, now);
        if age >= max_age {
            return Some(format!("snapshot is {}s old (limit {}s)", age.as_secs(), max_age.as_secs()));
        }
        None
    }
}

fn catalog_hash(entries: &[SnapshotEntry]) -> String {
    let mut hasher = Sha256::new();
    for entry in entries {
        hasher.update(entry.entry_id.as_bytes());
        hasher.update(b"\x1f");
        hasher.update(entry.content_hash.as_bytes());
        hasher.update(b"\n");
    }
    format!("{:x}", hasher.finalize())
}

/// Outcome of loading a snapshot for reuse
#[derive(Debug)]
pub enum SnapshotStatus {
    Valid(Snapshot),
    Missing,
    Stale { reason: String },
    Corrupt { reason: String },
}

/// Reads and writes the snapshot file
pub struct SnapshotStore {
    path: PathBuf,
    max_age: Duration,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>, max_age: Duration) -> Self {
        Self {
            path: path.into(),
            max_age,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Encode and atomically replace the snapshot file
    pub async fn save(&self, snapshot: &Snapshot) -> SyncResult<()> {
        let bytes = encode(snapshot).map_err(|e| SyncError::persistence(&self.path, e))?;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || musync_common::fs::atomic_write(&path, &bytes))
            .await
            .map_err(|e| {
                SyncError::persistence(&self.path, musync_common::Error::Internal(e.to_string()))
            })?
            .map_err(|e| SyncError::persistence(&self.path, e))?;

        tracing::info!(
            path = %self.path.display(),
            entries = snapshot.header.entry_count,
            "Snapshot saved"
        );
        Ok(())
    }

    /// Read and verify the snapshot file
    ///
    /// `Ok(None)` when no file exists; `SnapshotIntegrity` when it fails
    /// verification; `Persistence` when it cannot be read at all.
    pub async fn load(&self) -> SyncResult<Option<Snapshot>> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(SyncError::persistence(&self.path, e)),
        };

        let path = self.path.clone();
        let decoded = tokio::task::spawn_blocking(move || decode(&bytes))
            .await
            .map_err(|e| {
                SyncError::persistence(&path, musync_common::Error::Internal(e.to_string()))
            })?;
        decoded
            .map(Some)
            .map_err(|reason| SyncError::SnapshotIntegrity {
                path: self.path.clone(),
                reason,
            })
    }

    /// Load the snapshot and decide whether it can be reused
    pub async fn load_valid(
        &self,
        catalog_modified_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> SyncResult<SnapshotStatus> {
        let snapshot = match self.load().await {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => return Ok(SnapshotStatus::Missing),
            Err(SyncError::SnapshotIntegrity { reason, .. }) => {
                tracing::warn!(path = %self.path.display(), reason = %reason, "Snapshot failed integrity check, discarding");
                return Ok(SnapshotStatus::Corrupt { reason });
            }
            Err(e) => return Err(e),
        };

        match snapshot.staleness(catalog_modified_at, now, self.max_age) {
            Some(reason) => {
                tracing::info!(reason = %reason, "Snapshot is stale, discarding");
                Ok(SnapshotStatus::Stale { reason })
            }
            None => Ok(SnapshotStatus::Valid(snapshot)),
        }
    }

    /// Delete the snapshot file if present
    pub async fn discard(&self) -> SyncResult<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SyncError::persistence(&self.path, e)),
        }
    }
}

fn encode(snapshot: &Snapshot) -> musync_common::Result<Vec<u8>> {
    let header = serde_json::to_string(&snapshot.header)
        .map_err(|e| musync_common::Error::Internal(format!("Snapshot header encoding: {}", e)))?;
    let json = serde_json::to_vec(&snapshot.entries)
        .map_err(|e| musync_common::Error::Internal(format!("Snapshot payload encoding: {}", e)))?;

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&json)?;
    let payload = encoder.finish()?;

    let digest = file_digest(header.as_bytes(), &payload);
    let mut bytes = Vec::with_capacity(header.len() + digest.len() + payload.len() + 2);
    bytes.extend_from_slice(header.as_bytes());
    bytes.push(b'\n');
    bytes.extend_from_slice(digest.as_bytes());
    bytes.push(b'\n');
    bytes.extend_from_slice(&payload);
    Ok(bytes)
}

fn file_digest(header_line: &[u8], payload: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(header_line);
    hasher.update(b"\n");
    hasher.update(payload);
    format!("{:x}", hasher.finalize())
}

fn split_line(bytes: &[u8]) -> Option<(&[u8], &[u8])> {
    let newline = bytes.iter().position(|b| *b == b'\n')?;
    Some((&bytes[..newline], &bytes[newline + 1..]))
}

fn decode(bytes: &[u8]) -> Result<Snapshot, String> {
    let (header_line, rest) = split_line(bytes).ok_or("missing header line")?;
    let (digest_line, payload) = split_line(rest).ok_or("missing digest line")?;

    let expected = std::str::from_utf8(digest_line).map_err(|_| "digest is not UTF-8".to_string())?;
    if file_digest(header_line, payload) != expected.trim() {
        return Err("digest mismatch".to_string());
    }

    let header: SnapshotHeader =
        serde_json::from_slice(header_line).map_err(|e| format!("invalid header: {}", e))?;
    if header.format_version != SNAPSHOT_FORMAT_VERSION {
        return Err(format!("unsupported format version {}", header.format_version));
    }
    if header.hash_algorithm != HASH_ALGORITHM {
        return Err(format!("unsupported hash algorithm {}", header.hash_algorithm));
    }

    let mut json = Vec::new();
    GzDecoder::new(payload)
        .read_to_end(&mut json)
        .map_err(|e| format!("payload decompression failed: {}", e))?;
    let entries: Vec<SnapshotEntry> =
        serde_json::from_slice(&json).map_err(|e| format!("invalid payload: {}", e))?;

    if entries.len() != header.entry_count {
        return Err(format!(
            "entry count {} does not match header {}",
            entries.len(),
            header.entry_count
        ));
    }
    if catalog_hash(&entries) != header.catalog_hash {
        return Err("catalog hash mismatch".to_string());
    }

    Ok(Snapshot { header, entries })
}
