//! Library accessor interface
//!
//! The engine never talks to the host application directly; everything
//! goes through [`LibraryAccessor`]. [`JsonFileLibrary`] implements it
//! over an exported catalog file so the binary can run end to end.

use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

/// One catalog entry, as much as the engine needs of it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntrySummary {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub artist: String,
    #[serde(default)]
    pub album_artist: Option<String>,
    #[serde(default)]
    pub album: String,
    /// `None` when the entry has no year
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub genre: Option<String>,
    #[serde(default)]
    pub date_added: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_modified: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status_flag: Option<String>,
}

impl EntrySummary {
    pub fn new(id: impl Into<String>, artist: impl Into<String>, album: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            artist: artist.into(),
            album_artist: None,
            album: album.into(),
            year: None,
            genre: None,
            date_added: None,
            last_modified: None,
            status_flag: None,
        }
    }

    /// Album artist if set, otherwise the track artist
    pub fn grouping_artist(&self) -> &str {
        match self.album_artist.as_deref() {
            Some(a) if !a.trim().is_empty() => a,
            _ => &self.artist,
        }
    }

    pub fn light(&self) -> LightEntry {
        LightEntry {
            id: self.id.clone(),
            date_added: self.date_added,
            last_modified: self.last_modified,
            status_flag: self.status_flag.clone(),
        }
    }
}

/// Identifier plus the fields a cheap listing can provide
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LightEntry {
    pub id: String,
    pub date_added: Option<DateTime<Utc>>,
    pub last_modified: Option<DateTime<Utc>>,
    pub status_flag: Option<String>,
}

/// Restricts a full catalog fetch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogFilter {
    /// Only entries without a year
    pub missing_year_only: bool,
    /// Only these ids
    pub ids: Option<HashSet<String>>,
}

impl CatalogFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn matches(&self, entry: &EntrySummary) -> bool {
        if self.missing_year_only && entry.year.is_some() {
            return false;
        }
        self.ids.as_ref().map_or(true, |ids| ids.contains(&entry.id))
    }
}

/// Writable entry properties
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryProperty {
    Year,
    Genre,
}

impl fmt::Display for EntryProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryProperty::Year => f.write_str("year"),
            EntryProperty::Genre => f.write_str("genre"),
        }
    }
}

#[async_trait]
pub trait LibraryAccessor: Send + Sync {
    async fn list_all_entry_ids(&self) -> SyncResult<Vec<String>>;

    async fn fetch_entries_by_ids(&self, ids: &[String]) -> SyncResult<Vec<EntrySummary>>;

    async fn fetch_full_catalog(&self, filter: &CatalogFilter) -> SyncResult<Vec<EntrySummary>>;

    async fn update_entry_property(&self, id: &str, property: EntryProperty, value: &str) -> SyncResult<()>;

    /// The catalog's own last-modified timestamp
    async fn catalog_modified_at(&self) -> SyncResult<DateTime<Utc>>;

    /// Cheap listing used for delta computation
    async fn list_light_entries(&self) -> SyncResult<Vec<LightEntry>> {
        Ok(self
            .fetch_full_catalog(&CatalogFilter::all())
            .await?
            .iter()
            .map(EntrySummary::light)
            .collect())
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    entries: Vec<EntrySummary>,
}

/// Library backed by a JSON export (`{"entries": [...]}`)
///
/// Every update rewrites the file atomically, so the file's modification
/// time serves as the catalog timestamp.
pub struct JsonFileLibrary {
    path: PathBuf,
    entries: Mutex<Vec<EntrySummary>>,
}

impl JsonFileLibrary {
    pub async fn open(path: impl Into<PathBuf>) -> SyncResult<Self> {
        let path = path.into();
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| SyncError::Library(format!("Cannot read catalog {}: {}", path.display(), e)))?;
        let mut catalog: CatalogFile = serde_json::from_slice(&bytes)
            .map_err(|e| SyncError::Library(format!("Invalid catalog {}: {}", path.display(), e)))?;

        for entry in &mut catalog.entries {
            if entry.year == Some(0) {
                entry.year = None;
            }
        }
        tracing::info!(
            path = %path.display(),
            entries = catalog.entries.len(),
            "Catalog loaded"
        );

        Ok(Self {
            path,
            entries: Mutex::new(catalog.entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, entries: &[EntrySummary]) -> SyncResult<()> {
        let body = serde_json::to_vec_pretty(&CatalogFile {
            entries: entries.to_vec(),
        })
        .map_err(|e| SyncError::Library(format!("Cannot encode catalog: {}", e)))?;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || musync_common::fs::atomic_write(&path, &body))
            .await
            .map_err(|e| SyncError::Library(format!("Catalog write task failed: {}", e)))?
            .map_err(|e| SyncError::Library(format!("Cannot write catalog {}: {}", self.path.display(), e)))
    }
}

#[async_trait]
impl LibraryAccessor for JsonFileLibrary {
    async fn list_all_entry_ids(&self) -> SyncResult<Vec<String>> {
        Ok(self.entries.lock().await.iter().map(|e| e.id.clone()).collect())
    }

    async fn fetch_entries_by_ids(&self, ids: &[String]) -> SyncResult<Vec<EntrySummary>> {
        let wanted: HashSet<&str> = ids.iter().map(String::as_str).collect();
        Ok(self
            .entries
            .lock()
            .await
            .iter()
            .filter(|e| wanted.contains(e.id.as_str()))
            .cloned()
            .collect())
    }

    async fn fetch_full_catalog(&self, filter: &CatalogFilter) -> SyncResult<Vec<EntrySummary>> {
        Ok(self
            .entries
            .lock()
            .await
            .iter()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect())
    }

    async fn update_entry_property(&self, id: &str, property: EntryProperty, value: &str) -> SyncResult<()> {
        let mut entries = self.entries.lock().await;
        let entry = entries
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| SyncError::Library(format!("No catalog entry with id {}", id)))?;

        match property {
            EntryProperty::Year => {
                let year: i32 = value
                    .trim()
                    .parse()
                    .map_err(|_| SyncError::Validation(format!("Invalid year value '{}'", value)))?;
                entry.year = Some(year);
            }
            EntryProperty::Genre => entry.genre = Some(value.to_string()),
        }
        entry.last_modified = Some(Utc::now());
        tracing::debug!(id = %id, property = %property, value = %value, "Catalog entry updated");

        self.persist(&entries).await
    }

    async fn catalog_modified_at(&self) -> SyncResult<DateTime<Utc>> {
        let metadata = tokio::fs::metadata(&self.path)
            .await
            .map_err(|e| SyncError::Library(format!("Cannot stat catalog {}: {}", self.path.display(), e)))?;
        let modified = metadata
            .modified()
            .map_err(|e| SyncError::Library(format!("Catalog mtime unavailable: {}", e)))?;
        Ok(DateTime::<Utc>::from(modified))
    }
}
