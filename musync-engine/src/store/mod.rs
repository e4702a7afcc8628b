//! Persistent stores
//!
//! Core logic sees only the narrow [`Repository`] interface. The SQLite
//! implementations in [`sqlite`] are the production backing; nothing above
//! this module knows the storage format.

pub mod lock_retry;
pub mod sqlite;

use crate::cache::key::AlbumKey;
use crate::types::Provider;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use musync_common::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub use lock_retry::retry_on_lock;
pub use sqlite::{
    init_database_pool, open_in_memory, SqliteAlbumYearRepository, SqliteNegativeRepository,
    SqlitePendingRepository,
};

/// Records addressable by album key
pub trait Keyed {
    fn key(&self) -> AlbumKey;
}

/// Minimal CRUD surface over one persisted table
#[async_trait]
pub trait Repository<R>: Send + Sync
where
    R: Keyed + Send + Sync + 'static,
{
    async fn get(&self, key: &AlbumKey) -> Result<Option<R>>;

    /// Insert or replace the record under its key
    async fn put(&self, record: &R) -> Result<()>;

    /// Returns true if a record was removed
    async fn delete(&self, key: &AlbumKey) -> Result<bool>;

    async fn scan(&self) -> Result<Vec<R>>;

    /// Backing file, for error reporting
    fn location(&self) -> &Path;
}

/// Confidently resolved album year
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlbumCacheEntry {
    pub artist: String,
    pub album: String,
    pub year: i32,
    pub source: Provider,
    /// Winning score at decision time
    pub confidence: i32,
    pub written_at: DateTime<Utc>,
}

impl Keyed for AlbumCacheEntry {
    fn key(&self) -> AlbumKey {
        AlbumKey::new(&self.artist, &self.album)
    }
}

/// Album that no provider knows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NegativeCacheEntry {
    pub artist: String,
    pub album: String,
    pub written_at: DateTime<Utc>,
}

impl Keyed for NegativeCacheEntry {
    fn key(&self) -> AlbumKey {
        AlbumKey::new(&self.artist, &self.album)
    }
}

/// Album awaiting a retry or manual review
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingVerificationRecord {
    pub artist: String,
    pub album: String,
    pub attempt_count: u32,
    pub last_error: String,
    pub first_seen_at: DateTime<Utc>,
    pub last_attempt_at: DateTime<Utc>,
}

impl Keyed for PendingVerificationRecord {
    fn key(&self) -> AlbumKey {
        AlbumKey::new(&self.artist, &self.album)
    }
}
