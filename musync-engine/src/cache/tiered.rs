//! Tiered cache
//!
//! Lookup order:
//! 1. In-process memory (minutes-scale TTL, lost on restart)
//! 2. Persistent album-year store (permanent unless an album TTL is configured)
//! 3. Persistent negative-result store (weeks-scale TTL)
//!
//! A persistent hit back-fills memory. Writing an album year removes any
//! negative entry for the same key. Expired entries are misses.

use super::key::AlbumKey;
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::store::{AlbumCacheEntry, Keyed, NegativeCacheEntry, Repository};
use chrono::{DateTime, Utc};
use musync_common::time::age;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Which tier answered a positive lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheTier {
    Memory,
    Persistent,
}

/// Result of a cache lookup
#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup {
    Hit { entry: AlbumCacheEntry, tier: CacheTier },
    Negative(NegativeCacheEntry),
    Miss,
}

/// TTLs and the positive-write floor
#[derive(Debug, Clone)]
pub struct TieredCacheConfig {
    pub memory_ttl: Duration,
    /// `None`: album years never expire
    pub album_ttl: Option<Duration>,
    pub negative_ttl: Duration,
    /// Scores below this are never cached as positive
    pub rejection_floor: i32,
}

impl TieredCacheConfig {
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            memory_ttl: config.cache.memory_ttl(),
            album_ttl: config.cache.album_ttl(),
            negative_ttl: config.cache.negative_ttl(),
            rejection_floor: config.resolution.low_confidence_threshold,
        }
    }
}

#[derive(Debug, Clone)]
enum MemoryValue {
    Year(AlbumCacheEntry),
    Negative(NegativeCacheEntry),
}

#[derive(Debug, Clone)]
struct MemoryEntry {
    value: MemoryValue,
    inserted_at: DateTime<Utc>,
}

/// Memory → album-year → negative cache
pub struct TieredCache {
    memory: RwLock<HashMap<AlbumKey, MemoryEntry>>,
    albums: Arc<dyn Repository<AlbumCacheEntry>>,
    negatives: Arc<dyn Repository<NegativeCacheEntry>>,
    config: TieredCacheConfig,
}

impl TieredCache {
    pub fn new(
        albums: Arc<dyn Repository<AlbumCacheEntry>>,
        negatives: Arc<dyn Repository<NegativeCacheEntry>>,
        config: TieredCacheConfig,
    ) -> Self {
        Self {
            memory: RwLock::new(HashMap::new()),
            albums,
            negatives,
            config,
        }
    }

    pub fn config(&self) -> &TieredCacheConfig {
        &self.config
    }

    pub async fn lookup(&self, key: &AlbumKey) -> SyncResult<CacheLookup> {
        self.lookup_at(key, Utc::now()).await
    }

    /// Lookup evaluated as of `now`
    pub async fn lookup_at(&self, key: &AlbumKey, now: DateTime<Utc>) -> SyncResult<CacheLookup> {
        // Tier 1: memory
        let memory_hit = {
            let memory = self.memory.read().await;
            memory.get(key).cloned()
        };
        if let Some(entry) = memory_hit {
            if age(entry.inserted_at, now) < self.config.memory_ttl {
                match entry.value {
                    MemoryValue::Year(year) if !self.album_expired(&year, now) => {
                        tracing::trace!(key = %key, "Memory cache hit");
                        return Ok(CacheLookup::Hit {
                            entry: year,
                            tier: CacheTier::Memory,
                        });
                    }
                    MemoryValue::Negative(neg) if !self.negative_expired(&neg, now) => {
                        tracing::trace!(key = %key, "Memory negative hit");
                        return Ok(CacheLookup::Negative(neg));
                    }
                    _ => {}
                }
            }
            self.memory.write().await.remove(key);
        }

        // Tier 2: persistent album years
        let stored = self
            .albums
            .get(key)
            .await
            .map_err(|e| SyncError::persistence(self.albums.location(), e))?;
        if let Some(entry) = stored {
            if !self.album_expired(&entry, now) {
                self.remember(key.clone(), MemoryValue::Year(entry.clone()), now)
                    .await;
                tracing::debug!(key = %key, year = entry.year, "Persistent cache hit");
                return Ok(CacheLookup::Hit {
                    entry,
                    tier: CacheTier::Persistent,
                });
            }
            tracing::debug!(key = %key, "Album-year entry expired");
        }

        // Tier 3: persistent negative results
        let negative = self
            .negatives
            .get(key)
            .await
            .map_err(|e| SyncError::persistence(self.negatives.location(), e))?;
        if let Some(entry) = negative {
            if !self.negative_expired(&entry, now) {
                self.remember(key.clone(), MemoryValue::Negative(entry.clone()), now)
                    .await;
                tracing::debug!(key = %key, "Negative cache hit");
                return Ok(CacheLookup::Negative(entry));
            }
            tracing::debug!(key = %key, "Negative entry expired, removing");
            self.negatives
                .delete(key)
                .await
                .map_err(|e| SyncError::persistence(self.negatives.location(), e))?;
        }

        Ok(CacheLookup::Miss)
    }

    /// Persist a resolved year; clears any negative entry for the album
    pub async fn store_year(&self, entry: AlbumCacheEntry) -> SyncResult<()> {
        if entry.confidence < self.config.rejection_floor {
            return Err(SyncError::Validation(format!(
                "refusing to cache {} / {} with score {} below floor {}",
                entry.artist, entry.album, entry.confidence, self.config.rejection_floor
            )));
        }

        let key = entry.key();
        self.albums
            .put(&entry)
            .await
            .map_err(|e| SyncError::persistence(self.albums.location(), e))?;
        self.negatives
            .delete(&key)
            .await
            .map_err(|e| SyncError::persistence(self.negatives.location(), e))?;

        let written_at = entry.written_at;
        self.remember(key, MemoryValue::Year(entry), written_at).await;
        Ok(())
    }

    /// Record that no provider knows this album
    pub async fn store_negative(&self, entry: NegativeCacheEntry) -> SyncResult<()> {
        let key = entry.key();
        self.negatives
            .put(&entry)
            .await
            .map_err(|e| SyncError::persistence(self.negatives.location(), e))?;

        let written_at = entry.written_at;
        self.remember(key, MemoryValue::Negative(entry), written_at)
            .await;
        Ok(())
    }

    /// Drop an album from every tier
    pub async fn invalidate(&self, key: &AlbumKey) -> SyncResult<()> {
        self.memory.write().await.remove(key);
        self.albums
            .delete(key)
            .await
            .map_err(|e| SyncError::persistence(self.albums.location(), e))?;
        self.negatives
            .delete(key)
            .await
            .map_err(|e| SyncError::persistence(self.negatives.location(), e))?;
        Ok(())
    }

    /// Empty the in-process tier
    pub async fn clear_memory(&self) {
        self.memory.write().await.clear();
    }

    pub async fn memory_len(&self) -> usize {
        self.memory.read().await.len()
    }

    async fn remember(&self, key: AlbumKey, value: MemoryValue, now: DateTime<Utc>) {
        if self.config.memory_ttl.is_zero() {
            return;
        }
        self.memory.write().await.insert(
            key,
            MemoryEntry {
                value,
                inserted_at: now,
            },
        );
    }

    fn album_expired(&self, entry: &AlbumCacheEntry, now: DateTime<Utc>) -> bool {
        match self.config.album_ttl {
            Some(ttl) => age(entry.written_at, now) >= ttl,
            None => false,
        }
    }

    fn negative_expired(&self, entry: &NegativeCacheEntry, now: DateTime<Utc>) -> bool {
        age(entry.written_at, now) >= self.config.negative_ttl
    }
}
