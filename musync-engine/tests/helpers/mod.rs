//! Shared fixtures for engine integration tests
//!
//! Scripted provider clients, an in-memory library, and stores backed by
//! an in-memory SQLite database.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use musync_engine::cache::{TieredCache, TieredCacheConfig};
use musync_engine::error::{ProviderError, SyncError, SyncResult};
use musync_engine::library::{CatalogFilter, EntryProperty, EntrySummary, LibraryAccessor};
use musync_engine::pending::{PendingVerificationStore, RepositoryPendingStore};
use musync_engine::providers::SourceClient;
use musync_engine::store::{
    open_in_memory, SqliteAlbumYearRepository, SqliteNegativeRepository, SqlitePendingRepository,
};
use musync_engine::types::{AlbumQuery, CandidateRelease, Provider, ReleaseType};
use musync_engine::{SyncConfig, YearResolutionCoordinator};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

type Script = dyn Fn(&AlbumQuery) -> Result<Vec<CandidateRelease>, ProviderError> + Send + Sync;

/// Provider client answering from a closure, counting every call
pub struct MockSourceClient {
    provider: Provider,
    script: Box<Script>,
    calls: AtomicU32,
    queries: Mutex<Vec<AlbumQuery>>,
}

impl MockSourceClient {
    pub fn new<F>(provider: Provider, script: F) -> Arc<Self>
    where
        F: Fn(&AlbumQuery) -> Result<Vec<CandidateRelease>, ProviderError> + Send + Sync + 'static,
    {
        Arc::new(Self {
            provider,
            script: Box::new(script),
            calls: AtomicU32::new(0),
            queries: Mutex::new(Vec::new()),
        })
    }

    /// Always answers with no candidates
    pub fn empty(provider: Provider) -> Arc<Self> {
        Self::new(provider, |_| Ok(Vec::new()))
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn queries(&self) -> Vec<AlbumQuery> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl SourceClient for MockSourceClient {
    fn provider(&self) -> Provider {
        self.provider
    }

    async fn query(&self, query: &AlbumQuery) -> Result<Vec<CandidateRelease>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.queries.lock().unwrap().push(query.clone());
        (self.script)(query)
    }
}

pub fn as_clients(mocks: &[Arc<MockSourceClient>]) -> Vec<Arc<dyn SourceClient>> {
    mocks
        .iter()
        .map(|m| m.clone() as Arc<dyn SourceClient>)
        .collect()
}

/// Exact artist + album, official studio album in a major market: scores 75
pub fn strong_candidate(provider: Provider, artist: &str, album: &str, year: i32) -> CandidateRelease {
    let mut candidate = CandidateRelease::new(provider, artist, album, year);
    candidate.release_type = ReleaseType::Album;
    candidate.is_official = true;
    candidate.country = Some("US".to_string());
    candidate
}

/// Exact artist + album and nothing else: scores 45
pub fn medium_candidate(provider: Provider, artist: &str, album: &str, year: i32) -> CandidateRelease {
    CandidateRelease::new(provider, artist, album, year)
}

/// Live recording under a different title: scores below 30
pub fn weak_candidate(provider: Provider, artist: &str, year: i32) -> CandidateRelease {
    let mut candidate = CandidateRelease::new(provider, artist, "Live at the Something Else", year);
    candidate.release_type = ReleaseType::Live;
    candidate
}

/// Defaults with no provider pacing and millisecond retry timings
pub fn test_config() -> SyncConfig {
    let mut config = SyncConfig::default();
    for overrides in [
        &mut config.providers.musicbrainz,
        &mut config.providers.discogs,
        &mut config.providers.itunes,
    ] {
        overrides.min_interval_ms = Some(0);
        overrides.burst = Some(10);
        overrides.max_in_flight = Some(4);
    }
    config.retry.request_timeout_ms = 500;
    config.retry.transient_max_attempts = 2;
    config.retry.base_backoff_ms = 1;
    config.retry.max_backoff_ms = 5;
    config.retry.rate_limit_default_wait_ms = 1;
    config.retry.rate_limit_max_wait_ms = 5;
    config.resolution.batch_size = 2;
    config
}

/// Coordinator plus handles on its stores
pub struct Harness {
    pub coordinator: YearResolutionCoordinator,
    pub cache: Arc<TieredCache>,
    pub pending: Arc<dyn PendingVerificationStore>,
}

pub async fn harness(config: &SyncConfig, mocks: &[Arc<MockSourceClient>]) -> Harness {
    harness_with_cache(config, mocks, TieredCacheConfig::from_config(config)).await
}

/// Harness whose cache settings differ from what `config` would derive
pub async fn harness_with_cache(
    config: &SyncConfig,
    mocks: &[Arc<MockSourceClient>],
    cache_config: TieredCacheConfig,
) -> Harness {
    let pool = open_in_memory().await.unwrap();
    let albums = Arc::new(SqliteAlbumYearRepository::new(pool.clone(), None, 100));
    let negatives = Arc::new(SqliteNegativeRepository::new(pool.clone(), None, 100));
    let pending_repo = Arc::new(SqlitePendingRepository::new(pool, None, 100));

    let cache = Arc::new(TieredCache::new(albums, negatives, cache_config));
    let pending: Arc<dyn PendingVerificationStore> = Arc::new(RepositoryPendingStore::new(pending_repo));
    let coordinator = YearResolutionCoordinator::new(as_clients(mocks), cache.clone(), pending.clone(), config);

    Harness {
        coordinator,
        cache,
        pending,
    }
}

fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

/// Library held in memory with a controllable catalog timestamp
pub struct MockLibrary {
    entries: tokio::sync::Mutex<Vec<EntrySummary>>,
    modified_at: Mutex<DateTime<Utc>>,
    fail_updates: bool,
}

impl MockLibrary {
    pub fn new(entries: Vec<EntrySummary>) -> Arc<Self> {
        Arc::new(Self {
            entries: tokio::sync::Mutex::new(entries),
            modified_at: Mutex::new(epoch()),
            fail_updates: false,
        })
    }

    /// Every property update is rejected by the host
    pub fn read_only(entries: Vec<EntrySummary>) -> Arc<Self> {
        Arc::new(Self {
            entries: tokio::sync::Mutex::new(entries),
            modified_at: Mutex::new(epoch()),
            fail_updates: true,
        })
    }

    pub async fn year_of(&self, id: &str) -> Option<i32> {
        self.entries
            .lock()
            .await
            .iter()
            .find(|e| e.id == id)
            .and_then(|e| e.year)
    }

    /// Edit an entry without moving the catalog timestamp
    pub async fn touch(&self, id: &str, last_modified: DateTime<Utc>) {
        let mut entries = self.entries.lock().await;
        if let Some(entry) = entries.iter_mut().find(|e| e.id == id) {
            entry.last_modified = Some(last_modified);
        }
    }

    pub fn set_modified_at(&self, at: DateTime<Utc>) {
        *self.modified_at.lock().unwrap() = at;
    }
}

#[async_trait]
impl LibraryAccessor for MockLibrary {
    async fn list_all_entry_ids(&self) -> SyncResult<Vec<String>> {
        Ok(self.entries.lock().await.iter().map(|e| e.id.clone()).collect())
    }

    async fn fetch_entries_by_ids(&self, ids: &[String]) -> SyncResult<Vec<EntrySummary>> {
        Ok(self
            .entries
            .lock()
            .await
            .iter()
            .filter(|e| ids.contains(&e.id))
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
        if self.fail_updates {
            return Err(SyncError::Library(format!("entry {} is read-only", id)));
        }
        let mut entries = self.entries.lock().await;
        let entry = entries
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| SyncError::Library(format!("no entry {}", id)))?;
        match property {
            EntryProperty::Year => entry.year = Some(value.parse().unwrap()),
            EntryProperty::Genre => entry.genre = Some(value.to_string()),
        }
        let now = Utc::now();
        entry.last_modified = Some(now);
        *self.modified_at.lock().unwrap() = now;
        Ok(())
    }

    async fn catalog_modified_at(&self) -> SyncResult<DateTime<Utc>> {
        Ok(*self.modified_at.lock().unwrap())
    }
}

pub fn entry(id: &str, artist: &str, album: &str, year: Option<i32>) -> EntrySummary {
    let mut e = EntrySummary::new(id, artist, album);
    e.name = format!("Track {}", id);
    e.year = year;
    e.last_modified = Some(Utc.with_ymd_and_hms(2023, 6, 1, 12, 0, 0).unwrap());
    e
}
