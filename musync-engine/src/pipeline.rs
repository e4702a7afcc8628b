//! Sync pipeline: snapshot/delta planning, album batching, year application
//!
//! One run:
//! 1. Load the snapshot and validate it against the catalog timestamp.
//! 2. Valid snapshot: compute the delta from a cheap listing. An empty
//!    delta reuses the snapshot as the catalog view and only pending albums
//!    are retried. A non-empty delta falls back to a full catalog fetch and
//!    resolves the changed entries' albums.
//! 3. Missing, stale or corrupt snapshot: full fetch, every album resolved.
//! 4. Albums are resolved in batches; years are written per the decision.
//! 5. The snapshot is rewritten from the resulting catalog state.

use crate::cache::key::AlbumKey;
use crate::cache::{TieredCache, TieredCacheConfig};
use crate::config::SyncConfig;
use crate::coordinator::{AlbumRequest, Resolution, ResolutionOutcome, YearResolutionCoordinator};
use crate::delta;
use crate::error::{SyncError, SyncResult};
use crate::library::{CatalogFilter, EntryProperty, EntrySummary, LibraryAccessor};
use crate::pending::{PendingVerificationStore, RepositoryPendingStore};
use crate::providers::SourceClient;
use crate::snapshot::{Snapshot, SnapshotStatus, SnapshotStore};
use crate::store::{
    init_database_pool, Keyed, SqliteAlbumYearRepository, SqliteNegativeRepository,
    SqlitePendingRepository,
};
use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// How the catalog view for a run was obtained
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum SyncMode {
    /// Snapshot valid and delta empty: snapshot reused verbatim
    Reused,
    /// Snapshot valid but entries changed: full fetch, changed albums resolved
    Incremental,
    /// No usable snapshot: full fetch, every album resolved
    #[default]
    Full,
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncMode::Reused => f.write_str("reused"),
            SyncMode::Incremental => f.write_str("incremental"),
            SyncMode::Full => f.write_str("full"),
        }
    }
}

/// Summary of one run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SyncReport {
    pub mode: SyncMode,
    pub catalog_entries: usize,
    pub delta_added: usize,
    pub delta_updated: usize,
    pub delta_removed: usize,
    pub albums_considered: usize,
    pub albums_resolved: usize,
    pub albums_from_cache: usize,
    pub albums_negative: usize,
    pub albums_pending: usize,
    pub albums_abandoned: usize,
    pub albums_failed: usize,
    pub entries_updated: usize,
    pub entries_unchanged: usize,
    pub update_failures: usize,
    pub provider_calls: u64,
    pub cancelled: bool,
    pub snapshot_saved: bool,
}

/// Entries sharing one normalized (artist, album)
#[derive(Debug, Clone)]
struct AlbumGroup {
    request: AlbumRequest,
    entries: Vec<(String, Option<i32>)>,
}

/// Which entries need their album resolved
enum Targets {
    All,
    Ids(BTreeSet<String>),
}

impl Targets {
    fn contains(&self, id: &str) -> bool {
        match self {
            Targets::All => true,
            Targets::Ids(ids) => ids.contains(id),
        }
    }
}

pub struct SyncPipeline {
    library: Arc<dyn LibraryAccessor>,
    coordinator: Arc<YearResolutionCoordinator>,
    pending: Arc<dyn PendingVerificationStore>,
    snapshots: SnapshotStore,
    batch_size: usize,
    album_concurrency: usize,
    cancel: CancellationToken,
}

impl SyncPipeline {
    pub fn new(
        library: Arc<dyn LibraryAccessor>,
        coordinator: Arc<YearResolutionCoordinator>,
        pending: Arc<dyn PendingVerificationStore>,
        snapshots: SnapshotStore,
        config: &SyncConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            library,
            coordinator,
            pending,
            snapshots,
            batch_size: config.resolution.batch_size.max(1),
            album_concurrency: config.resolution.album_concurrency.max(1),
            cancel,
        }
    }

    /// Wire the SQLite stores under `root_folder` to the given provider clients
    pub async fn open(
        config: &SyncConfig,
        root_folder: &Path,
        library: Arc<dyn LibraryAccessor>,
        clients: Vec<Arc<dyn SourceClient>>,
        cancel: CancellationToken,
    ) -> SyncResult<Self> {
        let db_path = config.database_path(root_folder);
        let pool = init_database_pool(&db_path)
            .await
            .map_err(|e| SyncError::persistence(&db_path, e))?;
        let lock_wait = config.cache.max_lock_wait_ms;

        let albums = Arc::new(SqliteAlbumYearRepository::new(pool.clone(), Some(db_path.clone()), lock_wait));
        let negatives = Arc::new(SqliteNegativeRepository::new(pool.clone(), Some(db_path.clone()), lock_wait));
        let pending_repo = Arc::new(SqlitePendingRepository::new(pool, Some(db_path.clone()), lock_wait));

        let cache = Arc::new(TieredCache::new(albums, negatives, TieredCacheConfig::from_config(config)));
        let pending: Arc<dyn PendingVerificationStore> = Arc::new(RepositoryPendingStore::new(pending_repo));
        let coordinator = Arc::new(YearResolutionCoordinator::new(clients, cache, pending.clone(), config));
        let snapshots = SnapshotStore::new(config.snapshot_path(root_folder), config.snapshot.max_age());

        tracing::info!(
            database = %db_path.display(),
            snapshot = %snapshots.path().display(),
            providers = coordinator.provider_count(),
            "Sync pipeline ready"
        );
        Ok(Self::new(library, coordinator, pending, snapshots, config, cancel))
    }

    pub fn coordinator(&self) -> &YearResolutionCoordinator {
        &self.coordinator
    }

    pub fn pending(&self) -> &Arc<dyn PendingVerificationStore> {
        &self.pending
    }

    pub fn snapshots(&self) -> &SnapshotStore {
        &self.snapshots
    }

    pub async fn run(&self, full_rescan: bool) -> SyncResult<SyncReport> {
        let span = tracing::info_span!("sync_run", full_rescan);
        self.run_inner(full_rescan).instrument(span).await
    }

    async fn run_inner(&self, full_rescan: bool) -> SyncResult<SyncReport> {
        let started = Instant::now();
        let mut report = SyncReport::default();

        let catalog_modified_at = self.library.catalog_modified_at().await?;
        let status = if full_rescan {
            tracing::info!("Full rescan requested, ignoring snapshot");
            SnapshotStatus::Missing
        } else {
            self.snapshots.load_valid(catalog_modified_at, Utc::now()).await?
        };

        let (mut view, targets) = match status {
            SnapshotStatus::Valid(snapshot) => {
                let listing = self.library.list_light_entries().await?;
                let delta = delta::compute(&snapshot, &listing);
                report.delta_added = delta.added.len();
                report.delta_updated = delta.updated.len();
                report.delta_removed = delta.removed.len();

                if delta.is_empty() {
                    report.mode = SyncMode::Reused;
                    (snapshot.to_catalog(), Targets::Ids(BTreeSet::new()))
                } else {
                    report.mode = SyncMode::Incremental;
                    let view = self.library.fetch_full_catalog(&CatalogFilter::all()).await?;
                    (view, Targets::Ids(delta.changed_ids()))
                }
            }
            other => {
                match &other {
                    SnapshotStatus::Stale { reason } | SnapshotStatus::Corrupt { reason } => {
                        tracing::info!(reason = %reason, "Snapshot unusable, full rescan");
                    }
                    _ => tracing::info!("No snapshot, full rescan"),
                }
                report.mode = SyncMode::Full;
                let view = self.library.fetch_full_catalog(&CatalogFilter::all()).await?;
                (view, Targets::All)
            }
        };
        report.catalog_entries = view.len();

        let pending_keys: HashSet<AlbumKey> = self
            .pending
            .list()
            .await?
            .iter()
            .map(Keyed::key)
            .collect();
        let albums = select_albums(&view, &targets, &pending_keys);
        report.albums_considered = albums.len();
        tracing::info!(
            mode = %report.mode,
            entries = report.catalog_entries,
            albums = albums.len(),
            pending = pending_keys.len(),
            "Resolution plan ready"
        );

        let mut year_updates: BTreeMap<String, i32> = BTreeMap::new();
        for batch in albums.chunks(self.batch_size) {
            if self.cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }

            let results: Vec<(&AlbumGroup, Option<SyncResult<Resolution>>)> = stream::iter(batch)
                .map(|group| async move {
                    if self.cancel.is_cancelled() {
                        return (group, None);
                    }
                    (group, Some(self.coordinator.resolve(&group.request).await))
                })
                .buffer_unordered(self.album_concurrency)
                .collect()
                .await;

            for (group, result) in results {
                let resolution = match result {
                    None => {
                        report.cancelled = true;
                        continue;
                    }
                    Some(Ok(resolution)) => resolution,
                    Some(Err(e)) if e.is_run_fatal() => {
                        tracing::error!(error = %e, "Run aborted");
                        return Err(e);
                    }
                    Some(Err(e)) => {
                        report.albums_failed += 1;
                        tracing::warn!(album = %group.request.album, error = %e, "Album resolution failed");
                        continue;
                    }
                };
                self.apply(group, &resolution, &mut report, &mut year_updates).await;
            }
        }

        for entry in &mut view {
            if let Some(year) = year_updates.get(&entry.id) {
                entry.year = Some(*year);
            }
        }

        if report.cancelled {
            tracing::warn!("Run cancelled, snapshot left unchanged");
        } else if report.mode == SyncMode::Reused && report.entries_updated == 0 {
            tracing::debug!("Snapshot reused verbatim");
        } else {
            if report.entries_updated > 0 {
                // Pick up modification timestamps written by the updates
                view = self.library.fetch_full_catalog(&CatalogFilter::all()).await?;
            }
            let modified_at = self.library.catalog_modified_at().await?;
            let snapshot = Snapshot::from_catalog(&view, modified_at, Utc::now());
            self.snapshots.save(&snapshot).await?;
            report.snapshot_saved = true;
        }

        tracing::info!(
            mode = %report.mode,
            albums = report.albums_considered,
            resolved = report.albums_resolved,
            from_cache = report.albums_from_cache,
            negative = report.albums_negative,
            pending = report.albums_pending,
            abandoned = report.albums_abandoned,
            entries_updated = report.entries_updated,
            update_failures = report.update_failures,
            provider_calls = report.provider_calls,
            cancelled = report.cancelled,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Sync run complete"
        );
        Ok(report)
    }

    /// Count the outcome and write the year to the album's entries
    async fn apply(
        &self,
        group: &AlbumGroup,
        resolution: &Resolution,
        report: &mut SyncReport,
        year_updates: &mut BTreeMap<String, i32>,
    ) {
        report.provider_calls += u64::from(resolution.provider_calls);
        match &resolution.outcome {
            ResolutionOutcome::Resolved { cached: Some(_), .. } => report.albums_from_cache += 1,
            ResolutionOutcome::Resolved { cached: None, .. } => report.albums_resolved += 1,
            ResolutionOutcome::Negative { .. } => report.albums_negative += 1,
            ResolutionOutcome::Pending { .. } => report.albums_pending += 1,
            ResolutionOutcome::Abandoned { .. } => report.albums_abandoned += 1,
        }

        let Some((year, decision)) = resolution.year_to_apply() else {
            return;
        };
        for (id, current) in &group.entries {
            if !decision.should_write(*current, year) {
                report.entries_unchanged += 1;
                continue;
            }
            match self
                .library
                .update_entry_property(id, EntryProperty::Year, &year.to_string())
                .await
            {
                Ok(()) => {
                    report.entries_updated += 1;
                    year_updates.insert(id.clone(), year);
                    tracing::debug!(id = %id, from = ?current, to = year, "Year written");
                }
                Err(e) => {
                    report.update_failures += 1;
                    tracing::warn!(id = %id, error = %e, "Year update failed");
                }
            }
        }
    }
}

/// Group entries into albums and keep those touching a target entry or already pending
fn select_albums(
    view: &[EntrySummary],
    targets: &Targets,
    pending: &HashSet<AlbumKey>,
) -> Vec<AlbumGroup> {
    let mut groups: BTreeMap<AlbumKey, (AlbumGroup, bool)> = BTreeMap::new();
    for entry in view {
        if entry.album.trim().is_empty() {
            continue;
        }
        let artist = entry.grouping_artist();
        let key = AlbumKey::new(artist, &entry.album);
        let (group, selected) = groups.entry(key).or_insert_with(|| {
            (
                AlbumGroup {
                    request: AlbumRequest::new(artist, entry.album.as_str()),
                    entries: Vec::new(),
                },
                false,
            )
        });
        group.entries.push((entry.id.clone(), entry.year));
        *selected |= targets.contains(&entry.id);
    }

    groups
        .into_iter()
        .filter(|(key, (_, selected))| *selected || pending.contains(key))
        .map(|(_, (group, _))| group)
        .collect()
}
