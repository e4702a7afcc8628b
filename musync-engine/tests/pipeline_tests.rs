//! Sync runs over an in-memory library with scripted providers
//!
//! Each test opens the pipeline on a temp root folder, so the SQLite cache
//! and the snapshot file are real.

mod helpers;

use chrono::{TimeZone, Utc};
use helpers::*;
use musync_engine::library::{JsonFileLibrary, LibraryAccessor};
use musync_engine::pipeline::SyncMode;
use musync_engine::types::Provider;
use musync_engine::{SyncConfig, SyncError, SyncPipeline};
use std::sync::Arc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

fn provider() -> Arc<MockSourceClient> {
    MockSourceClient::new(Provider::MusicBrainz, |query| match query.album.as_str() {
        "Dummy" => Ok(vec![strong_candidate(Provider::MusicBrainz, "Portishead", "Dummy", 1994)]),
        "Play" => Ok(vec![medium_candidate(Provider::MusicBrainz, "Moby", "Play", 2001)]),
        "Rarities" => Ok(vec![weak_candidate(Provider::MusicBrainz, "Slint", 2014)]),
        _ => Ok(vec![]),
    })
}

async fn open(
    root: &TempDir,
    config: &SyncConfig,
    library: Arc<MockLibrary>,
    mock: &Arc<MockSourceClient>,
    cancel: CancellationToken,
) -> SyncPipeline {
    SyncPipeline::open(config, root.path(), library, as_clients(&[mock.clone()]), cancel)
        .await
        .unwrap()
}

fn catalog() -> Vec<musync_engine::library::EntrySummary> {
    vec![
        entry("1", "Portishead", "Dummy", None),
        entry("2", "Portishead", "Dummy", Some(1995)),
        entry("3", "Basement Quartet", "Demo Reel", None),
    ]
}

#[tokio::test]
async fn test_cold_run_then_snapshot_reused() {
    let root = TempDir::new().unwrap();
    let config = test_config();
    let library = MockLibrary::new(catalog());
    let mock = provider();
    let pipeline = open(&root, &config, library.clone(), &mock, CancellationToken::new()).await;

    let report = pipeline.run(false).await.unwrap();
    assert_eq!(report.mode, SyncMode::Full);
    assert_eq!(report.catalog_entries, 3);
    assert_eq!(report.albums_considered, 2);
    assert_eq!(report.albums_resolved, 1);
    assert_eq!(report.albums_negative, 1);
    assert_eq!(report.entries_updated, 2);
    assert!(report.snapshot_saved);
    assert!(pipeline.snapshots().path().exists());
    assert_eq!(library.year_of("1").await, Some(1994));
    assert_eq!(library.year_of("2").await, Some(1994));

    let calls = mock.calls();
    let second = pipeline.run(false).await.unwrap();
    assert_eq!(second.mode, SyncMode::Reused);
    assert_eq!(second.albums_considered, 0);
    assert_eq!(second.provider_calls, 0);
    assert!(!second.snapshot_saved);
    assert_eq!(mock.calls(), calls);
}

#[tokio::test]
async fn test_changed_entry_resolved_incrementally() {
    let root = TempDir::new().unwrap();
    let config = test_config();
    let library = MockLibrary::new(catalog());
    let mock = provider();
    let pipeline = open(&root, &config, library.clone(), &mock, CancellationToken::new()).await;
    pipeline.run(false).await.unwrap();
    let calls = mock.calls();

    // Host edited one entry but kept its catalog timestamp
    library
        .touch("3", Utc.with_ymd_and_hms(2025, 2, 2, 8, 0, 0).unwrap())
        .await;

    let report = pipeline.run(false).await.unwrap();
    assert_eq!(report.mode, SyncMode::Incremental);
    assert_eq!(report.delta_updated, 1);
    assert_eq!(report.delta_added, 0);
    assert_eq!(report.albums_considered, 1);
    assert_eq!(report.albums_negative, 1);
    assert!(report.snapshot_saved);
    // Negative result came from the cache
    assert_eq!(mock.calls(), calls);

    let report = pipeline.run(false).await.unwrap();
    assert_eq!(report.mode, SyncMode::Reused);
}

#[tokio::test]
async fn test_pending_albums_retried_on_reuse() {
    let root = TempDir::new().unwrap();
    let config = test_config();
    let library = MockLibrary::new(vec![entry("1", "Slint", "Rarities", None)]);
    let mock = provider();
    let pipeline = open(&root, &config, library.clone(), &mock, CancellationToken::new()).await;

    let first = pipeline.run(false).await.unwrap();
    assert_eq!(first.albums_pending, 1);
    assert_eq!(library.year_of("1").await, None);

    let second = pipeline.run(false).await.unwrap();
    assert_eq!(second.mode, SyncMode::Reused);
    assert_eq!(second.albums_considered, 1);
    assert_eq!(second.albums_pending, 1);
    assert_eq!(mock.calls(), 2);

    let records = pipeline.pending().list().await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].attempt_count, 2);
}

#[tokio::test]
async fn test_medium_confidence_keeps_existing_year() {
    let root = TempDir::new().unwrap();
    let config = test_config();
    let library = MockLibrary::new(vec![
        entry("10", "Moby", "Play", Some(1999)),
        entry("11", "Moby", "Play", None),
    ]);
    let mock = provider();
    let pipeline = open(&root, &config, library.clone(), &mock, CancellationToken::new()).await;

    let report = pipeline.run(false).await.unwrap();
    assert_eq!(report.entries_updated, 1);
    assert_eq!(report.entries_unchanged, 1);
    assert_eq!(library.year_of("10").await, Some(1999));
    assert_eq!(library.year_of("11").await, Some(2001));
}

#[tokio::test]
async fn test_corrupt_snapshot_forces_full_rescan() {
    let root = TempDir::new().unwrap();
    let config = test_config();
    let library = MockLibrary::new(catalog());
    let mock = provider();
    let pipeline = open(&root, &config, library.clone(), &mock, CancellationToken::new()).await;
    pipeline.run(false).await.unwrap();

    let mut bytes = std::fs::read(pipeline.snapshots().path()).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xff;
    std::fs::write(pipeline.snapshots().path(), &bytes).unwrap();

    let report = pipeline.run(false).await.unwrap();
    assert_eq!(report.mode, SyncMode::Full);
    assert_eq!(report.albums_considered, 2);
    assert_eq!(report.albums_from_cache + report.albums_negative, 2);
    assert!(report.snapshot_saved);

    let report = pipeline.run(false).await.unwrap();
    assert_eq!(report.mode, SyncMode::Reused);
}

#[tokio::test]
async fn test_stale_catalog_or_forced_rescan_is_full() {
    let root = TempDir::new().unwrap();
    let config = test_config();
    let library = MockLibrary::new(catalog());
    let mock = provider();
    let pipeline = open(&root, &config, library.clone(), &mock, CancellationToken::new()).await;
    pipeline.run(false).await.unwrap();

    assert_eq!(pipeline.run(true).await.unwrap().mode, SyncMode::Full);

    library.set_modified_at(Utc::now());
    assert_eq!(pipeline.run(false).await.unwrap().mode, SyncMode::Full);
}

#[tokio::test]
async fn test_cancelled_run_leaves_snapshot_untouched() {
    let root = TempDir::new().unwrap();
    let config = test_config();
    let library = MockLibrary::new(catalog());
    let mock = provider();
    let cancel = CancellationToken::new();
    let pipeline = open(&root, &config, library.clone(), &mock, cancel.clone()).await;

    cancel.cancel();
    let report = pipeline.run(false).await.unwrap();

    assert!(report.cancelled);
    assert!(!report.snapshot_saved);
    assert_eq!(report.entries_updated, 0);
    assert_eq!(mock.calls(), 0);
    assert!(!pipeline.snapshots().path().exists());
    assert_eq!(library.year_of("1").await, None);
}

#[tokio::test]
async fn test_update_failures_counted_not_fatal() {
    let root = TempDir::new().unwrap();
    let config = test_config();
    let library = MockLibrary::read_only(catalog());
    let mock = provider();
    let pipeline = open(&root, &config, library.clone(), &mock, CancellationToken::new()).await;

    let report = pipeline.run(false).await.unwrap();
    assert_eq!(report.albums_resolved, 1);
    assert_eq!(report.update_failures, 2);
    assert_eq!(report.entries_updated, 0);
    assert!(report.snapshot_saved);
}

#[tokio::test]
async fn test_json_catalog_end_to_end() {
    let root = TempDir::new().unwrap();
    let catalog_path = root.path().join("catalog.json");
    std::fs::write(
        &catalog_path,
        r#"{"entries": [
            {"id": "a1", "name": "Mysterons", "artist": "Portishead", "album": "Dummy", "year": 0},
            {"id": "a2", "name": "Sour Times", "artist": "Portishead", "albumArtist": "Portishead", "album": "Dummy"}
        ]}"#,
    )
    .unwrap();

    let config = test_config();
    let library = Arc::new(JsonFileLibrary::open(&catalog_path).await.unwrap());
    let mock = provider();
    let pipeline = SyncPipeline::open(
        &config,
        root.path(),
        library.clone(),
        as_clients(&[mock.clone()]),
        CancellationToken::new(),
    )
    .await
    .unwrap();

    let report = pipeline.run(false).await.unwrap();
    assert_eq!(report.entries_updated, 2);

    let reopened = JsonFileLibrary::open(&catalog_path).await.unwrap();
    let years: Vec<Option<i32>> = reopened
        .fetch_entries_by_ids(&["a1".to_string(), "a2".to_string()])
        .await
        .unwrap()
        .iter()
        .map(|e| e.year)
        .collect();
    assert_eq!(years, vec![Some(1994), Some(1994)]);

    let second = pipeline.run(false).await.unwrap();
    assert_eq!(second.mode, SyncMode::Reused);
    assert_eq!(mock.calls(), 1);
}

#[tokio::test]
async fn test_snapshot_write_failure_aborts_with_path() {
    let root = TempDir::new().unwrap();
    let config = test_config();
    let snapshot_path = config.snapshot_path(root.path());
    // A directory where the snapshot file should go: the final rename fails
    std::fs::create_dir_all(snapshot_path.join("occupied")).unwrap();
    let library = MockLibrary::new(catalog());
    let mock = provider();
    let pipeline = open(&root, &config, library.clone(), &mock, CancellationToken::new()).await;

    let err = pipeline.run(true).await.unwrap_err();

    assert!(err.is_run_fatal());
    match err {
        SyncError::Persistence { path, .. } => assert_eq!(path, snapshot_path),
        other => panic!("expected Persistence, got {:?}", other),
    }
    assert!(snapshot_path.join("occupied").is_dir());
    assert!(musync_common::fs::temp_files_for(&snapshot_path).unwrap().is_empty());
}

#[tokio::test]
async fn test_unreadable_snapshot_aborts_before_resolution() {
    let root = TempDir::new().unwrap();
    let config = test_config();
    let snapshot_path = config.snapshot_path(root.path());
    std::fs::create_dir_all(&snapshot_path).unwrap();
    let library = MockLibrary::new(catalog());
    let mock = provider();
    let pipeline = open(&root, &config, library.clone(), &mock, CancellationToken::new()).await;

    match pipeline.run(false).await {
        Err(SyncError::Persistence { path, .. }) => assert_eq!(path, snapshot_path),
        other => panic!("expected Persistence, got {:?}", other),
    }
    assert_eq!(mock.calls(), 0);
    assert_eq!(library.year_of("1").await, None);
}
