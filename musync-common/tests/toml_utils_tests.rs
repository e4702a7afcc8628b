//! Tests for atomic TOML writes

use musync_common::config::{load_toml, write_toml, LoggingConfig};
use musync_common::fs::temp_files_for;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tempfile::TempDir;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Sample {
    root_folder: Option<PathBuf>,
    discogs_token: Option<String>,
    logging: LoggingConfig,
}

fn sample() -> Sample {
    Sample {
        root_folder: Some(PathBuf::from("/music")),
        discogs_token: Some("token123".to_string()),
        logging: LoggingConfig::default(),
    }
}

#[test]
fn test_write_leaves_no_temp_file() {
    let temp_dir = TempDir::new().unwrap();
    let target = temp_dir.path().join("musync.toml");

    write_toml(&sample(), &target).unwrap();

    assert!(target.exists());
    assert!(temp_files_for(&target).unwrap().is_empty());
}

#[test]
fn test_write_then_load_round_trips() {
    let temp_dir = TempDir::new().unwrap();
    let target = temp_dir.path().join("musync.toml");

    write_toml(&sample(), &target).unwrap();
    let loaded: Sample = load_toml(&target).unwrap();

    assert_eq!(loaded, sample());
}

#[test]
fn test_overwrite_replaces_previous_values() {
    let temp_dir = TempDir::new().unwrap();
    let target = temp_dir.path().join("musync.toml");

    write_toml(&sample(), &target).unwrap();
    let mut updated = sample();
    updated.discogs_token = None;
    write_toml(&updated, &target).unwrap();

    let content = std::fs::read_to_string(&target).unwrap();
    assert!(!content.contains("token123"));
}

#[cfg(unix)]
#[test]
fn test_written_file_is_owner_only() {
    use std::os::unix::fs::PermissionsExt;

    let temp_dir = TempDir::new().unwrap();
    let target = temp_dir.path().join("musync.toml");

    write_toml(&sample(), &target).unwrap();

    let mode = std::fs::metadata(&target).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o600);
}
