//! Atomic file operations
//!
//! Every artifact musync persists outside SQLite (snapshot, exported
//! catalog, TOML config) goes through [`atomic_write`]: the bytes land in a
//! sibling temp file, are flushed to disk, then renamed over the target.
//! A crash or cancellation leaves either the old file or the new one.

use crate::{Error, Result};
use std::ffi::OsString;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// File-name prefix shared by every temp file written for `target` (`.<name>.`)
pub fn temp_prefix_for(target: &Path) -> OsString {
    let mut prefix = OsString::from(".");
    prefix.push(target.file_name().unwrap_or_else(|| "musync".as_ref()));
    prefix.push(".");
    prefix
}

/// Temp files for `target` still present in its directory
pub fn temp_files_for(target: &Path) -> Result<Vec<PathBuf>> {
    let prefix = temp_prefix_for(target);
    let prefix = prefix.to_string_lossy();
    let dir = parent_dir(target);
    let mut found = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with(prefix.as_ref()) && name.ends_with(".tmp") {
            found.push(entry.path());
        }
    }
    Ok(found)
}

fn parent_dir(target: &Path) -> &Path {
    match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

/// Write `bytes` to `target` atomically (temp + fsync + rename)
///
/// Each call writes its own uniquely named sibling temp file, so concurrent
/// writers never share one; the last rename wins. An existing target keeps
/// its permissions.
pub fn atomic_write(target: &Path, bytes: &[u8]) -> Result<()> {
    let dir = parent_dir(target);
    fs::create_dir_all(dir)?;

    let mut temp = tempfile::Builder::new()
        .prefix(&temp_prefix_for(target))
        .suffix(".tmp")
        .tempfile_in(dir)?;
    temp.write_all(bytes)?;
    temp.as_file().sync_all()?;
    if let Ok(metadata) = fs::metadata(target) {
        fs::set_permissions(temp.path(), metadata.permissions())?;
    }

    // An unpersisted temp file is removed when dropped
    temp.persist(target).map_err(|e| Error::Io(e.error))?;

    // Persist the rename itself
    #[cfg(unix)]
    if let Ok(dir) = fs::File::open(dir) {
        let _ = dir.sync_all();
    }

    tracing::debug!(path = %target.display(), bytes = bytes.len(), "Atomic write complete");
    Ok(())
}

/// Restrict a file to owner read/write (files that may hold provider tokens)
#[cfg(unix)]
pub fn set_owner_only(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
pub fn set_owner_only(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use tempfile::TempDir;

    #[test]
    fn test_temp_prefix_names_target() {
        let target = Path::new("/data/library_snapshot.snap");
        assert_eq!(temp_prefix_for(target), OsString::from(".library_snapshot.snap."));
    }

    #[test]
    fn test_atomic_write_replaces_content() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("file.bin");

        atomic_write(&target, b"first").unwrap();
        atomic_write(&target, b"second").unwrap();

        assert_eq!(fs::read(&target).unwrap(), b"second");
        assert!(temp_files_for(&target).unwrap().is_empty());
    }

    #[test]
    fn test_atomic_write_creates_parent_dirs() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("nested").join("deeper").join("file.bin");

        atomic_write(&target, b"payload").unwrap();

        assert_eq!(fs::read(&target).unwrap(), b"payload");
    }

    #[test]
    fn test_stale_temp_file_does_not_block_write() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("file.bin");
        let stale = dir.path().join(".file.bin.crashed.tmp");
        fs::write(&stale, b"half-written garbage").unwrap();

        atomic_write(&target, b"clean").unwrap();

        assert_eq!(fs::read(&target).unwrap(), b"clean");
        assert_eq!(temp_files_for(&target).unwrap(), vec![stale]);
    }

    #[cfg(unix)]
    #[test]
    fn test_existing_permissions_kept() {
        use std::os::unix::fs::PermissionsExt;
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("catalog.json");
        fs::write(&target, b"{}").unwrap();
        fs::set_permissions(&target, fs::Permissions::from_mode(0o644)).unwrap();

        atomic_write(&target, b"{\"entries\": []}").unwrap();

        let mode = fs::metadata(&target).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o644);
    }

    #[test]
    fn test_concurrent_writers_never_fail() {
        let dir = TempDir::new().unwrap();
        let target = Arc::new(dir.path().join("library_snapshot.snap"));
        let large = Arc::new(vec![b'a'; 4 * 1024 * 1024]);
        let small = Arc::new(vec![b'b'; 3 * 1024 * 1024]);

        for _ in 0..20 {
            let handles: Vec<_> = [large.clone(), small.clone()]
                .into_iter()
                .map(|bytes| {
                    let target = target.clone();
                    thread::spawn(move || atomic_write(&target, &bytes))
                })
                .collect();
            for handle in handles {
                handle.join().unwrap().unwrap();
            }

            let written = fs::read(target.as_path()).unwrap();
            assert!(written == *large || written == *small);
        }
        assert!(temp_files_for(&target).unwrap().is_empty());
    }
}
