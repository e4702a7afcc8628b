//! Pending verification queue
//!
//! Albums that could not be resolved confidently are parked here with
//! retry bookkeeping. Records stay until a later run resolves the album
//! or an operator clears them; nothing expires automatically.

use crate::cache::key::AlbumKey;
use crate::error::{SyncError, SyncResult};
use crate::store::{Keyed, PendingVerificationRecord, Repository};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Narrow interface the coordinator and pipeline depend on
#[async_trait]
pub trait PendingVerificationStore: Send + Sync {
    /// Create the record, or bump its attempt count if it already exists
    async fn mark_pending(
        &self,
        artist: &str,
        album: &str,
        error: &str,
    ) -> SyncResult<PendingVerificationRecord>;

    async fn is_pending(&self, key: &AlbumKey) -> SyncResult<bool>;

    async fn get(&self, key: &AlbumKey) -> SyncResult<Option<PendingVerificationRecord>>;

    /// Returns true if a record was removed
    async fn remove(&self, key: &AlbumKey) -> SyncResult<bool>;

    /// Record another failed attempt; `None` if the album is not pending
    async fn increment_attempt(
        &self,
        key: &AlbumKey,
        error: &str,
    ) -> SyncResult<Option<PendingVerificationRecord>>;

    async fn list(&self) -> SyncResult<Vec<PendingVerificationRecord>>;

    /// Operator reset; returns how many records were dropped
    async fn clear(&self) -> SyncResult<usize>;
}

/// Pending store over any repository
///
/// Read-modify-write sequences run under one async mutex, so concurrent
/// albums in this process never lose an attempt increment. Cross-process
/// exclusion comes from the repository's own locking.
pub struct RepositoryPendingStore {
    repo: Arc<dyn Repository<PendingVerificationRecord>>,
    write_lock: Mutex<()>,
}

impl RepositoryPendingStore {
    pub fn new(repo: Arc<dyn Repository<PendingVerificationRecord>>) -> Self {
        Self {
            repo,
            write_lock: Mutex::new(()),
        }
    }

    fn persistence(&self, err: musync_common::Error) -> SyncError {
        SyncError::persistence(self.repo.location(), err)
    }
}

#[async_trait]
impl PendingVerificationStore for RepositoryPendingStore {
    async fn mark_pending(
        &self,
        artist: &str,
        album: &str,
        error: &str,
    ) -> SyncResult<PendingVerificationRecord> {
        let _guard = self.write_lock.lock().await;
        let key = AlbumKey::new(artist, album);
        let now = Utc::now();

        let existing = self.repo.get(&key).await.map_err(|e| self.persistence(e))?;
        let record = match existing {
            Some(mut record) => {
                record.attempt_count = record.attempt_count.saturating_add(1);
                record.last_error = error.to_string();
                record.last_attempt_at = now;
                record
            }
            None => PendingVerificationRecord {
                artist: artist.to_string(),
                album: album.to_string(),
                attempt_count: 1,
                last_error: error.to_string(),
                first_seen_at: now,
                last_attempt_at: now,
            },
        };

        self.repo.put(&record).await.map_err(|e| self.persistence(e))?;
        tracing::info!(
            artist = %record.artist,
            album = %record.album,
            attempts = record.attempt_count,
            reason = %record.last_error,
            "Album marked pending verification"
        );
        Ok(record)
    }

    async fn is_pending(&self, key: &AlbumKey) -> SyncResult<bool> {
        Ok(self.get(key).await?.is_some())
    }

    async fn get(&self, key: &AlbumKey) -> SyncResult<Option<PendingVerificationRecord>> {
        self.repo.get(key).await.map_err(|e| self.persistence(e))
    }

    async fn remove(&self, key: &AlbumKey) -> SyncResult<bool> {
        let _guard = self.write_lock.lock().await;
        let removed = self.repo.delete(key).await.map_err(|e| self.persistence(e))?;
        if removed {
            tracing::info!(key = %key, "Album removed from pending verification");
        }
        Ok(removed)
    }

    async fn increment_attempt(
        &self,
        key: &AlbumKey,
        error: &str,
    ) -> SyncResult<Option<PendingVerificationRecord>> {
        let _guard = self.write_lock.lock().await;
        let Some(mut record) = self.repo.get(key).await.map_err(|e| self.persistence(e))? else {
            return Ok(None);
        };

        record.attempt_count = record.attempt_count.saturating_add(1);
        record.last_error = error.to_string();
        record.last_attempt_at = Utc::now();
        self.repo.put(&record).await.map_err(|e| self.persistence(e))?;
        Ok(Some(record))
    }

    async fn list(&self) -> SyncResult<Vec<PendingVerificationRecord>> {
        self.repo.scan().await.map_err(|e| self.persistence(e))
    }

    async fn clear(&self) -> SyncResult<usize> {
        let _guard = self.write_lock.lock().await;
        let records = self.repo.scan().await.map_err(|e| self.persistence(e))?;
        let mut removed = 0;
        for record in &records {
            if self
                .repo
                .delete(&record.key())
                .await
                .map_err(|e| self.persistence(e))?
            {
                removed += 1;
            }
        }
        tracing::info!(removed, "Pending verification queue cleared");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{open_in_memory, SqlitePendingRepository};

    async fn store() -> RepositoryPendingStore {
        let pool = open_in_memory().await.unwrap();
        RepositoryPendingStore::new(Arc::new(SqlitePendingRepository::new(pool, None, 100)))
    }

    #[tokio::test]
    async fn test_mark_creates_then_increments() {
        let store = store().await;

        let first = store.mark_pending("Obscure Band", "Rare EP", "no candidates").await.unwrap();
        assert_eq!(first.attempt_count, 1);

        let second = store
            .mark_pending("obscure band", "rare ep", "best score 20 below floor")
            .await
            .unwrap();
        assert_eq!(second.attempt_count, 2);
        assert_eq!(second.first_seen_at, first.first_seen_at);
        assert_eq!(second.artist, "Obscure Band");
        assert_eq!(second.last_error, "best score 20 below floor");
    }

    #[tokio::test]
    async fn test_is_pending_and_remove() {
        let store = store().await;
        let key = AlbumKey::new("Obscure Band", "Rare EP");
        assert!(!store.is_pending(&key).await.unwrap());

        store.mark_pending("Obscure Band", "Rare EP", "timeout").await.unwrap();
        assert!(store.is_pending(&key).await.unwrap());

        assert!(store.remove(&key).await.unwrap());
        assert!(!store.is_pending(&key).await.unwrap());
        assert!(!store.remove(&key).await.unwrap());
    }

    #[tokio::test]
    async fn test_increment_missing_is_none() {
        let store = store().await;
        let key = AlbumKey::new("Nobody", "Nothing");
        assert!(store.increment_attempt(&key, "x").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_increment_updates_error() {
        let store = store().await;
        store.mark_pending("A", "B", "first").await.unwrap();
        let updated = store
            .increment_attempt(&AlbumKey::new("A", "B"), "second")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.attempt_count, 2);
        assert_eq!(updated.last_error, "second");
    }

    #[tokio::test]
    async fn test_concurrent_marks_do_not_lose_increments() {
        let store = Arc::new(store().await);
        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.mark_pending("Race", "Condition", "err").await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let record = store.get(&AlbumKey::new("Race", "Condition")).await.unwrap().unwrap();
        assert_eq!(record.attempt_count, 8);
    }

    #[tokio::test]
    async fn test_list_and_clear() {
        let store = store().await;
        store.mark_pending("A", "One", "e").await.unwrap();
        store.mark_pending("B", "Two", "e").await.unwrap();

        assert_eq!(store.list().await.unwrap().len(), 2);
        assert_eq!(store.clear().await.unwrap(), 2);
        assert!(store.list().await.unwrap().is_empty());
    }
}
