//! SQLite-backed repositories
//!
//! Tables (tabular rows, stable across runs):
//! - `album_years`: artist, album, year, source, confidence, written_at
//! - `negative_results`: artist, album, written_at
//! - `pending_verification`: artist, album, attempts, last_error, first_seen, last_attempt
//!
//! Each row also carries the normalized key columns used as primary key.

use super::{
    retry_on_lock, AlbumCacheEntry, NegativeCacheEntry, PendingVerificationRecord, Repository,
};
use crate::cache::key::AlbumKey;
use crate::types::Provider;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use musync_common::{Error, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Location reported for in-memory databases
const IN_MEMORY: &str = ":memory:";

/// Open (or create) the cache database and ensure tables exist
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    tracing::debug!(path = %db_path.display(), "Connecting to cache database");

    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(2));

    let pool = SqlitePoolOptions::new()
        .max_connections(4)
        .connect_with(options)
        .await?;

    init_tables(&pool).await?;
    Ok(pool)
}

/// Single-connection in-memory database (tests, dry runs)
pub async fn open_in_memory() -> Result<SqlitePool> {
    // One connection that never expires: each new in-memory connection is a new database
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await?;
    init_tables(&pool).await?;
    Ok(pool)
}

async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS album_years (
            norm_artist TEXT NOT NULL,
            norm_album TEXT NOT NULL,
            artist TEXT NOT NULL,
            album TEXT NOT NULL,
            year INTEGER NOT NULL,
            source TEXT NOT NULL,
            confidence INTEGER NOT NULL,
            written_at TEXT NOT NULL,
            PRIMARY KEY (norm_artist, norm_album)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS negative_results (
            norm_artist TEXT NOT NULL,
            norm_album TEXT NOT NULL,
            artist TEXT NOT NULL,
            album TEXT NOT NULL,
            written_at TEXT NOT NULL,
            PRIMARY KEY (norm_artist, norm_album)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS pending_verification (
            norm_artist TEXT NOT NULL,
            norm_album TEXT NOT NULL,
            artist TEXT NOT NULL,
            album TEXT NOT NULL,
            attempts INTEGER NOT NULL DEFAULT 1,
            last_error TEXT NOT NULL DEFAULT '',
            first_seen TEXT NOT NULL,
            last_attempt TEXT NOT NULL,
            PRIMARY KEY (norm_artist, norm_album)
        )
        "#,
    )
    .execute(pool)
    .await?;

    tracing::debug!("Cache tables initialized (album_years, negative_results, pending_verification)");
    Ok(())
}

fn location_of(path: Option<PathBuf>) -> PathBuf {
    path.unwrap_or_else(|| PathBuf::from(IN_MEMORY))
}

fn parse_provider(raw: &str) -> Result<Provider> {
    raw.parse::<Provider>().map_err(Error::InvalidInput)
}

// ============================================================================
// Album years
// ============================================================================

type AlbumYearRow = (String, String, i64, String, i64, DateTime<Utc>);

/// `album_years` table
#[derive(Clone)]
pub struct SqliteAlbumYearRepository {
    pool: SqlitePool,
    location: PathBuf,
    max_lock_wait_ms: u64,
}

impl SqliteAlbumYearRepository {
    pub fn new(pool: SqlitePool, db_path: Option<PathBuf>, max_lock_wait_ms: u64) -> Self {
        Self {
            pool,
            location: location_of(db_path),
            max_lock_wait_ms,
        }
    }

    fn from_row(row: AlbumYearRow) -> Result<AlbumCacheEntry> {
        let (artist, album, year, source, confidence, written_at) = row;
        Ok(AlbumCacheEntry {
            artist,
            album,
            year: year as i32,
            source: parse_provider(&source)?,
            confidence: confidence as i32,
            written_at,
        })
    }
}

#[async_trait]
impl Repository<AlbumCacheEntry> for SqliteAlbumYearRepository {
    async fn get(&self, key: &AlbumKey) -> Result<Option<AlbumCacheEntry>> {
        let row: Option<AlbumYearRow> = sqlx::query_as(
            "SELECT artist, album, year, source, confidence, written_at FROM album_years \
             WHERE norm_artist = ? AND norm_album = ?",
        )
        .bind(key.artist())
        .bind(key.album())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::from_row).transpose()
    }

    async fn put(&self, record: &AlbumCacheEntry) -> Result<()> {
        let key = AlbumKey::new(&record.artist, &record.album);
        let pool = &self.pool;
        let key = &key;
        retry_on_lock("album_years put", self.max_lock_wait_ms, move || async move {
            sqlx::query(
                "INSERT OR REPLACE INTO album_years \
                 (norm_artist, norm_album, artist, album, year, source, confidence, written_at) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(key.artist())
            .bind(key.album())
            .bind(&record.artist)
            .bind(&record.album)
            .bind(record.year as i64)
            .bind(record.source.as_str())
            .bind(record.confidence as i64)
            .bind(record.written_at)
            .execute(pool)
            .await?;
            Ok(())
        })
        .await
    }

    async fn delete(&self, key: &AlbumKey) -> Result<bool> {
        let pool = &self.pool;
        retry_on_lock("album_years delete", self.max_lock_wait_ms, move || async move {
            let result =
                sqlx::query("DELETE FROM album_years WHERE norm_artist = ? AND norm_album = ?")
                    .bind(key.artist())
                    .bind(key.album())
                    .execute(pool)
                    .await?;
            Ok(result.rows_affected() > 0)
        })
        .await
    }

    async fn scan(&self) -> Result<Vec<AlbumCacheEntry>> {
        let rows: Vec<AlbumYearRow> = sqlx::query_as(
            "SELECT artist, album, year, source, confidence, written_at FROM album_years \
             ORDER BY norm_artist, norm_album",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::from_row).collect()
    }

    fn location(&self) -> &Path {
        &self.location
    }
}

// ============================================================================
// Negative results
// ============================================================================

type NegativeRow = (String, String, DateTime<Utc>);

/// `negative_results` table
#[derive(Clone)]
pub struct SqliteNegativeRepository {
    pool: SqlitePool,
    location: PathBuf,
    max_lock_wait_ms: u64,
}

impl SqliteNegativeRepository {
    pub fn new(pool: SqlitePool, db_path: Option<PathBuf>, max_lock_wait_ms: u64) -> Self {
        Self {
            pool,
            location: location_of(db_path),
            max_lock_wait_ms,
        }
    }
}

#[async_trait]
impl Repository<NegativeCacheEntry> for SqliteNegativeRepository {
    async fn get(&self, key: &AlbumKey) -> Result<Option<NegativeCacheEntry>> {
        let row: Option<NegativeRow> = sqlx::query_as(
            "SELECT artist, album, written_at FROM negative_results \
             WHERE norm_artist = ? AND norm_album = ?",
        )
        .bind(key.artist())
        .bind(key.album())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(artist, album, written_at)| NegativeCacheEntry {
            artist,
            album,
            written_at,
        }))
    }

    async fn put(&self, record: &NegativeCacheEntry) -> Result<()> {
        let key = AlbumKey::new(&record.artist, &record.album);
        let pool = &self.pool;
        let key = &key;
        retry_on_lock("negative_results put", self.max_lock_wait_ms, move || async move {
            sqlx::query(
                "INSERT OR REPLACE INTO negative_results \
                 (norm_artist, norm_album, artist, album, written_at) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(key.artist())
            .bind(key.album())
            .bind(&record.artist)
            .bind(&record.album)
            .bind(record.written_at)
            .execute(pool)
            .await?;
            Ok(())
        })
        .await
    }

    async fn delete(&self, key: &AlbumKey) -> Result<bool> {
        let pool = &self.pool;
        retry_on_lock("negative_results delete", self.max_lock_wait_ms, move || async move {
            let result = sqlx::query(
                "DELETE FROM negative_results WHERE norm_artist = ? AND norm_album = ?",
            )
            .bind(key.artist())
            .bind(key.album())
            .execute(pool)
            .await?;
            Ok(result.rows_affected() > 0)
        })
        .await
    }

    async fn scan(&self) -> Result<Vec<NegativeCacheEntry>> {
        let rows: Vec<NegativeRow> = sqlx::query_as(
            "SELECT artist, album, written_at FROM negative_results ORDER BY norm_artist, norm_album",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(artist, album, written_at)| NegativeCacheEntry {
                artist,
                album,
                written_at,
            })
            .collect())
    }

    fn location(&self) -> &Path {
        &self.location
    }
}

// ============================================================================
// Pending verification
// ============================================================================

type PendingRow = (String, String, i64, String, DateTime<Utc>, DateTime<Utc>);

/// `pending_verification` table
#[derive(Clone)]
pub struct SqlitePendingRepository {
    pool: SqlitePool,
    location: PathBuf,
    max_lock_wait_ms: u64,
}

impl SqlitePendingRepository {
    pub fn new(pool: SqlitePool, db_path: Option<PathBuf>, max_lock_wait_ms: u64) -> Self {
        Self {
            pool,
            location: location_of(db_path),
            max_lock_wait_ms,
        }
    }

    fn from_row(row: PendingRow) -> PendingVerificationRecord {
        let (artist, album, attempts, last_error, first_seen_at, last_attempt_at) = row;
        PendingVerificationRecord {
            artist,
            album,
            attempt_count: attempts.max(0) as u32,
            last_error,
            first_seen_at,
            last_attempt_at,
        }
    }
}

#[async_trait]
impl Repository<PendingVerificationRecord> for SqlitePendingRepository {
    async fn get(&self, key: &AlbumKey) -> Result<Option<PendingVerificationRecord>> {
        let row: Option<PendingRow> = sqlx::query_as(
            "SELECT artist, album, attempts, last_error, first_seen, last_attempt \
             FROM pending_verification WHERE norm_artist = ? AND norm_album = ?",
        )
        .bind(key.artist())
        .bind(key.album())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Self::from_row))
    }

    async fn put(&self, record: &PendingVerificationRecord) -> Result<()> {
        let key = AlbumKey::new(&record.artist, &record.album);
        let pool = &self.pool;
        let key = &key;
        retry_on_lock("pending_verification put", self.max_lock_wait_ms, move || async move {
            sqlx::query(
                "INSERT OR REPLACE INTO pending_verification \
                 (norm_artist, norm_album, artist, album, attempts, last_error, first_seen, last_attempt) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(key.artist())
            .bind(key.album())
            .bind(&record.artist)
            .bind(&record.album)
            .bind(record.attempt_count as i64)
            .bind(&record.last_error)
            .bind(record.first_seen_at)
            .bind(record.last_attempt_at)
            .execute(pool)
            .await?;
            Ok(())
        })
        .await
    }

    async fn delete(&self, key: &AlbumKey) -> Result<bool> {
        let pool = &self.pool;
        retry_on_lock("pending_verification delete", self.max_lock_wait_ms, move || async move {
            let result = sqlx::query(
                "DELETE FROM pending_verification WHERE norm_artist = ? AND norm_album = ?",
            )
            .bind(key.artist())
            .bind(key.album())
            .execute(pool)
            .await?;
            Ok(result.rows_affected() > 0)
        })
        .await
    }

    async fn scan(&self) -> Result<Vec<PendingVerificationRecord>> {
        let rows: Vec<PendingRow> = sqlx::query_as(
            "SELECT artist, album, attempts, last_error, first_seen, last_attempt \
             FROM pending_verification ORDER BY first_seen, norm_artist, norm_album",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Self::from_row).collect())
    }

    fn location(&self) -> &Path {
        &self.location
    }
}
