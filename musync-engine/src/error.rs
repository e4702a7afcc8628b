//! Error types for musync-engine
//!
//! Two layers:
//! - [`ProviderError`]: failures of a single provider call. Always isolated to
//!   that provider for the album being resolved.
//! - [`SyncError`]: run-level failures. Only persistence failures are fatal;
//!   a corrupt snapshot is discarded and forces a full rescan.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Failure of one provider query
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ProviderError {
    /// Connection reset, DNS failure, 5xx. Retried with backoff.
    #[error("Network error: {0}")]
    Transient(String),

    /// Per-request timeout elapsed; the call was cancelled
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// Provider asked us to slow down
    #[error("Rate limited by provider (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    /// Provider has nothing for this query. Terminal, not a failure.
    #[error("Not found")]
    NotFound,

    /// Unexpected status or undecodable body
    #[error("Malformed response: {0}")]
    Malformed(String),
}

impl ProviderError {
    /// Transient failures and timeouts share the capped backoff budget
    pub fn is_transient(&self) -> bool {
        matches!(self, ProviderError::Transient(_) | ProviderError::Timeout(_))
    }
}

/// Run-level error
#[derive(Debug, Error)]
pub enum SyncError {
    /// Snapshot file failed header, digest or payload validation
    #[error("Snapshot integrity check failed for {path}: {reason}")]
    SnapshotIntegrity { path: PathBuf, reason: String },

    /// Cache, queue or snapshot storage could not be read or written
    #[error("Persistence failure at {path}: {source}")]
    Persistence {
        path: PathBuf,
        #[source]
        source: musync_common::Error,
    },

    /// Library accessor failed
    #[error("Library accessor error: {0}")]
    Library(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Candidate or record failed validation
    #[error("Validation error: {0}")]
    Validation(String),

    /// Operator interrupted the run
    #[error("Run cancelled")]
    Cancelled,
}

impl SyncError {
    pub fn persistence(path: impl Into<PathBuf>, source: impl Into<musync_common::Error>) -> Self {
        SyncError::Persistence {
            path: path.into(),
            source: source.into(),
        }
    }

    /// Errors that abort the run with a non-zero exit
    pub fn is_run_fatal(&self) -> bool {
        matches!(
            self,
            SyncError::Persistence { .. } | SyncError::Library(_) | SyncError::Config(_)
        )
    }
}

impl From<musync_common::Error> for SyncError {
    fn from(err: musync_common::Error) -> Self {
        match err {
            musync_common::Error::Config(msg) => SyncError::Config(msg),
            musync_common::Error::InvalidInput(msg) => SyncError::Validation(msg),
            other => SyncError::Persistence {
                path: PathBuf::new(),
                source: other,
            },
        }
    }
}

/// Result type for engine operations
pub type SyncResult<T> = Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(ProviderError::Transient("reset".into()).is_transient());
        assert!(ProviderError::Timeout(Duration::from_secs(1)).is_transient());
        assert!(!ProviderError::NotFound.is_transient());
        assert!(!ProviderError::RateLimited { retry_after: None }.is_transient());
        assert!(!ProviderError::Malformed("bad json".into()).is_transient());
    }

    #[test]
    fn test_only_storage_and_library_errors_are_fatal() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        assert!(SyncError::persistence("/tmp/cache.db", io).is_run_fatal());
        assert!(SyncError::Library("gone".into()).is_run_fatal());
        assert!(!SyncError::SnapshotIntegrity {
            path: "/tmp/snap".into(),
            reason: "digest".into()
        }
        .is_run_fatal());
        assert!(!SyncError::Validation("year".into()).is_run_fatal());
    }

    #[test]
    fn test_persistence_message_names_path() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        let err = SyncError::persistence("/data/musync.db", io);
        assert!(err.to_string().contains("/data/musync.db"));
    }
}
