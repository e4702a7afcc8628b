//! Engine configuration
//!
//! One TOML file (`musync.toml`) holds bootstrap values (root folder,
//! logging) and every tunable the engine consumes. All fields have
//! built-in defaults, so a missing file or a partial table is fine.
//!
//! ```toml
//! provider_priority = ["musicbrainz", "discogs", "itunes"]
//!
//! [resolution]
//! high_confidence_threshold = 70
//! low_confidence_threshold = 30
//!
//! [providers.discogs]
//! token = "..."
//! ```

use crate::types::Provider;
use musync_common::config::{load_toml, LoggingConfig};
use musync_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming the config file
pub const CONFIG_ENV_VAR: &str = "MUSYNC_CONFIG";

/// Environment variable overriding the root folder
pub const ROOT_FOLDER_ENV_VAR: &str = "MUSYNC_ROOT_FOLDER";

/// Complete engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Folder holding the cache database and snapshot file
    pub root_folder: Option<PathBuf>,
    pub logging: LoggingConfig,
    pub resolution: ResolutionConfig,
    pub cache: CacheConfig,
    pub snapshot: SnapshotConfig,
    pub retry: RetryConfig,
    pub providers: ProvidersConfig,
    /// Tie-break order when two providers' best candidates score equally
    pub provider_priority: Vec<Provider>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            root_folder: None,
            logging: LoggingConfig::default(),
            resolution: ResolutionConfig::default(),
            cache: CacheConfig::default(),
            snapshot: SnapshotConfig::default(),
            retry: RetryConfig::default(),
            providers: ProvidersConfig::default(),
            provider_priority: Provider::ALL.to_vec(),
        }
    }
}

/// Scoring thresholds and album batching
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolutionConfig {
    /// Score at or above which a year overwrites an existing one
    pub high_confidence_threshold: i32,
    /// Score at or above which a year fills a missing one
    pub low_confidence_threshold: i32,
    /// Reissue vs. original year gap that switches to the original year
    pub reissue_year_threshold: u32,
    /// Albums per batch between cancellation checks
    pub batch_size: usize,
    /// Albums resolved concurrently inside a batch
    pub album_concurrency: usize,
    /// Pending albums stop being re-queried after this many attempts
    pub max_pending_attempts: u32,
    /// Earliest plausible release year
    pub min_year: i32,
    /// Latest plausible release year, relative to the current year
    pub max_years_ahead: i32,
    /// Countries that earn the major-market bonus
    pub major_markets: Vec<String>,
}

impl Default for ResolutionConfig {
    fn default() -> Self {
        Self {
            high_confidence_threshold: 70,
            low_confidence_threshold: 30,
            reissue_year_threshold: 5,
            batch_size: 50,
            album_concurrency: 4,
            max_pending_attempts: 5,
            min_year: 1900,
            max_years_ahead: 2,
            major_markets: ["US", "GB", "XW", "XE", "JP", "DE", "FR", "CA", "AU"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// Cache tier lifetimes and database location
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// In-process tier lifetime
    pub memory_ttl_secs: u64,
    /// Album-year entries expire after this many days; unset means never
    pub album_ttl_days: Option<u64>,
    /// Negative entries expire after this many days
    pub negative_ttl_days: u64,
    /// SQLite file name inside the root folder
    pub database_file: String,
    /// Max total wait on a locked database before failing
    pub max_lock_wait_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            memory_ttl_secs: 600,
            album_ttl_days: None,
            negative_ttl_days: 21,
            database_file: "musync.db".to_string(),
            max_lock_wait_ms: 5000,
        }
    }
}

impl CacheConfig {
    pub fn memory_ttl(&self) -> Duration {
        Duration::from_secs(self.memory_ttl_secs)
    }

    pub fn album_ttl(&self) -> Option<Duration> {
        self.album_ttl_days.map(days)
    }

    pub fn negative_ttl(&self) -> Duration {
        days(self.negative_ttl_days)
    }
}

/// Snapshot validity
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    pub max_age_hours: u64,
    /// Snapshot file name inside the root folder
    pub file_name: String,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            max_age_hours: 24,
            file_name: "library_snapshot.snap".to_string(),
        }
    }
}

impl SnapshotConfig {
    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_hours.saturating_mul(3600))
    }
}

/// Retry and backoff
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Per-request timeout; expiry counts as a transient failure
    pub request_timeout_ms: u64,
    /// Attempts (including the first) for transient failures
    pub transient_max_attempts: u32,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
    /// Wait used when a rate-limit response carries no Retry-After
    pub rate_limit_default_wait_ms: u64,
    /// Cap on any single rate-limit wait
    pub rate_limit_max_wait_ms: u64,
    /// Total rate-limit retries allowed across one run
    pub run_rate_limit_retry_cap: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: 15_000,
            transient_max_attempts: 3,
            base_backoff_ms: 500,
            max_backoff_ms: 8_000,
            rate_limit_default_wait_ms: 5_000,
            rate_limit_max_wait_ms: 60_000,
            run_rate_limit_retry_cap: 200,
        }
    }
}

/// `[providers.*]` tables
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    pub musicbrainz: ProviderOverrides,
    pub discogs: ProviderOverrides,
    pub itunes: ProviderOverrides,
}

impl ProvidersConfig {
    /// Built-in defaults for `provider` merged with any configured overrides
    pub fn settings_for(&self, provider: Provider) -> ProviderSettings {
        let overrides = match provider {
            Provider::MusicBrainz => &self.musicbrainz,
            Provider::Discogs => &self.discogs,
            Provider::ITunes => &self.itunes,
        };
        overrides.apply(ProviderSettings::defaults_for(provider))
    }
}

/// Optional per-provider overrides as written in TOML
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderOverrides {
    pub enabled: Option<bool>,
    pub base_url: Option<String>,
    pub min_interval_ms: Option<u64>,
    pub burst: Option<u32>,
    pub max_in_flight: Option<usize>,
    pub token: Option<String>,
    pub user_agent: Option<String>,
}

impl ProviderOverrides {
    fn apply(&self, mut settings: ProviderSettings) -> ProviderSettings {
        if let Some(enabled) = self.enabled {
            settings.enabled = enabled;
        }
        if let Some(url) = &self.base_url {
            settings.base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(interval) = self.min_interval_ms {
            settings.min_interval_ms = interval;
        }
        if let Some(burst) = self.burst {
            settings.burst = burst;
        }
        if let Some(max) = self.max_in_flight {
            settings.max_in_flight = max;
        }
        if self.token.is_some() {
            settings.token = self.token.clone();
        }
        if let Some(agent) = &self.user_agent {
            settings.user_agent = agent.clone();
        }
        settings
    }
}

/// Effective settings for one provider
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderSettings {
    pub enabled: bool,
    pub base_url: String,
    /// Token bucket refill interval (one request per interval)
    pub min_interval_ms: u64,
    pub burst: u32,
    /// In-flight requests to this provider across all albums
    pub max_in_flight: usize,
    pub token: Option<String>,
    pub user_agent: String,
}

impl ProviderSettings {
    pub fn defaults_for(provider: Provider) -> Self {
        let user_agent = default_user_agent();
        match provider {
            // MusicBrainz terms: 1 request per second, no bursts
            Provider::MusicBrainz => Self {
                enabled: true,
                base_url: "https://musicbrainz.org/ws/2".to_string(),
                min_interval_ms: 1000,
                burst: 1,
                max_in_flight: 1,
                token: None,
                user_agent,
            },
            // 60 req/min authenticated
            Provider::Discogs => Self {
                enabled: true,
                base_url: "https://api.discogs.com".to_string(),
                min_interval_ms: 1000,
                burst: 5,
                max_in_flight: 2,
                token: None,
                user_agent,
            },
            Provider::ITunes => Self {
                enabled: true,
                base_url: "https://itunes.apple.com".to_string(),
                min_interval_ms: 3000,
                burst: 3,
                max_in_flight: 2,
                token: None,
                user_agent,
            },
        }
    }

    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }
}

/// Standard user-agent for outbound requests
pub fn default_user_agent() -> String {
    format!(
        "musync/{} ( https://github.com/musync/musync )",
        env!("CARGO_PKG_VERSION")
    )
}

fn days(n: u64) -> Duration {
    Duration::from_secs(n.saturating_mul(24 * 3600))
}

impl SyncConfig {
    /// Load from `path`, or built-in defaults when no file applies
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => {
                let config: SyncConfig = load_toml(path)?;
                tracing::info!(path = %path.display(), "Configuration loaded");
                config
            }
            None => {
                tracing::warn!("No configuration file found, using built-in defaults");
                SyncConfig::default()
            }
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject inconsistent values before anything runs
    pub fn validate(&self) -> Result<()> {
        let r = &self.resolution;
        if r.low_confidence_threshold >= r.high_confidence_threshold {
            return Err(Error::Config(format!(
                "low_confidence_threshold ({}) must be below high_confidence_threshold ({})",
                r.low_confidence_threshold, r.high_confidence_threshold
            )));
        }
        if r.batch_size == 0 || r.album_concurrency == 0 {
            return Err(Error::Config(
                "batch_size and album_concurrency must be at least 1".to_string(),
            ));
        }
        if r.min_year > musync_common::time::current_year() {
            return Err(Error::Config(format!("min_year {} is in the future", r.min_year)));
        }
        if r.max_years_ahead < 0 {
            return Err(Error::Config("max_years_ahead must not be negative".to_string()));
        }

        if self.provider_priority.is_empty() {
            return Err(Error::Config("provider_priority must not be empty".to_string()));
        }
        let mut seen = HashSet::new();
        for provider in &self.provider_priority {
            if !seen.insert(provider) {
                return Err(Error::Config(format!(
                    "provider '{}' listed twice in provider_priority",
                    provider
                )));
            }
        }

        for provider in Provider::ALL {
            let settings = self.providers.settings_for(provider);
            if settings.burst == 0 || settings.max_in_flight == 0 {
                return Err(Error::Config(format!(
                    "provider '{}': burst and max_in_flight must be at least 1",
                    provider
                )));
            }
        }

        if self.retry.transient_max_attempts == 0 {
            return Err(Error::Config(
                "transient_max_attempts must be at least 1".to_string(),
            ));
        }
        if self.retry.base_backoff_ms > self.retry.max_backoff_ms {
            return Err(Error::Config(
                "base_backoff_ms must not exceed max_backoff_ms".to_string(),
            ));
        }

        Ok(())
    }

    /// Providers that are enabled, in priority order (unlisted ones last)
    pub fn enabled_providers(&self) -> Vec<Provider> {
        let mut ordered: Vec<Provider> = self.provider_priority.clone();
        for provider in Provider::ALL {
            if !ordered.contains(&provider) {
                ordered.push(provider);
            }
        }
        ordered
            .into_iter()
            .filter(|p| self.providers.settings_for(*p).enabled)
            .collect()
    }

    pub fn database_path(&self, root_folder: &Path) -> PathBuf {
        root_folder.join(&self.cache.database_file)
    }

    pub fn snapshot_path(&self, root_folder: &Path) -> PathBuf {
        root_folder.join(&self.snapshot.file_name)
    }
}
