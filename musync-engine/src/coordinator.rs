//! Per-album year resolution
//!
//! ```text
//! Abandoned? ──yes──▶ Done
//!     │
//! CacheLookup ──hit/negative──▶ Done
//!     │ miss
//! StandardSearch ──nonempty──▶ Score
//!     │ empty
//! AlternativeSearch (once) ──▶ Score | Negative | Pending
//!
//! Score ──▶ Decision{Apply, ApplyIfMissing, Pending}
//!       ──▶ WriteCache | EnqueuePending ──▶ Done
//! ```
//!
//! Provider failures never fail an album; only persistence errors
//! propagate out of [`YearResolutionCoordinator::resolve`].

use crate::cache::key::AlbumKey;
use crate::cache::{CacheLookup, CacheTier, TieredCache};
use crate::config::SyncConfig;
use crate::error::{ProviderError, SyncResult};
use crate::pending::PendingVerificationStore;
use crate::providers::SourceClient;
use crate::rate_limit::{LimiterRegistry, ProviderLimiter};
use crate::retry::{self, RetryBudget, RetryPolicy};
use crate::scoring::{Decision, DecisionPolicy, ReleaseScorer};
use crate::store::{AlbumCacheEntry, NegativeCacheEntry};
use crate::strategy::{SearchStrategy, SearchStrategySelector};
use crate::types::{AlbumQuery, CandidateRelease, Provider, ScoredRelease};
use chrono::Utc;
use futures::future::join_all;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::Instrument;

/// One album to resolve
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlbumRequest {
    pub artist: String,
    pub album: String,
}

impl AlbumRequest {
    pub fn new(artist: impl Into<String>, album: impl Into<String>) -> Self {
        Self {
            artist: artist.into(),
            album: album.into(),
        }
    }

    pub fn key(&self) -> AlbumKey {
        AlbumKey::new(&self.artist, &self.album)
    }
}

/// How the album ended up
#[derive(Debug, Clone, PartialEq)]
pub enum ResolutionOutcome {
    /// A year was chosen; `decision` says which entries receive it
    Resolved {
        year: i32,
        decision: Decision,
        score: i32,
        source: Provider,
        /// Set when the answer came from the cache instead of providers
        cached: Option<CacheTier>,
    },
    /// No provider knows the album
    Negative { cached: bool },
    /// Left unmodified and queued for another attempt
    Pending { attempts: u32, reason: String },
    /// Pending too many times; providers are no longer asked
    Abandoned { attempts: u32 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub key: AlbumKey,
    pub outcome: ResolutionOutcome,
    /// Strategy used for the alternative search, if one ran
    pub strategy: Option<SearchStrategy>,
    /// Requests sent to providers for this album, retries included
    pub provider_calls: u32,
}

impl Resolution {
    /// Year and decision to apply, if any
    pub fn year_to_apply(&self) -> Option<(i32, Decision)> {
        match &self.outcome {
            ResolutionOutcome::Resolved { year, decision, .. } => Some((*year, *decision)),
            _ => None,
        }
    }
}

struct ProviderHandle {
    client: Arc<dyn SourceClient>,
    limiter: Arc<ProviderLimiter>,
}

/// Candidates from one round of provider queries
struct SearchRound {
    candidates: Vec<CandidateRelease>,
    failures: usize,
    calls: u32,
}

pub struct YearResolutionCoordinator {
    providers: Vec<ProviderHandle>,
    scorer: ReleaseScorer,
    selector: SearchStrategySelector,
    policy: DecisionPolicy,
    cache: Arc<TieredCache>,
    pending: Arc<dyn PendingVerificationStore>,
    retry_policy: RetryPolicy,
    budget: Arc<RetryBudget>,
    max_pending_attempts: u32,
    total_calls: AtomicU64,
}

impl YearResolutionCoordinator {
    /// `clients` are queried in the order given; tie-breaks follow `provider_priority`
    pub fn new(
        clients: Vec<Arc<dyn SourceClient>>,
        cache: Arc<TieredCache>,
        pending: Arc<dyn PendingVerificationStore>,
        config: &SyncConfig,
    ) -> Self {
        let mut limiters = LimiterRegistry::from_config(config);
        let providers = clients
            .into_iter()
            .map(|client| ProviderHandle {
                limiter: limiters.get_or_default(client.provider()),
                client,
            })
            .collect();

        Self {
            providers,
            scorer: ReleaseScorer::new(&config.resolution, &config.provider_priority),
            selector: SearchStrategySelector::new(),
            policy: DecisionPolicy::from_config(&config.resolution),
            cache,
            pending,
            retry_policy: RetryPolicy::from_config(&config.retry),
            budget: Arc::new(RetryBudget::new(config.retry.run_rate_limit_retry_cap)),
            max_pending_attempts: config.resolution.max_pending_attempts,
            total_calls: AtomicU64::new(0),
        }
    }

    pub fn provider_count(&self) -> usize {
        self.providers.len()
    }

    /// Provider requests sent since construction
    pub fn total_provider_calls(&self) -> u64 {
        self.total_calls.load(Ordering::Relaxed)
    }

    pub fn policy(&self) -> &DecisionPolicy {
        &self.policy
    }

    pub async fn resolve(&self, request: &AlbumRequest) -> SyncResult<Resolution> {
        let span = tracing::info_span!("album", artist = %request.artist, album = %request.album);
        self.resolve_inner(request).instrument(span).await
    }

    async fn resolve_inner(&self, request: &AlbumRequest) -> SyncResult<Resolution> {
        let key = request.key();
        let pending = self.pending.get(&key).await?;

        if let Some(record) = &pending {
            if record.attempt_count >= self.max_pending_attempts {
                tracing::debug!(attempts = record.attempt_count, "Album abandoned, skipping providers");
                return Ok(Resolution {
                    key,
                    outcome: ResolutionOutcome::Abandoned {
                        attempts: record.attempt_count,
                    },
                    strategy: None,
                    provider_calls: 0,
                });
            }
        }

        match self.cache.lookup(&key).await? {
            CacheLookup::Hit { entry, tier } => {
                let decision = self.policy.decide(Some(entry.confidence));
                if decision != Decision::Pending {
                    if pending.is_some() {
                        self.pending.remove(&key).await?;
                    }
                    return Ok(Resolution {
                        key,
                        outcome: ResolutionOutcome::Resolved {
                            year: entry.year,
                            decision,
                            score: entry.confidence,
                            source: entry.source,
                            cached: Some(tier),
                        },
                        strategy: None,
                        provider_calls: 0,
                    });
                }
                // Below the current floor (thresholds were raised): drop it and ask again
                tracing::debug!(confidence = entry.confidence, "Cached year below floor, re-resolving");
                self.cache.invalidate(&key).await?;
            }
            CacheLookup::Negative(_) => {
                return Ok(Resolution {
                    key,
                    outcome: ResolutionOutcome::Negative { cached: true },
                    strategy: None,
                    provider_calls: 0,
                });
            }
            CacheLookup::Miss => {}
        }

        let standard = AlbumQuery::new(request.artist.as_str(), request.album.as_str());
        let mut round = self.search(&standard).await;
        let mut calls = round.calls;
        let mut failures = round.failures;
        let mut used_query = standard;
        let mut strategy = None;

        if round.candidates.is_empty() {
            let detected = self.selector.detect(&request.artist, &request.album);
            if let Some(alternative) = detected.query {
                tracing::info!(
                    strategy = %detected.strategy,
                    artist = %alternative.artist,
                    album = %alternative.album,
                    "Standard search empty, trying alternative query"
                );
                round = self.search(&alternative).await;
                calls += round.calls;
                failures += round.failures;
                used_query = alternative;
            }
            strategy = Some(detected.strategy);
        }

        let raw_count = round.candidates.len();
        let scored = self.scorer.score_all(&used_query, round.candidates);
        let best = self.scorer.select_best(scored);

        let outcome = self
            .decide(request, &key, best, raw_count, failures)
            .await?;
        Ok(Resolution {
            key,
            outcome,
            strategy,
            provider_calls: calls,
        })
    }

    async fn decide(
        &self,
        request: &AlbumRequest,
        key: &AlbumKey,
        best: Option<ScoredRelease>,
        raw_count: usize,
        failures: usize,
    ) -> SyncResult<ResolutionOutcome> {
        if raw_count == 0 && failures == 0 {
            self.cache
                .store_negative(NegativeCacheEntry {
                    artist: request.artist.clone(),
                    album: request.album.clone(),
                    written_at: Utc::now(),
                })
                .await?;
            self.pending.remove(key).await?;
            tracing::info!("No provider knows this album, negative result cached");
            return Ok(ResolutionOutcome::Negative { cached: false });
        }

        let reason = match &best {
            None if raw_count == 0 => format!("{} provider(s) failed and none returned candidates", failures),
            None => format!("{} candidate(s), none with a valid year", raw_count),
            Some(best) => format!("best score {} below {}", best.score, self.policy.low_threshold),
        };

        let decision = self.policy.decide(best.as_ref().map(|b| b.score));
        match (decision, best) {
            (Decision::Apply | Decision::ApplyIfMissing, Some(best)) => {
                self.cache
                    .store_year(AlbumCacheEntry {
                        artist: request.artist.clone(),
                        album: request.album.clone(),
                        year: best.resolved_year,
                        source: best.candidate.provider,
                        confidence: best.score,
                        written_at: Utc::now(),
                    })
                    .await?;
                self.pending.remove(key).await?;
                tracing::info!(
                    year = best.resolved_year,
                    score = best.score,
                    source = %best.candidate.provider,
                    decision = decision.as_str(),
                    "Album year resolved"
                );
                Ok(ResolutionOutcome::Resolved {
                    year: best.resolved_year,
                    decision,
                    score: best.score,
                    source: best.candidate.provider,
                    cached: None,
                })
            }
            _ => {
                let record = self
                    .pending
                    .mark_pending(&request.artist, &request.album, &reason)
                    .await?;
                Ok(ResolutionOutcome::Pending {
                    attempts: record.attempt_count,
                    reason,
                })
            }
        }
    }

    /// Query every provider concurrently; failures only remove that provider's results
    async fn search(&self, query: &AlbumQuery) -> SearchRound {
        let calls = self.providers.iter().map(|handle| self.query_provider(handle, query));
        let results = join_all(calls).await;

        let mut round = SearchRound {
            candidates: Vec::new(),
            failures: 0,
            calls: 0,
        };
        for (provider, attempted) in results {
            round.calls += attempted.attempts;
            match attempted.result {
                Ok(mut candidates) => round.candidates.append(&mut candidates),
                Err(ProviderError::NotFound) => {}
                Err(err) => {
                    round.failures += 1;
                    tracing::warn!(provider = %provider, error = %err, "Provider contribution dropped");
                }
            }
        }
        self.total_calls.fetch_add(u64::from(round.calls), Ordering::Relaxed);
        round
    }

    async fn query_provider(
        &self,
        handle: &ProviderHandle,
        query: &AlbumQuery,
    ) -> (Provider, retry::Attempted<Vec<CandidateRelease>>) {
        let provider = handle.client.provider();
        let client = &handle.client;
        let attempted = retry::execute(
            provider,
            &self.retry_policy,
            &self.budget,
            Some(handle.limiter.as_ref()),
            || client.query(query),
        )
        .await;
        tracing::debug!(
            provider = %provider,
            attempts = attempted.attempts,
            candidates = attempted.result.as_ref().map_or(0, Vec::len),
            "Provider queried"
        );
        (provider, attempted)
    }
}
