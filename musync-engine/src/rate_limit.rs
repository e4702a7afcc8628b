//! Per-provider request throttling
//!
//! Each provider gets a token bucket (`governor`) for its request rate and
//! a semaphore for the number of requests in flight. Both are shared by
//! every album resolved in the run, so the per-provider totals stay bounded
//! no matter how many albums run concurrently.

use crate::config::{ProviderSettings, SyncConfig};
use crate::error::ProviderError;
use crate::types::Provider;
use governor::{Quota, RateLimiter};
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

type DirectLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Token bucket plus in-flight cap for one provider
pub struct ProviderLimiter {
    provider: Provider,
    bucket: DirectLimiter,
    in_flight: Arc<Semaphore>,
    max_in_flight: usize,
}

/// Held for the duration of one outbound request
pub struct RequestPermit {
    _slot: OwnedSemaphorePermit,
}

impl ProviderLimiter {
    pub fn new(provider: Provider, settings: &ProviderSettings) -> Self {
        let burst = NonZeroU32::new(settings.burst.max(1)).unwrap_or(NonZeroU32::MIN);
        // Zero interval means "unthrottled"; governor needs a non-zero period
        let period = settings.min_interval().max(Duration::from_nanos(1));
        let quota = Quota::with_period(period)
            .unwrap_or_else(|| Quota::per_second(NonZeroU32::MIN))
            .allow_burst(burst);

        let max_in_flight = settings.max_in_flight.max(1);
        Self {
            provider,
            bucket: RateLimiter::direct(quota),
            in_flight: Arc::new(Semaphore::new(max_in_flight)),
            max_in_flight,
        }
    }

    pub fn provider(&self) -> Provider {
        self.provider
    }

    /// Wait for an in-flight slot, then for a token
    ///
    /// The slot is taken first so that waiting requests do not drain the
    /// bucket while they queue for a slot.
    pub async fn acquire(&self) -> Result<RequestPermit, ProviderError> {
        let slot = self
            .in_flight
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ProviderError::Transient(format!("{} limiter closed", self.provider)))?;
        self.bucket.until_ready().await;
        tracing::trace!(provider = %self.provider, "Request permit granted");
        Ok(RequestPermit { _slot: slot })
    }

    /// Requests currently holding a permit
    pub fn in_flight(&self) -> usize {
        self.max_in_flight - self.in_flight.available_permits()
    }
}

/// Limiters for every enabled provider, built once per run
#[derive(Clone, Default)]
pub struct LimiterRegistry {
    limiters: HashMap<Provider, Arc<ProviderLimiter>>,
}

impl LimiterRegistry {
    pub fn from_config(config: &SyncConfig) -> Self {
        let mut registry = Self::default();
        for provider in config.enabled_providers() {
            registry.insert(provider, &config.providers.settings_for(provider));
        }
        registry
    }

    pub fn insert(&mut self, provider: Provider, settings: &ProviderSettings) -> Arc<ProviderLimiter> {
        let limiter = Arc::new(ProviderLimiter::new(provider, settings));
        tracing::debug!(
            provider = %provider,
            min_interval_ms = settings.min_interval_ms,
            burst = settings.burst,
            max_in_flight = settings.max_in_flight,
            "Rate limiter configured"
        );
        self.limiters.insert(provider, limiter.clone());
        limiter
    }

    pub fn get(&self, provider: Provider) -> Option<Arc<ProviderLimiter>> {
        self.limiters.get(&provider).cloned()
    }

    /// Limiter for `provider`, created from its default settings if absent
    pub fn get_or_default(&mut self, provider: Provider) -> Arc<ProviderLimiter> {
        match self.get(provider) {
            Some(limiter) => limiter,
            None => self.insert(provider, &ProviderSettings::defaults_for(provider)),
        }
    }
}
