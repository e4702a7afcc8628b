//! Retry and backoff for provider calls
//!
//! - Transient failures and timeouts: exponential backoff, bounded attempts.
//! - Rate-limit responses: wait (honouring `Retry-After`, capped) and retry
//!   without a per-call bound; a run-level [`RetryBudget`] caps the total.
//! - Everything else is returned to the caller on first occurrence.

use crate::config::RetryConfig;
use crate::error::ProviderError;
use crate::rate_limit::ProviderLimiter;
use crate::types::Provider;
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

/// Backoff parameters for one run
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub request_timeout: Duration,
    pub transient_max_attempts: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
    pub rate_limit_default_wait: Duration,
    pub rate_limit_max_wait: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            request_timeout: Duration::from_millis(config.request_timeout_ms),
            transient_max_attempts: config.transient_max_attempts.max(1),
            base_backoff: Duration::from_millis(config.base_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
            rate_limit_default_wait: Duration::from_millis(config.rate_limit_default_wait_ms),
            rate_limit_max_wait: Duration::from_millis(config.rate_limit_max_wait_ms),
        }
    }

    /// Delay after the `failures`-th transient failure (1-based)
    pub fn backoff_for(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(16);
        self.base_backoff
            .saturating_mul(1u32 << exponent)
            .min(self.max_backoff)
    }

    /// Wait before retrying a rate-limited call
    pub fn rate_limit_wait(&self, retry_after: Option<Duration>) -> Duration {
        retry_after
            .unwrap_or(self.rate_limit_default_wait)
            .min(self.rate_limit_max_wait)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

/// Run-wide allowance of rate-limit retries, shared by all providers
#[derive(Debug)]
pub struct RetryBudget {
    remaining: AtomicU32,
}

impl RetryBudget {
    pub fn new(cap: u32) -> Self {
        Self {
            remaining: AtomicU32::new(cap),
        }
    }

    /// Take one retry from the budget; false once it is spent
    pub fn try_consume(&self) -> bool {
        self.remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok()
    }

    pub fn remaining(&self) -> u32 {
        self.remaining.load(Ordering::Acquire)
    }
}

/// Result of a call together with how many requests it took
#[derive(Debug)]
pub struct Attempted<T> {
    pub result: Result<T, ProviderError>,
    pub attempts: u32,
}

/// Run `call` under the limiter, timeout and retry rules
///
/// Every attempt takes a fresh permit from `limiter`, so retries are
/// throttled the same as first attempts.
pub async fn execute<T, F, Fut>(
    provider: Provider,
    policy: &RetryPolicy,
    budget: &RetryBudget,
    limiter: Option<&ProviderLimiter>,
    mut call: F,
) -> Attempted<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let mut attempts = 0u32;
    let mut transient_failures = 0u32;

    loop {
        let permit = match limiter {
            Some(limiter) => match limiter.acquire().await {
                Ok(permit) => Some(permit),
                Err(err) => return Attempted { result: Err(err), attempts },
            },
            None => None,
        };

        attempts += 1;
        let result = match tokio::time::timeout(policy.request_timeout, call()).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout(policy.request_timeout)),
        };
        drop(permit);

        let err = match result {
            Ok(value) => return Attempted { result: Ok(value), attempts },
            Err(err) => err,
        };

        if err.is_transient() {
            transient_failures += 1;
            if transient_failures >= policy.transient_max_attempts {
                tracing::warn!(
                    provider = %provider,
                    attempts,
                    error = %err,
                    "Provider call failed after retries"
                );
                return Attempted { result: Err(err), attempts };
            }
            let delay = policy.backoff_for(transient_failures);
            tracing::debug!(
                provider = %provider,
                attempt = attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Transient provider failure, backing off"
            );
            tokio::time::sleep(delay).await;
            continue;
        }

        let retry_after = match err {
            ProviderError::RateLimited { retry_after } => retry_after,
            other => return Attempted { result: Err(other), attempts },
        };
        if !budget.try_consume() {
            tracing::warn!(
                provider = %provider,
                attempts,
                "Run-level rate limit retry cap reached"
            );
            return Attempted {
                result: Err(ProviderError::RateLimited { retry_after }),
                attempts,
            };
        }
        let wait = policy.rate_limit_wait(retry_after);
        tracing::info!(
            provider = %provider,
            wait_ms = wait.as_millis() as u64,
            "Rate limited by provider, waiting"
        );
        tokio::time::sleep(wait).await;
    }
}
