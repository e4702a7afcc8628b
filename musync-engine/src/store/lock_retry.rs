//! Retry on SQLite lock contention
//!
//! A scheduled run and a manual invocation may write the same cache
//! database. SQLite serialises writers with its own file locks; the loser
//! sees "database is locked" and waits here.

use musync_common::{Error, Result};
use std::future::Future;
use std::time::{Duration, Instant};

const FIRST_DELAY: Duration = Duration::from_millis(10);
const DELAY_CEILING: Duration = Duration::from_millis(1000);

/// Doubling delays from [`FIRST_DELAY`] up to [`DELAY_CEILING`]
struct LockBackoff {
    next: Duration,
}

impl Iterator for LockBackoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        let current = self.next;
        self.next = (current * 2).min(DELAY_CEILING);
        Some(current)
    }
}

/// Run `operation`, re-running it while the database reports lock contention
///
/// Gives up with `Error::Internal` once `max_wait_ms` has passed. Any other
/// error is returned as is.
pub async fn retry_on_lock<F, Fut, T>(label: &str, max_wait_ms: u64, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let deadline = Duration::from_millis(max_wait_ms);
    let started = Instant::now();
    let mut delays = LockBackoff { next: FIRST_DELAY };
    let mut tries = 0u32;

    loop {
        tries += 1;
        let err = match operation().await {
            Ok(value) => {
                if tries > 1 {
                    tracing::debug!(label, tries, "Write went through after lock wait");
                }
                return Ok(value);
            }
            Err(err) if err.is_lock_contention() => err,
            Err(err) => return Err(err),
        };

        let waited = started.elapsed();
        if waited >= deadline {
            tracing::error!(label, tries, waited_ms = waited.as_millis() as u64, error = %err, "Gave up waiting for database lock");
            return Err(Error::Internal(format!(
                "{}: database still locked after {} tries over {} ms",
                label,
                tries,
                waited.as_millis()
            )));
        }

        let delay = delays.next().unwrap_or(DELAY_CEILING);
        tracing::warn!(label, tries, delay_ms = delay.as_millis() as u64, "Database locked");
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_backoff_doubles_to_ceiling() {
        let delays: Vec<u64> = LockBackoff { next: FIRST_DELAY }
            .take(9)
            .map(|d| d.as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![10, 20, 40, 80, 160, 320, 640, 1000, 1000]);
    }

    #[tokio::test]
    async fn test_value_passed_through() {
        let calls = AtomicU32::new(0);
        let result = retry_on_lock("put", 100, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, Error>(7)
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_other_errors_returned_at_once() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = retry_on_lock("put", 1000, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::InvalidInput("bad row".into()))
        })
        .await;

        assert!(matches!(result, Err(Error::InvalidInput(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
