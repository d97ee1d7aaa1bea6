//! Bounded retries for inventory API calls and the ingestion backoff schedule.

use anyhow::Result;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::error::AsmError;

/// Default attempts per API call
pub const DEFAULT_MAX_TRIES: u32 = 5;

/// Call `op` up to `max_tries` times, returning the first success.
///
/// Every error is logged and retried immediately. Returns `None` once the
/// budget is spent; no call is made past that point.
pub async fn try_multiple_times<T, F, Fut>(max_tries: u32, mut op: F) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    for attempt in 1..=max_tries {
        match op().await {
            Ok(value) => return Some(value),
            Err(e) => warn!("Attempt {}/{} failed: {:#}", attempt, max_tries, e),
        }
    }
    None
}

/// Like [`try_multiple_times`], but turns exhaustion into an error so the
/// caller can abort the run with `?`.
pub async fn with_retries<T, F, Fut>(max_tries: u32, operation: &str, op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    try_multiple_times(max_tries, op).await.ok_or_else(|| {
        AsmError::RetriesExhausted {
            operation: operation.to_string(),
            tries: max_tries,
        }
        .into()
    })
}

/// Exponential backoff schedule: yields sleep durations starting at `initial`,
/// doubling each step with every step capped at `max_delay`, until the sum of
/// yielded delays reaches `max_total`.
#[derive(Debug, Clone)]
pub struct Backoff {
    next_delay: Duration,
    max_delay: Duration,
    elapsed: Duration,
    max_total: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max_delay: Duration, max_total: Duration) -> Self {
        Self {
            next_delay: initial.min(max_delay),
            max_delay,
            elapsed: Duration::ZERO,
            max_total,
        }
    }

    /// Time already spent waiting
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Time left before the overall cap is reached
    pub fn remaining(&self) -> Duration {
        self.max_total.saturating_sub(self.elapsed)
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(
            Duration::from_secs(1),
            Duration::from_secs(514),
            Duration::from_secs(7200),
        )
    }
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        if self.elapsed >= self.max_total {
            return None;
        }
        let delay = self.next_delay;
        self.elapsed += delay;
        self.next_delay = (delay * 2).min(self.max_delay);
        Some(delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[tokio::test]
    async fn test_succeeds_after_failures() {
        let calls = Cell::new(0u32);
        let result = try_multiple_times(5, || {
            calls.set(calls.get() + 1);
            let n = calls.get();
            async move {
                if n < 3 {
                    anyhow::bail!("transient failure {}", n)
                }
                Ok(n)
            }
        })
        .await;

        assert_eq!(result, Some(3));
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test]
    async fn test_exhausted_returns_none_and_stops() {
        let calls = Cell::new(0u32);
        let result: Option<()> = try_multiple_times(4, || {
            calls.set(calls.get() + 1);
            async { anyhow::bail!("always down") }
        })
        .await;

        assert!(result.is_none());
        assert_eq!(calls.get(), 4);
    }

    #[tokio::test]
    async fn test_first_success_makes_single_call() {
        let calls = Cell::new(0u32);
        let result = try_multiple_times(5, || {
            calls.set(calls.get() + 1);
            async { Ok("ok") }
        })
        .await;
        assert_eq!(result, Some("ok"));
        assert_eq!(calls.get(), 1);
    }

    #[tokio::test]
    async fn test_with_retries_maps_exhaustion() {
        let err = with_retries(2, "add ip", || async { Err::<(), _>(anyhow::anyhow!("503")) })
            .await
            .unwrap_err();
        match err.downcast_ref::<AsmError>() {
            Some(AsmError::RetriesExhausted { operation, tries }) => {
                assert_eq!(operation, "add ip");
                assert_eq!(*tries, 2);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_default_backoff_schedule() {
        let delays: Vec<u64> = Backoff::default().map(|d| d.as_secs()).collect();

        assert_eq!(&delays[..11], &[1, 2, 4, 8, 16, 32, 64, 128, 256, 512, 514]);
        assert!(delays[10..].iter().all(|&d| d == 514));
        // Stops once the overall cap is reached
        let total: u64 = delays.iter().sum();
        assert!(total >= 7200);
        assert!(total - delays.last().unwrap() < 7200);
    }

    #[test]
    fn test_backoff_remaining() {
        let mut backoff = Backoff::new(
            Duration::from_secs(1),
            Duration::from_secs(4),
            Duration::from_secs(10),
        );
        assert_eq!(backoff.remaining(), Duration::from_secs(10));
        backoff.next();
        backoff.next();
        assert_eq!(backoff.elapsed(), Duration::from_secs(3));
        assert_eq!(backoff.remaining(), Duration::from_secs(7));
        let rest: Vec<u64> = backoff.map(|d| d.as_secs()).collect();
        assert_eq!(rest, vec![4, 4]);
    }

    #[test]
    fn test_backoff_zero_total_yields_nothing() {
        let mut backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(1), Duration::ZERO);
        assert!(backoff.next().is_none());
    }
}
