use parking_lot::Mutex;
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};
use tracing::warn;

use crate::config::ResilienceConfig;

/// Retries a fallible async operation with linear backoff, treating
/// "model loading / cold start" errors as worth waiting longer for than
/// ordinary transient failures. Generalizes the retry loop conversation
/// turns already use around LLM calls so ingestion and reranking calls
/// can share it too.
pub async fn retry_with_backoff<F, Fut, T>(
    config: &ResilienceConfig,
    op_name: &'static str,
    mut op: F,
) -> anyhow::Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let max_retries = config.max_retries.max(1);

    for attempt in 1..=max_retries {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                let err_msg = e.to_string();
                let is_cold_start = err_msg.contains("Loading model")
                    || err_msg.contains("503")
                    || err_msg.contains("unavailable");

                if attempt < max_retries {
                    let base = if is_cold_start { config.cold_start_backoff_ms } else { config.base_backoff_ms };
                    let wait = Duration::from_millis(base * attempt as u64);
                    warn!(
                        "{} failed (attempt {}/{}): {}. Retrying in {:?}...",
                        op_name, attempt, max_retries, e, wait
                    );
                    tokio::time::sleep(wait).await;
                } else {
                    return Err(e.context(format!("{} failed after {} attempts", op_name, max_retries)));
                }
            }
        }
    }

    unreachable!()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

/// Closed/Open/Half-Open circuit breaker guarding a single flaky dependency
/// (e.g. the embedding or LLM endpoint during a cold start). Trips to `Open`
/// after a run of consecutive failures, refuses calls for a cooldown window,
/// then allows one probe through in `HalfOpen` before fully resetting.
pub struct CircuitBreaker {
    state: Mutex<BreakerState>,
    opened_at: Mutex<Option<Instant>>,
    consecutive_failures: AtomicU32,
    failure_threshold: u32,
    open_duration: Duration,
}

impl CircuitBreaker {
    pub fn new(config: &ResilienceConfig) -> Self {
        Self {
            state: Mutex::new(BreakerState::Closed),
            opened_at: Mutex::new(None),
            consecutive_failures: AtomicU32::new(0),
            failure_threshold: config.circuit_failure_threshold.max(1),
            open_duration: Duration::from_secs(config.circuit_open_duration_secs.max(1)),
        }
    }

    /// Returns true if a call should be allowed through right now. `Open`
    /// transitions to `HalfOpen` once the cooldown window has elapsed.
    pub fn allow_request(&self) -> bool {
        let mut state = self.state.lock();
        match *state {
            BreakerState::Closed | BreakerState::HalfOpen => true,
            BreakerState::Open => {
                let elapsed = self.opened_at.lock().map(|t| t.elapsed()).unwrap_or_default();
                if elapsed >= self.open_duration {
                    *state = BreakerState::HalfOpen;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::SeqCst);
        *self.state.lock() = BreakerState::Closed;
        *self.opened_at.lock() = None;
    }

    /// Returns true if this failure just tripped the breaker open.
    pub fn record_failure(&self) -> bool {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
        let mut state = self.state.lock();

        if matches!(*state, BreakerState::HalfOpen) || failures >= self.failure_threshold {
            *state = BreakerState::Open;
            *self.opened_at.lock() = Some(Instant::now());
            true
        } else {
            false
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(*self.state.lock(), BreakerState::Open)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32 as Counter, Ordering as Ord};

    fn test_config() -> ResilienceConfig {
        ResilienceConfig {
            max_retries: 3,
            base_backoff_ms: 1,
            cold_start_backoff_ms: 1,
            circuit_failure_threshold: 2,
            circuit_open_duration_secs: 1,
        }
    }

    #[tokio::test]
    async fn retries_until_success() {
        let calls = Counter::new(0);
        let result = retry_with_backoff(&test_config(), "test_op", || {
            let n = calls.fetch_add(1, Ord::SeqCst);
            async move {
                if n < 2 {
                    Err(anyhow::anyhow!("transient"))
                } else {
                    Ok(42)
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(result, 42);
        assert_eq!(calls.load(Ord::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let result: anyhow::Result<()> =
            retry_with_backoff(&test_config(), "test_op", || async { Err(anyhow::anyhow!("always fails")) }).await;
        assert!(result.is_err());
    }

    #[test]
    fn breaker_opens_after_threshold_failures() {
        let breaker = CircuitBreaker::new(&test_config());
        assert!(breaker.allow_request());
        assert!(!breaker.record_failure());
        assert!(breaker.record_failure());
        assert!(breaker.is_open());
        assert!(!breaker.allow_request());
    }

    #[test]
    fn breaker_resets_on_success() {
        let breaker = CircuitBreaker::new(&test_config());
        breaker.record_failure();
        breaker.record_success();
        assert!(!breaker.is_open());
    }
}
