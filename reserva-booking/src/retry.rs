use std::future::Future;
use std::time::Duration;
use tracing::warn;

use reserva_store::BookingRules;

use crate::error::BookingError;

/// Bounded sequential retry with exponential backoff. Terminal errors
/// propagate on first occurrence; transient ones are retried until the
/// attempt cap, after which the last failure is wrapped in
/// [`BookingError::RetriesExhausted`].
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    pub fn from_rules(rules: &BookingRules) -> Self {
        Self::new(
            rules.retry_max_attempts,
            Duration::from_millis(rules.retry_base_delay_ms),
        )
    }

    /// Delay before attempt `k` (1-based): base_delay * 2^(k-2).
    fn delay_before(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.pow(attempt.saturating_sub(2))
    }

    pub async fn execute<T, F, Fut>(&self, mut op: F) -> Result<T, BookingError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, BookingError>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_terminal() => return Err(e),
                Err(e) => {
                    if attempt >= self.max_attempts {
                        return Err(BookingError::RetriesExhausted {
                            attempts: self.max_attempts,
                            source: Box::new(e),
                        });
                    }
                    attempt += 1;
                    let delay = self.delay_before(attempt);
                    warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "transient failure, retrying: {}",
                        e
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reserva_domain::StoreError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio::time::Instant;

    fn transient() -> BookingError {
        BookingError::Store(StoreError::Timeout)
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_on_third_attempt_with_doubling_delays() {
        let policy = RetryPolicy::default();
        let calls = Arc::new(AtomicU32::new(0));
        let started = Instant::now();

        let calls_in = calls.clone();
        let result = policy
            .execute(move || {
                let calls = calls_in.clone();
                async move {
                    let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                    if n < 3 {
                        Err(transient())
                    } else {
                        Ok(n)
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(result, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 100ms before attempt 2, 200ms before attempt 3.
        assert_eq!(started.elapsed(), Duration::from_millis(300));
    }

    #[tokio::test]
    async fn terminal_error_propagates_without_retry() {
        let policy = RetryPolicy::default();
        let calls = Arc::new(AtomicU32::new(0));

        let calls_in = calls.clone();
        let err = policy
            .execute(move || {
                let calls = calls_in.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(BookingError::Conflict { code: "RSV-000001".into() })
                }
            })
            .await
            .unwrap_err();

        assert!(matches!(err, BookingError::Conflict { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_wraps_last_transient_failure() {
        let policy = RetryPolicy::default();
        let calls = Arc::new(AtomicU32::new(0));

        let calls_in = calls.clone();
        let err = policy
            .execute(move || {
                let calls = calls_in.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(transient())
                }
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match err {
            BookingError::RetriesExhausted { attempts, source } => {
                assert_eq!(attempts, 3);
                assert!(matches!(*source, BookingError::Store(StoreError::Timeout)));
            }
            other => panic!("expected RetriesExhausted, got {:?}", other),
        }
    }
}
