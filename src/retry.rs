use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Bounded retry with a fixed delay between attempts.
///
/// The policy is an explicit value passed into the component that needs it;
/// the caller supplies the predicate deciding which errors are worth another
/// attempt. Everything else surfaces immediately.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// No retries at all; the operation runs exactly once.
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Run `op` until it succeeds, the predicate rejects the error, or the
    /// attempt budget is exhausted. The closure receives the 1-based attempt
    /// number so callers can report it.
    pub async fn run<T, E, F, Fut, P>(&self, label: &str, mut op: F, retryable: P) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        E: std::fmt::Display,
    {
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.max_attempts && retryable(&e) => {
                    warn!(
                        "{} failed (attempt {}/{}), retrying in {:.0}s: {}",
                        label,
                        attempt,
                        self.max_attempts,
                        self.delay.as_secs_f64(),
                        e
                    );
                    tokio::time::sleep(self.delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(5))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    struct FlakyError {
        transient: bool,
    }

    impl std::fmt::Display for FlakyError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "flaky (transient: {})", self.transient)
        }
    }

    #[tokio::test]
    async fn test_transient_failure_then_success() {
        let policy = RetryPolicy::new(3, Duration::ZERO);
        let calls = AtomicU32::new(0);

        let result: Result<u32, FlakyError> = policy
            .run(
                "op",
                |attempt| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async move {
                        if attempt == 1 {
                            Err(FlakyError { transient: true })
                        } else {
                            Ok(attempt)
                        }
                    }
                },
                |e| e.transient,
            )
            .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_fatal_error_is_not_retried() {
        let policy = RetryPolicy::new(3, Duration::ZERO);
        let calls = AtomicU32::new(0);

        let result: Result<(), FlakyError> = policy
            .run(
                "op",
                |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err(FlakyError { transient: false }) }
                },
                |e| e.transient,
            )
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_budget_exhaustion_returns_last_error() {
        let policy = RetryPolicy::new(3, Duration::ZERO);
        let calls = AtomicU32::new(0);

        let result: Result<(), FlakyError> = policy
            .run(
                "op",
                |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err(FlakyError { transient: true }) }
                },
                |e| e.transient,
            )
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
