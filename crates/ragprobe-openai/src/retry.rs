//! Retry policy for transient service failures

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

use ragprobe_core::{Error, Result};

/// How often, and how patiently, a request is retried
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Total attempts, the first one included
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(8),
        }
    }
}

impl RetryConfig {
    /// A single attempt, no retries
    pub fn disabled() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Only timeouts and network failures are retried. Authentication
    /// failures and rejected requests fail on the first attempt.
    pub fn should_retry(&self, error: &Error, attempt: u32) -> bool {
        attempt < self.max_attempts && matches!(error, Error::Timeout(_) | Error::Network(_))
    }

    /// Delay after failed attempt `attempt` (1-based): doubles each time up to `max_backoff`
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff.saturating_mul(factor).min(self.max_backoff)
    }
}

/// Run `op` until it succeeds, fails permanently, or runs out of attempts
pub(crate) async fn retrying<T, F, Fut>(policy: &RetryConfig, what: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Err(e) if policy.should_retry(&e, attempt) => {
                let backoff = policy.backoff(attempt);
                warn!(what, attempt, backoff_ms = backoff.as_millis() as u64, "retrying: {}", e);
                sleep(backoff).await;
                attempt += 1;
            }
            result => return result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn quick(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
        }
    }

    #[test]
    fn test_backoff_doubles_up_to_cap() {
        let policy = RetryConfig::default();
        assert_eq!(policy.backoff(1), Duration::from_millis(500));
        assert_eq!(policy.backoff(2), Duration::from_secs(1));
        assert_eq!(policy.backoff(3), Duration::from_secs(2));
        assert_eq!(policy.backoff(6), Duration::from_secs(8));
        assert_eq!(policy.backoff(40), Duration::from_secs(8));
    }

    #[test]
    fn test_only_transient_errors_retry() {
        let policy = RetryConfig::default();
        assert!(policy.should_retry(&Error::Timeout("t".into()), 1));
        assert!(policy.should_retry(&Error::Network("n".into()), 2));
        assert!(!policy.should_retry(&Error::Network("n".into()), 3));
        assert!(!policy.should_retry(&Error::Authentication("a".into()), 1));
        assert!(!policy.should_retry(&Error::Generation("g".into()), 1));
        assert!(!RetryConfig::disabled().should_retry(&Error::Timeout("t".into()), 1));
    }

    #[tokio::test]
    async fn test_retrying_recovers_from_transient_failures() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result = retrying(&quick(3), "chat", move || async move {
            match calls.fetch_add(1, Ordering::SeqCst) {
                0 => Err(Error::Timeout("slow".into())),
                1 => Err(Error::Network("reset".into())),
                _ => Ok("done"),
            }
        })
        .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retrying_gives_up() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<()> = retrying(&quick(2), "chat", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::Network("down".into()))
        })
        .await;
        assert!(matches!(result, Err(Error::Network(_))));
        assert_eq!(counter.load(Ordering::SeqCst), 2);

        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<()> = retrying(&quick(3), "chat", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::Authentication("bad key".into()))
        })
        .await;
        assert!(matches!(result, Err(Error::Authentication(_))));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
