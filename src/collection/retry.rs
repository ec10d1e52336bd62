use crate::config::LoaderConfig;
use crate::error::Result;
use crate::telemetry;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Attempts per fetch, first try included
pub const MAX_FETCH_ATTEMPTS: u32 = 3;

/// Bounded exponential backoff: `base_delay * 2^(attempt - 1)`, no jitter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts in total, first try included
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Delay after failed attempt `attempt` (counted from 1)
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1u32 << exponent)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        LoaderConfig::default().into()
    }
}

impl From<LoaderConfig> for RetryPolicy {
    fn from(config: LoaderConfig) -> Self {
        Self::new(MAX_FETCH_ATTEMPTS, config.retry_delay)
    }
}

/// Run `operation` until it succeeds or `policy.max_attempts` is reached.
///
/// Every error is retried; classification is left to the caller. After each
/// failure except the last, `on_retry(&error, attempt)` is invoked before the
/// backoff sleep. The last error is returned unchanged.
pub async fn with_retry<T, F, Fut, O>(
    policy: RetryPolicy,
    operation_name: &str,
    mut operation: F,
    mut on_retry: O,
) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
    O: FnMut(&crate::error::Error, u32),
{
    let mut attempt = 1;
    loop {
        telemetry::record_fetch_attempt(operation_name);
        match operation(attempt).await {
            Ok(result) => return Ok(result),
            Err(e) => {
                telemetry::record_fetch_failure(operation_name, e.is_retryable());
                if attempt >= policy.max_attempts {
                    return Err(e);
                }

                warn!(
                    "{} failed (attempt {}/{}): {}",
                    operation_name, attempt, policy.max_attempts, e
                );
                on_retry(&e, attempt);

                tokio::time::sleep(policy.delay_after(attempt)).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1000));
        assert_eq!(policy.delay_after(1), Duration::from_millis(1000));
        assert_eq!(policy.delay_after(2), Duration::from_millis(2000));
        assert_eq!(policy.delay_after(3), Duration::from_millis(4000));
    }

    #[test]
    fn test_configured_policy_keeps_three_attempts() {
        let policy = RetryPolicy::from(LoaderConfig {
            retry_delay: Duration::from_millis(250),
        });
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.base_delay, Duration::from_millis(250));
    }

    #[test]
    fn test_zero_attempts_clamped_to_one() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_failing_operation_gives_up_after_cap() {
        let calls = AtomicU32::new(0);
        let mut observed = Vec::new();
        let started = tokio::time::Instant::now();

        let result: Result<()> = with_retry(
            RetryPolicy::new(3, Duration::from_millis(1000)),
            "test_fetch",
            |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(Error::network("connection refused")) }
            },
            |_, attempt| observed.push(attempt),
        )
        .await;

        assert!(matches!(result, Err(Error::Network { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(observed, vec![1, 2]);
        // 1s after the first failure, 2s after the second, none after the last
        let waited = started.elapsed();
        assert!(waited >= Duration::from_millis(3000), "waited {:?}", waited);
        assert!(waited < Duration::from_millis(3100), "waited {:?}", waited);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_on_later_attempt() {
        let result = with_retry(
            RetryPolicy::new(3, Duration::from_millis(10)),
            "test_fetch",
            |attempt| async move {
                if attempt < 2 {
                    Err(Error::Timeout { timeout_ms: 10 })
                } else {
                    Ok(attempt)
                }
            },
            |_, _| {},
        )
        .await;

        assert_eq!(result.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_permanent_errors_still_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_retry(
            RetryPolicy::new(3, Duration::ZERO),
            "test_fetch",
            |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(Error::NotConfigured {
                        service: "ALCHEMY_API_KEY",
                    })
                }
            },
            |_, _| {},
        )
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
