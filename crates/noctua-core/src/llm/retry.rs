//! Retry with exponential backoff for transient model-layer failures.
//!
//! Transient errors are rate limits (HTTP 429) and the usual broken-network
//! markers. Everything else propagates immediately.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Message fragments that mark an error as transient. Matched
/// case-insensitively against the full error message.
const TRANSIENT_MARKERS: [&str; 7] = [
    "rate limit",
    "too many requests",
    "response failed",
    "network error",
    "timed out",
    "etimedout",
    "econnreset",
];

/// Errors that can report whether a retry is worthwhile.
pub trait IsRetryable {
    fn is_retryable(&self) -> bool;
}

/// HTTP status codes worth retrying at this layer.
pub fn is_retryable_status(status: u16) -> bool {
    status == 429
}

/// Check an error message against the transient markers.
pub fn message_is_transient(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    TRANSIENT_MARKERS.iter().any(|m| lower.contains(m))
}

/// Retry schedule: up to `max_attempts` tries, sleeping
/// `base_delay * 2^(attempt-1)` between them.
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryConfig {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    /// Delay to sleep after a failed `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt.saturating_sub(1))
    }
}

/// Run `op` until it succeeds, a non-transient error occurs, or
/// `config.max_attempts` is exhausted.
pub async fn with_backoff<T, E, F, Fut>(
    label: &str,
    config: RetryConfig,
    mut op: F,
) -> Result<T, E>
where
    E: IsRetryable + Display,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 1u32;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt < config.max_attempts => {
                let delay = config.delay_after(attempt);
                tracing::warn!(
                    label,
                    attempt,
                    max_attempts = config.max_attempts,
                    delay_secs = delay.as_secs(),
                    error = %err,
                    "transient failure, backing off"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => {
                if attempt > 1 {
                    tracing::error!(label, attempt, error = %err, "retries exhausted");
                }
                return Err(err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    struct TestError {
        message: String,
        transient: bool,
    }

    impl Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{}", self.message)
        }
    }

    impl IsRetryable for TestError {
        fn is_retryable(&self) -> bool {
            self.transient
        }
    }

    #[test]
    fn marker_classification() {
        assert!(message_is_transient("Rate limit exceeded, slow down"));
        assert!(message_is_transient("429 Too Many Requests"));
        assert!(message_is_transient("Response failed mid-stream"));
        assert!(message_is_transient("fetch: network error"));
        assert!(message_is_transient("request timed out after 60s"));
        assert!(message_is_transient("connect ETIMEDOUT 1.2.3.4:443"));
        assert!(message_is_transient("read ECONNRESET"));
        assert!(!message_is_transient("invalid schema"));
    }

    #[test]
    fn status_classification() {
        assert!(is_retryable_status(429));
        assert!(!is_retryable_status(400));
        assert!(!is_retryable_status(500));
    }

    #[test]
    fn delay_schedule_doubles() {
        let config = RetryConfig::new(3, Duration::from_secs(30));
        assert_eq!(config.delay_after(1), Duration::from_secs(30));
        assert_eq!(config.delay_after(2), Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_transient_until_success() {
        let calls = AtomicU32::new(0);
        let result = with_backoff(
            "test",
            RetryConfig::new(3, Duration::from_secs(30)),
            |_| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(TestError {
                            message: "rate limit".into(),
                            transient: true,
                        })
                    } else {
                        Ok(42)
                    }
                }
            },
        )
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_backoff(
            "test",
            RetryConfig::new(3, Duration::from_secs(30)),
            |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(TestError {
                        message: "timed out".into(),
                        transient: true,
                    })
                }
            },
        )
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn fatal_error_propagates_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_backoff(
            "test",
            RetryConfig::new(3, Duration::from_secs(30)),
            |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(TestError {
                        message: "bad request".into(),
                        transient: false,
                    })
                }
            },
        )
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
