//! Retry with exponential backoff for outbound calls
//!
//! Remote calls made by a sync flow can be retried on transient failures
//! (connection refused, timeouts, 5xx, 429). Each operation gets its own
//! attempt budget from the configuration.

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (not including the initial attempt)
    pub max_retries: u32,

    /// Initial backoff duration
    pub initial_backoff: Duration,

    /// Maximum backoff duration
    pub max_backoff: Duration,

    /// Backoff multiplier (typically 2.0 for exponential backoff)
    pub multiplier: f64,

    /// Add random jitter to prevent thundering herd
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(10),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Default backoff curve with a specific retry budget
    pub fn with_budget(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Default::default()
        }
    }

    /// Single attempt, no retries
    pub fn none() -> Self {
        Self::with_budget(0)
    }

    /// Calculate backoff duration for a given attempt
    pub fn backoff_duration(&self, attempt: u32) -> Duration {
        let base = self.initial_backoff.as_secs_f64() * self.multiplier.powi(attempt as i32);
        let capped = base.min(self.max_backoff.as_secs_f64());

        let final_duration = if self.jitter {
            // 0-25% on top
            capped * (1.0 + rand_jitter() * 0.25)
        } else {
            capped
        };

        Duration::from_secs_f64(final_duration)
    }

    /// Longest total sleep the retry loop can add, with full jitter
    pub fn max_total_backoff(&self) -> Duration {
        let jitter = if self.jitter { 1.25 } else { 1.0 };
        let total: f64 = (0..self.max_retries)
            .map(|attempt| {
                let base =
                    self.initial_backoff.as_secs_f64() * self.multiplier.powi(attempt as i32);
                base.min(self.max_backoff.as_secs_f64()) * jitter
            })
            .sum();
        Duration::from_secs_f64(total)
    }
}

/// Cheap jitter source (0.0 to 1.0) from the clock's sub-second nanos
fn rand_jitter() -> f64 {
    use std::time::SystemTime;
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    (nanos % 1000) as f64 / 1000.0
}

/// Retry classification for errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry the operation
    Retry,
    /// Retry after a specific duration (e.g., from Retry-After header)
    RetryAfter(Duration),
    /// Don't retry, the error is permanent
    NoRetry,
}

/// Trait for errors that can indicate whether to retry
pub trait RetryableError {
    fn retry_decision(&self) -> RetryDecision;
}

/// Execute an async operation with retry logic
///
/// Returns the first success, or the last error once the budget is spent or
/// the error is classified as permanent.
pub async fn with_retry<F, Fut, T, E>(
    config: &RetryConfig,
    operation_name: &str,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: RetryableError + std::fmt::Display,
{
    let mut attempt = 0;

    loop {
        let err = match operation().await {
            Ok(result) => return Ok(result),
            Err(e) => e,
        };

        let decision = err.retry_decision();
        if decision == RetryDecision::NoRetry {
            debug!(
                operation = operation_name,
                attempt = attempt,
                "Operation failed with non-retryable error: {}",
                err
            );
            return Err(err);
        }

        if attempt >= config.max_retries {
            warn!(
                operation = operation_name,
                attempts = attempt + 1,
                "Operation failed after {} attempts: {}",
                attempt + 1,
                err
            );
            return Err(err);
        }

        let backoff = match decision {
            RetryDecision::RetryAfter(d) => d.min(config.max_backoff),
            _ => config.backoff_duration(attempt),
        };

        warn!(
            operation = operation_name,
            attempt = attempt + 1,
            max_attempts = config.max_retries + 1,
            backoff_secs = backoff.as_secs_f64(),
            "Retrying after error: {}",
            err
        );

        sleep(backoff).await;
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HubError;

    fn fast(max_retries: u32) -> RetryConfig {
        RetryConfig {
            max_retries,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(5),
            multiplier: 2.0,
            jitter: false,
        }
    }

    #[test]
    fn test_backoff_duration() {
        let config = RetryConfig {
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(10),
            jitter: false,
            ..Default::default()
        };

        assert_eq!(config.backoff_duration(0), Duration::from_secs(1));
        assert_eq!(config.backoff_duration(1), Duration::from_secs(2));
        assert_eq!(config.backoff_duration(3), Duration::from_secs(8));
        assert_eq!(config.backoff_duration(6), Duration::from_secs(10));
    }

    #[test]
    fn test_backoff_with_jitter() {
        let config = RetryConfig {
            initial_backoff: Duration::from_secs(1),
            jitter: true,
            ..Default::default()
        };

        let backoff = config.backoff_duration(0);
        assert!(backoff >= Duration::from_secs(1));
        assert!(backoff <= Duration::from_millis(1250));
    }

    #[test]
    fn test_max_total_backoff() {
        assert_eq!(RetryConfig::none().max_total_backoff(), Duration::ZERO);

        // 0.5 + 1 + 2 seconds, plus 25% jitter
        let config = RetryConfig::with_budget(3);
        assert_eq!(config.max_total_backoff(), Duration::from_secs_f64(4.375));

        let capped = RetryConfig {
            max_retries: 6,
            jitter: false,
            ..Default::default()
        };
        // 0.5 + 1 + 2 + 4 + 8 + 10 (capped)
        assert_eq!(capped.max_total_backoff(), Duration::from_secs_f64(25.5));
    }

    #[tokio::test]
    async fn test_server_error_retried_until_success() {
        let mut attempts = 0;

        let result: Result<i64, HubError> = with_retry(&fast(3), "create issue", || {
            attempts += 1;
            let current = attempts;
            async move {
                if current < 3 {
                    Err(HubError::Integration("HTTP 503 Service Unavailable".into()))
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts, 3);
    }

    #[tokio::test]
    async fn test_budget_exhausted() {
        let mut attempts = 0;

        let result: Result<i64, HubError> = with_retry(&fast(2), "move card", || {
            attempts += 1;
            async { Err(HubError::Integration("HTTP 500 Internal Server Error".into())) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts, 3);
    }

    #[tokio::test]
    async fn test_zero_budget_makes_one_attempt() {
        let mut attempts = 0;

        let result: Result<i64, HubError> = with_retry(&RetryConfig::none(), "create issue", || {
            attempts += 1;
            async { Err(HubError::Integration("HTTP 502 Bad Gateway".into())) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts, 1);
    }

    #[tokio::test]
    async fn test_permanent_error_not_retried() {
        let mut attempts = 0;

        let result: Result<i64, HubError> = with_retry(&fast(5), "move card", || {
            attempts += 1;
            async { Err(HubError::Auth("invalid token".into())) }
        })
        .await;

        assert!(matches!(result, Err(HubError::Auth(_))));
        assert_eq!(attempts, 1);
    }
}
