//! Helpers wrapped around every unit of work: a store timeout and a bounded
//! retry loop for optimistic-concurrency conflicts.

use crate::errors::ServiceError;
use metrics::counter;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first
    pub max_attempts: u32,
    /// Initial delay between retries
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Factor to multiply delay by after each attempt
    pub backoff_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(200),
            backoff_factor: 2.0,
        }
    }
}

impl RetryConfig {
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Default::default()
        }
    }
}

/// Retry policy for determining if an error is retryable
pub trait RetryPolicy<E> {
    fn is_retryable(&self, error: &E) -> bool;
}

/// Only version conflicts are worth replaying; everything else is final.
pub struct ConflictRetryPolicy;

impl RetryPolicy<ServiceError> for ConflictRetryPolicy {
    fn is_retryable(&self, error: &ServiceError) -> bool {
        matches!(error, ServiceError::ConcurrentModification(_))
    }
}

/// Execute an async function with retries
pub async fn with_retry<F, Fut, T, E>(
    config: &RetryConfig,
    policy: impl RetryPolicy<E>,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut delay = config.initial_delay;
    let mut attempts = 0;

    loop {
        attempts += 1;

        match operation().await {
            Ok(result) => {
                if attempts > 1 {
                    debug!("Operation succeeded after {} attempts", attempts);
                }
                return Ok(result);
            }
            Err(error) => {
                if attempts >= config.max_attempts || !policy.is_retryable(&error) {
                    if attempts > 1 {
                        warn!("Operation failed after {} attempts: {}", attempts, error);
                    }
                    return Err(error);
                }

                counter!("invoice_ledger_uow.retries", 1);
                warn!(
                    "Attempt {} failed: {}. Retrying in {:?}...",
                    attempts, error, delay
                );

                sleep(delay).await;

                delay = Duration::from_secs_f64(
                    (delay.as_secs_f64() * config.backoff_factor)
                        .min(config.max_delay.as_secs_f64()),
                );
            }
        }
    }
}

/// Bounds a unit of work by `limit`. Expiry drops the future, which rolls back
/// any transaction it still holds.
pub async fn with_store_timeout<Fut, T>(
    limit: Duration,
    operation: &str,
    fut: Fut,
) -> Result<T, ServiceError>
where
    Fut: Future<Output = Result<T, ServiceError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => {
            counter!("invoice_ledger_uow.timeouts", 1);
            warn!(operation, ?limit, "unit of work timed out");
            Err(ServiceError::Timeout(format!(
                "{} did not complete within {:?}",
                operation, limit
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::sync::atomic::{AtomicU32, Ordering};
    use uuid::Uuid;

    #[tokio::test]
    async fn conflicts_are_retried_until_success() {
        let calls = AtomicU32::new(0);
        let result = with_retry(&RetryConfig::with_max_attempts(3), ConflictRetryPolicy, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(ServiceError::ConcurrentModification(Uuid::nil()))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn conflicts_surface_once_attempts_are_exhausted() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> =
            with_retry(&RetryConfig::with_max_attempts(2), ConflictRetryPolicy, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(ServiceError::ConcurrentModification(Uuid::nil())) }
            })
            .await;

        assert_matches!(result, Err(ServiceError::ConcurrentModification(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn validation_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> =
            with_retry(&RetryConfig::with_max_attempts(5), ConflictRetryPolicy, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(ServiceError::ValidationError("bad".into())) }
            })
            .await;

        assert_matches!(result, Err(ServiceError::ValidationError(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn slow_units_of_work_time_out() {
        let result: Result<(), _> = with_store_timeout(
            Duration::from_millis(10),
            "record_payment",
            async {
                sleep(Duration::from_secs(5)).await;
                Ok(())
            },
        )
        .await;

        assert_matches!(result, Err(ServiceError::Timeout(msg)) if msg.contains("record_payment"));
    }
}
