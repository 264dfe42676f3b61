//! C6: Retry Engine — exponential backoff with jitter, cancellation-aware.
//! See `spec.md` §4.6.

use std::future::Future;
use std::time::Duration as StdDuration;

use ingest_core::config::RetryConfig;
use ingest_core::error::IngestError;
use rand::Rng;
use tokio_util::sync::CancellationToken;

use crate::internal_events::{emit, IngestRetrying};

/// Runs `operation`, retrying on [`IngestError::is_retryable`] failures with
/// exponential backoff and jitter until `maxRetries` is exhausted or
/// `cancel` fires. `operation` is invoked with the current attempt number
/// (0-based) so it can tag logs/requestIds per attempt.
///
/// Returns the last error once retries are exhausted, or immediately on a
/// non-retryable error. If `cancel` fires while waiting out a backoff, the
/// wait is aborted and the triggering error is returned without a further
/// attempt (`spec.md` §5, cancellation during backoff).
pub async fn execute_with_retry<F, Fut, T>(
    config: &RetryConfig,
    batch_id: &str,
    cancel: &CancellationToken,
    mut operation: F,
) -> Result<T, IngestError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, IngestError>>,
{
    let mut attempt = 0u32;
    loop {
        let result = operation(attempt).await;
        let error = match result {
            Ok(value) => return Ok(value),
            Err(error) => error,
        };

        if !error.is_retryable() || attempt >= config.max_retries {
            return Err(error);
        }

        let delay = backoff_delay(config, attempt);
        emit(IngestRetrying {
            batch_id: batch_id.to_owned(),
            attempt: attempt + 1,
            delay_ms: delay.as_millis() as u64,
            reason: error.to_string(),
        });

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = cancel.cancelled() => return Err(error),
        }

        attempt += 1;
    }
}

/// `delay = min(maxBackoff, initialBackoff * multiplier^attempt) * jitter`,
/// `jitter ~ Uniform[0.5, 1.5)`, per `spec.md` §4.6.
fn backoff_delay(config: &RetryConfig, attempt: u32) -> StdDuration {
    let exponential = config.initial_backoff_ms as f64 * config.multiplier.powi(attempt as i32);
    let capped = exponential.min(config.max_backoff_ms as f64);
    let jitter = rand::rng().random_range(0.5..1.5);
    StdDuration::from_millis((capped * jitter) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn config() -> RetryConfig {
        RetryConfig {
            max_retries: 3,
            initial_backoff_ms: 1,
            max_backoff_ms: 5,
            multiplier: 2.0,
        }
    }

    #[tokio::test]
    async fn succeeds_without_retry_on_first_try() {
        let calls = AtomicU32::new(0);
        let result = execute_with_retry(&config(), "b1", &CancellationToken::new(), |_attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, IngestError>(42) }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_transient_then_succeeds() {
        let calls = AtomicU32::new(0);
        let result = execute_with_retry(&config(), "b1", &CancellationToken::new(), |_attempt| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(IngestError::Transient { message: "x".into() })
                } else {
                    Ok(())
                }
            }
        })
        .await;
        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn does_not_retry_fatal_errors() {
        let calls = AtomicU32::new(0);
        let result = execute_with_retry(&config(), "b1", &CancellationToken::new(), |_attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(IngestError::Schema { message: "bad".into() }) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let calls = AtomicU32::new(0);
        let result = execute_with_retry(&config(), "b1", &CancellationToken::new(), |_attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(IngestError::Transient { message: "x".into() }) }
        })
        .await;
        assert!(result.is_err());
        // initial attempt + max_retries retries.
        assert_eq!(calls.load(Ordering::SeqCst), config().max_retries + 1);
    }

    #[tokio::test]
    async fn cancellation_aborts_during_backoff() {
        let token = CancellationToken::new();
        let token_clone = token.clone();
        token.cancel();
        let calls = AtomicU32::new(0);
        let result = execute_with_retry(&config(), "b1", &token_clone, |_attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(IngestError::Transient { message: "x".into() }) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
