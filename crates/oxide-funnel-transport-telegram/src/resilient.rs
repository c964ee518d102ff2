//! Automatic retry for Telegram API operations.
//!
//! Only transport-level failures are retried: network errors, and rate
//! limits short enough to wait out. Anything the platform rejected on its
//! merits is returned immediately so the delivery fallbacks can react.

use oxide_funnel_core::error::GatewayError;
use std::future::Future;
use std::time::Duration;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;
use tracing::warn;

/// Retries after the first attempt.
pub const TELEGRAM_API_MAX_RETRIES: usize = 3;
/// First backoff delay.
pub const TELEGRAM_API_INITIAL_BACKOFF_MS: u64 = 500;
/// Backoff ceiling.
pub const TELEGRAM_API_MAX_BACKOFF_MS: u64 = 4_000;
/// Longer rate limits are not waited out.
pub const MAX_RATE_LIMIT_WAIT_SECS: u64 = 30;

fn is_retryable(err: &GatewayError) -> bool {
    match err {
        GatewayError::Network(_) => true,
        GatewayError::RateLimited { retry_after_secs } => {
            *retry_after_secs <= MAX_RATE_LIMIT_WAIT_SECS
        }
        _ => false,
    }
}

/// Run `operation`, retrying transient failures with exponential backoff
/// and jitter.
///
/// A rate-limited attempt waits for the requested period before the next
/// one.
///
/// # Errors
///
/// Returns the last error once retries are exhausted, or the first
/// non-retryable error.
pub async fn retry_telegram_operation<F, Fut, T>(mut operation: F) -> Result<T, GatewayError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, GatewayError>>,
{
    let retry_strategy = ExponentialBackoff::from_millis(2)
        .factor(TELEGRAM_API_INITIAL_BACKOFF_MS / 2)
        .max_delay(Duration::from_millis(TELEGRAM_API_MAX_BACKOFF_MS))
        .map(jitter)
        .take(TELEGRAM_API_MAX_RETRIES);

    let attempt = || {
        let fut = operation();
        async move {
            let result = fut.await;
            if let Err(GatewayError::RateLimited { retry_after_secs }) = &result {
                if *retry_after_secs <= MAX_RATE_LIMIT_WAIT_SECS {
                    tokio::time::sleep(Duration::from_secs(*retry_after_secs)).await;
                }
            }
            result
        }
    };

    RetryIf::spawn(retry_strategy, attempt, is_retryable)
        .await
        .map_err(|e| {
            if is_retryable(&e) {
                warn!(
                    "Telegram API operation failed after {} retries: {}",
                    TELEGRAM_API_MAX_RETRIES, e
                );
            }
            e
        })
}
