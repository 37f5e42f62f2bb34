//! Retry with exponential back-off and jitter for Admin API calls.
//!
//! Only transient conditions are retried: throttling (HTTP 429 or a GraphQL
//! `THROTTLED` error), network failures, and 5xx responses. Validation and
//! decoding errors are returned on the first attempt.

use std::future::Future;
use std::time::Duration;

use crate::error::ShopifyError;

const MAX_DELAY_MS: u64 = 60_000;

pub(crate) fn is_retriable(err: &ShopifyError) -> bool {
    match err {
        ShopifyError::RateLimited { .. } => true,
        ShopifyError::Http(e) => {
            e.is_timeout() || e.is_connect() || e.status().is_some_and(|s| s.is_server_error())
        }
        ShopifyError::UnexpectedStatus { status, .. } => *status >= 500,
        ShopifyError::GraphQl(_)
        | ShopifyError::UserErrors(_)
        | ShopifyError::Deserialize { .. }
        | ShopifyError::MissingData(_)
        | ShopifyError::Upload { .. } => false,
    }
}

/// Sleep before retry `attempt` (1-based): `base × 2^(attempt-1)` ± 25 %, at
/// least the server's `Retry-After` when throttled, capped at 60 s.
fn delay_for(attempt: u32, backoff_base_ms: u64, err: &ShopifyError) -> u64 {
    let computed = backoff_base_ms.saturating_mul(1u64 << (attempt - 1).min(10));
    let capped = computed.min(MAX_DELAY_MS);
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    let jittered = (capped as f64 * (rand::random::<f64>() * 0.5 + 0.75)) as u64;
    match err {
        ShopifyError::RateLimited { retry_after_secs } if backoff_base_ms > 0 => jittered
            .max(retry_after_secs.saturating_mul(1_000))
            .min(MAX_DELAY_MS),
        _ => jittered,
    }
}

/// Runs `operation` with up to `max_retries` additional attempts on transient errors.
pub(crate) async fn retry_with_backoff<T, F, Fut>(
    max_retries: u32,
    backoff_base_ms: u64,
    mut operation: F,
) -> Result<T, ShopifyError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ShopifyError>>,
{
    let mut attempt = 0u32;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !is_retriable(&err) || attempt >= max_retries {
                    return Err(err);
                }
                attempt += 1;
                let delay_ms = delay_for(attempt, backoff_base_ms, &err);
                tracing::warn!(
                    attempt,
                    max_retries,
                    delay_ms,
                    error = %err,
                    "Admin API transient error, retrying after back-off"
                );
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
        }
    }
}
