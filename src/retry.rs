use std::{future::Future, time::Duration};

use tokio::time::sleep;
use tracing::debug;

/// Retries an async operation with exponential backoff.
///
/// `op` receives the 1-based attempt number. Only errors for which `is_retryable` returns true
/// are retried; any other error, or the error of the last attempt, is returned as is.
pub async fn retry_async<F, Fut, T, E, R>(
    mut op: F,
    attempts: usize,
    initial_delay: Duration,
    is_retryable: R,
) -> Result<T, E>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    R: Fn(&E) -> bool,
    E: std::fmt::Display,
{
    let mut delay = initial_delay;
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(v) => return Ok(v),
            Err(e) if attempt < attempts && is_retryable(&e) => {
                debug!(attempt, error = %e, "Retrying after {:?}", delay);
                sleep(delay).await;
                delay = delay.saturating_mul(2);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
