//! Fixed-delay retry for idempotent remote reads.

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Run `op` up to `attempts` times, sleeping `delay` between failures that
/// `should_retry` accepts.
///
/// Returns the first success, the first error `should_retry` rejects, or the
/// last error once attempts run out. `attempts` of zero is treated as one.
pub async fn retry<F, Fut, T, E, P>(
    attempts: usize,
    delay: Duration,
    should_retry: P,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let attempts = attempts.max(1);
    let mut remaining = attempts;
    loop {
        match op().await {
            Ok(v) => return Ok(v),
            Err(err) => {
                remaining -= 1;
                if remaining == 0 || !should_retry(&err) {
                    return Err(err);
                }
                tracing::debug!(
                    error = %err,
                    attempt = attempts - remaining,
                    "retrying after failure"
                );
                sleep(delay).await;
            }
        }
    }
}
