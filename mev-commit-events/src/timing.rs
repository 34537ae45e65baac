//! Elapsed-time logging for client operations.

use std::future::Future;
use std::time::Instant;

/// Await `future` and log how long it took under `operation`.
///
/// Success is logged at `info`, failure at `warn`; the result is returned
/// unchanged.
pub async fn timed<T, E, F>(operation: &'static str, future: F) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let start = Instant::now();
    let result = future.await;
    let elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
    match &result {
        Ok(_) => tracing::info!(operation, elapsed_ms, "done"),
        Err(e) => tracing::warn!(operation, elapsed_ms, error = %e, "failed"),
    }
    result
}
