//! Retry of store writes while SQLite reports "database is locked"
//!
//! The scraper and the analysis service share one database file, so a write
//! can find the file locked by the other process. Such writes are retried
//! with exponential backoff (10ms doubling, capped at 1s) until `max_wait`
//! has elapsed; any other error is returned immediately.

use std::future::Future;
use std::time::{Duration, Instant};

use crate::{StoreError, StoreResult};

const INITIAL_BACKOFF_MS: u64 = 10;
const MAX_BACKOFF_MS: u64 = 1000;

/// Run `operation` until it succeeds, fails with a non-lock error, or the
/// database stays locked for longer than `max_wait`
pub async fn retry_on_lock<F, Fut, T>(
    operation_name: &'static str,
    max_wait: Duration,
    mut operation: F,
) -> StoreResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = StoreResult<T>>,
{
    let start_time = Instant::now();
    let mut attempt: u32 = 0;
    let mut backoff_ms = INITIAL_BACKOFF_MS;

    loop {
        attempt += 1;

        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    tracing::debug!(
                        operation = operation_name,
                        attempt,
                        elapsed_ms = start_time.elapsed().as_millis() as u64,
                        "Store write succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(err) if !err.is_lock_error() => return Err(err),
            Err(_) => {
                let elapsed = start_time.elapsed();

                if elapsed >= max_wait {
                    tracing::error!(
                        operation = operation_name,
                        attempt,
                        elapsed_ms = elapsed.as_millis() as u64,
                        max_wait_ms = max_wait.as_millis() as u64,
                        "Database still locked, giving up"
                    );
                    return Err(StoreError::Locked {
                        operation: operation_name,
                        attempts: attempt,
                    });
                }

                tracing::warn!(
                    operation = operation_name,
                    attempt,
                    backoff_ms,
                    remaining_ms = max_wait.saturating_sub(elapsed).as_millis() as u64,
                    "Database locked, will retry after backoff"
                );

                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                backoff_ms = (backoff_ms * 2).min(MAX_BACKOFF_MS);
            }
        }
    }
}
