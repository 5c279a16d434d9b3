//! Retry logic for contended write transactions
//!
//! SQLite serializes writers. A transaction that loses the writer lock (or
//! whose WAL snapshot went stale while it waited) fails with SQLITE_BUSY and
//! must be re-run from the start.

use imgq_common::{Error, Result};
use std::time::{Duration, Instant};

/// Attempts before giving up on a contended transaction
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Initial backoff between attempts
const INITIAL_BACKOFF_MS: u64 = 10;

/// Backoff ceiling
const MAX_BACKOFF_MS: u64 = 500;

/// Re-run a whole transaction with exponential backoff while it loses the
/// writer lock.
///
/// **Algorithm:**
/// 1. Attempt operation
/// 2. If successful, return result
/// 3. If retryable (see `Error::is_retryable`) and attempts remain: log, back off, retry
/// 4. If retryable and attempts are exhausted: return `Error::Conflict`
/// 5. Any other error is returned immediately
///
/// **Backoff Strategy:**
/// - Initial delay: 10ms
/// - Max delay: 500ms
/// - Multiplier: 2
pub async fn retry_on_conflict<F, Fut, T>(
    operation_name: &str,
    max_attempts: u32,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let start_time = Instant::now();
    let mut attempt = 0;
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
                        "Write succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(err) if !err.is_retryable() => return Err(err),
            Err(err) => {
                if attempt >= max_attempts {
                    tracing::warn!(
                        operation = operation_name,
                        attempt,
                        elapsed_ms = start_time.elapsed().as_millis() as u64,
                        "Giving up on contended write: {}",
                        err
                    );
                    return Err(Error::Conflict(format!(
                        "{} lost the writer lock {} times; retry later",
                        operation_name, attempt
                    )));
                }

                tracing::debug!(
                    operation = operation_name,
                    attempt,
                    backoff_ms,
                    "Writer lock contended, backing off"
                );
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                backoff_ms = (backoff_ms * 2).min(MAX_BACKOFF_MS);
            }
        }
    }
}
