//! Fixed-delay retry helpers.

use std::future::Future;
use std::thread;
use std::time::Duration;

use tracing::debug;

/// Call `f` until it reports success, at most `max_attempts` times, sleeping
/// `delay` between attempts. Returns whether any attempt succeeded.
///
/// Blocks the calling thread; use [`retry_async`] inside async code.
pub fn retry<F>(mut f: F, max_attempts: u32, delay: Duration) -> bool
where
    F: FnMut() -> bool,
{
    for attempt in 1..=max_attempts {
        if f() {
            return true;
        }
        debug!(attempt, max_attempts, "attempt failed");
        if attempt < max_attempts {
            thread::sleep(delay);
        }
    }
    false
}

/// Async form of [`retry`], sleeping on the tokio timer.
pub async fn retry_async<F, Fut>(mut f: F, max_attempts: u32, delay: Duration) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for attempt in 1..=max_attempts {
        if f().await {
            return true;
        }
        debug!(attempt, max_attempts, "attempt failed");
        if attempt < max_attempts {
            tokio::time::sleep(delay).await;
        }
    }
    false
}
