use anyhow::Result;
use std::time::Duration;
use tokio::time::{sleep, Instant};

/// Re-checks `check` every `interval` until it reports `true` or `timeout` runs out.
///
/// Returns `Ok(false)` on timeout. The condition is always evaluated at least
/// once, and once more at the deadline, so a zero timeout is a single check.
/// Errors from `check` end the wait immediately.
pub async fn poll_until<F>(timeout: Duration, interval: Duration, mut check: F) -> Result<bool>
where
    F: FnMut() -> Result<bool>,
{
    let deadline = Instant::now() + timeout;
    loop {
        if check()? {
            return Ok(true);
        }
        let now = Instant::now();
        if now >= deadline {
            return Ok(false);
        }
        sleep(interval.min(deadline - now)).await;
    }
}
