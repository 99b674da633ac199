use std::time::Duration;

use tokio_retry::strategy::{ExponentialBackoff, jitter};
use tracing::warn;

use crate::error::VoteError;

const BASE_BACKOFF_MS: u64 = 10;
const MAX_BACKOFF_MS: u64 = 250;

/// Run `op` until it succeeds, fails with a non-transient error, or has been
/// tried `attempts` times. Only [`VoteError::is_transient`] failures are
/// retried; everything else is returned on the first occurrence.
pub fn retry_transient<T, F>(attempts: u32, mut op: F) -> Result<T, VoteError>
where
    F: FnMut() -> Result<T, VoteError>,
{
    let attempts = attempts.max(1);
    let mut delays = backoff(attempts);
    let mut tried = 0;

    loop {
        tried += 1;
        match op() {
            Err(err) if err.is_transient() => {
                let Some(delay) = delays.next() else {
                    return Err(err);
                };
                warn!(
                    "Transient storage error (attempt {}/{}): {}, retrying in {:?}",
                    tried, attempts, err, delay
                );
                std::thread::sleep(delay);
            }
            other => return other,
        }
    }
}

/// Jittered exponential delays, one per retry after the first attempt.
fn backoff(attempts: u32) -> impl Iterator<Item = Duration> {
    ExponentialBackoff::from_millis(BASE_BACKOFF_MS)
        .factor(2)
        .max_delay(Duration::from_millis(MAX_BACKOFF_MS))
        .map(jitter)
        .take(attempts.saturating_sub(1) as usize)
}
