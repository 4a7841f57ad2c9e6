//! Capped exponential backoff for rate-limited API calls.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::warn;

/// First wait after a rate-limit response.
pub const BASE_BACKOFF: Duration = Duration::from_secs(1);

/// Upper bound for a single wait.
pub const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Errors that can tell the retry helper whether the server asked us to slow down.
pub trait RateLimited {
    fn is_rate_limited(&self) -> bool;
}

/// Current wait between retries. Doubles on every consecutive rate limit, resets
/// after a success.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            current: base,
        }
    }

    /// The wait that the next rate limit will use.
    pub fn current(&self) -> Duration {
        self.current
    }

    /// Return the wait to apply now and double the following one.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.base;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(BASE_BACKOFF, MAX_BACKOFF)
    }
}

/// Run `op` until it succeeds or fails with something other than a rate limit.
///
/// Each rate-limited attempt sleeps for `backoff.next_delay()` before retrying
/// the same call. There is no attempt limit: a server that keeps answering 429
/// keeps this future pending, with waits pinned at the backoff's maximum.
pub async fn retry_rate_limited<T, E, F, Fut>(
    backoff: &mut Backoff,
    label: &str,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: RateLimited + Display,
{
    loop {
        match op().await {
            Ok(value) => {
                backoff.reset();
                return Ok(value);
            }
            Err(e) if e.is_rate_limited() => {
                let wait = backoff.next_delay();
                warn!("{label}: rate limited ({e}), retrying in {}s", wait.as_secs());
                tokio::time::sleep(wait).await;
            }
            Err(e) => return Err(e),
        }
    }
}
