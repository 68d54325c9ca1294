//! Bounded retry loop: attempt, sleep, repeat until a deadline.
//!
//! Gated reads poll the leader's lock status with this primitive.  The loop
//! is a plain future, so dropping it cancels the remaining attempts.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;

/// Outcome of a single attempt.
#[derive(Debug, PartialEq, Eq)]
pub enum Attempt<T> {
    /// Stop retrying and return this value.
    Ready(T),
    /// Sleep for the pacing interval and try again.
    Retry,
}

/// Total time budget and the pause between attempts.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub budget: Duration,
    pub pacing: Duration,
}

/// The budget ran out before any attempt produced a value.
#[derive(Debug, Error)]
#[error("gave up after {attempts} attempts in {elapsed:?}")]
pub struct DeadlineExceeded {
    pub attempts: u32,
    pub elapsed: Duration,
}

/// Run `attempt` until it returns [`Attempt::Ready`] or `policy.budget` has
/// elapsed.  An attempt is only started while the budget is not exhausted.
pub async fn retry_until<T, F, Fut>(policy: RetryPolicy, mut attempt: F) -> Result<T, DeadlineExceeded>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Attempt<T>>,
{
    let start = Instant::now();
    let mut attempts = 0u32;

    while start.elapsed() < policy.budget {
        attempts += 1;
        if let Attempt::Ready(value) = attempt().await {
            return Ok(value);
        }
        tokio::time::sleep(policy.pacing).await;
    }

    Err(DeadlineExceeded {
        attempts,
        elapsed: start.elapsed(),
    })
}
