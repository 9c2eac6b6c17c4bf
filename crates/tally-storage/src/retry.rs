use crate::error::Result;
use std::future::Future;
use std::time::Duration;

/// Bounded retry schedule for transient storage failures.
///
/// The first attempt runs immediately; `backoff[i]` is the pause before
/// attempt `i + 2`. The default allows 4 attempts with pauses of 1s, 3s, 5s.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    backoff: Vec<Duration>,
}

impl RetryPolicy {
    pub fn new(backoff: Vec<Duration>) -> Self {
        Self { backoff }
    }

    /// `attempts` tries with no pause in between.
    pub fn immediate(attempts: usize) -> Self {
        Self {
            backoff: vec![Duration::ZERO; attempts.saturating_sub(1)],
        }
    }

    pub fn attempts(&self) -> usize {
        self.backoff.len() + 1
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            backoff: (1..=3u64).map(|i| Duration::from_secs(2 * i - 1)).collect(),
        }
    }
}

/// Runs `op` until it succeeds, fails with a non-transient error, or the
/// policy is exhausted. Exhaustion returns the last transient error.
pub async fn retry_transient<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &'static str,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!(operation, attempt, "Storage operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) if e.is_transient() => match policy.backoff.get(attempt - 1) {
                Some(delay) => {
                    tracing::warn!(
                        operation,
                        attempt,
                        retry_in_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient storage error, retrying"
                    );
                    if !delay.is_zero() {
                        tokio::time::sleep(*delay).await;
                    }
                    attempt += 1;
                }
                None => {
                    tracing::error!(operation, attempts = attempt, error = %e, "Storage retries exhausted");
                    return Err(e);
                }
            },
            Err(e) => return Err(e),
        }
    }
}
