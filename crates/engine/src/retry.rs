//! Bounded retries with optional capped exponential backoff.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

use crate::client::RemoteError;

/// Delay schedule between retry attempts.
///
/// Attempt `n` (0-based) waits `base * 2^n`, capped at `cap` and scaled by
/// a random factor in `[0.5, 1.0]` so concurrent uploads do not retry in
/// lockstep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub base: Duration,
    pub cap: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(200),
            cap: Duration::from_secs(5),
        }
    }
}

impl Backoff {
    fn delay(&self, attempt: u32) -> Duration {
        let exp = self.base.saturating_mul(2u32.saturating_pow(attempt));
        let capped = exp.min(self.cap);
        let factor = rand::thread_rng().gen_range(0.5..=1.0);
        capped.mul_f64(factor)
    }
}

/// Retry budget for one remote operation.
///
/// `max_retries` counts retries after the first attempt, so an operation
/// runs at most `max_retries + 1` times. Only transient failures consume
/// the budget; a rejection surfaces immediately.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff: Option<Backoff>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: Some(Backoff::default()),
        }
    }
}

impl RetryPolicy {
    /// Policy with no delay between attempts.
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            backoff: None,
        }
    }

    /// Runs `op` until it succeeds, is rejected, or the budget is spent.
    ///
    /// `op` receives the 0-based attempt number; `op_name` labels the
    /// retry warnings.
    pub async fn run<T, F, Fut>(&self, op_name: &str, mut op: F) -> Result<T, RemoteError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, RemoteError>>,
    {
        let mut attempt = 0;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_transient() => return Err(e),
                Err(e) if attempt >= self.max_retries => return Err(e),
                Err(e) => {
                    warn!(
                        op = op_name,
                        attempt = attempt + 1,
                        max_retries = self.max_retries,
                        error = %e,
                        "transient failure, retrying"
                    );
                    if let Some(backoff) = self.backoff {
                        tokio::time::sleep(backoff.delay(attempt)).await;
                    }
                    attempt += 1;
                }
            }
        }
    }
}
