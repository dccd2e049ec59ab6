//! Bounded retry with exponential backoff and jitter for adapter reads.
//!
//! Only `Transient` and `RateLimited` venue errors are re-attempted; every
//! other kind surfaces immediately. Order placement never goes through this
//! path after an order may have reached a venue; ambiguity is handled by
//! reconciliation, not by retrying.

use rand::Rng;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{VenueError, VenueResult};

/// Retry policy for adapter reads (order books, balances, positions).
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempts including the initial try.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl RetryPolicy {
    /// Read policy: 1 try + 3 retries, 1 s base, x2, capped at 8 s.
    pub fn reads() -> Self {
        Self {
            max_attempts: 4,
            base_delay_ms: 1_000,
            max_delay_ms: 8_000,
        }
    }

    /// Placement policy: exactly one retry, and only for errors observed
    /// before the order could have reached the venue.
    pub fn placement() -> Self {
        Self {
            max_attempts: 2,
            base_delay_ms: 250,
            max_delay_ms: 250,
        }
    }

    /// Exponential backoff for `attempt` (1-based) with full jitter.
    pub fn backoff_ms(&self, attempt: u32) -> u64 {
        let capped = self.raw_backoff_ms(attempt);
        if capped == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=capped)
        }
    }

    /// The deterministic pre-jitter delay, exposed for tests.
    pub fn raw_backoff_ms(&self, attempt: u32) -> u64 {
        let exponent = attempt.saturating_sub(1);
        let multiplier = if exponent >= 32 {
            u64::MAX
        } else {
            1u64 << exponent
        };
        self.base_delay_ms
            .saturating_mul(multiplier)
            .min(self.max_delay_ms)
    }
}

/// Run `operation` under `policy`, retrying transient venue errors.
///
/// A hard `RateLimited` is surfaced immediately: re-attempting into a rate
/// limiter only burns quota; the scan loop throttles on seeing it. (Soft
/// rate limits that carry a retry hint are classified `Transient` at the
/// adapter boundary and do retry here.) Returns the last error once the
/// attempt budget is spent.
pub async fn retry_venue_call<T, Fut, F>(
    policy: &RetryPolicy,
    op_name: &str,
    mut operation: F,
) -> VenueResult<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = VenueResult<T>>,
{
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!("retry op={} succeeded on attempt {}", op_name, attempt);
                }
                return Ok(value);
            }
            Err(err @ VenueError::RateLimited(_)) => {
                debug!("retry op={} rate limited, surfacing for throttle", op_name);
                return Err(err);
            }
            Err(err) => {
                if !err.is_retryable() {
                    debug!("retry op={} non-retryable: {}", op_name, err);
                    return Err(err);
                }
                if attempt >= policy.max_attempts {
                    warn!(
                        "retry op={} exhausted after {} attempts: {}",
                        op_name, attempt, err
                    );
                    return Err(err);
                }

                let backoff = policy.backoff_ms(attempt);
                debug!(
                    "retry op={} attempt={} backoff_ms={} reason={}",
                    op_name, attempt, backoff, err
                );
                if backoff > 0 {
                    tokio::time::sleep(Duration::from_millis(backoff)).await;
                }
                attempt += 1;
            }
        }
    }
}
