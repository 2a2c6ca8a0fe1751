//! Exponential backoff for webhook delivery retries.
//!
//! One batch of events delivered to one consumer gets up to
//! `max_attempts` tries before the consumer is dropped from the topic.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Backoff schedule for a single delivery attempt sequence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BackoffConfig {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Fraction of the computed delay randomized in either direction, e.g.
    /// `0.2` spreads the delay across `[0.8x, 1.2x]`.
    pub jitter: f64,
}

impl Default for BackoffConfig {
    /// 5 attempts, 1s/2s/4s/8s/16s before jitter.
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(16),
            jitter: 0.2,
        }
    }
}

/// Delay to wait before the given 1-based attempt number. `attempt` is the
/// attempt about to be made; there is no delay before attempt 1.
pub fn calculate_delay(config: &BackoffConfig, attempt: u32) -> Duration {
    if attempt <= 1 {
        return Duration::ZERO;
    }
    let exponent = (attempt - 2).min(16);
    let factor = 1u64 << exponent;
    let delay = config.base_delay.saturating_mul(factor as u32).min(config.max_delay);
    apply_jitter(delay, config.jitter)
}

/// Jitter factor of 0.2 means delay * (0.8 to 1.2).
fn apply_jitter(delay: Duration, jitter: f64) -> Duration {
    if jitter <= 0.0 {
        return delay;
    }
    let jitter_range = 2.0 * jitter;
    let mut rng = rand::thread_rng();
    let random_value: f64 = rng.r#gen();
    let random_factor = 1.0 - jitter + (random_value * jitter_range);
    Duration::from_secs_f64((delay.as_secs_f64() * random_factor).max(0.0))
}

/// Outcome of a single delivery attempt, decided by the caller.
pub enum AttemptOutcome {
    Succeeded,
    /// Worth retrying (e.g. connection error, 5xx, timeout).
    Retryable,
    /// Never worth retrying (e.g. consumer config rejected outright).
    Permanent,
}

/// Runs `attempt` up to `config.max_attempts` times, sleeping the computed
/// backoff between tries. Returns `true` if an attempt reported
/// [`AttemptOutcome::Succeeded`], `false` if attempts were exhausted or a
/// permanent failure was reported.
pub async fn run_with_backoff<F, Fut>(config: &BackoffConfig, mut attempt: F) -> bool
where
    F: FnMut(u32) -> Fut,
    Fut: std::future::Future<Output = AttemptOutcome>,
{
    for n in 1..=config.max_attempts {
        let delay = calculate_delay(config, n);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        match attempt(n).await {
            AttemptOutcome::Succeeded => return true,
            AttemptOutcome::Permanent => return false,
            AttemptOutcome::Retryable => continue,
        }
    }
    false
}
