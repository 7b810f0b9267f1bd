// Retry logic for transient content-generator failures
use crate::port::SynthesisError;
use std::time::Duration;
use tracing::{info, warn};

/// Retry decision result
#[derive(Debug, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after this backoff delay
    Retry(Duration),
    /// Do not retry; surface the error
    GiveUp,
}

/// Exponential backoff policy for synthesis calls
///
/// Only transient errors are retried: the generator being unreachable,
/// rate limiting (HTTP 429) and upstream 5xx responses.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    backoff_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(1000), 2.0)
    }
}

impl RetryPolicy {
    /// Create a new retry policy
    ///
    /// # Arguments
    /// * `max_attempts` - Total attempts including the first one
    /// * `base_delay` - Delay before the first retry
    /// * `backoff_factor` - Multiplier applied per attempt
    pub fn new(max_attempts: u32, base_delay: Duration, backoff_factor: f64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            backoff_factor,
        }
    }

    /// Policy that never retries
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO, 1.0)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Whether `error` is worth another attempt
    pub fn is_transient(error: &SynthesisError) -> bool {
        match error {
            SynthesisError::Unreachable(_) => true,
            SynthesisError::Upstream { status, .. } => *status == 429 || *status >= 500,
            SynthesisError::NotConfigured(_)
            | SynthesisError::Unauthorized(_)
            | SynthesisError::MalformedResponse(_) => false,
        }
    }

    /// Decide whether to retry after `attempts_made` failed attempts
    ///
    /// Backoff formula:
    /// delay = base_delay * (backoff_factor ^ (attempts_made - 1)) * (1.0 ± 0.1)
    ///
    /// `jitter_seed` keeps the jitter deterministic per caller (the variant
    /// seed), so concurrent variants do not retry in lockstep.
    pub fn should_retry(
        &self,
        error: &SynthesisError,
        attempts_made: u32,
        jitter_seed: u64,
    ) -> RetryDecision {
        if !Self::is_transient(error) {
            return RetryDecision::GiveUp;
        }

        if attempts_made >= self.max_attempts {
            warn!(
                attempts = %attempts_made,
                max_attempts = %self.max_attempts,
                error = %error,
                "Max synthesis attempts reached"
            );
            return RetryDecision::GiveUp;
        }

        let exponent = attempts_made.saturating_sub(1) as i32;
        let base_ms = self.base_delay.as_millis() as f64 * self.backoff_factor.powi(exponent);
        let jitter_factor = 0.9 + ((jitter_seed % 21) as f64 / 100.0); // 0.9 to 1.1
        let delay = Duration::from_millis((base_ms * jitter_factor) as u64);

        info!(
            attempt = %attempts_made,
            max_attempts = %self.max_attempts,
            delay_ms = %delay.as_millis(),
            error = %error,
            "Scheduling synthesis retry"
        );

        RetryDecision::Retry(delay)
    }
}
