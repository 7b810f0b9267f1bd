//! Rate Limiter (Token Bucket Algorithm)
//!
//! Bounds how often batches can be started. Generation is expensive, so the
//! bucket is small and refills slowly.
//! Uses atomic operations to avoid lock contention under high load.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Fixed-point scale: tokens are stored in thousandths
const MILLI: u64 = 1000;

/// Rate limiter using token bucket algorithm with atomic operations
#[derive(Debug)]
pub struct RateLimiter {
    // Upper 32 bits: available millitokens
    // Lower 32 bits: last refill, milliseconds since `created`
    packed: AtomicU64,
    created: Instant,
    burst: u32,
    per_second: u32,
}

fn pack(millitokens: u64, at_ms: u64) -> u64 {
    (millitokens << 32) | (at_ms & 0xFFFF_FFFF)
}

fn unpack(packed: u64) -> (u64, u64) {
    (packed >> 32, packed & 0xFFFF_FFFF)
}

impl RateLimiter {
    /// Create a new rate limiter
    ///
    /// # Arguments
    /// * `burst` - Maximum burst size (bucket capacity)
    /// * `per_second` - Tokens added per second
    ///
    /// # Example
    /// Burst of 5 batches, then one per second:
    /// `RateLimiter::new(5, 1)`
    pub fn new(burst: u32, per_second: u32) -> Self {
        let burst = burst.max(1);
        Self {
            packed: AtomicU64::new(pack(burst as u64 * MILLI, 0)),
            created: Instant::now(),
            burst,
            per_second,
        }
    }

    /// Consume one token
    ///
    /// Returns `Err(wait)` with the time until a token is available when the
    /// bucket is empty.
    pub fn try_acquire(&self) -> Result<(), Duration> {
        let capacity = self.burst as u64 * MILLI;

        // CAS loop to update tokens atomically
        loop {
            let current = self.packed.load(Ordering::Acquire);
            let (millitokens, last_ms) = unpack(current);

            let now_ms = (self.created.elapsed().as_millis() as u64) & 0xFFFF_FFFF;
            let delta_ms = now_ms.saturating_sub(last_ms);

            // per_second tokens/s == per_second millitokens/ms
            let refilled = (millitokens + delta_ms * self.per_second as u64).min(capacity);

            if refilled >= MILLI {
                let next = pack(refilled - MILLI, now_ms);
                match self.packed.compare_exchange(
                    current,
                    next,
                    Ordering::Release,
                    Ordering::Acquire,
                ) {
                    Ok(_) => return Ok(()),
                    Err(_) => continue, // Retry
                }
            }

            // Not enough tokens: keep the partial refill
            let _ = self.packed.compare_exchange(
                current,
                pack(refilled, now_ms),
                Ordering::Release,
                Ordering::Acquire,
            );
            return Err(self.wait_for(MILLI - refilled));
        }
    }

    /// Whether a request may proceed (consumes 1 token)
    pub fn check(&self) -> bool {
        self.try_acquire().is_ok()
    }

    /// Whole tokens currently available (without refill)
    pub fn remaining(&self) -> u32 {
        (unpack(self.packed.load(Ordering::Acquire)).0 / MILLI) as u32
    }

    fn wait_for(&self, missing_millitokens: u64) -> Duration {
        if self.per_second == 0 {
            return Duration::from_secs(u64::from(u32::MAX));
        }
        Duration::from_millis(missing_millitokens.div_ceil(self.per_second as u64))
    }
}
