//! Tick clock used for every timeout and backoff computation

use std::time::Instant;

/// Clock resolution: all timeouts are expressed in ticks of this rate.
pub const TICKS_PER_SEC: u64 = 1000;

/// Monotonic tick source.
pub trait Clock {
    /// Current tick count. Never decreases.
    fn now(&self) -> u64;
}

/// Wall clock backed by [`Instant`], ticking in milliseconds.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    /// Create a clock whose tick 0 is now
    #[must_use]
    pub fn new() -> Self {
        Self { origin: Instant::now() }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}
