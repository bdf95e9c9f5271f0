//! # Retransmission Backoff
//!
//! Randomized exponential backoff used for every retransmission in the engine.
//!
//! Two shapes are provided:
//! - RFC2131 style for ARP, BOOTP/DHCP and the first TFTP request:
//!   `(base << exp) + jitter`, with jitter in `[0, min(1s, base)]` so that
//!   booting clients desynchronize while the delay still never shrinks as the
//!   retry count grows.
//! - RFC1112 style for IGMP reports: uniformly random in `[1, base << exp]`.
//!
//! The exponent is clamped to a configured limit. Every delay is at least one
//! tick, so a zero-tick wait can never be mistaken for a single drain pass.

use crate::clock::TICKS_PER_SEC;
use crate::wire::Mac;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

/// Hard ceiling on the exponent clamp, keeps `base << exp` far from overflow
pub const MAX_BACKOFF_LIMIT: u32 = 16;

/// Backoff calculator with its own jitter source
///
/// The generator is seeded from the tick counter XORed with the station MAC,
/// which is enough for two clients powered on together to pick different
/// delays without any entropy source.
#[derive(Debug, Clone)]
pub struct Backoff {
    rng: SmallRng,
    /// Largest exponent honoured
    limit: u32,
}

impl Backoff {
    /// Create a backoff calculator from an explicit seed
    #[must_use]
    pub fn new(seed: u64, limit: u32) -> Self {
        Self {
            rng: SmallRng::seed_from_u64(seed),
            limit: limit.min(MAX_BACKOFF_LIMIT),
        }
    }

    /// Seed from the current tick count and the station address
    #[must_use]
    pub fn for_station(mac: Mac, ticks: u64, limit: u32) -> Self {
        let mut seed = [0u8; 8];
        seed[2..].copy_from_slice(&mac.0);
        Self::new(ticks ^ u64::from_be_bytes(seed), limit)
    }

    /// Configured exponent limit
    #[must_use]
    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// RFC2131 retransmission delay in ticks for retry number `exp`
    pub fn rfc2131_interval(&mut self, base: u64, exp: u32) -> u64 {
        let (low, high) = Self::rfc2131_bounds(base, exp, self.limit);
        self.rng.random_range(low..=high)
    }

    /// RFC1112 report delay in ticks: random in `[1, base << exp]`
    pub fn rfc1112_interval(&mut self, base: u64, exp: u32) -> u64 {
        let high = shifted(base, exp, self.limit).max(1);
        self.rng.random_range(1..=high)
    }

    /// Range an RFC2131 delay falls in (stateless)
    ///
    /// # Arguments
    ///
    /// * `base` - Delay for the first attempt, in ticks
    /// * `exp` - Retry number (0-indexed)
    /// * `limit` - Exponent clamp
    ///
    /// # Returns
    ///
    /// Inclusive `(low, high)` bounds, both at least one tick.
    #[must_use]
    pub fn rfc2131_bounds(base: u64, exp: u32, limit: u32) -> (u64, u64) {
        let low = shifted(base, exp, limit);
        let high = low.saturating_add(base.min(TICKS_PER_SEC));
        (low.max(1), high.max(1))
    }
}

fn shifted(base: u64, exp: u32, limit: u32) -> u64 {
    let exp = exp.min(limit).min(MAX_BACKOFF_LIMIT);
    base.saturating_mul(1u64 << exp)
}
