//! Pseudo-random source for the disturbance decisions.
//!
//! A plain linear congruential step is plenty for injecting faults, but it
//! has one quirk worth keeping in mind: every step flips the parity of the
//! seed. A caller that draws an even number of values per decision would
//! therefore see the same parity on every decision, which turns a width-2
//! range into a constant. The read hook compensates by keeping its number
//! of draws per call odd.

use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

pub(crate) struct DisturbRng {
    seed: Mutex<i64>,
}

impl DisturbRng {
    /// Seeded from the wall clock.
    pub(crate) fn new() -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as i64)
            .unwrap_or(1);
        Self::with_seed(nanos)
    }

    pub(crate) fn with_seed(seed: i64) -> Self {
        Self { seed: Mutex::new(seed) }
    }

    /// Next value, masked to 35 bits so it is always non-negative.
    pub(crate) fn next(&self) -> i64 {
        let mut seed = self.seed.lock().unwrap();
        *seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12_345);
        *seed & 0x7_ffff_ffff
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_is_deterministic_for_a_seed() {
        let a = DisturbRng::with_seed(42);
        let b = DisturbRng::with_seed(42);
        for _ in 0..32 {
            assert_eq!(a.next(), b.next());
        }
    }

    #[test]
    fn values_are_non_negative() {
        let rng = DisturbRng::with_seed(-987_654_321);
        for _ in 0..256 {
            assert!(rng.next() >= 0);
        }
    }

    #[test]
    fn consecutive_draws_alternate_parity() {
        let rng = DisturbRng::with_seed(7);
        let mut last = rng.next() & 1;
        for _ in 0..64 {
            let cur = rng.next() & 1;
            assert_ne!(cur, last);
            last = cur;
        }
    }
}
