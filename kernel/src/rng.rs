//! Process-id and `random_get` entropy source (design §4.4, §4.5).
//!
//! A linear congruential generator, the same algorithm and constants the
//! original `cloudos::rng` used ("a cryptographically unsafe RNG, using a
//! linear congruential generator seeded with a constant at boot time").
//! Unlike [`cosix_core::ContextSwitch`]/[`cosix_core::TickSource`], nothing
//! here reads real hardware, so this crate supplies a concrete
//! implementation instead of leaving the trait boundary unfilled.

use core::sync::atomic::{AtomicU64, Ordering};

use cosix_core::RandomSource;

// Relative primes, and every prime factor of `M` divides `A - 1`; taken
// from glibc, same as the original.
const A: u64 = 1_103_515_245;
const C: u64 = 12_345;
const M: u64 = 1 << 32;

/// Seeded once at construction with a fixed constant. Not suitable for
/// anything security-sensitive.
pub struct LcgRandomSource {
    state: AtomicU64,
}

impl LcgRandomSource {
    pub const fn new(seed: u32) -> Self {
        Self { state: AtomicU64::new(seed as u64) }
    }

    fn next_u32(&self) -> u32 {
        loop {
            let current = self.state.load(Ordering::Relaxed);
            let next = (A.wrapping_mul(current).wrapping_add(C)) % M;
            if self.state.compare_exchange_weak(current, next, Ordering::Relaxed, Ordering::Relaxed).is_ok() {
                return next as u32;
            }
        }
    }
}

impl RandomSource for LcgRandomSource {
    fn fill(&self, buf: &mut [u8]) {
        for chunk in buf.chunks_mut(4) {
            let word = self.next_u32().to_ne_bytes();
            chunk.copy_from_slice(&word[..chunk.len()]);
        }
    }
}
