//! Random number generator abstraction for determinism.
//!
//! In production, this wraps a real RNG. In tests and replays,
//! a seeded or scripted implementation is injected.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Abstraction over random number generation.
pub trait DeterministicRng: Send + Sync {
    /// Generate a random `u32` in the range `[min, max]` inclusive.
    fn next_u32_range(&mut self, min: u32, max: u32) -> u32;
}

/// Production RNG backed by `StdRng`, seeded from the operating system.
#[derive(Debug)]
pub struct StdRandom(StdRng);

impl StdRandom {
    /// Creates an OS-seeded generator.
    #[must_use]
    pub fn from_os() -> Self {
        Self(StdRng::from_os_rng())
    }

    /// Creates a generator with a fixed seed, for reproducible runs.
    #[must_use]
    pub fn seeded(seed: u64) -> Self {
        Self(StdRng::seed_from_u64(seed))
    }
}

impl DeterministicRng for StdRandom {
    fn next_u32_range(&mut self, min: u32, max: u32) -> u32 {
        self.0.random_range(min..=max)
    }
}

/// Index conversion for slice positions; slices handled here never exceed
/// `u32::MAX` elements.
fn to_u32(value: usize) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

/// Shuffles `items` in place with Fisher–Yates, drawing from `rng`.
///
/// Every permutation is equally likely given a uniform `rng`.
pub fn shuffle<T>(items: &mut [T], rng: &mut dyn DeterministicRng) {
    for i in (1..items.len()).rev() {
        let j = rng.next_u32_range(0, to_u32(i)) as usize;
        items.swap(i, j.min(i));
    }
}

/// Picks an index uniformly from `0..len`. Returns `None` for an empty range.
pub fn choose_index(len: usize, rng: &mut dyn DeterministicRng) -> Option<usize> {
    if len == 0 {
        return None;
    }
    let picked = rng.next_u32_range(0, to_u32(len - 1)) as usize;
    Some(picked.min(len - 1))
}
