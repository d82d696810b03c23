//! Test RNG: deterministic `DeterministicRng` implementations for tests.

use avalon_core::rng::DeterministicRng;

/// A no-op RNG that always returns `min`. Suitable for tests that do not
/// depend on specific random values.
#[derive(Debug)]
pub struct MockRng;

impl DeterministicRng for MockRng {
    fn next_u32_range(&mut self, min: u32, _max: u32) -> u32 {
        min
    }
}

/// An RNG that returns values from a predetermined sequence. Panics if the
/// sequence is exhausted. Used in tests that need a specific role deal or
/// starting leader.
#[derive(Debug)]
pub struct SequenceRng {
    values: Vec<u32>,
    index: usize,
}

impl SequenceRng {
    /// Create a new `SequenceRng` with the given values.
    #[must_use]
    pub fn new(values: Vec<u32>) -> Self {
        Self { values, index: 0 }
    }
}

impl DeterministicRng for SequenceRng {
    fn next_u32_range(&mut self, _min: u32, _max: u32) -> u32 {
        let val = self.values[self.index];
        self.index += 1;
        val
    }
}

/// Draws that make a Fisher–Yates shuffle of `len` items the identity
/// permutation: `len - 1, len - 2, ..., 1`.
///
/// Append a leader index to deal roles in list order and pick that leader.
#[must_use]
pub fn identity_shuffle_draws(len: u32) -> Vec<u32> {
    (1..len).rev().collect()
}
