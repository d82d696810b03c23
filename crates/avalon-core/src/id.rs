//! Identifier collaborator.
//!
//! Game, player and quest-attempt identifiers double as capability tokens,
//! so production ids must be unguessable. Tests inject a predictable source.

use uuid::Uuid;

/// Source of opaque identifiers.
pub trait IdGenerator: Send + Sync {
    /// Returns a fresh identifier.
    fn new_id(&self) -> Uuid;
}

/// Production generator: random version 4 UUIDs (122 random bits).
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomIdGenerator;

impl IdGenerator for RandomIdGenerator {
    fn new_id(&self) -> Uuid {
        Uuid::new_v4()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_ids_are_v4_and_distinct() {
        let ids = RandomIdGenerator;
        let a = ids.new_id();
        let b = ids.new_id();
        assert_ne!(a, b);
        assert_eq!(a.get_version_num(), 4);
    }
}
