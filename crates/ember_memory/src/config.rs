//! # Memory Budget Configuration
//!
//! Arena sizes an engine reserves at startup. Loaded once, never reloaded.

use serde::{Deserialize, Serialize};

use crate::error::{AllocError, AllocResult};
use crate::free_list::MIN_BLOCK_SIZE;

/// Arena budgets for the engine's standard allocators.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MemoryConfig {
    /// Per-frame linear arena, reset every frame.
    pub frame_arena_bytes: usize,
    /// Scratch stack arena for nested temporary work.
    pub scratch_stack_bytes: usize,
    /// General-purpose free-list heap.
    pub general_heap_bytes: usize,
    /// Slot count for typed object pools.
    pub pool_slots: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            frame_arena_bytes: 1024 * 1024,     // 1MB per frame
            scratch_stack_bytes: 256 * 1024,
            general_heap_bytes: 16 * 1024 * 1024,
            pool_slots: 4096,
        }
    }
}

impl MemoryConfig {
    /// Small budgets for tests and tools.
    #[must_use]
    pub const fn compact() -> Self {
        Self {
            frame_arena_bytes: 64 * 1024,
            scratch_stack_bytes: 16 * 1024,
            general_heap_bytes: 256 * 1024,
            pool_slots: 256,
        }
    }

    /// Checks that every arena can hold at least one allocation.
    ///
    /// # Errors
    ///
    /// Returns [`AllocError::ArenaTooSmall`] for the first undersized arena.
    pub fn validate(&self) -> AllocResult<()> {
        for (capacity, required) in [
            (self.frame_arena_bytes, 1),
            (self.scratch_stack_bytes, 1),
            (self.general_heap_bytes, MIN_BLOCK_SIZE),
            (self.pool_slots, 1),
        ] {
            if capacity < required {
                return Err(AllocError::ArenaTooSmall { capacity, required });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        MemoryConfig::default().validate().unwrap();
        MemoryConfig::compact().validate().unwrap();
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: MemoryConfig = toml::from_str("general_heap_bytes = 4096").unwrap();
        assert_eq!(config.general_heap_bytes, 4096);
        assert_eq!(config.pool_slots, MemoryConfig::default().pool_slots);
    }

    #[test]
    fn test_undersized_heap_rejected() {
        let config = MemoryConfig {
            general_heap_bytes: 8,
            ..MemoryConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(AllocError::ArenaTooSmall {
                capacity: 8,
                required: MIN_BLOCK_SIZE,
            })
        );
    }
}
