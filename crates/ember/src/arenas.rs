//! # Engine Arenas
//!
//! The bulk buffers reserved at startup and the standard allocators over them.

use ember_memory::{
    AllocError, AllocResult, ArenaBuffer, FreeListAllocator, LinearAllocator, MemoryConfig,
    PoolAllocator, StackAllocator,
};

/// Backing storage for the engine's standard allocators.
///
/// Owns the buffers; the allocators borrow them through
/// [`EngineArenas::allocators`], so the buffers outlive every allocation by
/// construction.
pub struct EngineArenas {
    frame: ArenaBuffer,
    scratch: ArenaBuffer,
    heap: ArenaBuffer,
    /// Sized per slot type on first use of [`EngineArenas::pool`].
    pool: ArenaBuffer,
    pool_slots: usize,
}

/// The standard allocators, borrowing an [`EngineArenas`].
pub struct EngineAllocators<'a> {
    /// Per-frame scratch, reset once per frame.
    pub frame: LinearAllocator<'a>,
    /// Nested temporary work with markers.
    pub scratch: StackAllocator<'a>,
    /// General-purpose heap.
    pub heap: FreeListAllocator<'a>,
}

impl EngineArenas {
    /// Reserves the buffers described by `config`.
    #[must_use]
    pub fn new(config: &MemoryConfig) -> Self {
        tracing::info!(
            frame = config.frame_arena_bytes,
            scratch = config.scratch_stack_bytes,
            heap = config.general_heap_bytes,
            pool_slots = config.pool_slots,
            "engine arenas reserved"
        );
        Self {
            frame: ArenaBuffer::new(config.frame_arena_bytes),
            scratch: ArenaBuffer::new(config.scratch_stack_bytes),
            heap: ArenaBuffer::new(config.general_heap_bytes),
            pool: ArenaBuffer::new(0),
            pool_slots: config.pool_slots,
        }
    }

    /// Builds the standard allocators over the buffers.
    ///
    /// # Errors
    ///
    /// Fails if the heap buffer is too small for the free-list allocator.
    pub fn allocators(&mut self) -> AllocResult<EngineAllocators<'_>> {
        let Self {
            frame,
            scratch,
            heap,
            ..
        } = self;
        Ok(EngineAllocators {
            frame: LinearAllocator::new(frame.arena()),
            scratch: StackAllocator::new(scratch.arena()),
            heap: FreeListAllocator::new(heap.arena())?,
        })
    }

    /// Builds a pool of exactly `pool_slots` slots of `T`.
    ///
    /// The pool buffer is resized when the slot type changes; building the
    /// pool again for the same `T` reuses it.
    ///
    /// # Errors
    ///
    /// Returns [`AllocError::CapacityOverflow`] if the slot count does not
    /// fit in memory for `T`.
    pub fn pool<T>(&mut self) -> AllocResult<PoolAllocator<'_, T>> {
        let bytes =
            PoolAllocator::<T>::bytes_for(self.pool_slots).ok_or(AllocError::CapacityOverflow)?;
        if self.pool.capacity() != bytes {
            tracing::debug!(slots = self.pool_slots, bytes, "pool buffer resized");
            self.pool = ArenaBuffer::new(bytes);
        }
        PoolAllocator::new(self.pool.arena())
    }

    /// Total bytes reserved.
    #[must_use]
    pub fn reserved_bytes(&self) -> usize {
        self.frame.capacity()
            + self.scratch.capacity()
            + self.heap.capacity()
            + self.pool.capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_memory::Allocator;

    #[test]
    fn test_allocators_cover_budgets() {
        let config = MemoryConfig::compact();
        let mut arenas = EngineArenas::new(&config);
        assert!(arenas.reserved_bytes() >= config.frame_arena_bytes + config.general_heap_bytes);

        let allocators = arenas.allocators().unwrap();
        assert_eq!(allocators.frame.capacity(), config.frame_arena_bytes);
        assert_eq!(allocators.heap.capacity(), config.general_heap_bytes);
        let ptr = allocators.heap.allocate(128, 16).unwrap();
        allocators.heap.deallocate(ptr).unwrap();
    }

    #[test]
    fn test_pool_holds_configured_slots() {
        #[allow(dead_code)]
        struct Particle {
            position: [f32; 3],
            life: f32,
        }

        let config = MemoryConfig {
            pool_slots: 16,
            ..MemoryConfig::compact()
        };
        let mut arenas = EngineArenas::new(&config);
        {
            let particles = arenas.pool::<Particle>().unwrap();
            assert_eq!(particles.slot_capacity(), 16);
            for _ in 0..16 {
                particles
                    .emplace(Particle {
                        position: [0.0; 3],
                        life: 1.0,
                    })
                    .unwrap();
            }
            assert!(matches!(
                particles.emplace(Particle {
                    position: [1.0; 3],
                    life: 0.0,
                }),
                Err(AllocError::OutOfMemory { .. })
            ));
        }

        let reserved = arenas.reserved_bytes();
        assert_eq!(arenas.pool::<Particle>().unwrap().allocated_count(), 0);
        assert_eq!(arenas.reserved_bytes(), reserved);

        let ids = arenas.pool::<u64>().unwrap();
        assert_eq!(ids.slot_capacity(), 16);
    }
}
