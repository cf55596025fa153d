//! # Linear Allocator
//!
//! A bump allocator for temporary allocations that are freed all at once.

use std::cell::Cell;
use std::ptr::NonNull;

use crate::allocator::{align_forward_adjustment, validate_request, Allocator};
use crate::arena::Arena;
use crate::error::{AllocError, AllocResult};

/// A bump-pointer allocator over a caller-supplied arena.
///
/// Allocations are fast (just bump an offset). Individual frees are ignored;
/// memory is reclaimed all at once by [`LinearAllocator::reset`].
///
/// # Thread Safety
///
/// This allocator is NOT thread-safe. Use one per thread.
///
/// # Example
///
/// ```rust,ignore
/// let mut buffer = ArenaBuffer::new(1024 * 1024); // 1MB
/// let frame = LinearAllocator::new(buffer.arena());
///
/// let ptr = frame.allocate(256, 16)?;
///
/// // End of frame: everything goes at once
/// frame.reset();
/// ```
pub struct LinearAllocator<'a> {
    /// The backing region.
    arena: Arena<'a>,
    /// Current allocation offset.
    offset: Cell<usize>,
    /// Allocations since the last reset.
    allocations: Cell<usize>,
}

impl<'a> LinearAllocator<'a> {
    /// Creates a linear allocator over `arena`.
    #[must_use]
    pub fn new(arena: Arena<'a>) -> Self {
        tracing::debug!(capacity = arena.capacity(), "linear allocator created");
        Self {
            arena,
            offset: Cell::new(0),
            allocations: Cell::new(0),
        }
    }

    /// Returns the remaining free space in bytes (before alignment padding).
    #[inline]
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.arena.capacity() - self.offset.get()
    }

    /// Resets the allocator, invalidating all previous allocations.
    ///
    /// This is a **zero-cost** operation - nothing is scanned or freed.
    /// Previous pointers become invalid and must not be used.
    #[inline]
    pub fn reset(&self) {
        tracing::debug!(
            used = self.offset.get(),
            allocations = self.allocations.get(),
            "linear allocator reset"
        );
        self.offset.set(0);
        self.allocations.set(0);
    }
}

impl Allocator for LinearAllocator<'_> {
    fn allocate(&self, size: usize, alignment: usize) -> AllocResult<NonNull<u8>> {
        validate_request(size, alignment)?;

        let offset = self.offset.get();
        let aligned_offset =
            offset + align_forward_adjustment(self.arena.address(offset), alignment);
        let new_offset = aligned_offset
            .checked_add(size)
            .filter(|&end| end <= self.arena.capacity())
            .ok_or(AllocError::OutOfMemory {
                requested: size,
                alignment,
                available: self.remaining(),
            })?;

        self.offset.set(new_offset);
        self.allocations.set(self.allocations.get() + 1);
        tracing::trace!(size, alignment, offset = aligned_offset, "linear allocate");

        Ok(self.arena.ptr_at(aligned_offset))
    }

    /// No-op: linear allocations are only reclaimed by [`LinearAllocator::reset`].
    fn deallocate(&self, ptr: NonNull<u8>) -> AllocResult<()> {
        if self.arena.offset_of(ptr).is_none() {
            return Err(AllocError::ForeignPointer {
                address: ptr.as_ptr() as usize,
            });
        }
        tracing::trace!("linear deallocate ignored, use reset()");
        Ok(())
    }

    fn capacity(&self) -> usize {
        self.arena.capacity()
    }

    fn used_memory(&self) -> usize {
        self.offset.get()
    }

    fn allocation_count(&self) -> usize {
        self.allocations.get()
    }

    fn name(&self) -> &'static str {
        "linear"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::ArenaBuffer;

    #[test]
    fn test_linear_allocation() {
        let mut buffer = ArenaBuffer::new(1024);
        let linear = LinearAllocator::new(buffer.arena());

        let first = linear.allocate(10, 1).unwrap();
        let second = linear.allocate(4, 4).unwrap();
        assert_eq!(second.as_ptr() as usize % 4, 0);
        assert!(second.as_ptr() as usize >= first.as_ptr() as usize + 10);
        assert_eq!(linear.allocation_count(), 2);
    }

    #[test]
    fn test_linear_reset() {
        let mut buffer = ArenaBuffer::new(1024);
        let linear = LinearAllocator::new(buffer.arena());
        let first = linear.allocate(100, 8).unwrap();
        assert!(linear.used_memory() > 0);

        linear.reset();
        assert_eq!(linear.used_memory(), 0);
        assert_eq!(linear.allocation_count(), 0);

        // The first allocation after a reset starts over at the same place.
        let again = linear.allocate(100, 8).unwrap();
        assert_eq!(first, again);
    }

    #[test]
    fn test_linear_exhaustion() {
        let mut buffer = ArenaBuffer::new(64);
        let linear = LinearAllocator::new(buffer.arena());
        linear.allocate(60, 1).unwrap();
        let err = linear.allocate(8, 1).unwrap_err();
        assert_eq!(
            err,
            AllocError::OutOfMemory {
                requested: 8,
                alignment: 1,
                available: 4,
            }
        );
        // Exactly filling the arena is allowed.
        linear.allocate(4, 1).unwrap();
        assert_eq!(linear.remaining(), 0);
    }

    #[test]
    fn test_linear_deallocate_is_noop() {
        let mut buffer = ArenaBuffer::new(64);
        let linear = LinearAllocator::new(buffer.arena());
        let ptr = linear.allocate(16, 8).unwrap();
        let used = linear.used_memory();
        linear.deallocate(ptr).unwrap();
        assert_eq!(linear.used_memory(), used);
    }

    #[test]
    fn test_linear_rejects_foreign_pointer() {
        let mut buffer = ArenaBuffer::new(64);
        let mut other = [0u8; 4];
        let linear = LinearAllocator::new(buffer.arena());
        let foreign = NonNull::from(&mut other[0]);
        assert!(matches!(
            linear.deallocate(foreign),
            Err(AllocError::ForeignPointer { .. })
        ));
    }
}
