//! # Stack Allocator
//!
//! LIFO allocator with save/restore markers.
//!
//! ## Layout
//!
//! ```text
//!   ... prev top ][ pad ][ adjustment | prev allocation ][ user data ][ free ...
//!                 ^ block start        header (2 words) ^ aligned     ^ offset
//! ```
//!
//! The header in front of every allocation records how far the user pointer
//! is from the previous stack top, so freeing the top allocation rewinds the
//! offset exactly.

use std::cell::Cell;
use std::ptr::NonNull;

use crate::allocator::{align_forward_adjustment_with_header, validate_request, Allocator};
use crate::arena::{Arena, WORD};
use crate::error::{AllocError, AllocResult};

/// Size of the per-allocation header.
const HEADER_SIZE: usize = 2 * WORD;

/// Sentinel for "no allocation".
const NONE: usize = usize::MAX;

/// A saved stack position.
///
/// Restoring a marker with [`StackAllocator::free_to_marker`] releases every
/// allocation made after it was taken. Markers must be restored in reverse
/// order of acquisition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Marker {
    /// Stack offset when the marker was taken.
    offset: usize,
    /// Top allocation when the marker was taken.
    top: usize,
    /// Live allocations when the marker was taken.
    allocations: usize,
    /// Nesting depth of this marker (1 for the outermost).
    depth: usize,
    /// Floor that was active before this marker.
    previous_floor: usize,
}

impl Marker {
    /// Stack offset recorded by the marker.
    #[inline]
    #[must_use]
    pub const fn offset(&self) -> usize {
        self.offset
    }

    /// Nesting depth of the marker.
    #[inline]
    #[must_use]
    pub const fn depth(&self) -> usize {
        self.depth
    }
}

/// A LIFO allocator over a caller-supplied arena.
///
/// Only the most recent live allocation may be freed individually. Groups of
/// allocations are released in bulk by restoring a [`Marker`].
///
/// # Thread Safety
///
/// This allocator is NOT thread-safe. Use one per thread.
///
/// # Example
///
/// ```rust,ignore
/// let scratch = StackAllocator::new(buffer.arena());
/// let marker = scratch.marker();
/// let a = scratch.allocate(64, 8)?;
/// let b = scratch.allocate(32, 16)?;
/// scratch.free_to_marker(marker)?; // a and b are gone
/// ```
pub struct StackAllocator<'a> {
    /// The backing region.
    arena: Arena<'a>,
    /// First free byte.
    offset: Cell<usize>,
    /// Offset of the most recent live allocation's user data.
    top: Cell<usize>,
    /// Live allocations.
    allocations: Cell<usize>,
    /// Number of outstanding markers.
    marker_depth: Cell<usize>,
    /// Offset of the innermost outstanding marker; nothing below may be freed.
    floor: Cell<usize>,
}

impl<'a> StackAllocator<'a> {
    /// Creates a stack allocator over `arena`.
    #[must_use]
    pub fn new(arena: Arena<'a>) -> Self {
        tracing::debug!(capacity = arena.capacity(), "stack allocator created");
        Self {
            arena,
            offset: Cell::new(0),
            top: Cell::new(NONE),
            allocations: Cell::new(0),
            marker_depth: Cell::new(0),
            floor: Cell::new(0),
        }
    }

    /// Takes a marker at the current stack top.
    #[must_use]
    pub fn marker(&self) -> Marker {
        let depth = self.marker_depth.get() + 1;
        let marker = Marker {
            offset: self.offset.get(),
            top: self.top.get(),
            allocations: self.allocations.get(),
            depth,
            previous_floor: self.floor.get(),
        };
        self.marker_depth.set(depth);
        self.floor.set(marker.offset);
        marker
    }

    /// Releases every allocation made after `marker` was taken.
    ///
    /// Nothing is scanned; the stack offset simply rewinds.
    ///
    /// # Errors
    ///
    /// Returns [`AllocError::MarkerOutOfOrder`] if a marker taken after this
    /// one has not been restored yet, or if this marker was already restored.
    pub fn free_to_marker(&self, marker: Marker) -> AllocResult<()> {
        let depth = self.marker_depth.get();
        if marker.depth != depth {
            return Err(AllocError::MarkerOutOfOrder {
                expected_depth: depth,
                marker_depth: marker.depth,
            });
        }

        tracing::debug!(
            from = self.offset.get(),
            to = marker.offset,
            released = self.allocations.get() - marker.allocations,
            "stack rewound to marker"
        );
        self.offset.set(marker.offset);
        self.top.set(marker.top);
        self.allocations.set(marker.allocations);
        self.marker_depth.set(depth - 1);
        self.floor.set(marker.previous_floor);
        Ok(())
    }

    /// Releases everything, including outstanding markers.
    pub fn clear(&self) {
        self.offset.set(0);
        self.top.set(NONE);
        self.allocations.set(0);
        self.marker_depth.set(0);
        self.floor.set(0);
    }

    /// Number of outstanding markers.
    #[inline]
    #[must_use]
    pub fn marker_depth(&self) -> usize {
        self.marker_depth.get()
    }

    /// Returns true if `ptr` is the most recent live allocation.
    #[must_use]
    pub fn is_top(&self, ptr: NonNull<u8>) -> bool {
        self.arena.offset_of(ptr) == Some(self.top.get())
    }
}

impl Allocator for StackAllocator<'_> {
    fn allocate(&self, size: usize, alignment: usize) -> AllocResult<NonNull<u8>> {
        validate_request(size, alignment)?;

        let offset = self.offset.get();
        let adjustment =
            align_forward_adjustment_with_header(self.arena.address(offset), alignment, HEADER_SIZE);
        let user = offset + adjustment;
        let end = user
            .checked_add(size)
            .filter(|&end| end <= self.arena.capacity())
            .ok_or(AllocError::OutOfMemory {
                requested: size,
                alignment,
                available: self.arena.capacity() - offset,
            })?;

        self.arena.write_word(user - HEADER_SIZE, adjustment);
        self.arena.write_word(user - WORD, self.top.get());
        self.top.set(user);
        self.offset.set(end);
        self.allocations.set(self.allocations.get() + 1);
        tracing::trace!(size, alignment, offset = user, "stack allocate");

        Ok(self.arena.ptr_at(user))
    }

    fn deallocate(&self, ptr: NonNull<u8>) -> AllocResult<()> {
        let user = self.arena.offset_of(ptr).ok_or(AllocError::ForeignPointer {
            address: ptr.as_ptr() as usize,
        })?;
        if user != self.top.get() || user < self.floor.get() {
            return Err(AllocError::NotTopOfStack { offset: user });
        }

        let adjustment = self.arena.read_word(user - HEADER_SIZE);
        let previous_top = self.arena.read_word(user - WORD);
        self.offset.set(user - adjustment);
        self.top.set(previous_top);
        self.allocations.set(self.allocations.get() - 1);
        tracing::trace!(offset = user, "stack deallocate");
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
        "stack"
    }
}
