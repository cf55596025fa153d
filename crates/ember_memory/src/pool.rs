//! # Pool Allocator
//!
//! Fixed-size block allocator for objects that are frequently allocated and
//! freed.
//!
//! ## Layout
//!
//! ```text
//!   [ pad ][ slot 0 ][ slot 1 ][ slot 2 ] ... [ slot N-1 ][ tail ]
//!            │ next ─────────────┘
//! ```
//!
//! A free slot's first word holds the index of the next free slot, so the
//! free list costs no memory outside the arena.

#![allow(unsafe_code)]

use std::cell::Cell;
use std::marker::PhantomData;
use std::mem;
use std::ptr::NonNull;

use crate::allocator::{align_forward_adjustment, align_up, validate_request, Allocator};
use crate::arena::{Arena, WORD};
use crate::error::{AllocError, AllocResult};

/// Free-list terminator.
const NONE: usize = usize::MAX;

/// A pool allocator for fixed-size objects of type `T`.
///
/// Slots can be allocated and freed individually, but every slot has the
/// same size. This is perfect for things like particles, network packets,
/// or temporary game objects.
///
/// The slot count is fixed at construction; the pool never grows.
///
/// # Thread Safety
///
/// This pool is NOT thread-safe. Use one pool per thread or wrap in a mutex.
///
/// # Example
///
/// ```rust,ignore
/// struct Particle { x: f32, y: f32, life: f32 }
///
/// let pool: PoolAllocator<Particle> = PoolAllocator::new(buffer.arena())?;
///
/// // Allocate - O(1), no heap allocation
/// let particle = pool.emplace(Particle { x: 0.0, y: 0.0, life: 1.0 })?;
///
/// // Free - O(1), no heap deallocation
/// let value = unsafe { pool.take(particle)? };
/// ```
pub struct PoolAllocator<'a, T> {
    /// The backing region.
    arena: Arena<'a>,
    /// Offset of slot 0.
    first_slot: usize,
    /// Bytes per slot.
    slot_size: usize,
    /// Alignment of every slot.
    slot_alignment: usize,
    /// Total slots.
    capacity: usize,
    /// Index of the first free slot.
    free_head: Cell<usize>,
    /// Number of allocated slots.
    allocated_count: Cell<usize>,
    /// Marker for T.
    _phantom: PhantomData<T>,
}

impl<'a, T> PoolAllocator<'a, T> {
    /// Bytes per slot: large enough for `T` and for a free-list link.
    pub const SLOT_SIZE: usize = align_up(
        if mem::size_of::<T>() > WORD { mem::size_of::<T>() } else { WORD },
        Self::SLOT_ALIGNMENT,
    );

    /// Alignment of every slot.
    pub const SLOT_ALIGNMENT: usize = if mem::align_of::<T>() > mem::align_of::<usize>() {
        mem::align_of::<T>()
    } else {
        mem::align_of::<usize>()
    };

    /// Bytes a word-aligned buffer needs to hold exactly `slots` slots.
    ///
    /// Includes the worst-case lead for slot alignments above a word. Returns
    /// `None` on overflow.
    #[must_use]
    pub const fn bytes_for(slots: usize) -> Option<usize> {
        match slots.checked_mul(Self::SLOT_SIZE) {
            Some(bytes) => bytes.checked_add(Self::SLOT_ALIGNMENT - WORD),
            None => None,
        }
    }

    /// Carves `arena` into as many slots as fit.
    ///
    /// # Errors
    ///
    /// Returns [`AllocError::ArenaTooSmall`] if not even one slot fits.
    pub fn new(arena: Arena<'a>) -> AllocResult<Self> {
        let slot_size = Self::SLOT_SIZE;
        let slot_alignment = Self::SLOT_ALIGNMENT;
        let first_slot = align_forward_adjustment(arena.base_address(), slot_alignment);
        let capacity = arena.capacity().saturating_sub(first_slot) / slot_size;
        if capacity == 0 {
            return Err(AllocError::ArenaTooSmall {
                capacity: arena.capacity(),
                required: first_slot + slot_size,
            });
        }

        let pool = Self {
            arena,
            first_slot,
            slot_size,
            slot_alignment,
            capacity,
            free_head: Cell::new(NONE),
            allocated_count: Cell::new(0),
            _phantom: PhantomData,
        };
        pool.rebuild_free_list();
        tracing::debug!(capacity, slot_size, "pool allocator created");
        Ok(pool)
    }

    /// Returns the total number of slots.
    #[inline]
    #[must_use]
    pub const fn slot_capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the number of allocated slots.
    #[inline]
    #[must_use]
    pub fn allocated_count(&self) -> usize {
        self.allocated_count.get()
    }

    /// Returns the number of free slots.
    #[inline]
    #[must_use]
    pub fn free_count(&self) -> usize {
        self.capacity - self.allocated_count.get()
    }

    /// Allocates one uninitialised slot.
    ///
    /// This is a **O(1)** operation.
    ///
    /// # Errors
    ///
    /// Returns [`AllocError::OutOfMemory`] if every slot is taken.
    pub fn allocate_slot(&self) -> AllocResult<NonNull<T>> {
        let index = self.free_head.get();
        if index == NONE {
            return Err(AllocError::OutOfMemory {
                requested: self.slot_size,
                alignment: self.slot_alignment,
                available: 0,
            });
        }

        let offset = self.slot_offset(index);
        self.free_head.set(self.arena.read_word(offset));
        self.allocated_count.set(self.allocated_count.get() + 1);
        tracing::trace!(index, "pool allocate");
        Ok(self.arena.ptr_at(offset).cast::<T>())
    }

    /// Allocates a slot and moves `value` into it.
    ///
    /// # Errors
    ///
    /// Returns [`AllocError::OutOfMemory`] if every slot is taken.
    pub fn emplace(&self, value: T) -> AllocResult<NonNull<T>> {
        let slot = self.allocate_slot()?;
        // SAFETY: the slot is freshly allocated, sized and aligned for `T`,
        // and not aliased by anyone else.
        unsafe { slot.as_ptr().write(value) };
        Ok(slot)
    }

    /// Moves the value out of `slot` and returns the slot to the pool.
    ///
    /// # Errors
    ///
    /// Fails like [`Allocator::deallocate`]; on error the value is left in place.
    ///
    /// # Safety
    ///
    /// `slot` must have been produced by [`PoolAllocator::emplace`] (or written
    /// with a valid `T` after [`PoolAllocator::allocate_slot`]) on this pool
    /// and not taken or freed since.
    pub unsafe fn take(&self, slot: NonNull<T>) -> AllocResult<T> {
        let index = self.slot_index(slot.cast::<u8>())?;
        self.check_not_free(index)?;
        // SAFETY: guaranteed by the caller; the slot holds an initialised `T`.
        let value = unsafe { slot.as_ptr().read() };
        self.release(index);
        Ok(value)
    }

    /// Returns every slot to the pool.
    ///
    /// Values still living in slots are NOT dropped.
    pub fn clear(&self) {
        self.rebuild_free_list();
        self.allocated_count.set(0);
    }

    /// Threads all slots onto the free list in address order.
    fn rebuild_free_list(&self) {
        for index in 0..self.capacity {
            let next = if index + 1 < self.capacity { index + 1 } else { NONE };
            self.arena.write_word(self.slot_offset(index), next);
        }
        self.free_head.set(0);
    }

    #[inline]
    fn slot_offset(&self, index: usize) -> usize {
        self.first_slot + index * self.slot_size
    }

    /// Maps a pointer to its slot index.
    fn slot_index(&self, ptr: NonNull<u8>) -> AllocResult<usize> {
        let offset = self.arena.offset_of(ptr).ok_or(AllocError::ForeignPointer {
            address: ptr.as_ptr() as usize,
        })?;
        let relative = offset
            .checked_sub(self.first_slot)
            .ok_or(AllocError::InvalidPointer { offset })?;
        let index = relative / self.slot_size;
        if relative % self.slot_size != 0 || index >= self.capacity {
            return Err(AllocError::InvalidPointer { offset });
        }
        Ok(index)
    }

    /// Walks the free list looking for `index`. Debug builds only.
    fn check_not_free(&self, index: usize) -> AllocResult<()> {
        if cfg!(debug_assertions) {
            let mut cursor = self.free_head.get();
            while cursor != NONE {
                if cursor == index {
                    return Err(AllocError::DoubleFree {
                        offset: self.slot_offset(index),
                    });
                }
                cursor = self.arena.read_word(self.slot_offset(cursor));
            }
        }
        Ok(())
    }

    /// Pushes `index` onto the free list.
    fn release(&self, index: usize) {
        self.arena
            .write_word(self.slot_offset(index), self.free_head.get());
        self.free_head.set(index);
        self.allocated_count.set(self.allocated_count.get() - 1);
        tracing::trace!(index, "pool deallocate");
    }
}

impl<T> Allocator for PoolAllocator<'_, T> {
    /// Hands out one slot; the request must fit in it.
    fn allocate(&self, size: usize, alignment: usize) -> AllocResult<NonNull<u8>> {
        validate_request(size, alignment)?;
        if size > self.slot_size || alignment > self.slot_alignment {
            return Err(AllocError::UnsupportedRequest {
                size,
                alignment,
                slot_size: self.slot_size,
                slot_alignment: self.slot_alignment,
            });
        }
        self.allocate_slot().map(NonNull::cast)
    }

    fn deallocate(&self, ptr: NonNull<u8>) -> AllocResult<()> {
        let index = self.slot_index(ptr)?;
        self.check_not_free(index)?;
        self.release(index);
        Ok(())
    }

    fn capacity(&self) -> usize {
        self.arena.capacity()
    }

    fn used_memory(&self) -> usize {
        self.allocated_count.get() * self.slot_size
    }

    fn allocation_count(&self) -> usize {
        self.allocated_count.get()
    }

    fn name(&self) -> &'static str {
        "pool"
    }
}
