//! # Arena Region
//!
//! A borrowed, contiguous byte range handed to exactly one allocator.
//!
//! ## Safety Note
//!
//! This module is one of the few places that needs unsafe code: it turns a
//! `&mut [u8]` into a base pointer so that allocators can hand out raw
//! pointers into the buffer and keep their bookkeeping inside it. All other
//! modules address the arena through byte offsets and the word accessors
//! below, which bounds-check every access.

#![allow(unsafe_code)]

use std::marker::PhantomData;
use std::ptr::{self, NonNull};

/// Size in bytes of one bookkeeping word.
pub(crate) const WORD: usize = std::mem::size_of::<usize>();

/// A caller-owned byte range lent to a single allocator.
///
/// The raw buffer belongs to the caller, the bookkeeping written inside it
/// belongs to the allocator. The `'a` borrow keeps the caller from touching
/// or freeing the buffer while the allocator is alive.
///
/// # Thread Safety
///
/// An arena may be moved to another thread together with its allocator, but
/// allocators built on it are never `Sync`.
pub struct Arena<'a> {
    /// First byte of the region.
    base: NonNull<u8>,
    /// Length of the region in bytes.
    capacity: usize,
    /// Ties the region to the caller's exclusive borrow.
    _borrow: PhantomData<&'a mut [u8]>,
}

// SAFETY: `Arena` is semantically a `&'a mut [u8]`, which is `Send`.
unsafe impl Send for Arena<'_> {}

impl<'a> Arena<'a> {
    /// Wraps a caller-supplied buffer.
    #[must_use]
    pub fn new(buffer: &'a mut [u8]) -> Self {
        let capacity = buffer.len();
        Self {
            base: NonNull::from(buffer).cast::<u8>(),
            capacity,
            _borrow: PhantomData,
        }
    }

    /// Returns the size of the region in bytes.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the absolute address of the first byte.
    #[inline]
    #[must_use]
    pub fn base_address(&self) -> usize {
        self.base.as_ptr() as usize
    }

    /// Returns the absolute address of `offset`.
    #[inline]
    #[must_use]
    pub fn address(&self, offset: usize) -> usize {
        self.base_address() + offset
    }

    /// Returns a pointer to `offset`.
    ///
    /// # Panics
    ///
    /// Panics if `offset` is past the end of the region.
    #[inline]
    #[must_use]
    pub fn ptr_at(&self, offset: usize) -> NonNull<u8> {
        assert!(offset <= self.capacity, "arena offset {offset} out of range");
        // SAFETY: `offset` is within (or one past) the borrowed region, so the
        // result stays in the same allocation and is non-null.
        unsafe { NonNull::new_unchecked(self.base.as_ptr().add(offset)) }
    }

    /// Maps a pointer back to its offset, or `None` if it lies outside the region.
    #[inline]
    #[must_use]
    pub fn offset_of(&self, ptr: NonNull<u8>) -> Option<usize> {
        let address = ptr.as_ptr() as usize;
        let base = self.base_address();
        if address >= base && address < base + self.capacity {
            Some(address - base)
        } else {
            None
        }
    }

    /// Returns true if `len` bytes starting at `offset` lie inside the region.
    #[inline]
    #[must_use]
    pub fn contains_range(&self, offset: usize, len: usize) -> bool {
        offset
            .checked_add(len)
            .is_some_and(|end| end <= self.capacity)
    }

    /// Reads a bookkeeping word stored at `offset`.
    ///
    /// # Panics
    ///
    /// Panics if the word is not fully inside the region.
    #[inline]
    pub(crate) fn read_word(&self, offset: usize) -> usize {
        assert!(self.contains_range(offset, WORD), "arena word read at {offset} out of range");
        // SAFETY: bounds checked above; unaligned reads are allowed.
        unsafe { ptr::read_unaligned(self.base.as_ptr().add(offset).cast::<usize>()) }
    }

    /// Writes a bookkeeping word at `offset`.
    ///
    /// # Panics
    ///
    /// Panics if the word is not fully inside the region.
    #[inline]
    pub(crate) fn write_word(&self, offset: usize, value: usize) {
        assert!(self.contains_range(offset, WORD), "arena word write at {offset} out of range");
        // SAFETY: bounds checked above; unaligned writes are allowed. The
        // allocator owning this arena is the only writer of bookkeeping words.
        unsafe { ptr::write_unaligned(self.base.as_ptr().add(offset).cast::<usize>(), value) }
    }
}

impl std::fmt::Debug for Arena<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Arena")
            .field("base", &format_args!("{:#x}", self.base_address()))
            .field("capacity", &self.capacity)
            .finish()
    }
}

/// Host-side backing storage for an arena.
///
/// Plays the role of the single bulk `malloc` a subsystem makes at startup.
/// The storage is word aligned and zeroed; its capacity is rounded up to a
/// multiple of eight bytes.
///
/// # Example
///
/// ```rust,ignore
/// let mut buffer = ArenaBuffer::new(64 * 1024);
/// let allocator = FreeListAllocator::new(buffer.arena())?;
/// ```
pub struct ArenaBuffer {
    /// Word storage, viewed as bytes through `bytemuck`.
    words: Box<[u64]>,
}

impl ArenaBuffer {
    /// Creates a zeroed buffer of at least `capacity` bytes.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let words = vec![0u64; capacity.div_ceil(8)].into_boxed_slice();
        Self { words }
    }

    /// Returns the capacity in bytes.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.words.len() * 8
    }

    /// Returns the storage as bytes.
    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.words)
    }

    /// Returns the storage as mutable bytes.
    #[inline]
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        bytemuck::cast_slice_mut(&mut self.words)
    }

    /// Lends the whole buffer out as an arena.
    #[inline]
    pub fn arena(&mut self) -> Arena<'_> {
        Arena::new(self.as_bytes_mut())
    }
}

impl std::fmt::Debug for ArenaBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArenaBuffer")
            .field("capacity", &self.capacity())
            .finish()
    }
}
