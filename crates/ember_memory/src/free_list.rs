//! # Free-List Allocator
//!
//! General-purpose allocator with variable-size blocks, first-fit search and
//! immediate coalescing.
//!
//! ## Block Layout
//!
//! ```text
//!   block start
//!   │
//!   ▼
//!   [ size | free ][ prev physical ][ next free ][ prev free ][ pad ... ][ adjustment ][ user data ... ]
//!   └─────────────────────── header (4 words) ──────────────┘           └─ 1 word ──┘▲
//!                                                                                    │ aligned
//! ```
//!
//! The free-list links are only meaningful while the block is free. They sit
//! in front of the adjustment word, so a freed block still maps its old user
//! pointer back to the header and a second free is reported as such.
//!
//! All bookkeeping lives inside the arena and is addressed by byte offsets.
//! Every block knows its physical predecessor (header word) and successor
//! (`offset + size`), so coalescing on free never scans.

use std::cell::Cell;
use std::ptr::NonNull;

use crate::allocator::{
    align_forward_adjustment, align_forward_adjustment_with_header, validate_request, Allocator,
};
use crate::arena::{Arena, WORD};
use crate::error::{AllocError, AllocResult};

/// Offset of the next-free link inside a block.
const NEXT_FREE: usize = 2 * WORD;

/// Offset of the previous-free link inside a block.
const PREV_FREE: usize = 3 * WORD;

/// Size of the block header (size/free, previous physical, free-list links).
const BLOCK_HEADER: usize = 4 * WORD;

/// Word right before user data holding the alignment adjustment.
const ADJUSTMENT_SLOT: usize = WORD;

/// Smallest block: a bare header, enough to sit on the free list.
pub const MIN_BLOCK_SIZE: usize = BLOCK_HEADER;

/// Low bit of the size word marks a free block.
const FREE_BIT: usize = 1;

/// Null offset.
const NONE: usize = usize::MAX;

/// One block from a physical walk of the arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockInfo {
    /// Offset of the block header inside the arena.
    pub offset: usize,
    /// Block size in bytes, header included.
    pub size: usize,
    /// Whether the block is on the free list.
    pub free: bool,
}

/// Occupancy summary of a [`FreeListAllocator`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FreeListStats {
    /// Total arena bytes.
    pub capacity: usize,
    /// Bytes held by free blocks.
    pub free_bytes: usize,
    /// Bytes held by allocated blocks, headers and padding included.
    pub used_bytes: usize,
    /// Bytes outside the managed region (alignment lead and tail).
    pub reserved_bytes: usize,
    /// Number of free blocks.
    pub free_blocks: usize,
    /// Size of the largest free block.
    pub largest_free_block: usize,
}

impl FreeListStats {
    /// Returns true if every byte of the arena is accounted for exactly once.
    #[inline]
    #[must_use]
    pub const fn is_balanced(&self) -> bool {
        self.free_bytes + self.used_bytes + self.reserved_bytes == self.capacity
    }
}

/// General-purpose allocator over a fixed arena.
///
/// # Algorithm
///
/// - **Allocate**: first-fit over the free list. A block is split when the
///   remainder can hold a minimal block; otherwise the whole block is handed
///   out.
/// - **Deallocate**: the block is marked free and merged with its free
///   physical neighbours, then pushed to the front of the free list, so a
///   freed block is found before untouched space.
///
/// # Thread Safety
///
/// This allocator is NOT thread-safe. Use one per thread.
///
/// # Example
///
/// ```rust,ignore
/// let mut buffer = ArenaBuffer::new(64 * 1024);
/// let heap = FreeListAllocator::new(buffer.arena())?;
///
/// let mesh = heap.allocate(4096, 16)?;
/// heap.deallocate(mesh)?;
/// heap.verify_integrity()?;
/// ```
pub struct FreeListAllocator<'a> {
    /// The backing region.
    arena: Arena<'a>,
    /// Offset of the first block.
    start: usize,
    /// End of the managed region.
    end: usize,
    /// First block on the free list.
    free_head: Cell<usize>,
    /// Bytes in allocated blocks.
    used: Cell<usize>,
    /// Live allocations.
    allocations: Cell<usize>,
}

impl<'a> FreeListAllocator<'a> {
    /// Creates the allocator with the whole arena as one free block.
    ///
    /// # Errors
    ///
    /// Returns [`AllocError::ArenaTooSmall`] if the arena cannot hold one
    /// minimal block after word alignment.
    pub fn new(arena: Arena<'a>) -> AllocResult<Self> {
        let start = align_forward_adjustment(arena.base_address(), WORD);
        let managed = arena.capacity().saturating_sub(start) & !(WORD - 1);
        if managed < MIN_BLOCK_SIZE {
            return Err(AllocError::ArenaTooSmall {
                capacity: arena.capacity(),
                required: start + MIN_BLOCK_SIZE,
            });
        }

        let allocator = Self {
            arena,
            start,
            end: start + managed,
            free_head: Cell::new(NONE),
            used: Cell::new(0),
            allocations: Cell::new(0),
        };
        allocator.write_header(start, managed, true);
        allocator.set_prev_physical(start, NONE);
        allocator.push_free(start);

        tracing::debug!(capacity = allocator.arena.capacity(), managed, "free-list allocator created");
        Ok(allocator)
    }

    /// Walks every block in address order.
    #[must_use]
    pub fn blocks(&self) -> Blocks<'_, 'a> {
        Blocks {
            allocator: self,
            cursor: self.start,
        }
    }

    /// Summarises free and used space.
    ///
    /// Free space is measured by walking the free list, not taken from a
    /// counter, so the result doubles as a consistency check.
    #[must_use]
    pub fn block_stats(&self) -> FreeListStats {
        let mut stats = FreeListStats {
            capacity: self.arena.capacity(),
            used_bytes: self.used.get(),
            reserved_bytes: self.start + (self.arena.capacity() - self.end),
            ..FreeListStats::default()
        };
        let mut cursor = self.free_head.get();
        while cursor != NONE {
            let size = self.block_size(cursor);
            stats.free_bytes += size;
            stats.free_blocks += 1;
            stats.largest_free_block = stats.largest_free_block.max(size);
            cursor = self.next_free(cursor);
        }
        stats
    }

    /// Checks every structural invariant of the block list.
    ///
    /// # Errors
    ///
    /// Returns [`AllocError::Corrupted`] naming the first offending block.
    pub fn verify_integrity(&self) -> AllocResult<()> {
        let corrupted = |offset, reason| Err(AllocError::Corrupted { offset, reason });

        let mut cursor = self.start;
        let mut previous = NONE;
        let mut previous_free = false;
        let mut free_blocks = 0;
        let mut used_bytes = 0;
        let mut used_blocks = 0;
        while cursor < self.end {
            let size = self.block_size(cursor);
            if size < MIN_BLOCK_SIZE || size % WORD != 0 || cursor + size > self.end {
                return corrupted(cursor, "block size out of range");
            }
            if self.prev_physical(cursor) != previous {
                return corrupted(cursor, "previous-block link mismatch");
            }
            let free = self.is_free(cursor);
            if free && previous_free {
                return corrupted(cursor, "adjacent free blocks not coalesced");
            }
            if free {
                free_blocks += 1;
            } else {
                used_bytes += size;
                used_blocks += 1;
            }
            previous = cursor;
            previous_free = free;
            cursor += size;
        }
        if cursor != self.end {
            return corrupted(cursor, "blocks do not tile the managed region");
        }
        if used_bytes != self.used.get() || used_blocks != self.allocations.get() {
            return corrupted(self.start, "allocation counters disagree with blocks");
        }

        let mut listed = 0;
        let mut back = NONE;
        let mut cursor = self.free_head.get();
        while cursor != NONE {
            listed += 1;
            if listed > free_blocks {
                return corrupted(cursor, "free list longer than free block count");
            }
            if !self.is_free(cursor) {
                return corrupted(cursor, "allocated block on free list");
            }
            if self.prev_free(cursor) != back {
                return corrupted(cursor, "free list back link mismatch");
            }
            back = cursor;
            cursor = self.next_free(cursor);
        }
        if listed != free_blocks {
            return corrupted(self.start, "free block missing from free list");
        }
        Ok(())
    }

    // ---- header access ----

    #[inline]
    fn block_size(&self, block: usize) -> usize {
        self.arena.read_word(block) & !FREE_BIT
    }

    #[inline]
    fn is_free(&self, block: usize) -> bool {
        self.arena.read_word(block) & FREE_BIT != 0
    }

    #[inline]
    fn write_header(&self, block: usize, size: usize, free: bool) {
        self.arena
            .write_word(block, size | if free { FREE_BIT } else { 0 });
    }

    #[inline]
    fn prev_physical(&self, block: usize) -> usize {
        self.arena.read_word(block + WORD)
    }

    #[inline]
    fn set_prev_physical(&self, block: usize, previous: usize) {
        self.arena.write_word(block + WORD, previous);
    }

    /// Block physically after `block`, if any.
    #[inline]
    fn next_physical(&self, block: usize) -> Option<usize> {
        let next = block + self.block_size(block);
        (next < self.end).then_some(next)
    }

    // ---- free list ----

    #[inline]
    fn next_free(&self, block: usize) -> usize {
        self.arena.read_word(block + NEXT_FREE)
    }

    #[inline]
    fn prev_free(&self, block: usize) -> usize {
        self.arena.read_word(block + PREV_FREE)
    }

    #[inline]
    fn set_free_links(&self, block: usize, previous: usize, next: usize) {
        self.arena.write_word(block + NEXT_FREE, next);
        self.arena.write_word(block + PREV_FREE, previous);
    }

    fn push_free(&self, block: usize) {
        let head = self.free_head.get();
        self.set_free_links(block, NONE, head);
        if head != NONE {
            self.arena.write_word(head + PREV_FREE, block);
        }
        self.free_head.set(block);
    }

    fn unlink_free(&self, block: usize) {
        let previous = self.prev_free(block);
        let next = self.next_free(block);
        if previous == NONE {
            self.free_head.set(next);
        } else {
            self.arena.write_word(previous + NEXT_FREE, next);
        }
        if next != NONE {
            self.arena.write_word(next + PREV_FREE, previous);
        }
    }

    /// Bytes a block needs to serve `size` bytes after `adjustment`.
    fn block_size_for(adjustment: usize, size: usize) -> Option<usize> {
        let raw = adjustment.checked_add(size)?.checked_add(WORD - 1)?;
        Some((raw & !(WORD - 1)).max(MIN_BLOCK_SIZE))
    }

    /// Recovers the block owning the user offset `user`.
    fn owning_block(&self, user: usize) -> AllocResult<usize> {
        let invalid = AllocError::InvalidPointer { offset: user };
        if user < self.start + BLOCK_HEADER + ADJUSTMENT_SLOT || user >= self.end {
            return Err(invalid);
        }
        let adjustment = self.arena.read_word(user - ADJUSTMENT_SLOT);
        if adjustment < BLOCK_HEADER + ADJUSTMENT_SLOT || adjustment > user - self.start {
            return Err(invalid);
        }
        let block = user - adjustment;
        if (block - self.start) % WORD != 0 {
            return Err(invalid);
        }
        Ok(block)
    }

    /// Physical walk looking for a block starting at `target`.
    fn is_block_start(&self, target: usize) -> bool {
        self.blocks()
            .map(|block| block.offset)
            .take_while(|&offset| offset <= target)
            .any(|offset| offset == target)
    }
}

impl Allocator for FreeListAllocator<'_> {
    fn allocate(&self, size: usize, alignment: usize) -> AllocResult<NonNull<u8>> {
        validate_request(size, alignment)?;

        let mut cursor = self.free_head.get();
        while cursor != NONE {
            let block_size = self.block_size(cursor);
            let adjustment = align_forward_adjustment_with_header(
                self.arena.address(cursor),
                alignment,
                BLOCK_HEADER + ADJUSTMENT_SLOT,
            );
            let needed = match Self::block_size_for(adjustment, size) {
                Some(needed) if needed <= block_size => needed,
                _ => {
                    cursor = self.next_free(cursor);
                    continue;
                }
            };

            self.unlink_free(cursor);
            let mut granted = block_size;
            if block_size - needed >= MIN_BLOCK_SIZE {
                let remainder = cursor + needed;
                self.write_header(remainder, block_size - needed, true);
                self.set_prev_physical(remainder, cursor);
                if let Some(after) = self.next_physical(remainder) {
                    self.set_prev_physical(after, remainder);
                }
                self.push_free(remainder);
                granted = needed;
            }
            self.write_header(cursor, granted, false);

            let user = cursor + adjustment;
            self.arena.write_word(user - ADJUSTMENT_SLOT, adjustment);
            self.used.set(self.used.get() + granted);
            self.allocations.set(self.allocations.get() + 1);
            tracing::trace!(size, alignment, block = cursor, granted, "free-list allocate");

            return Ok(self.arena.ptr_at(user));
        }

        Err(AllocError::OutOfMemory {
            requested: size,
            alignment,
            available: self.block_stats().largest_free_block,
        })
    }

    fn deallocate(&self, ptr: NonNull<u8>) -> AllocResult<()> {
        let user = self.arena.offset_of(ptr).ok_or(AllocError::ForeignPointer {
            address: ptr.as_ptr() as usize,
        })?;
        let block = self.owning_block(user)?;
        if self.is_free(block) {
            return Err(AllocError::DoubleFree { offset: user });
        }
        if cfg!(debug_assertions) && !self.is_block_start(block) {
            return Err(AllocError::InvalidPointer { offset: user });
        }
        let original = self.block_size(block);
        if original < MIN_BLOCK_SIZE || block + original > self.end {
            return Err(AllocError::Corrupted {
                offset: block,
                reason: "block size out of range",
            });
        }

        let mut merged_start = block;
        let mut merged_size = original;

        if let Some(next) = self.next_physical(block) {
            if self.is_free(next) {
                self.unlink_free(next);
                merged_size += self.block_size(next);
            }
        }

        let previous = self.prev_physical(block);
        if previous != NONE && self.is_free(previous) {
            self.unlink_free(previous);
            merged_size += self.block_size(previous);
            merged_start = previous;
            // Absorbed header stays marked free so a stale pointer reads as a double free.
            self.write_header(block, original, true);
        }

        self.write_header(merged_start, merged_size, true);
        if let Some(after) = self.next_physical(merged_start) {
            self.set_prev_physical(after, merged_start);
        }
        self.push_free(merged_start);

        self.used.set(self.used.get() - original);
        self.allocations.set(self.allocations.get() - 1);
        tracing::trace!(block, merged_start, merged_size, "free-list deallocate");
        Ok(())
    }

    fn capacity(&self) -> usize {
        self.arena.capacity()
    }

    fn used_memory(&self) -> usize {
        self.used.get()
    }

    fn allocation_count(&self) -> usize {
        self.allocations.get()
    }

    fn name(&self) -> &'static str {
        "free_list"
    }
}

/// Iterator over the blocks of a [`FreeListAllocator`] in address order.
pub struct Blocks<'b, 'a> {
    allocator: &'b FreeListAllocator<'a>,
    cursor: usize,
}

impl Iterator for Blocks<'_, '_> {
    type Item = BlockInfo;

    fn next(&mut self) -> Option<BlockInfo> {
        let allocator = self.allocator;
        if self.cursor >= allocator.end {
            return None;
        }
        let size = allocator.block_size(self.cursor);
        if size == 0 {
            self.cursor = allocator.end;
            return None;
        }
        let info = BlockInfo {
            offset: self.cursor,
            size,
            free: allocator.is_free(self.cursor),
        };
        self.cursor += size;
        Some(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::ArenaBuffer;

    #[test]
    fn test_fresh_arena_is_one_free_block() {
        let mut buffer = ArenaBuffer::new(1024);
        let heap = FreeListAllocator::new(buffer.arena()).unwrap();
        let blocks: Vec<_> = heap.blocks().collect();
        assert_eq!(
            blocks,
            vec![BlockInfo {
                offset: 0,
                size: 1024,
                free: true
            }]
        );
        heap.verify_integrity().unwrap();
    }

    #[test]
    fn test_first_fit_reuses_freed_block() {
        let mut buffer = ArenaBuffer::new(1040);
        let heap = FreeListAllocator::new(buffer.arena()).unwrap();

        let ptrs: Vec<_> = (0..10).map(|_| heap.allocate(64, 8).unwrap()).collect();
        assert_eq!(heap.allocation_count(), 10);

        heap.deallocate(ptrs[4]).unwrap();
        let again = heap.allocate(64, 8).unwrap();
        assert_eq!(again, ptrs[4]);
        heap.verify_integrity().unwrap();
    }

    #[test]
    fn test_freed_block_preferred_over_untouched_space() {
        let mut buffer = ArenaBuffer::new(4096);
        let heap = FreeListAllocator::new(buffer.arena()).unwrap();

        let ptrs: Vec<_> = (0..10).map(|_| heap.allocate(64, 8).unwrap()).collect();
        let tail = heap.block_stats().largest_free_block;
        assert_eq!(tail, 4096 - 10 * 104);

        heap.deallocate(ptrs[4]).unwrap();
        assert_eq!(heap.allocate(64, 8).unwrap(), ptrs[4]);
        assert_eq!(heap.block_stats().largest_free_block, tail);
        heap.verify_integrity().unwrap();
    }

    #[test]
    fn test_most_recently_freed_block_reused_first() {
        let mut buffer = ArenaBuffer::new(4096);
        let heap = FreeListAllocator::new(buffer.arena()).unwrap();
        let ptrs: Vec<_> = (0..10).map(|_| heap.allocate(64, 8).unwrap()).collect();

        heap.deallocate(ptrs[4]).unwrap();
        heap.deallocate(ptrs[1]).unwrap();
        assert_eq!(heap.allocate(64, 8).unwrap(), ptrs[1]);
        assert_eq!(heap.allocate(64, 8).unwrap(), ptrs[4]);
        heap.verify_integrity().unwrap();
    }

    #[test]
    fn test_adjacent_frees_coalesce() {
        let mut buffer = ArenaBuffer::new(1024);
        let heap = FreeListAllocator::new(buffer.arena()).unwrap();

        let a = heap.allocate(40, 8).unwrap();
        let b = heap.allocate(40, 8).unwrap();
        let c = heap.allocate(40, 8).unwrap();

        heap.deallocate(a).unwrap();
        heap.deallocate(b).unwrap();
        let free: Vec<_> = heap.blocks().filter(|block| block.free).collect();
        assert_eq!(free.len(), 2); // a+b, and the tail behind c
        assert_eq!(free[0].offset, 0);
        heap.verify_integrity().unwrap();

        heap.deallocate(c).unwrap();
        assert_eq!(heap.blocks().count(), 1);
        assert_eq!(heap.used_memory(), 0);
        heap.verify_integrity().unwrap();
    }

    #[test]
    fn test_small_remainder_not_split() {
        let mut buffer = ArenaBuffer::new(96);
        let heap = FreeListAllocator::new(buffer.arena()).unwrap();

        // 40 bytes of header and adjustment + 48 = 88, leaving 8 < MIN_BLOCK_SIZE.
        heap.allocate(48, 8).unwrap();
        assert_eq!(heap.blocks().count(), 1);
        assert_eq!(heap.used_memory(), 96);
        assert!(matches!(
            heap.allocate(1, 1),
            Err(AllocError::OutOfMemory { .. })
        ));
    }

    #[test]
    fn test_alignment_honoured() {
        let mut buffer = ArenaBuffer::new(4096);
        let heap = FreeListAllocator::new(buffer.arena()).unwrap();
        for alignment in [1usize, 2, 4, 8, 16, 32, 64] {
            let ptr = heap.allocate(3, alignment).unwrap();
            assert_eq!(ptr.as_ptr() as usize % alignment, 0);
        }
        heap.verify_integrity().unwrap();
    }

    #[test]
    fn test_double_free_detected() {
        let mut buffer = ArenaBuffer::new(1024);
        let heap = FreeListAllocator::new(buffer.arena()).unwrap();
        let a = heap.allocate(32, 8).unwrap();
        let _b = heap.allocate(32, 8).unwrap();

        heap.deallocate(a).unwrap();
        assert!(matches!(
            heap.deallocate(a),
            Err(AllocError::DoubleFree { .. })
        ));
        heap.verify_integrity().unwrap();
    }

    #[test]
    fn test_foreign_pointer_rejected() {
        let mut buffer = ArenaBuffer::new(1024);
        let mut other = [0u64; 4];
        let heap = FreeListAllocator::new(buffer.arena()).unwrap();
        let foreign = NonNull::from(&mut other[0]).cast::<u8>();
        assert!(matches!(
            heap.deallocate(foreign),
            Err(AllocError::ForeignPointer { .. })
        ));
    }

    #[cfg(debug_assertions)]
    #[test]
    fn test_interior_pointer_rejected() {
        let mut buffer = ArenaBuffer::new(1024);
        let heap = FreeListAllocator::new(buffer.arena()).unwrap();
        let a = heap.allocate(128, 8).unwrap();
        // Plant a plausible adjustment word in the middle of the payload.
        // SAFETY: the write stays inside the 128-byte allocation.
        #[allow(unsafe_code)]
        let interior = unsafe {
            let interior = a.as_ptr().add(64);
            interior
                .sub(WORD)
                .cast::<usize>()
                .write_unaligned(BLOCK_HEADER + ADJUSTMENT_SLOT);
            NonNull::new_unchecked(interior)
        };
        assert!(matches!(
            heap.deallocate(interior),
            Err(AllocError::InvalidPointer { .. })
        ));
        heap.deallocate(a).unwrap();
    }

    #[test]
    fn test_arena_too_small() {
        let mut bytes = [0u8; 16];
        assert!(matches!(
            FreeListAllocator::new(Arena::new(&mut bytes)),
            Err(AllocError::ArenaTooSmall { .. })
        ));
    }

    #[test]
    fn test_stats_account_for_every_byte() {
        let mut buffer = ArenaBuffer::new(2048);
        let heap = FreeListAllocator::new(buffer.arena()).unwrap();
        let a = heap.allocate(100, 16).unwrap();
        let _b = heap.allocate(7, 1).unwrap();
        heap.deallocate(a).unwrap();

        let stats = heap.block_stats();
        assert!(stats.is_balanced());
        assert_eq!(stats.free_blocks, 2);
        assert_eq!(stats.used_bytes, heap.used_memory());
    }
}
