//! # Allocator Capability
//!
//! The contract shared by every arena strategy, plus the alignment math they
//! all use.
//!
//! Callers (containers, engine subsystems) depend only on `&dyn Allocator`,
//! never on a concrete strategy.

use std::fmt;
use std::ptr::NonNull;

use crate::error::{AllocError, AllocResult};

/// Allocation strategy over a single arena.
///
/// All methods take `&self`: implementations keep their cursor state in
/// `Cell`s so several containers can share one allocator. No implementation
/// is `Sync`; an allocator must not be used from two threads at once.
pub trait Allocator {
    /// Returns a pointer to at least `size` bytes aligned to `alignment`.
    ///
    /// # Errors
    ///
    /// - [`AllocError::ZeroSizedRequest`] if `size` is zero
    /// - [`AllocError::InvalidAlignment`] if `alignment` is not a power of two
    /// - [`AllocError::OutOfMemory`] if the arena cannot satisfy the request
    fn allocate(&self, size: usize, alignment: usize) -> AllocResult<NonNull<u8>>;

    /// Returns memory obtained from [`Allocator::allocate`].
    ///
    /// # Errors
    ///
    /// Returns an error if `ptr` was not produced by this allocator, was
    /// already freed, or may not be freed individually under this strategy.
    fn deallocate(&self, ptr: NonNull<u8>) -> AllocResult<()>;

    /// Total bytes in the arena.
    fn capacity(&self) -> usize;

    /// Bytes currently consumed, including padding and headers.
    fn used_memory(&self) -> usize;

    /// Number of live allocations.
    fn allocation_count(&self) -> usize;

    /// Short strategy name used in logs.
    fn name(&self) -> &'static str;

    /// Snapshot of the allocator's counters.
    fn stats(&self) -> AllocatorStats {
        AllocatorStats {
            name: self.name(),
            capacity: self.capacity(),
            used: self.used_memory(),
            allocations: self.allocation_count(),
        }
    }
}

/// Counters reported by [`Allocator::stats`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AllocatorStats {
    /// Strategy name.
    pub name: &'static str,
    /// Total bytes in the arena.
    pub capacity: usize,
    /// Bytes consumed.
    pub used: usize,
    /// Live allocations.
    pub allocations: usize,
}

impl AllocatorStats {
    /// Bytes not yet consumed.
    #[inline]
    #[must_use]
    pub const fn remaining(&self) -> usize {
        self.capacity.saturating_sub(self.used)
    }
}

impl fmt::Display for AllocatorStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {}/{} bytes in {} allocations",
            self.name, self.used, self.capacity, self.allocations
        )
    }
}

/// Checks the parts of a request every strategy rejects the same way.
pub(crate) fn validate_request(size: usize, alignment: usize) -> AllocResult<()> {
    if size == 0 {
        return Err(AllocError::ZeroSizedRequest);
    }
    if !alignment.is_power_of_two() {
        return Err(AllocError::InvalidAlignment(alignment));
    }
    Ok(())
}

/// Bytes to add to `address` so it becomes a multiple of `alignment`.
///
/// `alignment` must be a power of two.
#[inline]
#[must_use]
pub const fn align_forward_adjustment(address: usize, alignment: usize) -> usize {
    let misalignment = address & (alignment - 1);
    if misalignment == 0 {
        0
    } else {
        alignment - misalignment
    }
}

/// Like [`align_forward_adjustment`], but leaves at least `header_size` bytes
/// in front of the aligned address.
///
/// The result is the smallest adjustment that is both aligned and large
/// enough for the header.
#[inline]
#[must_use]
pub const fn align_forward_adjustment_with_header(
    address: usize,
    alignment: usize,
    header_size: usize,
) -> usize {
    let mut adjustment = align_forward_adjustment(address, alignment);
    if adjustment < header_size {
        let needed = header_size - adjustment;
        adjustment += alignment * (needed / alignment);
        if needed % alignment > 0 {
            adjustment += alignment;
        }
    }
    adjustment
}

/// Rounds `value` up to a multiple of `alignment` (a power of two).
#[inline]
#[must_use]
pub const fn align_up(value: usize, alignment: usize) -> usize {
    (value + alignment - 1) & !(alignment - 1)
}
