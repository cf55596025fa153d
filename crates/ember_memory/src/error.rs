//! # Allocator Error Types
//!
//! All errors that can occur while allocating from an arena or growing a
//! container.

use thiserror::Error;

/// Errors that can occur in the memory subsystem.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AllocError {
    /// The arena cannot satisfy the request after alignment padding.
    #[error("out of memory: requested {requested} bytes (alignment {alignment}), {available} bytes available")]
    OutOfMemory {
        /// Bytes requested by the caller.
        requested: usize,
        /// Alignment requested by the caller.
        alignment: usize,
        /// Bytes still unused in the arena (not necessarily contiguous).
        available: usize,
    },

    /// A zero-byte allocation was requested.
    #[error("zero-sized allocation request")]
    ZeroSizedRequest,

    /// The alignment is zero or not a power of two.
    #[error("alignment {0} is not a power of two")]
    InvalidAlignment(usize),

    /// The request does not fit in a single pool slot.
    #[error("request of {size} bytes (alignment {alignment}) does not fit a {slot_size}-byte slot (alignment {slot_alignment})")]
    UnsupportedRequest {
        /// Bytes requested.
        size: usize,
        /// Alignment requested.
        alignment: usize,
        /// Size of one pool slot.
        slot_size: usize,
        /// Alignment of one pool slot.
        slot_alignment: usize,
    },

    /// The arena is too small to hold even the allocator's own bookkeeping.
    #[error("arena of {capacity} bytes is too small, need at least {required}")]
    ArenaTooSmall {
        /// Capacity supplied.
        capacity: usize,
        /// Minimum capacity required.
        required: usize,
    },

    /// The pointer does not lie inside this allocator's arena.
    #[error("pointer {address:#x} does not belong to this arena")]
    ForeignPointer {
        /// Address of the offending pointer.
        address: usize,
    },

    /// The pointer lies inside the arena but is not the start of a live allocation.
    #[error("no live allocation starts at arena offset {offset}")]
    InvalidPointer {
        /// Arena offset of the offending pointer.
        offset: usize,
    },

    /// The allocation was already returned to the allocator.
    #[error("double free at arena offset {offset}")]
    DoubleFree {
        /// Arena offset of the offending pointer.
        offset: usize,
    },

    /// A stack allocation was freed out of LIFO order.
    #[error("stack allocation at offset {offset} is not the top of the stack")]
    NotTopOfStack {
        /// Arena offset of the offending pointer.
        offset: usize,
    },

    /// A stack marker was restored out of acquisition order.
    #[error("stack marker at depth {marker_depth} restored while depth {expected_depth} is outstanding")]
    MarkerOutOfOrder {
        /// Depth of the most recent outstanding marker.
        expected_depth: usize,
        /// Depth recorded in the marker being restored.
        marker_depth: usize,
    },

    /// A container size computation overflowed `usize`.
    #[error("container capacity overflow")]
    CapacityOverflow,

    /// Arena bookkeeping is inconsistent.
    #[error("arena corrupted at offset {offset}: {reason}")]
    Corrupted {
        /// Arena offset where the inconsistency was found.
        offset: usize,
        /// What was wrong.
        reason: &'static str,
    },
}

/// Result type for memory operations.
pub type AllocResult<T> = Result<T, AllocError>;
