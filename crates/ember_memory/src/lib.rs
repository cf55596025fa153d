//! # Ember Memory
//!
//! Arena allocators and allocator-aware containers for engine subsystems.
//!
//! Every allocator manages one caller-supplied arena for its whole lifetime:
//! - **Linear**: bump pointer, bulk reset (per-frame scratch)
//! - **Stack**: LIFO with markers (nested temporary work)
//! - **Pool**: fixed-size slots (particles, packets, game objects)
//! - **Free list**: general purpose with coalescing (assets, long-lived data)
//! - **Proxy**: per-subsystem accounting on top of any of the above
//!
//! ## Architecture Rules
//!
//! 1. **No global heap after construction** - allocators only carve their arena
//! 2. **Bookkeeping by offset** - headers live in the arena, addressed by byte offset
//! 3. **Explicit lifetimes** - an `Arena<'a>` borrows its buffer; containers
//!    borrow their allocator
//!
//! ## Example
//!
//! ```rust,ignore
//! use ember_memory::{Allocator, ArenaBuffer, DynArray, FreeListAllocator};
//!
//! let mut buffer = ArenaBuffer::new(64 * 1024);
//! let heap = FreeListAllocator::new(buffer.arena())?;
//! let mut ids = DynArray::new(&heap);
//! ids.push(42u32)?;
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod allocator;
pub mod arena;
pub mod config;
pub mod containers;
pub mod error;
pub mod free_list;
pub mod linear;
pub mod pool;
pub mod proxy;
pub mod stack;

pub use allocator::{
    align_forward_adjustment, align_forward_adjustment_with_header, align_up, Allocator,
    AllocatorStats,
};
pub use arena::{Arena, ArenaBuffer};
pub use config::MemoryConfig;
pub use containers::{DynArray, DynString, DynamicQueue, SmallQueue};
pub use error::{AllocError, AllocResult};
pub use free_list::{BlockInfo, Blocks, FreeListAllocator, FreeListStats, MIN_BLOCK_SIZE};
pub use linear::LinearAllocator;
pub use pool::PoolAllocator;
pub use proxy::ProxyAllocator;
pub use stack::{Marker, StackAllocator};
