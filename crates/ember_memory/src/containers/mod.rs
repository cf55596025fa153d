//! # Allocator-Aware Containers
//!
//! Collections that never touch the global heap: every byte comes from the
//! `&dyn Allocator` they are built with.
//!
//! - [`DynArray`]: growable contiguous array
//! - [`DynString`]: UTF-8 string over a `DynArray<u8>`
//! - [`SmallQueue`]: fixed-capacity inline FIFO
//! - [`DynamicQueue`]: growable ring-buffer deque
//!
//! Containers that outlive their allocator are rejected by the borrow
//! checker. Dropping a container returns its buffer; strategies that cannot
//! free an arbitrary buffer (a stack allocator, for anything but its top
//! allocation) log the refusal at `warn` level.

pub mod dyn_array;
pub mod dyn_string;
pub mod dynamic_queue;
pub mod small_queue;

pub use dyn_array::DynArray;
pub use dyn_string::DynString;
pub use dynamic_queue::DynamicQueue;
pub use small_queue::SmallQueue;
