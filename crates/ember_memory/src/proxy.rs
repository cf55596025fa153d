//! # Proxy Allocator
//!
//! Forwards to another allocator and attributes usage to one subsystem, so a
//! shared heap can still answer "how much does the audio system hold?".

use std::cell::Cell;
use std::ptr::NonNull;

use crate::allocator::Allocator;
use crate::error::AllocResult;

/// A tracking wrapper around a shared allocator.
///
/// The proxy owns no memory. It counts the allocations made through it and
/// the bytes they cost the inner allocator (headers and padding included,
/// measured as the change in the inner allocator's `used_memory`).
///
/// # Example
///
/// ```rust,ignore
/// let heap = FreeListAllocator::new(buffer.arena())?;
/// let audio = ProxyAllocator::new("audio", &heap);
/// let voices = DynArray::<Voice>::with_capacity(&audio, 32)?;
/// tracing::info!(bytes = audio.used_memory(), "audio memory");
/// ```
pub struct ProxyAllocator<'a> {
    /// Subsystem label.
    label: &'static str,
    /// The allocator doing the work.
    inner: &'a dyn Allocator,
    /// Live allocations made through the proxy.
    allocations: Cell<usize>,
    /// Inner bytes attributable to the proxy.
    used: Cell<usize>,
}

impl<'a> ProxyAllocator<'a> {
    /// Wraps `inner`, tagging usage with `label`.
    #[must_use]
    pub fn new(label: &'static str, inner: &'a dyn Allocator) -> Self {
        Self {
            label,
            inner,
            allocations: Cell::new(0),
            used: Cell::new(0),
        }
    }

    /// Returns the subsystem label.
    #[inline]
    #[must_use]
    pub const fn label(&self) -> &'static str {
        self.label
    }

    /// Returns the wrapped allocator.
    #[inline]
    #[must_use]
    pub fn inner(&self) -> &'a dyn Allocator {
        self.inner
    }
}

impl Allocator for ProxyAllocator<'_> {
    fn allocate(&self, size: usize, alignment: usize) -> AllocResult<NonNull<u8>> {
        let before = self.inner.used_memory();
        let ptr = self.inner.allocate(size, alignment)?;
        let cost = self.inner.used_memory().saturating_sub(before);
        self.used.set(self.used.get() + cost);
        self.allocations.set(self.allocations.get() + 1);
        tracing::trace!(label = self.label, size, cost, "proxy allocate");
        Ok(ptr)
    }

    fn deallocate(&self, ptr: NonNull<u8>) -> AllocResult<()> {
        let before = self.inner.used_memory();
        self.inner.deallocate(ptr)?;
        let released = before.saturating_sub(self.inner.used_memory());
        self.used.set(self.used.get().saturating_sub(released));
        self.allocations.set(self.allocations.get().saturating_sub(1));
        tracing::trace!(label = self.label, released, "proxy deallocate");
        Ok(())
    }

    fn capacity(&self) -> usize {
        self.inner.capacity()
    }

    fn used_memory(&self) -> usize {
        self.used.get()
    }

    fn allocation_count(&self) -> usize {
        self.allocations.get()
    }

    fn name(&self) -> &'static str {
        self.label
    }
}
