//! # DynamicQueue
//!
//! Growable double-ended ring buffer in allocator memory.

#![allow(unsafe_code)]

use std::fmt;
use std::marker::PhantomData;
use std::mem;
use std::ptr::{self, NonNull};

use crate::allocator::Allocator;
use crate::error::{AllocError, AllocResult};

/// Smallest non-zero capacity after the first growth.
const MIN_CAPACITY: usize = 4;

/// A ring-buffer deque whose storage comes from an [`Allocator`].
///
/// Pushes and pops at either end are O(1) amortised. When full, capacity
/// doubles and the elements are re-linearised at the start of the new buffer.
///
/// # Example
///
/// ```rust,ignore
/// let mut requests = DynamicQueue::new(&heap);
/// requests.push_back(LoadRequest::texture("stone"))?;
/// while let Some(request) = requests.pop_front() {
///     loader.start(request);
/// }
/// ```
pub struct DynamicQueue<'a, T> {
    allocator: &'a dyn Allocator,
    ptr: NonNull<T>,
    capacity: usize,
    head: usize,
    len: usize,
    _owns: PhantomData<T>,
}

impl<'a, T> DynamicQueue<'a, T> {
    const IS_ZST: bool = mem::size_of::<T>() == 0;

    /// Creates an empty queue. Nothing is allocated until the first push.
    #[must_use]
    pub fn new(allocator: &'a dyn Allocator) -> Self {
        Self {
            allocator,
            ptr: NonNull::dangling(),
            capacity: if Self::IS_ZST { usize::MAX } else { 0 },
            head: 0,
            len: 0,
            _owns: PhantomData,
        }
    }

    /// Creates an empty queue with room for `capacity` elements.
    ///
    /// # Errors
    ///
    /// Fails if the allocator cannot provide the buffer.
    pub fn with_capacity(allocator: &'a dyn Allocator, capacity: usize) -> AllocResult<Self> {
        let mut queue = Self::new(allocator);
        if capacity > queue.capacity {
            queue.grow_to(capacity)?;
        }
        Ok(queue)
    }

    /// Number of queued elements.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns true if nothing is queued.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Elements that fit without growing.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Appends at the back.
    ///
    /// # Errors
    ///
    /// Fails if growth fails; `value` is dropped in that case.
    pub fn push_back(&mut self, value: T) -> AllocResult<()> {
        self.grow_if_full()?;
        let slot = self.physical(self.len);
        // SAFETY: the queue is not full, so `slot` is unused.
        unsafe { self.ptr.as_ptr().add(slot).write(value) };
        self.len += 1;
        Ok(())
    }

    /// Prepends at the front.
    ///
    /// # Errors
    ///
    /// Fails if growth fails; `value` is dropped in that case.
    pub fn push_front(&mut self, value: T) -> AllocResult<()> {
        self.grow_if_full()?;
        self.head = if Self::IS_ZST {
            0
        } else {
            (self.head + self.capacity - 1) % self.capacity
        };
        // SAFETY: the queue is not full, so the slot before `head` is unused.
        unsafe { self.ptr.as_ptr().add(self.head).write(value) };
        self.len += 1;
        Ok(())
    }

    /// Removes the front element.
    pub fn pop_front(&mut self) -> Option<T> {
        if self.len == 0 {
            return None;
        }
        let slot = self.head;
        self.head = self.physical(1);
        self.len -= 1;
        // SAFETY: the old head slot was initialised and has left the live range.
        Some(unsafe { self.ptr.as_ptr().add(slot).read() })
    }

    /// Removes the back element.
    pub fn pop_back(&mut self) -> Option<T> {
        if self.len == 0 {
            return None;
        }
        self.len -= 1;
        let slot = self.physical(self.len);
        // SAFETY: the old back slot was initialised and has left the live range.
        Some(unsafe { self.ptr.as_ptr().add(slot).read() })
    }

    /// Returns the front element.
    #[must_use]
    pub fn front(&self) -> Option<&T> {
        self.get(0)
    }

    /// Returns the back element.
    #[must_use]
    pub fn back(&self) -> Option<&T> {
        self.len.checked_sub(1).and_then(|last| self.get(last))
    }

    /// Returns the element `index` positions from the front.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&T> {
        if index >= self.len {
            return None;
        }
        // SAFETY: logical indices below `len` map to initialised slots.
        Some(unsafe { &*self.ptr.as_ptr().add(self.physical(index)) })
    }

    /// Iterates from front to back.
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        (0..self.len).filter_map(move |index| self.get(index))
    }

    /// Drops every element, keeping the buffer.
    pub fn clear(&mut self) {
        while self.pop_front().is_some() {}
        self.head = 0;
    }

    /// Maps a logical index to a buffer slot.
    #[inline]
    fn physical(&self, index: usize) -> usize {
        if Self::IS_ZST {
            0
        } else {
            (self.head + index) % self.capacity
        }
    }

    fn grow_if_full(&mut self) -> AllocResult<()> {
        if self.len < self.capacity {
            return Ok(());
        }
        if Self::IS_ZST {
            return Err(AllocError::CapacityOverflow);
        }
        let doubled = self.capacity.saturating_mul(2).max(MIN_CAPACITY);
        self.grow_to(doubled)
    }

    /// Moves the elements, front first, to the start of a new buffer.
    fn grow_to(&mut self, new_capacity: usize) -> AllocResult<()> {
        let bytes = new_capacity
            .checked_mul(mem::size_of::<T>())
            .ok_or(AllocError::CapacityOverflow)?;
        let new_ptr = self
            .allocator
            .allocate(bytes, mem::align_of::<T>())?
            .cast::<T>();

        if self.len > 0 {
            let first_run = (self.capacity - self.head).min(self.len);
            // SAFETY: the live range is `head..head+first_run` followed by
            // `0..len-first_run` in the old buffer; the new buffer holds at
            // least `len` elements and does not overlap the old one.
            unsafe {
                let old = self.ptr.as_ptr();
                let new = new_ptr.as_ptr();
                ptr::copy_nonoverlapping(old.add(self.head), new, first_run);
                ptr::copy_nonoverlapping(old, new.add(first_run), self.len - first_run);
            }
        }

        let old = mem::replace(&mut self.ptr, new_ptr);
        let old_capacity = mem::replace(&mut self.capacity, new_capacity);
        self.head = 0;
        if old_capacity > 0 {
            self.release(old);
        }
        tracing::trace!(from = old_capacity, to = new_capacity, "dynamic queue grow");
        Ok(())
    }

    fn release(&self, buffer: NonNull<T>) {
        if let Err(err) = self.allocator.deallocate(buffer.cast()) {
            tracing::warn!(
                allocator = self.allocator.name(),
                %err,
                "dynamic queue buffer not returned"
            );
        }
    }
}

impl<T> Drop for DynamicQueue<'_, T> {
    fn drop(&mut self) {
        self.clear();
        if !Self::IS_ZST && self.capacity > 0 {
            self.release(self.ptr);
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for DynamicQueue<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::ArenaBuffer;
    use crate::free_list::FreeListAllocator;

    #[test]
    fn test_fifo_order_across_growth() {
        let mut buffer = ArenaBuffer::new(4096);
        let heap = FreeListAllocator::new(buffer.arena()).unwrap();
        let mut queue = DynamicQueue::new(&heap);

        for i in 0..3 {
            queue.push_back(i).unwrap();
        }
        assert_eq!(queue.pop_front(), Some(0));
        // head is now 1; these wrap and then force a growth mid-wrap.
        for i in 3..10 {
            queue.push_back(i).unwrap();
        }
        assert_eq!(queue.capacity(), 16);
        let drained: Vec<_> = std::iter::from_fn(|| queue.pop_front()).collect();
        assert_eq!(drained, (1..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_double_ended() {
        let mut buffer = ArenaBuffer::new(1024);
        let heap = FreeListAllocator::new(buffer.arena()).unwrap();
        let mut queue = DynamicQueue::with_capacity(&heap, 4).unwrap();

        queue.push_back(2).unwrap();
        queue.push_front(1).unwrap();
        queue.push_front(0).unwrap();
        queue.push_back(3).unwrap();
        queue.push_back(4).unwrap(); // grows while wrapped

        assert_eq!(queue.iter().copied().collect::<Vec<_>>(), vec![0, 1, 2, 3, 4]);
        assert_eq!(queue.front(), Some(&0));
        assert_eq!(queue.back(), Some(&4));
        assert_eq!(queue.pop_back(), Some(4));
        assert_eq!(queue.pop_front(), Some(0));
        assert_eq!(queue.len(), 3);
    }

    #[test]
    fn test_drop_frees_buffer() {
        let mut buffer = ArenaBuffer::new(1024);
        let heap = FreeListAllocator::new(buffer.arena()).unwrap();
        {
            let mut queue = DynamicQueue::new(&heap);
            for i in 0..20u64 {
                queue.push_back(i).unwrap();
            }
            assert!(heap.used_memory() > 0);
        }
        assert_eq!(heap.used_memory(), 0);
        heap.verify_integrity().unwrap();
    }
}
