//! # DynArray
//!
//! Growable array whose storage comes from an injected [`Allocator`].

#![allow(unsafe_code)]

use std::fmt;
use std::marker::PhantomData;
use std::mem;
use std::ops::{Deref, DerefMut};
use std::ptr::{self, NonNull};
use std::slice;

use crate::allocator::Allocator;
use crate::error::{AllocError, AllocResult};

/// Smallest non-zero capacity after the first growth.
const MIN_CAPACITY: usize = 4;

/// A contiguous growable array in allocator memory.
///
/// Capacity doubles when full. Growing allocates the new buffer first, moves
/// the elements over and only then returns the old buffer, so a failed
/// growth leaves the array untouched.
///
/// Read access goes through the slice view: `array[i]` panics when out of
/// bounds, `array.get(i)` returns an `Option`.
///
/// # Example
///
/// ```rust,ignore
/// let frame = LinearAllocator::new(buffer.arena());
/// let mut visible = DynArray::with_capacity(&frame, 256)?;
/// for entity in scene.entities() {
///     visible.push(entity.id())?;
/// }
/// ```
pub struct DynArray<'a, T> {
    allocator: &'a dyn Allocator,
    ptr: NonNull<T>,
    len: usize,
    capacity: usize,
    _owns: PhantomData<T>,
}

impl<'a, T> DynArray<'a, T> {
    const IS_ZST: bool = mem::size_of::<T>() == 0;

    /// Creates an empty array. Nothing is allocated until the first push.
    #[must_use]
    pub fn new(allocator: &'a dyn Allocator) -> Self {
        Self {
            allocator,
            ptr: NonNull::dangling(),
            len: 0,
            capacity: if Self::IS_ZST { usize::MAX } else { 0 },
            _owns: PhantomData,
        }
    }

    /// Creates an empty array with room for `capacity` elements.
    ///
    /// # Errors
    ///
    /// Fails if the allocator cannot provide the buffer.
    pub fn with_capacity(allocator: &'a dyn Allocator, capacity: usize) -> AllocResult<Self> {
        let mut array = Self::new(allocator);
        array.reserve_exact(capacity)?;
        Ok(array)
    }

    /// Creates an array holding clones of `items`.
    ///
    /// # Errors
    ///
    /// Fails if the allocator cannot provide the buffer.
    pub fn from_slice(allocator: &'a dyn Allocator, items: &[T]) -> AllocResult<Self>
    where
        T: Clone,
    {
        let mut array = Self::with_capacity(allocator, items.len())?;
        array.extend_from_slice(items)?;
        Ok(array)
    }

    /// Number of elements.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns true if there are no elements.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of elements that fit without growing.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// The allocator backing this array.
    #[inline]
    #[must_use]
    pub fn allocator(&self) -> &'a dyn Allocator {
        self.allocator
    }

    /// Makes room for at least `additional` more elements, doubling capacity.
    ///
    /// # Errors
    ///
    /// Fails if the allocator cannot provide the larger buffer.
    pub fn reserve(&mut self, additional: usize) -> AllocResult<()> {
        let required = self
            .len
            .checked_add(additional)
            .ok_or(AllocError::CapacityOverflow)?;
        if required <= self.capacity {
            return Ok(());
        }
        let doubled = self.capacity.saturating_mul(2).max(MIN_CAPACITY);
        self.grow_to(doubled.max(required))
    }

    /// Makes room for exactly `additional` more elements.
    ///
    /// # Errors
    ///
    /// Fails if the allocator cannot provide the larger buffer.
    pub fn reserve_exact(&mut self, additional: usize) -> AllocResult<()> {
        let required = self
            .len
            .checked_add(additional)
            .ok_or(AllocError::CapacityOverflow)?;
        if required <= self.capacity {
            return Ok(());
        }
        self.grow_to(required)
    }

    /// Appends `value`, growing if needed.
    ///
    /// # Errors
    ///
    /// Fails if growth fails; `value` is dropped in that case.
    pub fn push(&mut self, value: T) -> AllocResult<()> {
        if self.len == self.capacity {
            self.reserve(1)?;
        }
        // SAFETY: `len < capacity`, so the slot is inside the buffer and unused.
        unsafe { self.ptr.as_ptr().add(self.len).write(value) };
        self.len += 1;
        Ok(())
    }

    /// Removes and returns the last element.
    pub fn pop(&mut self) -> Option<T> {
        if self.len == 0 {
            return None;
        }
        self.len -= 1;
        // SAFETY: the slot at the old last index is initialised and is no
        // longer counted by `len`.
        Some(unsafe { self.ptr.as_ptr().add(self.len).read() })
    }

    /// Inserts `value` at `index`, shifting later elements right.
    ///
    /// # Errors
    ///
    /// Fails if growth fails.
    ///
    /// # Panics
    ///
    /// Panics if `index > len`.
    pub fn insert(&mut self, index: usize, value: T) -> AllocResult<()> {
        assert!(
            index <= self.len,
            "insertion index (is {index}) should be <= len (is {})",
            self.len
        );
        if self.len == self.capacity {
            self.reserve(1)?;
        }
        // SAFETY: capacity > len, so shifting `len - index` elements by one
        // stays inside the buffer.
        unsafe {
            let at = self.ptr.as_ptr().add(index);
            ptr::copy(at, at.add(1), self.len - index);
            at.write(value);
        }
        self.len += 1;
        Ok(())
    }

    /// Removes the element at `index`, shifting later elements left.
    ///
    /// # Panics
    ///
    /// Panics if `index >= len`.
    pub fn remove(&mut self, index: usize) -> T {
        assert!(
            index < self.len,
            "removal index (is {index}) should be < len (is {})",
            self.len
        );
        // SAFETY: `index` is in bounds; the tail is moved down over the hole.
        unsafe {
            let at = self.ptr.as_ptr().add(index);
            let value = at.read();
            ptr::copy(at.add(1), at, self.len - index - 1);
            self.len -= 1;
            value
        }
    }

    /// Removes the element at `index` by moving the last element into its place.
    ///
    /// # Panics
    ///
    /// Panics if `index >= len`.
    pub fn swap_remove(&mut self, index: usize) -> T {
        assert!(
            index < self.len,
            "swap_remove index (is {index}) should be < len (is {})",
            self.len
        );
        self.len -= 1;
        // SAFETY: `index` and the old last slot are both initialised; the last
        // slot is moved into the hole and dropped from the count.
        unsafe {
            let base = self.ptr.as_ptr();
            let value = base.add(index).read();
            ptr::copy(base.add(self.len), base.add(index), 1);
            value
        }
    }

    /// Shortens the array to `len` elements, dropping the rest.
    pub fn truncate(&mut self, len: usize) {
        if len >= self.len {
            return;
        }
        let tail = self.len - len;
        self.len = len;
        // SAFETY: the `tail` elements past the new length are initialised and
        // no longer reachable through `self`.
        unsafe {
            ptr::drop_in_place(ptr::slice_from_raw_parts_mut(
                self.ptr.as_ptr().add(len),
                tail,
            ));
        }
    }

    /// Drops every element, keeping the buffer.
    pub fn clear(&mut self) {
        self.truncate(0);
    }

    /// Appends clones of `items`.
    ///
    /// # Errors
    ///
    /// Fails if growth fails; nothing is appended in that case.
    pub fn extend_from_slice(&mut self, items: &[T]) -> AllocResult<()>
    where
        T: Clone,
    {
        self.reserve(items.len())?;
        for item in items {
            // SAFETY: capacity was reserved above.
            unsafe { self.ptr.as_ptr().add(self.len).write(item.clone()) };
            self.len += 1;
        }
        Ok(())
    }

    /// Views the elements as a slice.
    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        // SAFETY: `ptr` is valid (or dangling with len 0 / ZST) for `len`
        // initialised elements.
        unsafe { slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    /// Views the elements as a mutable slice.
    #[inline]
    #[must_use]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        // SAFETY: as in `as_slice`, and `&mut self` guarantees uniqueness.
        unsafe { slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }

    /// Moves the elements into a buffer of `new_capacity`.
    fn grow_to(&mut self, new_capacity: usize) -> AllocResult<()> {
        if Self::IS_ZST {
            return Err(AllocError::CapacityOverflow);
        }
        let bytes = new_capacity
            .checked_mul(mem::size_of::<T>())
            .ok_or(AllocError::CapacityOverflow)?;
        let new_ptr = self
            .allocator
            .allocate(bytes, mem::align_of::<T>())?
            .cast::<T>();

        // SAFETY: both buffers hold at least `len` elements and do not overlap.
        unsafe { ptr::copy_nonoverlapping(self.ptr.as_ptr(), new_ptr.as_ptr(), self.len) };

        let old = mem::replace(&mut self.ptr, new_ptr);
        let old_capacity = mem::replace(&mut self.capacity, new_capacity);
        if old_capacity > 0 {
            self.release(old);
        }
        tracing::trace!(from = old_capacity, to = new_capacity, "dyn array grow");
        Ok(())
    }

    /// Returns a buffer to the allocator, logging strategies that refuse.
    fn release(&self, buffer: NonNull<T>) {
        if let Err(err) = self.allocator.deallocate(buffer.cast()) {
            tracing::warn!(
                allocator = self.allocator.name(),
                %err,
                "dyn array buffer not returned"
            );
        }
    }
}

impl<T> Drop for DynArray<'_, T> {
    fn drop(&mut self) {
        self.clear();
        if !Self::IS_ZST && self.capacity > 0 {
            self.release(self.ptr);
        }
    }
}

impl<T> Deref for DynArray<'_, T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        self.as_slice()
    }
}

impl<T> DerefMut for DynArray<'_, T> {
    fn deref_mut(&mut self) -> &mut [T] {
        self.as_mut_slice()
    }
}

impl<'b, T> IntoIterator for &'b DynArray<'_, T> {
    type Item = &'b T;
    type IntoIter = slice::Iter<'b, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.as_slice().iter()
    }
}

impl<'b, T> IntoIterator for &'b mut DynArray<'_, T> {
    type Item = &'b mut T;
    type IntoIter = slice::IterMut<'b, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.as_mut_slice().iter_mut()
    }
}

impl<T: PartialEq> PartialEq<[T]> for DynArray<'_, T> {
    fn eq(&self, other: &[T]) -> bool {
        self.as_slice() == other
    }
}

impl<T: fmt::Debug> fmt::Debug for DynArray<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::ArenaBuffer;
    use crate::free_list::FreeListAllocator;
    use crate::linear::LinearAllocator;
    use std::rc::Rc;

    #[test]
    fn test_push_and_index() {
        let mut buffer = ArenaBuffer::new(4096);
        let heap = FreeListAllocator::new(buffer.arena()).unwrap();
        let mut array = DynArray::new(&heap);

        for i in 0..10u32 {
            array.push(i * 3).unwrap();
        }
        assert_eq!(array.len(), 10);
        assert_eq!(array[4], 12);
        assert_eq!(array.get(10), None);
        assert_eq!(array.pop(), Some(27));
    }

    #[test]
    #[should_panic(expected = "out of bounds")]
    fn test_index_out_of_bounds_panics() {
        let mut buffer = ArenaBuffer::new(1024);
        let heap = FreeListAllocator::new(buffer.arena()).unwrap();
        let mut array = DynArray::new(&heap);
        array.push(1u8).unwrap();
        let _ = array[1];
    }

    #[test]
    fn test_growth_doubles_and_returns_old_buffer() {
        let mut buffer = ArenaBuffer::new(4096);
        let heap = FreeListAllocator::new(buffer.arena()).unwrap();
        let mut array = DynArray::new(&heap);

        array.push(1u64).unwrap();
        assert_eq!(array.capacity(), 4);
        for i in 2..=5 {
            array.push(i).unwrap();
        }
        assert_eq!(array.capacity(), 8);
        assert_eq!(heap.allocation_count(), 1);
        assert_eq!(array.as_slice(), &[1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_failed_growth_leaves_array_intact() {
        let mut buffer = ArenaBuffer::new(64);
        let frame = LinearAllocator::new(buffer.arena());
        let mut array = DynArray::with_capacity(&frame, 4).unwrap();
        array.extend_from_slice(&[1u64, 2, 3, 4]).unwrap();

        assert!(matches!(
            array.push(5),
            Err(AllocError::OutOfMemory { .. })
        ));
        assert_eq!(array.as_slice(), &[1, 2, 3, 4]);
    }

    #[test]
    fn test_insert_remove() {
        let mut buffer = ArenaBuffer::new(2048);
        let heap = FreeListAllocator::new(buffer.arena()).unwrap();
        let mut array = DynArray::from_slice(&heap, &[1, 2, 4]).unwrap();

        array.insert(2, 3).unwrap();
        array.insert(0, 0).unwrap();
        assert_eq!(array.as_slice(), &[0, 1, 2, 3, 4]);

        assert_eq!(array.remove(0), 0);
        assert_eq!(array.swap_remove(0), 1);
        assert_eq!(array.as_slice(), &[4, 2, 3]);
    }

    #[test]
    fn test_drop_runs_destructors_and_frees() {
        let mut buffer = ArenaBuffer::new(2048);
        let heap = FreeListAllocator::new(buffer.arena()).unwrap();
        let shared = Rc::new(());
        {
            let mut array = DynArray::new(&heap);
            for _ in 0..6 {
                array.push(Rc::clone(&shared)).unwrap();
            }
            assert_eq!(Rc::strong_count(&shared), 7);
        }
        assert_eq!(Rc::strong_count(&shared), 1);
        assert_eq!(heap.used_memory(), 0);
    }

    #[test]
    fn test_zero_sized_never_allocates() {
        let mut buffer = ArenaBuffer::new(256);
        let heap = FreeListAllocator::new(buffer.arena()).unwrap();
        let mut array = DynArray::new(&heap);
        for _ in 0..1000 {
            array.push(()).unwrap();
        }
        assert_eq!(array.len(), 1000);
        assert_eq!(heap.allocation_count(), 0);
    }
}
