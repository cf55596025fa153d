//! # SmallQueue
//!
//! Fixed-capacity FIFO stored inline, for hot paths that must not allocate.

#![allow(unsafe_code)]

use std::fmt;
use std::mem::MaybeUninit;

/// An inline ring buffer holding at most `N` elements.
///
/// # Example
///
/// ```rust,ignore
/// let mut pending: SmallQueue<EntityId, 16> = SmallQueue::new();
/// if let Err(id) = pending.push(id) {
///     overflow.push(id)?;
/// }
/// ```
pub struct SmallQueue<T, const N: usize> {
    slots: [MaybeUninit<T>; N],
    head: usize,
    len: usize,
}

impl<T, const N: usize> SmallQueue<T, N> {
    /// Creates an empty queue.
    ///
    /// # Panics
    ///
    /// Panics if `N` is zero.
    #[must_use]
    pub fn new() -> Self {
        assert!(N > 0, "SmallQueue capacity must be > 0");
        Self {
            // SAFETY: an array of `MaybeUninit` needs no initialisation.
            slots: unsafe { MaybeUninit::uninit().assume_init() },
            head: 0,
            len: 0,
        }
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

    /// Returns true if no more elements fit.
    #[inline]
    #[must_use]
    pub const fn is_full(&self) -> bool {
        self.len == N
    }

    /// Compile-time capacity.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Appends `value` at the back.
    ///
    /// # Errors
    ///
    /// Hands `value` back if the queue is full.
    pub fn push(&mut self, value: T) -> Result<(), T> {
        if self.is_full() {
            return Err(value);
        }
        let tail = (self.head + self.len) % N;
        self.slots[tail].write(value);
        self.len += 1;
        Ok(())
    }

    /// Removes the front element.
    pub fn pop(&mut self) -> Option<T> {
        if self.is_empty() {
            return None;
        }
        let head = self.head;
        self.head = (head + 1) % N;
        self.len -= 1;
        // SAFETY: slots in `head..head+len` (mod N) are initialised; this one
        // just left that range.
        Some(unsafe { self.slots[head].assume_init_read() })
    }

    /// Returns the front element without removing it.
    #[must_use]
    pub fn peek(&self) -> Option<&T> {
        if self.is_empty() {
            return None;
        }
        // SAFETY: the front slot is initialised while `len > 0`.
        Some(unsafe { self.slots[self.head].assume_init_ref() })
    }

    /// Iterates from front to back.
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        (0..self.len).map(move |i| {
            // SAFETY: every index below `len` maps to an initialised slot.
            unsafe { self.slots[(self.head + i) % N].assume_init_ref() }
        })
    }

    /// Drops every queued element.
    pub fn clear(&mut self) {
        while self.pop().is_some() {}
    }
}

impl<T, const N: usize> Default for SmallQueue<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, const N: usize> Drop for SmallQueue<T, N> {
    fn drop(&mut self) {
        self.clear();
    }
}

impl<T: fmt::Debug, const N: usize> fmt::Debug for SmallQueue<T, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    #[test]
    fn test_fifo_with_wraparound() {
        let mut queue: SmallQueue<u32, 3> = SmallQueue::new();
        queue.push(1).unwrap();
        queue.push(2).unwrap();
        assert_eq!(queue.pop(), Some(1));
        queue.push(3).unwrap();
        queue.push(4).unwrap(); // wraps
        assert!(queue.is_full());
        assert_eq!(queue.push(5), Err(5));

        assert_eq!(queue.iter().copied().collect::<Vec<_>>(), vec![2, 3, 4]);
        assert_eq!(queue.pop(), Some(2));
        assert_eq!(queue.pop(), Some(3));
        assert_eq!(queue.pop(), Some(4));
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn test_drop_releases_queued_values() {
        let shared = Rc::new(());
        {
            let mut queue: SmallQueue<Rc<()>, 4> = SmallQueue::new();
            queue.push(Rc::clone(&shared)).unwrap();
            queue.push(Rc::clone(&shared)).unwrap();
            assert_eq!(Rc::strong_count(&shared), 3);
        }
        assert_eq!(Rc::strong_count(&shared), 1);
    }

    #[test]
    #[should_panic(expected = "capacity must be > 0")]
    fn test_zero_capacity_rejected() {
        let _queue: SmallQueue<u8, 0> = SmallQueue::new();
    }
}
