//! # DynString
//!
//! UTF-8 text stored in allocator memory.

#![allow(unsafe_code)]

use std::fmt;
use std::ops::{AddAssign, Deref};

use super::dyn_array::DynArray;
use crate::allocator::Allocator;
use crate::error::AllocResult;

/// An owned, growable UTF-8 string whose bytes live in an [`Allocator`].
///
/// Equality is byte-wise and works against `str`, `&str` and other
/// `DynString`s regardless of which allocator holds them.
///
/// # Example
///
/// ```rust,ignore
/// let mut path = DynString::from_str_in(&heap, "assets/")?;
/// path.push_str("textures/stone.png")?;
/// assert_eq!(path, "assets/textures/stone.png");
/// ```
pub struct DynString<'a> {
    bytes: DynArray<'a, u8>,
}

impl<'a> DynString<'a> {
    /// Creates an empty string. Nothing is allocated until text is added.
    #[must_use]
    pub fn new(allocator: &'a dyn Allocator) -> Self {
        Self {
            bytes: DynArray::new(allocator),
        }
    }

    /// Copies `text` into allocator memory.
    ///
    /// # Errors
    ///
    /// Fails if the allocator cannot hold the text.
    pub fn from_str_in(allocator: &'a dyn Allocator, text: &str) -> AllocResult<Self> {
        Ok(Self {
            bytes: DynArray::from_slice(allocator, text.as_bytes())?,
        })
    }

    /// Creates an empty string with room for `capacity` bytes.
    ///
    /// # Errors
    ///
    /// Fails if the allocator cannot provide the buffer.
    pub fn with_capacity(allocator: &'a dyn Allocator, capacity: usize) -> AllocResult<Self> {
        Ok(Self {
            bytes: DynArray::with_capacity(allocator, capacity)?,
        })
    }

    /// Appends `text`.
    ///
    /// # Errors
    ///
    /// Fails if growth fails; the string is unchanged in that case.
    pub fn push_str(&mut self, text: &str) -> AllocResult<()> {
        self.bytes.extend_from_slice(text.as_bytes())
    }

    /// Appends one character.
    ///
    /// # Errors
    ///
    /// Fails if growth fails.
    pub fn push(&mut self, ch: char) -> AllocResult<()> {
        let mut utf8 = [0u8; 4];
        self.push_str(ch.encode_utf8(&mut utf8))
    }

    /// Removes the last character.
    pub fn pop(&mut self) -> Option<char> {
        let ch = self.as_str().chars().next_back()?;
        self.bytes.truncate(self.bytes.len() - ch.len_utf8());
        Some(ch)
    }

    /// Empties the string, keeping its buffer.
    pub fn clear(&mut self) {
        self.bytes.clear();
    }

    /// Length in bytes.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns true if the string is empty.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Bytes that fit without growing.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.bytes.capacity()
    }

    /// Views the text as a `str`.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        // SAFETY: bytes only ever enter through `&str` or `char`, and `pop`
        // removes whole characters, so the buffer is always valid UTF-8.
        unsafe { std::str::from_utf8_unchecked(self.bytes.as_slice()) }
    }

    /// Copies the text into a new string backed by `allocator`.
    ///
    /// # Errors
    ///
    /// Fails if the allocator cannot hold the text.
    pub fn clone_in<'b>(&self, allocator: &'b dyn Allocator) -> AllocResult<DynString<'b>> {
        DynString::from_str_in(allocator, self.as_str())
    }
}

impl Deref for DynString<'_> {
    type Target = str;

    fn deref(&self) -> &str {
        self.as_str()
    }
}

impl AsRef<str> for DynString<'_> {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

/// Appends like `std::string::String`.
///
/// # Panics
///
/// Panics if the allocator is exhausted. Use [`DynString::push_str`] to
/// handle that case.
impl AddAssign<&str> for DynString<'_> {
    fn add_assign(&mut self, text: &str) {
        if let Err(err) = self.push_str(text) {
            panic!("DynString append failed: {err}");
        }
    }
}

impl PartialEq for DynString<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl Eq for DynString<'_> {}

impl PartialEq<str> for DynString<'_> {
    fn eq(&self, other: &str) -> bool {
        self.as_str() == other
    }
}

impl PartialEq<&str> for DynString<'_> {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == *other
    }
}

impl PartialEq<DynString<'_>> for &str {
    fn eq(&self, other: &DynString<'_>) -> bool {
        *self == other.as_str()
    }
}

impl fmt::Display for DynString<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for DynString<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.as_str(), f)
    }
}
