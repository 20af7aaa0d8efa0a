//! A growable array stored in mapped memory.

use std::fs::File;
use std::slice;

use crate::{Element, MappingMode, RegionError, TypedView};

/// Initial capacity used by [`MappedVec::anonymous`] and [`MappedVec::with_file`].
pub const DEFAULT_CAPACITY: usize = 1024;

/// A vector whose elements live in a [`TypedView`].
///
/// Capacity doubles through [`TypedView::resize`] when a push finds the
/// storage full, so element addresses are not stable across pushes. Anonymous
/// vectors are only available where anonymous mappings can grow in place;
/// file-backed vectors work on every platform.
///
/// # Examples
///
/// ```
/// use bulkmap_region::MappedVec;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let file = tempfile::tempfile()?;
/// let mut offsets = MappedVec::<u64>::with_file(&file, 2)?;
/// for value in [3, 5, 8] {
///     offsets.push(value)?;
/// }
/// assert_eq!(offsets.as_slice(), &[3, 5, 8]);
/// assert!(offsets.capacity() >= 3);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct MappedVec<T: Element> {
    storage: TypedView<T>,
    len: usize,
}

impl<T: Element> MappedVec<T> {
    /// An empty anonymous vector with [`DEFAULT_CAPACITY`].
    #[cfg(any(target_os = "linux", target_os = "android"))]
    pub fn anonymous() -> Result<Self, RegionError> {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// An empty anonymous vector holding at least `capacity` elements.
    #[cfg(any(target_os = "linux", target_os = "android"))]
    pub fn with_capacity(capacity: usize) -> Result<Self, RegionError> {
        TypedView::anonymous(capacity.max(1)).map(Self::empty)
    }

    /// An empty vector stored at the start of `file`, shared with it.
    ///
    /// Existing file contents are ignored and overwritten by pushes. The file
    /// grows as the vector does. A `capacity` of zero uses
    /// [`DEFAULT_CAPACITY`].
    pub fn with_file(file: &File, capacity: usize) -> Result<Self, RegionError> {
        let initial = if capacity == 0 {
            DEFAULT_CAPACITY
        } else {
            capacity
        };
        TypedView::with_file(initial, MappingMode::WriteShared, file, 0).map(Self::empty)
    }

    const fn empty(storage: TypedView<T>) -> Self {
        Self { storage, len: 0 }
    }

    /// Number of stored elements.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Whether no elements are stored.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Elements the current mapping can hold without growing.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.storage.len()
    }

    /// Append `value`, doubling the capacity when full.
    pub fn push(&mut self, value: T) -> Result<(), RegionError> {
        if self.len == self.capacity() {
            self.reserve(1)?;
        }
        let index = self.len;
        let slot = self
            .storage
            .as_mut_slice()
            .and_then(|elements| elements.get_mut(index))
            .ok_or(RegionError::Precondition {
                reason: "vector storage is no longer mapped",
            })?;
        *slot = value;
        self.len = index + 1;
        Ok(())
    }

    /// Remove and return the last element.
    pub fn pop(&mut self) -> Option<T> {
        let last = self.len.checked_sub(1)?;
        let value = self.get(last)?;
        self.len = last;
        Some(value)
    }

    /// The element at `index`, if stored.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<T> {
        self.as_slice().get(index).copied()
    }

    /// Ensure room for `additional` more elements.
    ///
    /// Capacity at least doubles when it grows.
    pub fn reserve(&mut self, additional: usize) -> Result<(), RegionError> {
        let required = self
            .len
            .checked_add(additional)
            .ok_or(RegionError::Overflow {
                what: "vector capacity",
            })?;
        let current = self.capacity();
        if required <= current {
            return Ok(());
        }
        let doubled = current.saturating_mul(2).max(required);
        self.storage.resize(doubled)
    }

    /// Forget all elements, keeping the mapping.
    pub const fn clear(&mut self) {
        self.len = 0;
    }

    /// The stored elements.
    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        self.storage.as_slice().get(..self.len).unwrap_or_default()
    }

    /// The stored elements for writing.
    #[must_use]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        let len = self.len;
        self.storage
            .as_mut_slice()
            .and_then(|elements| elements.get_mut(..len))
            .unwrap_or_default()
    }

    /// Iterate over the stored elements.
    pub fn iter(&self) -> slice::Iter<'_, T> {
        self.as_slice().iter()
    }

    /// Write the stored elements of a file-backed vector to the file.
    pub fn flush(&self) -> Result<(), RegionError> {
        self.storage.flush()
    }

    /// Give up the vector and return its storage; only the first
    /// [`len`](Self::len) elements were written by the vector.
    #[must_use]
    pub fn into_storage(self) -> TypedView<T> {
        self.storage
    }
}

impl<'a, T: Element> IntoIterator for &'a MappedVec<T> {
    type Item = &'a T;
    type IntoIter = slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};
    use tempfile::NamedTempFile;

    #[fixture]
    fn backing() -> NamedTempFile {
        NamedTempFile::new().expect("create temp file")
    }

    #[rstest]
    fn pushes_past_capacity_double_storage(backing: NamedTempFile) {
        let mut vec = MappedVec::<u32>::with_file(backing.as_file(), 4).expect("file vector");
        for value in 0..9 {
            vec.push(value).expect("push");
        }
        assert_eq!(vec.len(), 9);
        assert_eq!(vec.capacity(), 16);
        assert_eq!(vec.as_slice(), &[0, 1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[rstest]
    fn zero_capacity_uses_default(backing: NamedTempFile) {
        let vec = MappedVec::<u8>::with_file(backing.as_file(), 0).expect("file vector");
        assert_eq!(vec.capacity(), DEFAULT_CAPACITY);
        assert!(vec.is_empty());
    }

    #[rstest]
    fn pop_and_get_follow_length(backing: NamedTempFile) {
        let mut vec = MappedVec::<i16>::with_file(backing.as_file(), 2).expect("file vector");
        vec.push(-1).expect("push");
        vec.push(2).expect("push");
        assert_eq!(vec.get(1), Some(2));
        assert_eq!(vec.pop(), Some(2));
        assert_eq!(vec.get(1), None);
        assert_eq!(vec.pop(), Some(-1));
        assert_eq!(vec.pop(), None);
    }

    #[rstest]
    fn reserve_grows_to_at_least_the_request(backing: NamedTempFile) {
        let mut vec = MappedVec::<u64>::with_file(backing.as_file(), 8).expect("file vector");
        vec.reserve(3).expect("reserve within capacity");
        assert_eq!(vec.capacity(), 8);
        vec.reserve(100).expect("reserve beyond capacity");
        assert_eq!(vec.capacity(), 100);
    }

    #[rstest]
    fn clear_keeps_capacity(backing: NamedTempFile) {
        let mut vec = MappedVec::<u8>::with_file(backing.as_file(), 4).expect("file vector");
        vec.push(1).expect("push");
        vec.clear();
        assert!(vec.is_empty());
        assert_eq!(vec.capacity(), 4);
        assert!(vec.as_mut_slice().is_empty());
    }

    #[rstest]
    fn pushed_values_reach_the_file(backing: NamedTempFile) {
        let mut vec = MappedVec::<u8>::with_file(backing.as_file(), 2).expect("file vector");
        for byte in b"tiles" {
            vec.push(*byte).expect("push");
        }
        vec.flush().expect("flush");
        drop(vec);
        let contents = std::fs::read(backing.path()).expect("read file");
        assert_eq!(contents.get(..5), Some(&b"tiles"[..]));
    }

    #[cfg(any(target_os = "linux", target_os = "android"))]
    #[rstest]
    fn anonymous_vector_grows_in_memory() {
        let mut vec = MappedVec::<u64>::with_capacity(1).expect("anonymous vector");
        for value in 0..5000u64 {
            vec.push(value * 3).expect("push");
        }
        assert_eq!(vec.len(), 5000);
        assert_eq!(vec.get(4999), Some(14_997));
        assert_eq!(vec.iter().copied().take(3).collect::<Vec<_>>(), vec![0, 3, 6]);
    }
}
