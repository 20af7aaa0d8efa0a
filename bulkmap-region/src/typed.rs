//! Typed views over memory regions.

use std::fs::File;
use std::marker::PhantomData;
use std::mem::size_of;
use std::slice;

use crate::{MappingMode, MemoryRegion, RegionError, sys};

/// Plain data that can live in mapped memory.
///
/// # Safety
///
/// Every bit pattern of `size_of::<Self>()` bytes must be a valid value,
/// including all zeroes, and the type must not own resources. Mapped
/// memory is never initialised by a view, so anything read back is whatever
/// the OS or the backing file provides.
pub unsafe trait Element: Copy + 'static {}

macro_rules! impl_element {
    ($($ty:ty),* $(,)?) => {
        $(
            // SAFETY: primitive integers and floats accept any bit pattern.
            unsafe impl Element for $ty {}
        )*
    };
}

impl_element!(
    u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize, f32, f64
);

// SAFETY: arrays of valid elements have no padding and accept any bit pattern.
unsafe impl<T: Element, const N: usize> Element for [T; N] {}

fn element_bytes<T: Element>(count: usize) -> Result<usize, RegionError> {
    if size_of::<T>() == 0 {
        return Err(RegionError::Precondition {
            reason: "zero-sized element types cannot be mapped",
        });
    }
    count
        .checked_mul(size_of::<T>())
        .ok_or(RegionError::Overflow {
            what: "element count",
        })
}

/// A memory region viewed as a contiguous run of `T`.
///
/// Sizes are counted in elements. The underlying byte size is always a
/// multiple of `size_of::<T>()`. Element storage is never initialised by the
/// view.
///
/// # Examples
///
/// ```
/// use bulkmap_region::TypedView;
///
/// # fn main() -> Result<(), bulkmap_region::RegionError> {
/// let mut ids = TypedView::<u64>::anonymous(4)?;
/// if let Some(slots) = ids.as_mut_slice() {
///     slots.copy_from_slice(&[7, 11, 13, 17]);
/// }
/// assert_eq!(ids.len(), 4);
/// assert_eq!(ids.iter().sum::<u64>(), 48);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct TypedView<T: Element> {
    region: MemoryRegion,
    marker: PhantomData<T>,
}

impl<T: Element> TypedView<T> {
    /// Create an anonymous private view of `count` elements.
    ///
    /// A count of zero maps one page worth of whole elements (at least one).
    pub fn anonymous(count: usize) -> Result<Self, RegionError> {
        let effective = if count == 0 { page_count::<T>() } else { count };
        let bytes = element_bytes::<T>(effective)?;
        MemoryRegion::anonymous(bytes, MappingMode::WritePrivate).map(Self::wrap)
    }

    /// Map `count` elements of `file`, starting `offset` elements in.
    ///
    /// The file is grown when shorter than the mapped range. A count of zero
    /// maps one page worth of whole elements for writable modes and is
    /// rejected for read-only ones.
    pub fn with_file(
        count: usize,
        mode: MappingMode,
        file: &File,
        offset: u64,
    ) -> Result<Self, RegionError> {
        let effective = if count == 0 && mode.is_writable() {
            page_count::<T>()
        } else {
            count
        };
        let bytes = element_bytes::<T>(effective)?;
        let byte_offset = u64::try_from(size_of::<T>())
            .ok()
            .and_then(|width| offset.checked_mul(width))
            .ok_or(RegionError::Overflow {
                what: "element offset",
            })?;
        MemoryRegion::with_file(bytes, mode, file, byte_offset).map(Self::wrap)
    }

    const fn wrap(region: MemoryRegion) -> Self {
        Self {
            region,
            marker: PhantomData,
        }
    }

    /// Number of elements mapped.
    #[must_use]
    pub const fn len(&self) -> usize {
        match self.region.size().checked_div(size_of::<T>()) {
            Some(count) => count,
            None => 0,
        }
    }

    /// Whether the view maps no elements.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resize the view to `new_count` elements.
    ///
    /// Follows [`MemoryRegion::resize`]; the address may change.
    pub fn resize(&mut self, new_count: usize) -> Result<(), RegionError> {
        let bytes = element_bytes::<T>(new_count)?;
        self.region.resize(bytes)
    }

    /// Release the mapping. Does nothing when already invalid.
    pub fn unmap(&mut self) -> Result<(), RegionError> {
        self.region.unmap()
    }

    /// Write modified pages of a shared file view back to the file.
    pub fn flush(&self) -> Result<(), RegionError> {
        self.region.flush()
    }

    /// Whether the view currently holds a live mapping.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.region.is_valid()
    }

    /// Whether the view was created writable.
    #[must_use]
    pub const fn writable(&self) -> bool {
        self.region.writable()
    }

    /// The view's handle on the backing file, `None` when anonymous.
    #[must_use]
    pub const fn descriptor(&self) -> Option<&File> {
        self.region.descriptor()
    }

    /// The underlying byte region.
    #[must_use]
    pub const fn region(&self) -> &MemoryRegion {
        &self.region
    }

    /// Give up the typed view and return the byte region.
    #[must_use]
    pub fn into_region(self) -> MemoryRegion {
        self.region
    }

    /// The mapped elements, empty when the view is invalid.
    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        let data = self.region.as_ptr::<T>();
        if data.is_null() {
            return &[];
        }
        debug_assert!(data.is_aligned(), "mapped elements must be aligned");
        // SAFETY: the region maps `len() * size_of::<T>()` readable bytes at
        // `data`, offsets are whole elements, and `T: Element` accepts any
        // bit pattern.
        unsafe { slice::from_raw_parts(data, self.len()) }
    }

    /// The mapped elements for writing, `None` when invalid or read-only.
    #[must_use]
    pub fn as_mut_slice(&mut self) -> Option<&mut [T]> {
        let count = self.len();
        let bytes = self.region.as_mut_slice()?;
        let data = bytes.as_mut_ptr().cast::<T>();
        debug_assert!(data.is_aligned(), "mapped elements must be aligned");
        // SAFETY: as for `as_slice`; the byte slice borrow proves the region
        // is writable and exclusively borrowed.
        Some(unsafe { slice::from_raw_parts_mut(data, count) })
    }

    /// Iterate over the mapped elements.
    pub fn iter(&self) -> slice::Iter<'_, T> {
        self.as_slice().iter()
    }

    /// Iterate mutably over the mapped elements; empty when read-only.
    pub fn iter_mut(&mut self) -> slice::IterMut<'_, T> {
        self.as_mut_slice().unwrap_or_default().iter_mut()
    }
}

impl<'a, T: Element> IntoIterator for &'a TypedView<T> {
    type Item = &'a T;
    type IntoIter = slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'a, T: Element> IntoIterator for &'a mut TypedView<T> {
    type Item = &'a mut T;
    type IntoIter = slice::IterMut<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter_mut()
    }
}

/// Whole elements fitting in one page, never fewer than one.
fn page_count<T>() -> usize {
    sys::page_size()
        .checked_div(size_of::<T>())
        .unwrap_or(0)
        .max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[rstest]
    fn anonymous_view_sizes_in_elements(#[values(1, 3, 1000)] count: usize) {
        let view = TypedView::<u32>::anonymous(count).expect("anonymous view");
        assert_eq!(view.len(), count);
        assert_eq!(view.region().size(), count * size_of::<u32>());
        assert_eq!(view.iter().count(), count);
    }

    #[rstest]
    fn zero_count_maps_whole_elements() {
        let view = TypedView::<[u8; 12]>::anonymous(0).expect("anonymous view");
        assert!(!view.is_empty());
        assert_eq!(view.region().size() % size_of::<[u8; 12]>(), 0);
    }

    #[rstest]
    #[case(MappingMode::WritePrivate)]
    #[case(MappingMode::WriteShared)]
    fn zero_count_file_view_maps_whole_elements(#[case] mode: MappingMode) {
        let file = NamedTempFile::new().expect("create temp file");
        let view = TypedView::<[u8; 12]>::with_file(0, mode, file.as_file(), 0)
            .expect("file view");
        assert!(!view.is_empty());
        assert_eq!(view.len() * size_of::<[u8; 12]>(), view.region().size());
        assert_eq!(view.as_slice().len(), view.len());
    }

    #[rstest]
    fn zero_count_readonly_file_view_is_rejected() {
        let file = NamedTempFile::new().expect("create temp file");
        let err = TypedView::<u32>::with_file(0, MappingMode::ReadOnly, file.as_file(), 0)
            .expect_err("zero-size read-only view must fail");
        assert!(matches!(err, RegionError::Precondition { .. }));
    }

    #[rstest]
    fn zero_sized_elements_are_rejected() {
        let err = TypedView::<[u32; 0]>::anonymous(4).expect_err("ZST view must fail");
        assert!(matches!(err, RegionError::Precondition { .. }));
    }

    #[rstest]
    fn file_offsets_count_elements() {
        let mut file = NamedTempFile::new().expect("create temp file");
        let values: Vec<u8> = (0u16..64)
            .flat_map(|value| value.to_ne_bytes())
            .collect();
        file.write_all(&values).expect("seed file");

        let view = TypedView::<u16>::with_file(4, MappingMode::ReadOnly, file.as_file(), 10)
            .expect("file view");

        assert_eq!(view.as_slice(), &[10, 11, 12, 13]);
        assert_eq!(view.region().offset(), 20);
    }

    #[rstest]
    fn mutable_iteration_writes_through() {
        let mut view = TypedView::<i64>::anonymous(5).expect("anonymous view");
        for (index, slot) in (&mut view).into_iter().enumerate() {
            *slot = i64::try_from(index).expect("small index") * -2;
        }
        let collected: Vec<i64> = (&view).into_iter().copied().collect();
        assert_eq!(collected, vec![0, -2, -4, -6, -8]);
    }

    #[rstest]
    fn readonly_views_have_no_mutable_elements() {
        let file = NamedTempFile::new().expect("create temp file");
        file.as_file().set_len(64).expect("extend file");
        let mut view = TypedView::<u64>::with_file(8, MappingMode::ReadOnly, file.as_file(), 0)
            .expect("file view");
        assert!(view.as_mut_slice().is_none());
        assert_eq!(view.iter_mut().count(), 0);
        assert_eq!(view.iter().count(), 8);
    }

    #[rstest]
    fn resize_counts_elements() {
        let file = NamedTempFile::new().expect("create temp file");
        let mut view = TypedView::<f64>::with_file(2, MappingMode::WriteShared, file.as_file(), 0)
            .expect("file view");
        view.resize(300).expect("resize view");
        assert_eq!(view.len(), 300);
        assert_eq!(view.region().size(), 300 * size_of::<f64>());
        assert!(file.as_file().metadata().expect("metadata").len() >= 2400);
    }

    #[rstest]
    fn unmapped_view_is_empty() {
        let mut view = TypedView::<u8>::anonymous(16).expect("anonymous view");
        view.unmap().expect("unmap");
        assert!(!view.is_valid());
        assert!(view.as_slice().is_empty());
        assert!(view.as_mut_slice().is_none());
    }
}
