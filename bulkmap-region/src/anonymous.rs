//! Anonymous-only wrappers whose growth is gated at compile time.
//!
//! `mremap` is the only primitive that grows an anonymous mapping while
//! keeping its contents, so `resize` only exists on Linux and Android. Code
//! calling it elsewhere fails to build instead of failing at run time.

use std::ops::Deref;

use crate::{Element, MappingMode, MemoryRegion, RegionError, TypedView};

/// A private anonymous [`MemoryRegion`].
///
/// Read access goes through [`Deref`]; mutation is limited to the methods
/// below so the region cannot be resized on platforms without in-place growth.
///
/// # Examples
///
/// ```
/// use bulkmap_region::AnonymousRegion;
///
/// # fn main() -> Result<(), bulkmap_region::RegionError> {
/// let mut scratch = AnonymousRegion::new(4096)?;
/// if let Some(bytes) = scratch.as_mut_slice() {
///     bytes[..4].copy_from_slice(b"node");
/// }
/// assert_eq!(&scratch.as_slice()[..4], b"node");
/// assert!(scratch.is_anonymous());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct AnonymousRegion {
    inner: MemoryRegion,
}

impl AnonymousRegion {
    /// Map `size` zero-filled private bytes; zero maps one page.
    pub fn new(size: usize) -> Result<Self, RegionError> {
        MemoryRegion::anonymous(size, MappingMode::WritePrivate).map(|inner| Self { inner })
    }

    /// Grow or shrink the region, preserving the common prefix.
    ///
    /// The address may change.
    #[cfg(any(target_os = "linux", target_os = "android"))]
    pub fn resize(&mut self, new_size: usize) -> Result<(), RegionError> {
        self.inner.resize(new_size)
    }

    /// The mapped bytes for writing, `None` once unmapped.
    #[must_use]
    pub fn as_mut_slice(&mut self) -> Option<&mut [u8]> {
        self.inner.as_mut_slice()
    }

    /// Release the mapping. Does nothing when already invalid.
    pub fn unmap(&mut self) -> Result<(), RegionError> {
        self.inner.unmap()
    }

    /// Move the mapping into a new value, leaving `self` invalid.
    #[must_use]
    pub fn take(&mut self) -> Self {
        Self {
            inner: self.inner.take(),
        }
    }

    /// Unwrap into the general region type.
    #[must_use]
    pub fn into_inner(self) -> MemoryRegion {
        self.inner
    }
}

impl Deref for AnonymousRegion {
    type Target = MemoryRegion;

    fn deref(&self) -> &MemoryRegion {
        &self.inner
    }
}

/// A private anonymous [`TypedView`].
#[derive(Debug)]
pub struct AnonymousTypedView<T: Element> {
    inner: TypedView<T>,
}

impl<T: Element> AnonymousTypedView<T> {
    /// Map `count` elements; zero maps a page worth of elements.
    pub fn new(count: usize) -> Result<Self, RegionError> {
        TypedView::anonymous(count).map(|inner| Self { inner })
    }

    /// Grow or shrink the view to `new_count` elements, preserving the prefix.
    #[cfg(any(target_os = "linux", target_os = "android"))]
    pub fn resize(&mut self, new_count: usize) -> Result<(), RegionError> {
        self.inner.resize(new_count)
    }

    /// The mapped elements for writing, `None` once unmapped.
    #[must_use]
    pub fn as_mut_slice(&mut self) -> Option<&mut [T]> {
        self.inner.as_mut_slice()
    }

    /// Iterate mutably over the mapped elements.
    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, T> {
        self.inner.iter_mut()
    }

    /// Release the mapping. Does nothing when already invalid.
    pub fn unmap(&mut self) -> Result<(), RegionError> {
        self.inner.unmap()
    }

    /// Unwrap into the general typed view.
    #[must_use]
    pub fn into_inner(self) -> TypedView<T> {
        self.inner
    }
}

impl<T: Element> Deref for AnonymousTypedView<T> {
    type Target = TypedView<T>;

    fn deref(&self) -> &TypedView<T> {
        &self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn anonymous_region_is_private_and_zeroed() {
        let region = AnonymousRegion::new(512).expect("anonymous region");
        assert_eq!(region.mode(), MappingMode::WritePrivate);
        assert!(region.descriptor().is_none());
        assert!(region.as_slice().iter().all(|byte| *byte == 0));
    }

    #[rstest]
    fn take_leaves_an_invalid_region() {
        let mut source = AnonymousRegion::new(512).expect("anonymous region");
        let taken = source.take();
        assert!(!source.is_valid());
        assert!(taken.is_valid());
        assert_eq!(taken.into_inner().size(), 512);
    }

    #[rstest]
    fn typed_view_writes_through_deref_reads() {
        let mut view = AnonymousTypedView::<u32>::new(3).expect("anonymous view");
        for (slot, value) in view.iter_mut().zip([5, 8, 13]) {
            *slot = value;
        }
        assert_eq!(view.as_slice(), &[5, 8, 13]);
        view.unmap().expect("unmap");
        assert!(!view.is_valid());
    }

    #[cfg(any(target_os = "linux", target_os = "android"))]
    #[rstest]
    fn typed_view_grows_with_contents() {
        let mut view = AnonymousTypedView::<u64>::new(2).expect("anonymous view");
        view.as_mut_slice()
            .expect("writable view")
            .copy_from_slice(&[21, 34]);
        view.resize(10_000).expect("grow view");
        assert_eq!(view.len(), 10_000);
        assert_eq!(view.as_slice().get(..2), Some(&[21, 34][..]));
    }

    #[cfg(any(target_os = "linux", target_os = "android"))]
    #[rstest]
    fn region_shrinks_keeping_prefix() {
        let mut region = AnonymousRegion::new(8192).expect("anonymous region");
        region.as_mut_slice().expect("writable region").fill(9);
        region.resize(100).expect("shrink region");
        assert_eq!(region.size(), 100);
        assert!(region.as_slice().iter().all(|byte| *byte == 9));
    }
}
