//! The owning wrapper around a single OS mapping.

use std::fs::File;
use std::{fmt, mem, slice};

use camino::Utf8Path;
use log::{debug, warn};

use crate::sys::{self, Active, Backend, Handle, RawMapping};
use crate::{MappingMode, RegionError};

/// Either a live mapping or nothing.
enum State {
    Mapped(RawMapping<Handle>),
    Unmapped,
}

/// Exclusive owner of one anonymous or file-backed memory mapping.
///
/// A region is created mapped and stays valid until [`unmap`](Self::unmap)
/// is called or it is dropped. Ownership moves like any Rust value;
/// [`take`](Self::take) additionally leaves an invalid region behind.
///
/// File-backed regions keep their own duplicate of the file handle so they
/// can be remapped by [`resize`](Self::resize); the caller may close its
/// handle at any time. The file must not be truncated below
/// `offset + size` by anyone else while the region is mapped.
///
/// # Examples
///
/// ```
/// use bulkmap_region::{MappingMode, MemoryRegion};
///
/// # fn main() -> Result<(), bulkmap_region::RegionError> {
/// let mut region = MemoryRegion::anonymous(1024, MappingMode::WritePrivate)?;
/// if let Some(bytes) = region.as_mut_slice() {
///     bytes[0] = 42;
/// }
/// assert_eq!(region.as_slice()[0], 42);
/// region.unmap()?;
/// assert!(!region.is_valid());
/// # Ok(())
/// # }
/// ```
pub struct MemoryRegion {
    size: usize,
    offset: u64,
    file: Option<File>,
    mode: MappingMode,
    state: State,
}

// SAFETY: the region exclusively owns its mapping and handles; none of them
// are tied to the creating thread.
unsafe impl Send for MemoryRegion {}

impl MemoryRegion {
    /// Create a private anonymous mapping of `size` bytes.
    ///
    /// A size of zero is rounded up to the page size. Anonymous mappings are
    /// zero-filled and always private, so `mode` must be writable.
    pub fn anonymous(size: usize, mode: MappingMode) -> Result<Self, RegionError> {
        if !mode.is_writable() {
            return Err(RegionError::Precondition {
                reason: "anonymous mappings must be writable",
            });
        }
        Self::create(size, mode, None, 0)
    }

    /// Map `size` bytes of `file` starting at byte `offset`.
    ///
    /// The file is grown to `offset + size` bytes first when shorter, which
    /// requires it to be open for writing. `offset` need not be page aligned.
    pub fn with_file(
        size: usize,
        mode: MappingMode,
        file: &File,
        offset: u64,
    ) -> Result<Self, RegionError> {
        let handle = file
            .try_clone()
            .map_err(|source| RegionError::mapping("duplicating the file handle", source))?;
        Self::create(size, mode, Some(handle), offset)
    }

    /// Open the file at `path` and map `size` bytes starting at `offset`.
    ///
    /// Read-only mappings need an existing file. Writable mappings create the
    /// file and its parent directories when missing.
    pub fn open(
        path: &Utf8Path,
        size: usize,
        mode: MappingMode,
        offset: u64,
    ) -> Result<Self, RegionError> {
        let file = bulkmap_fs::open_for_mapping(path, mode.is_writable()).map_err(|source| {
            RegionError::Open {
                path: path.to_owned(),
                source,
            }
        })?;
        Self::create(size, mode, Some(file), offset)
    }

    fn create(
        size: usize,
        mode: MappingMode,
        file: Option<File>,
        offset: u64,
    ) -> Result<Self, RegionError> {
        let length = checked_size(size, mode)?;
        let mut region = Self {
            size: length,
            offset: if file.is_some() { offset } else { 0 },
            file,
            mode,
            state: State::Unmapped,
        };
        region.grow_backing_file()?;
        region.map_now()?;
        debug!(
            "mapped {} bytes ({:?}, {})",
            region.size,
            region.mode,
            region.kind()
        );
        Ok(region)
    }

    fn map_now(&mut self) -> Result<(), RegionError> {
        let mapping = Active::map(self.size, self.mode, self.file.as_ref(), self.offset)?;
        self.state = State::Mapped(mapping);
        Ok(())
    }

    fn grow_backing_file(&self) -> Result<(), RegionError> {
        let Some(file) = &self.file else {
            return Ok(());
        };
        let required = u64::try_from(self.size)
            .ok()
            .and_then(|size| size.checked_add(self.offset))
            .ok_or(RegionError::Overflow {
                what: "mapping end offset",
            })?;
        let current = file
            .metadata()
            .map_err(|source| RegionError::GrowFile { required, source })?
            .len();
        if current < required {
            file.set_len(required)
                .map_err(|source| RegionError::GrowFile { required, source })?;
            debug!("grew backing file from {current} to {required} bytes");
        }
        Ok(())
    }

    /// Release the mapping. Does nothing when the region is already invalid.
    ///
    /// Dropping a region calls this too but discards any failure; call it
    /// explicitly to observe one.
    pub fn unmap(&mut self) -> Result<(), RegionError> {
        let State::Mapped(mapping) = mem::replace(&mut self.state, State::Unmapped) else {
            return Ok(());
        };
        match Active::unmap(mapping) {
            Ok(()) => {
                debug!("unmapped {} bytes ({})", self.size, self.kind());
                Ok(())
            }
            Err(failure) => {
                if let Some(live) = failure.remaining {
                    self.state = State::Mapped(live);
                }
                Err(failure.error)
            }
        }
    }

    /// Resize the mapping to `new_size` bytes.
    ///
    /// Anonymous regions grow in place where the platform allows it and are
    /// rejected with [`RegionError::Unsupported`] elsewhere, before any OS call.
    /// File-backed regions are unmapped, the file is grown if needed, and the
    /// same range is mapped again with the same mode. The address may change.
    ///
    /// An invalid region is rejected with [`RegionError::Precondition`]. When
    /// growing the file or mapping it again fails, the region is left invalid
    /// and [`size`](Self::size) already reports `new_size`. A failed anonymous
    /// remap leaves the old mapping in place.
    pub fn resize(&mut self, new_size: usize) -> Result<(), RegionError> {
        if new_size == 0 {
            return Err(RegionError::Precondition {
                reason: "cannot resize a mapping to zero bytes",
            });
        }
        if !self.is_valid() {
            return Err(RegionError::Precondition {
                reason: "cannot resize an unmapped region",
            });
        }
        if self.is_anonymous() {
            self.remap_anonymous(new_size)?;
        } else {
            self.unmap()?;
            self.size = new_size;
            self.grow_backing_file()?;
            self.map_now()?;
        }
        debug!("resized {} region to {new_size} bytes", self.kind());
        Ok(())
    }

    fn remap_anonymous(&mut self, new_size: usize) -> Result<(), RegionError> {
        if !Active::GROWS_ANONYMOUS {
            return Err(RegionError::Unsupported {
                operation: "resizing an anonymous mapping",
            });
        }
        let State::Mapped(mapping) = &mut self.state else {
            return Err(RegionError::Precondition {
                reason: "cannot resize an unmapped region",
            });
        };
        Active::remap_anonymous(mapping, new_size)?;
        self.size = new_size;
        Ok(())
    }

    /// Write modified pages of a shared file mapping back to the file.
    ///
    /// A no-op for anonymous, private, read-only, or invalid regions.
    pub fn flush(&self) -> Result<(), RegionError> {
        match &self.state {
            State::Mapped(mapping)
                if self.file.is_some() && self.mode == MappingMode::WriteShared =>
            {
                Active::flush(mapping)
            }
            _ => Ok(()),
        }
    }

    /// Move the mapping into a new value, leaving `self` invalid.
    ///
    /// No OS call is made.
    #[must_use]
    pub fn take(&mut self) -> Self {
        mem::take(self)
    }

    /// Whether the region currently holds a live mapping.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        matches!(self.state, State::Mapped(_))
    }

    /// Number of bytes mapped.
    ///
    /// This is the requested size (or the page size for a zero request); the
    /// OS may round the underlying mapping up to whole pages.
    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Byte offset into the backing file, `0` for anonymous regions.
    #[must_use]
    pub const fn offset(&self) -> u64 {
        self.offset
    }

    /// The mapping mode.
    #[must_use]
    pub const fn mode(&self) -> MappingMode {
        self.mode
    }

    /// The region's handle on the backing file, `None` for anonymous regions.
    #[must_use]
    pub const fn descriptor(&self) -> Option<&File> {
        self.file.as_ref()
    }

    /// Whether the region has no backing file.
    #[must_use]
    pub const fn is_anonymous(&self) -> bool {
        self.file.is_none()
    }

    /// Whether the region was created writable.
    #[must_use]
    pub const fn writable(&self) -> bool {
        self.mode.is_writable()
    }

    /// Start address of the mapped bytes cast to `*mut T`.
    ///
    /// Returns a null pointer when the region is invalid. Writing through the
    /// pointer of a read-only region faults.
    #[must_use]
    pub fn as_ptr<T>(&self) -> *mut T {
        match &self.state {
            State::Mapped(mapping) => mapping.data().cast::<T>(),
            State::Unmapped => std::ptr::null_mut(),
        }
    }

    /// The mapped bytes, empty when the region is invalid.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        match &self.state {
            // SAFETY: the mapping covers `delta + size` readable bytes and
            // lives at least as long as this borrow of `self`.
            State::Mapped(mapping) => unsafe { slice::from_raw_parts(mapping.data(), self.size) },
            State::Unmapped => &[],
        }
    }

    /// The mapped bytes for writing.
    ///
    /// `None` when the region is invalid or read-only.
    #[must_use]
    pub fn as_mut_slice(&mut self) -> Option<&mut [u8]> {
        if !self.writable() {
            return None;
        }
        match &mut self.state {
            // SAFETY: the mapping is writable, covers `delta + size` bytes and
            // `&mut self` guarantees exclusive access for the borrow.
            State::Mapped(mapping) => {
                Some(unsafe { slice::from_raw_parts_mut(mapping.data(), self.size) })
            }
            State::Unmapped => None,
        }
    }

    const fn kind(&self) -> &'static str {
        if self.file.is_some() {
            "file-backed"
        } else {
            "anonymous"
        }
    }
}

/// Round a zero request up to the page size for writable modes.
fn checked_size(size: usize, mode: MappingMode) -> Result<usize, RegionError> {
    match size {
        0 if mode.is_writable() => Ok(sys::page_size()),
        0 => Err(RegionError::Precondition {
            reason: "read-only mappings need a non-zero size",
        }),
        other => Ok(other),
    }
}

impl Default for MemoryRegion {
    /// An invalid anonymous region owning nothing.
    fn default() -> Self {
        Self {
            size: 0,
            offset: 0,
            file: None,
            mode: MappingMode::WritePrivate,
            state: State::Unmapped,
        }
    }
}

impl Drop for MemoryRegion {
    fn drop(&mut self) {
        // Failures cannot reach a caller from here.
        if let Err(err) = self.unmap() {
            warn!("discarding failure while releasing memory region: {err}");
        }
    }
}

impl fmt::Debug for MemoryRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryRegion")
            .field("size", &self.size)
            .field("offset", &self.offset)
            .field("file", &self.file)
            .field("mode", &self.mode)
            .field("valid", &self.is_valid())
            .finish()
    }
}
