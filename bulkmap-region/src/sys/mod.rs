//! Platform mapping backends.
//!
//! Each OS family implements [`Backend`]; [`Active`] names the one selected
//! for the build target. Shared region logic only talks to the trait.

use std::fs::File;
use std::ptr::NonNull;
use std::sync::OnceLock;

use crate::{MappingMode, RegionError};

#[cfg(unix)]
mod unix;
#[cfg(windows)]
mod windows;

#[cfg(unix)]
pub(crate) type Active = unix::UnixBackend;
#[cfg(windows)]
pub(crate) type Active = windows::WindowsBackend;

/// Platform handle kept alongside a live mapping.
pub(crate) type Handle = <Active as Backend>::Handle;

/// A live OS mapping.
///
/// `base` is the address returned by the OS. The caller-visible bytes start
/// `delta` bytes later, because file offsets are rounded down to the
/// allocation granularity before mapping.
#[derive(Debug)]
pub(crate) struct RawMapping<H> {
    pub(crate) base: NonNull<u8>,
    pub(crate) len: usize,
    pub(crate) delta: usize,
    #[cfg_attr(unix, expect(dead_code, reason = "POSIX mappings need no handle"))]
    pub(crate) handle: H,
}

impl<H> RawMapping<H> {
    pub(crate) fn data(&self) -> *mut u8 {
        self.base.as_ptr().wrapping_add(self.delta)
    }
}

/// A failed release. `remaining` holds the mapping when it is still live.
#[derive(Debug)]
pub(crate) struct UnmapFailure<H> {
    pub(crate) remaining: Option<RawMapping<H>>,
    pub(crate) error: RegionError,
}

pub(crate) trait Backend {
    type Handle;

    /// Whether anonymous mappings can be grown without unmapping.
    const GROWS_ANONYMOUS: bool;

    fn page_size() -> usize;

    /// Alignment required for file offsets.
    fn allocation_granularity() -> usize;

    fn map(
        len: usize,
        mode: MappingMode,
        file: Option<&File>,
        offset: u64,
    ) -> Result<RawMapping<Self::Handle>, RegionError>;

    fn unmap(mapping: RawMapping<Self::Handle>) -> Result<(), UnmapFailure<Self::Handle>>;

    /// Grow or shrink an anonymous mapping. On failure the mapping is untouched.
    fn remap_anonymous(
        _mapping: &mut RawMapping<Self::Handle>,
        _new_len: usize,
    ) -> Result<(), RegionError> {
        Err(RegionError::Unsupported {
            operation: "resizing an anonymous mapping",
        })
    }

    fn flush(mapping: &RawMapping<Self::Handle>) -> Result<(), RegionError>;
}

/// System page size, queried once.
pub(crate) fn page_size() -> usize {
    static PAGE_SIZE: OnceLock<usize> = OnceLock::new();
    *PAGE_SIZE.get_or_init(Active::page_size)
}

/// Split `offset` into a granularity-aligned file offset and the remainder.
pub(crate) fn split_offset(offset: u64, granularity: usize) -> Result<(u64, usize), RegionError> {
    let overflow = || RegionError::Overflow {
        what: "mapping offset",
    };
    let step = u64::try_from(granularity).map_err(|_| overflow())?;
    let remainder = offset.checked_rem(step).ok_or_else(overflow)?;
    let delta = usize::try_from(remainder).map_err(|_| overflow())?;
    Ok((offset - remainder, delta))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, 4096, 0, 0)]
    #[case(4096, 4096, 4096, 0)]
    #[case(4100, 4096, 4096, 4)]
    #[case(70_000, 65_536, 65_536, 4_464)]
    fn splits_offsets_on_granularity(
        #[case] offset: u64,
        #[case] granularity: usize,
        #[case] aligned: u64,
        #[case] delta: usize,
    ) {
        let split = split_offset(offset, granularity).expect("valid granularity");
        assert_eq!(split, (aligned, delta));
    }

    #[rstest]
    fn rejects_zero_granularity() {
        let err = split_offset(12, 0).expect_err("zero granularity cannot split");
        assert!(matches!(err, RegionError::Overflow { .. }));
    }

    #[rstest]
    fn page_size_is_a_power_of_two() {
        assert!(page_size().is_power_of_two());
        assert_eq!(Active::allocation_granularity() % page_size(), 0);
    }
}
