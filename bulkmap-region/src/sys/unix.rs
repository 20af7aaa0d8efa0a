//! POSIX backend built on `mmap`, `munmap`, `mremap` and `msync`.

use std::fs::File;
use std::io;
use std::os::fd::AsRawFd;
use std::ptr::{self, NonNull};

use super::{Backend, RawMapping, UnmapFailure, split_offset};
use crate::{MappingMode, RegionError};

const FALLBACK_PAGE_SIZE: usize = 4096;

#[derive(Debug)]
pub(crate) struct UnixBackend;

const fn protection(mode: MappingMode) -> libc::c_int {
    match mode {
        MappingMode::ReadOnly => libc::PROT_READ,
        MappingMode::WritePrivate | MappingMode::WriteShared => libc::PROT_READ | libc::PROT_WRITE,
    }
}

const fn sharing(mode: MappingMode, anonymous: bool) -> libc::c_int {
    if anonymous {
        return libc::MAP_PRIVATE | libc::MAP_ANON;
    }
    match mode {
        MappingMode::WriteShared => libc::MAP_SHARED,
        MappingMode::ReadOnly | MappingMode::WritePrivate => libc::MAP_PRIVATE,
    }
}

fn checked_address(
    addr: *mut libc::c_void,
    operation: &'static str,
) -> Result<NonNull<u8>, RegionError> {
    if addr == libc::MAP_FAILED {
        return Err(RegionError::last_os_error(operation));
    }
    NonNull::new(addr.cast::<u8>()).ok_or_else(|| {
        RegionError::mapping(operation, io::Error::other("kernel returned a null mapping"))
    })
}

impl Backend for UnixBackend {
    type Handle = ();

    const GROWS_ANONYMOUS: bool = cfg!(any(target_os = "linux", target_os = "android"));

    fn page_size() -> usize {
        // SAFETY: `sysconf` has no preconditions.
        let raw = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        usize::try_from(raw)
            .ok()
            .filter(|size| *size > 0)
            .unwrap_or(FALLBACK_PAGE_SIZE)
    }

    fn allocation_granularity() -> usize {
        super::page_size()
    }

    fn map(
        len: usize,
        mode: MappingMode,
        file: Option<&File>,
        offset: u64,
    ) -> Result<RawMapping<()>, RegionError> {
        let (aligned, delta) = match file {
            Some(_) => split_offset(offset, Self::allocation_granularity())?,
            None => (0, 0),
        };
        let map_len = len.checked_add(delta).ok_or(RegionError::Overflow {
            what: "mapping length",
        })?;
        let file_offset = libc::off_t::try_from(aligned).map_err(|_| RegionError::Overflow {
            what: "file offset",
        })?;
        let fd = file.map_or(-1, AsRawFd::as_raw_fd);
        // SAFETY: a null hint lets the kernel pick a fresh range, so no
        // existing memory is replaced.
        let addr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                map_len,
                protection(mode),
                sharing(mode, file.is_none()),
                fd,
                file_offset,
            )
        };
        let base = checked_address(addr, "mmap")?;
        Ok(RawMapping {
            base,
            len: map_len,
            delta,
            handle: (),
        })
    }

    fn unmap(mapping: RawMapping<()>) -> Result<(), UnmapFailure<()>> {
        // SAFETY: `mapping` owns exactly this range and is consumed here.
        let status = unsafe { libc::munmap(mapping.base.as_ptr().cast(), mapping.len) };
        if status == 0 {
            return Ok(());
        }
        let error = RegionError::last_os_error("munmap");
        Err(UnmapFailure {
            remaining: Some(mapping),
            error,
        })
    }

    #[cfg(any(target_os = "linux", target_os = "android"))]
    fn remap_anonymous(mapping: &mut RawMapping<()>, new_len: usize) -> Result<(), RegionError> {
        // SAFETY: the old range is owned by `mapping`; MREMAP_MAYMOVE lets the
        // kernel relocate it and invalidates the old address only on success.
        let addr = unsafe {
            libc::mremap(
                mapping.base.as_ptr().cast(),
                mapping.len,
                new_len,
                libc::MREMAP_MAYMOVE,
            )
        };
        mapping.base = checked_address(addr, "mremap")?;
        mapping.len = new_len;
        Ok(())
    }

    fn flush(mapping: &RawMapping<()>) -> Result<(), RegionError> {
        // SAFETY: the range stays mapped for the duration of the borrow.
        let status =
            unsafe { libc::msync(mapping.base.as_ptr().cast(), mapping.len, libc::MS_SYNC) };
        if status == 0 {
            Ok(())
        } else {
            Err(RegionError::last_os_error("msync"))
        }
    }
}
