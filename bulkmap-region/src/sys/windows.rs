//! Windows backend built on file-mapping objects and mapped views.
//!
//! Release is two-phase: the view is unmapped first, then the mapping object
//! handle is closed.

use std::ffi::c_void;
use std::fs::File;
use std::os::windows::io::AsRawHandle;
use std::ptr::{self, NonNull};

use windows_sys::Win32::Foundation::{CloseHandle, HANDLE, INVALID_HANDLE_VALUE};
use windows_sys::Win32::System::Memory::{
    CreateFileMappingW, FILE_MAP, FILE_MAP_COPY, FILE_MAP_READ, FILE_MAP_WRITE, FlushViewOfFile,
    MEMORY_MAPPED_VIEW_ADDRESS, MapViewOfFile, PAGE_PROTECTION_FLAGS, PAGE_READONLY,
    PAGE_READWRITE, PAGE_WRITECOPY, UnmapViewOfFile,
};
use windows_sys::Win32::System::SystemInformation::{GetSystemInfo, SYSTEM_INFO};

use super::{Backend, RawMapping, UnmapFailure, split_offset};
use crate::{MappingMode, RegionError};

#[derive(Debug)]
pub(crate) struct WindowsBackend;

/// Mapping object handle returned by `CreateFileMappingW`.
#[derive(Debug)]
pub(crate) struct MappingObject(HANDLE);

const fn protection(mode: MappingMode, anonymous: bool) -> PAGE_PROTECTION_FLAGS {
    if anonymous {
        return PAGE_READWRITE;
    }
    match mode {
        MappingMode::ReadOnly => PAGE_READONLY,
        MappingMode::WritePrivate => PAGE_WRITECOPY,
        MappingMode::WriteShared => PAGE_READWRITE,
    }
}

const fn access(mode: MappingMode, anonymous: bool) -> FILE_MAP {
    if anonymous {
        return FILE_MAP_WRITE;
    }
    match mode {
        MappingMode::ReadOnly => FILE_MAP_READ,
        MappingMode::WritePrivate => FILE_MAP_COPY,
        MappingMode::WriteShared => FILE_MAP_WRITE,
    }
}

fn dwords(value: u64) -> Result<(u32, u32), RegionError> {
    let overflow = |_| RegionError::Overflow {
        what: "mapping size",
    };
    let high = u32::try_from(value >> 32).map_err(overflow)?;
    let low = u32::try_from(value & 0xffff_ffff).map_err(overflow)?;
    Ok((high, low))
}

fn system_info() -> SYSTEM_INFO {
    // SAFETY: SYSTEM_INFO is plain data and GetSystemInfo fills every field.
    unsafe {
        let mut info: SYSTEM_INFO = std::mem::zeroed();
        GetSystemInfo(&mut info);
        info
    }
}

fn close_object(object: &MappingObject) -> Result<(), RegionError> {
    // SAFETY: the handle came from CreateFileMappingW and is closed once.
    if unsafe { CloseHandle(object.0) } == 0 {
        Err(RegionError::last_os_error("CloseHandle"))
    } else {
        Ok(())
    }
}

impl Backend for WindowsBackend {
    type Handle = MappingObject;

    const GROWS_ANONYMOUS: bool = false;

    fn page_size() -> usize {
        usize::try_from(system_info().dwPageSize).unwrap_or(4096)
    }

    fn allocation_granularity() -> usize {
        usize::try_from(system_info().dwAllocationGranularity).unwrap_or(65_536)
    }

    fn map(
        len: usize,
        mode: MappingMode,
        file: Option<&File>,
        offset: u64,
    ) -> Result<RawMapping<MappingObject>, RegionError> {
        let anonymous = file.is_none();
        let (aligned, delta) = if anonymous {
            (0, 0)
        } else {
            split_offset(offset, Self::allocation_granularity())?
        };
        let map_len = len.checked_add(delta).ok_or(RegionError::Overflow {
            what: "mapping length",
        })?;
        let total = u64::try_from(map_len)
            .ok()
            .and_then(|bytes| bytes.checked_add(aligned))
            .ok_or(RegionError::Overflow {
                what: "mapping size",
            })?;
        let (size_high, size_low) = dwords(total)?;
        let (offset_high, offset_low) = dwords(aligned)?;
        let source: HANDLE = file.map_or(INVALID_HANDLE_VALUE, |handle| {
            handle.as_raw_handle().cast::<c_void>()
        });

        // SAFETY: `source` is either a live file handle borrowed for this call
        // or INVALID_HANDLE_VALUE for a pagefile-backed mapping.
        let raw_object = unsafe {
            CreateFileMappingW(
                source,
                ptr::null(),
                protection(mode, anonymous),
                size_high,
                size_low,
                ptr::null(),
            )
        };
        if raw_object.is_null() {
            return Err(RegionError::last_os_error("CreateFileMapping"));
        }
        let object = MappingObject(raw_object);

        // SAFETY: `object` is a live mapping object sized to cover the view.
        let view = unsafe {
            MapViewOfFile(
                object.0,
                access(mode, anonymous),
                offset_high,
                offset_low,
                map_len,
            )
        };
        let Some(base) = NonNull::new(view.Value.cast::<u8>()) else {
            let error = RegionError::last_os_error("MapViewOfFile");
            if let Err(close_error) = close_object(&object) {
                log::warn!(
                    "failed to close mapping object after MapViewOfFile failure: {close_error}"
                );
            }
            return Err(error);
        };
        Ok(RawMapping {
            base,
            len: map_len,
            delta,
            handle: object,
        })
    }

    fn unmap(mapping: RawMapping<MappingObject>) -> Result<(), UnmapFailure<MappingObject>> {
        let view = MEMORY_MAPPED_VIEW_ADDRESS {
            Value: mapping.base.as_ptr().cast::<c_void>(),
        };
        // SAFETY: `view` is the address returned by MapViewOfFile for this mapping.
        if unsafe { UnmapViewOfFile(view) } == 0 {
            let error = RegionError::last_os_error("UnmapViewOfFile");
            return Err(UnmapFailure {
                remaining: Some(mapping),
                error,
            });
        }
        close_object(&mapping.handle).map_err(|error| UnmapFailure {
            remaining: None,
            error,
        })
    }

    fn flush(mapping: &RawMapping<MappingObject>) -> Result<(), RegionError> {
        // SAFETY: the view stays mapped for the duration of the borrow.
        let status =
            unsafe { FlushViewOfFile(mapping.base.as_ptr().cast::<c_void>(), mapping.len) };
        if status == 0 {
            Err(RegionError::last_os_error("FlushViewOfFile"))
        } else {
            Ok(())
        }
    }
}
