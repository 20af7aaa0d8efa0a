//! Error types raised while creating, resizing, or releasing memory regions.

use std::io;

use camino::Utf8PathBuf;
use thiserror::Error;

/// Errors raised by [`MemoryRegion`](crate::MemoryRegion) and the typed views
/// built on it.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RegionError {
    /// An OS mapping primitive failed.
    #[error("{operation} failed")]
    Mapping {
        /// Name of the failing OS call.
        operation: &'static str,
        /// Error reported by the operating system.
        #[source]
        source: io::Error,
    },
    /// The backing file could not be inspected or grown to cover the mapping.
    #[error("failed to grow backing file to {required} bytes")]
    GrowFile {
        /// File length needed to cover `offset + size`.
        required: u64,
        /// Source error from std I/O.
        #[source]
        source: io::Error,
    },
    /// Opening the backing file failed.
    #[error("failed to open mapping file at {path}")]
    Open {
        /// Requested file path.
        path: Utf8PathBuf,
        /// Source error from std I/O.
        #[source]
        source: io::Error,
    },
    /// The caller broke a documented precondition.
    #[error("invalid mapping request: {reason}")]
    Precondition {
        /// Which precondition was violated.
        reason: &'static str,
    },
    /// The platform cannot perform the requested operation.
    #[error("{operation} is not supported on this platform")]
    Unsupported {
        /// Description of the rejected operation.
        operation: &'static str,
    },
    /// A size or offset does not fit the platform's integer types.
    #[error("{what} overflows the platform address range")]
    Overflow {
        /// Which quantity overflowed.
        what: &'static str,
    },
}

impl RegionError {
    pub(crate) const fn mapping(operation: &'static str, source: io::Error) -> Self {
        Self::Mapping { operation, source }
    }

    pub(crate) fn last_os_error(operation: &'static str) -> Self {
        Self::mapping(operation, io::Error::last_os_error())
    }

    /// Raw OS error code for failures reported by the operating system.
    #[must_use]
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            Self::Mapping { source, .. }
            | Self::GrowFile { source, .. }
            | Self::Open { source, .. } => source.raw_os_error(),
            _ => None,
        }
    }
}
