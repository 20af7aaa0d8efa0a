//! Owned memory mappings for bulk data processing.
//!
//! [`MemoryRegion`] owns one anonymous or file-backed mapping and releases it
//! on drop. [`TypedView`] reinterprets a region as a slice of plain
//! [`Element`] values, and [`MappedVec`] grows one on demand. The
//! [`AnonymousRegion`] and [`AnonymousTypedView`] wrappers only offer
//! `resize` on targets that can grow anonymous mappings in place.
//!
//! Platform calls live behind a small backend trait with POSIX and Windows
//! implementations; the rest of the crate is platform independent.

#![deny(unsafe_op_in_unsafe_fn)]

mod anonymous;
mod error;
mod mode;
mod region;
mod sys;
mod typed;
mod vec;

pub use anonymous::{AnonymousRegion, AnonymousTypedView};
pub use error::RegionError;
pub use mode::MappingMode;
pub use region::MemoryRegion;
pub use typed::{Element, TypedView};
pub use vec::{DEFAULT_CAPACITY, MappedVec};

/// The system page size in bytes.
///
/// Zero-byte writable requests are rounded up to this size.
#[must_use]
pub fn page_size() -> usize {
    sys::page_size()
}
