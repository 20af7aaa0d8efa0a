//! Facade crate for the bulkmap toolkit.
//!
//! Re-exports owned memory mappings from `bulkmap-region` and the threaded
//! read pipeline from `bulkmap-pipeline`. The `test-support` feature exposes
//! the pipeline's scripted decompressors.

#![forbid(unsafe_code)]

pub use bulkmap_pipeline::{
    Bzip2Decompressor, CancelHandle, ChunkReader, Compression, Decompressor, PipelineError,
    PipelineOptions, PlainDecompressor, ReadPipeline,
};
pub use bulkmap_region::{
    AnonymousRegion, AnonymousTypedView, Element, MappedVec, MappingMode, MemoryRegion,
    RegionError, TypedView, page_size,
};

#[cfg(feature = "test-support")]
pub use bulkmap_pipeline::test_support;

/// Filesystem helpers shared by the mapping and pipeline crates.
pub mod fs {
    pub use bulkmap_fs::{ensure_parent_dir, open_for_mapping, open_input};
}
