//! Threaded read-ahead for compressed bulk inputs.
//!
//! A [`ReadPipeline`] moves a [`Decompressor`] onto a named background thread
//! that keeps a short queue of decoded chunks ahead of the consumer. The
//! queue is bounded softly by [`PipelineOptions::watermark`]; the producer
//! pauses above it and resumes as chunks are taken. Cancellation is
//! cooperative and failures are reported once, when the pipeline is joined.

#![forbid(unsafe_code)]

mod decompressor;
mod error;
mod options;
mod pipeline;
mod queue;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use decompressor::{
    Bzip2Decompressor, Compression, DEFAULT_BUFFER_SIZE, Decompressor, PlainDecompressor,
};
pub use error::PipelineError;
pub use options::{DEFAULT_POLL_INTERVAL, DEFAULT_THREAD_NAME, DEFAULT_WATERMARK, PipelineOptions};
pub use pipeline::{CancelHandle, ChunkReader, ReadPipeline};
