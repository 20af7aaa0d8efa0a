//! Error types produced by the read pipeline.

use std::io;

use camino::Utf8PathBuf;
use thiserror::Error;

/// Errors surfaced by [`ReadPipeline`](crate::ReadPipeline) and the
/// decompressor helpers.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PipelineError {
    /// The decompressor failed while producing a chunk.
    #[error("failed to read from decompressor: {source}")]
    Read {
        /// Error returned by the decompressor.
        #[source]
        source: io::Error,
    },
    /// Closing the decompressor after end of stream failed.
    #[error("failed to close decompressor: {source}")]
    Close {
        /// Error returned by the decompressor.
        #[source]
        source: io::Error,
    },
    /// The producer thread could not be started.
    #[error("failed to spawn input thread: {source}")]
    Spawn {
        /// Error reported by the thread builder.
        #[source]
        source: io::Error,
    },
    /// Opening the input file failed.
    #[error("failed to open input {path}: {source}")]
    Open {
        /// Requested input path.
        path: Utf8PathBuf,
        /// Source error from std I/O.
        #[source]
        source: io::Error,
    },
    /// The producer thread panicked.
    #[error("input thread panicked")]
    Panicked,
}

impl PipelineError {
    /// Convert into an [`io::Error`] for `std::io::Read` adapters.
    #[must_use]
    pub fn into_io_error(self) -> io::Error {
        match self {
            Self::Read { source } | Self::Close { source } | Self::Open { source, .. } => source,
            other => io::Error::other(other),
        }
    }
}
