//! Chunked byte sources consumed by the producer thread.

use std::fs::File;
use std::io::{self, Read};

use bzip2::read::MultiBzDecoder;
use camino::Utf8Path;

use crate::PipelineError;

/// Default chunk size for the bundled decompressors.
pub const DEFAULT_BUFFER_SIZE: usize = 1024 * 1024;

/// A source of decompressed chunks.
///
/// `read` returns the next non-empty chunk, or an empty vector once the
/// input is exhausted. `close` releases the underlying input and is called
/// exactly once by the pipeline.
pub trait Decompressor: Send {
    /// Produce the next chunk; empty at end of input.
    fn read(&mut self) -> io::Result<Vec<u8>>;

    /// Release the underlying input.
    fn close(&mut self) -> io::Result<()>;
}

impl<D: Decompressor + ?Sized> Decompressor for Box<D> {
    fn read(&mut self) -> io::Result<Vec<u8>> {
        (**self).read()
    }

    fn close(&mut self) -> io::Result<()> {
        (**self).close()
    }
}

/// Fill a fresh buffer of up to `capacity` bytes from `reader`.
///
/// Short reads are retried until the buffer is full or the reader reports
/// end of input, so only the final chunk may be shorter than `capacity`.
fn read_chunk<R: Read>(reader: &mut R, capacity: usize) -> io::Result<Vec<u8>> {
    let mut chunk = Vec::with_capacity(capacity);
    let limit = u64::try_from(capacity).unwrap_or(u64::MAX);
    reader.take(limit).read_to_end(&mut chunk)?;
    Ok(chunk)
}

/// Passes bytes through unchanged.
#[derive(Debug)]
pub struct PlainDecompressor<R> {
    reader: Option<R>,
    buffer_size: usize,
}

impl<R: Read + Send> PlainDecompressor<R> {
    /// Wrap `reader` using [`DEFAULT_BUFFER_SIZE`] chunks.
    pub const fn new(reader: R) -> Self {
        Self::with_buffer_size(reader, DEFAULT_BUFFER_SIZE)
    }

    /// Wrap `reader` using chunks of `buffer_size` bytes (at least one).
    pub const fn with_buffer_size(reader: R, buffer_size: usize) -> Self {
        Self {
            reader: Some(reader),
            buffer_size: if buffer_size == 0 { 1 } else { buffer_size },
        }
    }
}

impl<R: Read + Send> Decompressor for PlainDecompressor<R> {
    fn read(&mut self) -> io::Result<Vec<u8>> {
        match self.reader.as_mut() {
            Some(reader) => read_chunk(reader, self.buffer_size),
            None => Ok(Vec::new()),
        }
    }

    fn close(&mut self) -> io::Result<()> {
        self.reader = None;
        Ok(())
    }
}

/// Decodes one or more concatenated bzip2 streams.
pub struct Bzip2Decompressor<R> {
    decoder: Option<MultiBzDecoder<R>>,
    buffer_size: usize,
}

impl<R: Read + Send> Bzip2Decompressor<R> {
    /// Decode `reader` into [`DEFAULT_BUFFER_SIZE`] chunks.
    pub fn new(reader: R) -> Self {
        Self::with_buffer_size(reader, DEFAULT_BUFFER_SIZE)
    }

    /// Decode `reader` into chunks of `buffer_size` bytes (at least one).
    pub fn with_buffer_size(reader: R, buffer_size: usize) -> Self {
        Self {
            decoder: Some(MultiBzDecoder::new(reader)),
            buffer_size: buffer_size.max(1),
        }
    }
}

impl<R> std::fmt::Debug for Bzip2Decompressor<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bzip2Decompressor")
            .field("open", &self.decoder.is_some())
            .field("buffer_size", &self.buffer_size)
            .finish()
    }
}

impl<R: Read + Send> Decompressor for Bzip2Decompressor<R> {
    fn read(&mut self) -> io::Result<Vec<u8>> {
        match self.decoder.as_mut() {
            Some(decoder) => read_chunk(decoder, self.buffer_size),
            None => Ok(Vec::new()),
        }
    }

    fn close(&mut self) -> io::Result<()> {
        self.decoder = None;
        Ok(())
    }
}

/// Compression formats understood by [`Compression::open`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Compression {
    /// Raw bytes.
    None,
    /// One or more concatenated bzip2 streams.
    Bzip2,
}

impl Compression {
    /// Pick a format from the file extension; `.bz2` in any case is bzip2.
    #[must_use]
    pub fn from_path(path: &Utf8Path) -> Self {
        match path.extension() {
            Some(ext) if ext.eq_ignore_ascii_case("bz2") => Self::Bzip2,
            _ => Self::None,
        }
    }

    /// Wrap `reader` in the matching decompressor.
    #[must_use]
    pub fn decompressor<R>(self, reader: R) -> Box<dyn Decompressor>
    where
        R: Read + Send + 'static,
    {
        match self {
            Self::None => Box::new(PlainDecompressor::new(reader)),
            Self::Bzip2 => Box::new(Bzip2Decompressor::new(reader)),
        }
    }

    /// Open `path` and wrap it in the matching decompressor.
    pub fn open(self, path: &Utf8Path) -> Result<Box<dyn Decompressor>, PipelineError> {
        let file: File = bulkmap_fs::open_input(path).map_err(|source| PipelineError::Open {
            path: path.to_owned(),
            source,
        })?;
        Ok(self.decompressor(file))
    }
}
