//! A background thread that pulls chunks from a decompressor.
//!
//! The producer reads chunks into a shared queue and pauses while the queue
//! holds more than the configured watermark. End of input, a read failure,
//! cancellation, and a panicking decompressor all finish with exactly one
//! empty sentinel chunk on the queue, so a consumer blocked on the queue is
//! always released. The producer's outcome is delivered by
//! [`ReadPipeline::join`].

use std::fmt;
use std::io::{self, Cursor, Read};
use std::iter::FusedIterator;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use camino::Utf8Path;
use log::{debug, warn};

use crate::queue::ChunkQueue;
use crate::{Compression, Decompressor, PipelineError, PipelineOptions};

/// Pushes the sentinel chunk once, on request or on drop.
struct SentinelGuard<'a> {
    queue: &'a ChunkQueue,
    pushed: bool,
}

impl<'a> SentinelGuard<'a> {
    const fn new(queue: &'a ChunkQueue) -> Self {
        Self {
            queue,
            pushed: false,
        }
    }

    fn push(&mut self) {
        if !self.pushed {
            self.pushed = true;
            self.queue.push(Vec::new());
        }
    }
}

impl Drop for SentinelGuard<'_> {
    fn drop(&mut self) {
        self.push();
    }
}

/// Body of the producer thread.
fn produce<D: Decompressor>(
    mut decompressor: D,
    queue: &ChunkQueue,
    options: &PipelineOptions,
) -> Result<(), PipelineError> {
    let mut sentinel = SentinelGuard::new(queue);
    let mut produced: u64 = 0;
    while !queue.is_cancelled() {
        let chunk = match decompressor.read() {
            Ok(chunk) => chunk,
            Err(source) => {
                sentinel.push();
                if let Err(close_err) = decompressor.close() {
                    warn!("discarding decompressor close failure after read failure: {close_err}");
                }
                return Err(PipelineError::Read { source });
            }
        };
        if chunk.is_empty() {
            sentinel.push();
            debug!("end of input after {produced} chunks");
            break;
        }
        queue.push(chunk);
        produced = produced.saturating_add(1);
        queue.wait_below(options.watermark, options.poll_interval);
    }
    if queue.is_cancelled() {
        debug!("input cancelled after {produced} chunks");
    }
    sentinel.push();
    decompressor
        .close()
        .map_err(|source| PipelineError::Close { source })
}

/// Cancels a [`ReadPipeline`] from another thread.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    queue: Arc<ChunkQueue>,
}

impl CancelHandle {
    /// Ask the producer to stop. It finishes within one poll interval, or
    /// after the read in progress returns.
    pub fn cancel(&self) {
        self.queue.cancel();
    }

    /// Whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.queue.is_cancelled()
    }
}

/// Reads a decompressor on a background thread.
///
/// Chunks arrive in the order the decompressor produced them. After the
/// sentinel, [`next_chunk`](Self::next_chunk) returns `None` without touching
/// the queue again. Dropping the pipeline cancels and joins the producer,
/// logging any failure; call [`join`](Self::join) to receive it instead.
///
/// # Examples
///
/// ```
/// use std::io::Cursor;
/// use bulkmap_pipeline::{PipelineOptions, PlainDecompressor, ReadPipeline};
///
/// # fn main() -> Result<(), bulkmap_pipeline::PipelineError> {
/// let input = PlainDecompressor::with_buffer_size(Cursor::new(b"way 42".to_vec()), 4);
/// let mut pipeline = ReadPipeline::start(input, PipelineOptions::default())?;
/// let mut data = Vec::new();
/// while let Some(chunk) = pipeline.next_chunk() {
///     data.extend(chunk);
/// }
/// pipeline.join()?;
/// assert_eq!(data, b"way 42");
/// # Ok(())
/// # }
/// ```
pub struct ReadPipeline {
    queue: Arc<ChunkQueue>,
    worker: Option<JoinHandle<Result<(), PipelineError>>>,
    finished: bool,
}

impl ReadPipeline {
    /// Spawn the producer thread over `decompressor`.
    pub fn start<D>(decompressor: D, options: PipelineOptions) -> Result<Self, PipelineError>
    where
        D: Decompressor + 'static,
    {
        let queue = Arc::new(ChunkQueue::default());
        let shared = Arc::clone(&queue);
        let name = options.thread_name.clone();
        let worker = thread::Builder::new()
            .name(name.clone())
            .spawn(move || produce(decompressor, &shared, &options))
            .map_err(|source| PipelineError::Spawn { source })?;
        debug!("started input thread {name}");
        Ok(Self {
            queue,
            worker: Some(worker),
            finished: false,
        })
    }

    /// Open `path`, choose a decompressor from its extension, and start.
    pub fn open(path: &Utf8Path, options: PipelineOptions) -> Result<Self, PipelineError> {
        let decompressor = Compression::from_path(path).open(path)?;
        Self::start(decompressor, options)
    }

    /// Block for the next chunk; `None` once the sentinel has been seen.
    pub fn next_chunk(&mut self) -> Option<Vec<u8>> {
        if self.finished {
            return None;
        }
        let chunk = self.queue.pop();
        if chunk.is_empty() {
            self.finished = true;
            debug!("consumer reached end of input");
            return None;
        }
        Some(chunk)
    }

    /// Ask the producer to stop.
    pub fn cancel(&self) {
        self.queue.cancel();
    }

    /// A handle that can cancel this pipeline from elsewhere.
    #[must_use]
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            queue: Arc::clone(&self.queue),
        }
    }

    /// Whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.queue.is_cancelled()
    }

    /// Number of chunks waiting in the queue, sentinel included.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Whether the consumer has seen the sentinel.
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        self.finished
    }

    /// Stop the producer, wait for it, and return its outcome.
    ///
    /// Cancelling after end of input has no effect, so this is also the way
    /// to collect the result of a fully consumed pipeline.
    pub fn join(mut self) -> Result<(), PipelineError> {
        self.finish()
    }

    fn finish(&mut self) -> Result<(), PipelineError> {
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };
        self.queue.cancel();
        let outcome = worker.join().map_err(|_| PipelineError::Panicked)?;
        debug!("input thread stopped");
        outcome
    }

    /// Adapt the pipeline into a byte stream.
    #[must_use]
    pub const fn into_reader(self) -> ChunkReader {
        ChunkReader::new(self)
    }
}

impl Iterator for ReadPipeline {
    type Item = Vec<u8>;

    fn next(&mut self) -> Option<Vec<u8>> {
        self.next_chunk()
    }
}

impl FusedIterator for ReadPipeline {}

impl Drop for ReadPipeline {
    fn drop(&mut self) {
        if let Err(err) = self.finish() {
            warn!("discarding input thread failure: {err}");
        }
    }
}

impl fmt::Debug for ReadPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadPipeline")
            .field("pending", &self.pending())
            .field("cancelled", &self.is_cancelled())
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

/// [`Read`] over the concatenated chunks of a [`ReadPipeline`].
///
/// At the end of the stream the producer is joined. A clean end of input
/// reads as `Ok(0)`, and a producer failure is returned as an I/O error from
/// that read, once. [`finish`](Self::finish) reports the typed outcome when
/// no read has delivered it yet.
#[derive(Debug)]
pub struct ChunkReader {
    pipeline: ReadPipeline,
    current: Cursor<Vec<u8>>,
}

impl ChunkReader {
    /// Wrap `pipeline`.
    #[must_use]
    pub const fn new(pipeline: ReadPipeline) -> Self {
        Self {
            pipeline,
            current: Cursor::new(Vec::new()),
        }
    }

    /// Join the producer and return its outcome.
    ///
    /// Returns `Ok(())` when a read has already reported the failure.
    pub fn finish(self) -> Result<(), PipelineError> {
        self.pipeline.join()
    }
}

impl Read for ChunkReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            let copied = self.current.read(buf)?;
            if copied > 0 {
                return Ok(copied);
            }
            match self.pipeline.next_chunk() {
                Some(chunk) => self.current = Cursor::new(chunk),
                None => {
                    return self
                        .pipeline
                        .finish()
                        .map(|()| 0)
                        .map_err(PipelineError::into_io_error);
                }
            }
        }
    }
}
