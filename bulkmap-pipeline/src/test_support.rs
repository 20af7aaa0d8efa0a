//! Deterministic decompressors for pipeline tests.

use std::collections::VecDeque;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::Decompressor;

/// One scripted response to [`Decompressor::read`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Return this chunk.
    Chunk(Vec<u8>),
    /// Fail with an I/O error carrying this message.
    Fail(String),
    /// Panic inside `read`.
    Panic,
}

/// Shared read and close counters observed from the test thread.
#[derive(Debug, Clone, Default)]
pub struct CallCounts {
    reads: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
}

impl CallCounts {
    /// Number of `read` calls so far.
    #[must_use]
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Number of `close` calls so far.
    #[must_use]
    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    fn record_read(&self) {
        self.reads.fetch_add(1, Ordering::SeqCst);
    }

    fn record_close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Plays back a fixed script, then reports end of input.
#[derive(Debug, Default)]
pub struct ScriptedDecompressor {
    script: VecDeque<Step>,
    counts: CallCounts,
    fail_close: bool,
}

impl ScriptedDecompressor {
    /// Play back `steps` in order.
    pub fn new(steps: impl IntoIterator<Item = Step>) -> Self {
        Self {
            script: steps.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Return each chunk in order, then end of input.
    pub fn chunks<I, C>(chunks: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<Vec<u8>>,
    {
        Self::new(chunks.into_iter().map(|chunk| Step::Chunk(chunk.into())))
    }

    /// Make `close` fail.
    #[must_use]
    pub const fn with_failing_close(mut self) -> Self {
        self.fail_close = true;
        self
    }

    /// Counters that stay observable after the decompressor moves threads.
    #[must_use]
    pub fn counts(&self) -> CallCounts {
        self.counts.clone()
    }
}

fn scripted_panic() -> ! {
    panic!("scripted decompressor panic");
}

impl Decompressor for ScriptedDecompressor {
    fn read(&mut self) -> io::Result<Vec<u8>> {
        self.counts.record_read();
        match self.script.pop_front() {
            Some(Step::Chunk(chunk)) => Ok(chunk),
            Some(Step::Fail(message)) => Err(io::Error::other(message)),
            Some(Step::Panic) => scripted_panic(),
            None => Ok(Vec::new()),
        }
    }

    fn close(&mut self) -> io::Result<()> {
        self.counts.record_close();
        if self.fail_close {
            Err(io::Error::other("scripted close failure"))
        } else {
            Ok(())
        }
    }
}

/// Returns the same chunk forever.
#[derive(Debug)]
pub struct EndlessDecompressor {
    chunk: Vec<u8>,
    counts: CallCounts,
}

impl EndlessDecompressor {
    /// Repeat `chunk` on every read. An empty chunk is replaced by one byte.
    pub fn new(chunk: impl Into<Vec<u8>>) -> Self {
        let mut repeated = chunk.into();
        if repeated.is_empty() {
            repeated.push(0);
        }
        Self {
            chunk: repeated,
            counts: CallCounts::default(),
        }
    }

    /// Counters that stay observable after the decompressor moves threads.
    #[must_use]
    pub fn counts(&self) -> CallCounts {
        self.counts.clone()
    }
}

impl Decompressor for EndlessDecompressor {
    fn read(&mut self) -> io::Result<Vec<u8>> {
        self.counts.record_read();
        Ok(self.chunk.clone())
    }

    fn close(&mut self) -> io::Result<()> {
        self.counts.record_close();
        Ok(())
    }
}
