//! The bounded hand-off between the producer thread and its consumer.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Chunk queue plus the cancellation flag shared by both threads.
///
/// `ready` wakes a consumer waiting for a chunk. `drained` wakes a producer
/// paused above the watermark, and is signalled on every pop and on
/// cancellation.
#[derive(Debug, Default)]
pub(crate) struct ChunkQueue {
    chunks: Mutex<VecDeque<Vec<u8>>>,
    ready: Condvar,
    drained: Condvar,
    cancelled: AtomicBool,
}

impl ChunkQueue {
    // Neither side panics while holding the lock, and the deque stays
    // consistent even if one did.
    fn lock(&self) -> MutexGuard<'_, VecDeque<Vec<u8>>> {
        self.chunks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn push(&self, chunk: Vec<u8>) {
        self.lock().push_back(chunk);
        self.ready.notify_one();
    }

    /// Block until a chunk is available and remove it.
    pub(crate) fn pop(&self) -> Vec<u8> {
        let mut chunks = self
            .ready
            .wait_while(self.lock(), |queued| queued.is_empty())
            .unwrap_or_else(PoisonError::into_inner);
        let chunk = chunks.pop_front().unwrap_or_default();
        drop(chunks);
        self.drained.notify_one();
        chunk
    }

    /// Pause while more than `watermark` chunks are queued.
    ///
    /// Each wait lasts at most `poll_interval` before the length and the
    /// cancellation flag are checked again.
    pub(crate) fn wait_below(&self, watermark: usize, poll_interval: Duration) {
        let mut chunks = self.lock();
        while chunks.len() > watermark && !self.is_cancelled() {
            chunks = self
                .drained
                .wait_timeout(chunks, poll_interval)
                .map_or_else(|poisoned| poisoned.into_inner().0, |(guard, _)| guard);
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().len()
    }

    pub(crate) fn cancel(&self) {
        // Taking the lock orders the store before any producer re-check.
        let chunks = self.lock();
        self.cancelled.store(true, Ordering::Release);
        drop(chunks);
        self.drained.notify_all();
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::sync::Arc;
    use std::thread;
    use std::time::Instant;

    #[rstest]
    fn chunks_leave_in_arrival_order() {
        let queue = ChunkQueue::default();
        queue.push(b"a".to_vec());
        queue.push(b"b".to_vec());
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.pop(), b"a");
        assert_eq!(queue.pop(), b"b");
        assert_eq!(queue.len(), 0);
    }

    #[rstest]
    fn pop_waits_for_a_push() {
        let queue = Arc::new(ChunkQueue::default());
        let producer = Arc::clone(&queue);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            producer.push(b"late".to_vec());
        });
        assert_eq!(queue.pop(), b"late");
        handle.join().expect("producer thread");
    }

    #[rstest]
    fn wait_below_returns_immediately_under_the_watermark() {
        let queue = ChunkQueue::default();
        queue.push(Vec::from(*b"x"));
        let started = Instant::now();
        queue.wait_below(1, Duration::from_secs(5));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[rstest]
    fn cancellation_releases_a_paused_producer() {
        let queue = Arc::new(ChunkQueue::default());
        queue.push(b"1".to_vec());
        queue.push(b"2".to_vec());
        let paused = Arc::clone(&queue);
        let handle = thread::spawn(move || paused.wait_below(1, Duration::from_millis(5)));
        thread::sleep(Duration::from_millis(20));
        assert!(!handle.is_finished());
        queue.cancel();
        handle.join().expect("paused thread");
        assert!(queue.is_cancelled());
    }

    #[rstest]
    fn popping_releases_a_paused_producer() {
        let queue = Arc::new(ChunkQueue::default());
        queue.push(b"1".to_vec());
        queue.push(b"2".to_vec());
        let paused = Arc::clone(&queue);
        let handle = thread::spawn(move || paused.wait_below(1, Duration::from_millis(5)));
        assert_eq!(queue.pop(), b"1");
        handle.join().expect("paused thread");
        assert!(!queue.is_cancelled());
    }
}
