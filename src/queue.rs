//! Bounded receive queue for inbound audio chunks.

use crate::audio::AudioChunk;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Notify;

/// Bounded FIFO of received audio chunks.
///
/// The network reader appends, the output pacer pops, and a barge-in flush
/// clears everything at once. When the queue is full the oldest chunk is
/// evicted so fresh audio wins over stale audio under sustained overload:
/// for a live stream, low latency beats completeness.
///
/// All operations take one short lock; a `Notify` wakes the pacer whenever
/// queue activity may have satisfied its initial-buffering threshold.
pub struct ReceiveQueue {
    inner: Mutex<VecDeque<AudioChunk>>,
    capacity: usize,
    dropped: AtomicU64,
    activity: Notify,
}

impl ReceiveQueue {
    /// Create a queue holding at most `capacity` chunks.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity,
            dropped: AtomicU64::new(0),
            activity: Notify::new(),
        }
    }

    /// Append a chunk, evicting the oldest entries if the queue is full.
    pub fn push(&self, chunk: AudioChunk) {
        {
            let mut queue = self.inner.lock();
            while queue.len() >= self.capacity {
                queue.pop_front();
                self.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(capacity = self.capacity, "Queue full, dropped old chunk");
            }
            queue.push_back(chunk);
            tracing::trace!(len = queue.len(), "Queued chunk");
        }
        self.activity.notify_waiters();
    }

    /// Remove and return the oldest chunk, if any.
    pub fn pop_front(&self) -> Option<AudioChunk> {
        self.inner.lock().pop_front()
    }

    /// Atomically remove all chunks, returning how many were discarded.
    pub fn flush(&self) -> usize {
        let flushed = {
            let mut queue = self.inner.lock();
            let len = queue.len();
            queue.clear();
            len
        };
        self.activity.notify_waiters();
        flushed
    }

    /// Current number of queued chunks.
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Total chunks evicted by the overflow policy since creation.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Wait until the queue sees activity (push or flush).
    ///
    /// Callers must re-check their condition after waking and bound the wait
    /// with a timeout; a notification can race with the check.
    pub async fn wait_activity(&self) {
        self.activity.notified().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(byte: u8) -> AudioChunk {
        AudioChunk::new(vec![byte; 4])
    }

    #[test]
    fn test_fifo_order() {
        let queue = ReceiveQueue::new(10);
        queue.push(chunk(1));
        queue.push(chunk(2));
        queue.push(chunk(3));
        assert_eq!(queue.pop_front().unwrap().data[0], 1);
        assert_eq!(queue.pop_front().unwrap().data[0], 2);
        assert_eq!(queue.pop_front().unwrap().data[0], 3);
        assert!(queue.pop_front().is_none());
    }

    #[test]
    fn test_overflow_drops_oldest() {
        // Capacity 3: push A,B,C,D -> queue holds B,C,D.
        let queue = ReceiveQueue::new(3);
        for byte in [b'A', b'B', b'C', b'D'] {
            queue.push(chunk(byte));
        }
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.dropped(), 1);
        assert_eq!(queue.pop_front().unwrap().data[0], b'B');
        assert_eq!(queue.pop_front().unwrap().data[0], b'C');
        assert_eq!(queue.pop_front().unwrap().data[0], b'D');
    }

    #[test]
    fn test_flush_clears_all() {
        let queue = ReceiveQueue::new(10);
        queue.push(chunk(1));
        queue.push(chunk(2));
        assert_eq!(queue.flush(), 2);
        assert!(queue.is_empty());
        assert_eq!(queue.flush(), 0);
    }

    #[test]
    fn test_capacity_one() {
        let queue = ReceiveQueue::new(1);
        queue.push(chunk(1));
        queue.push(chunk(2));
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.pop_front().unwrap().data[0], 2);
    }
}
