//! Property tests for the bounded receive queue.

use proptest::prelude::*;
use ws_audio_relay::{AudioChunk, ReceiveQueue};

proptest! {
    /// The queue never holds more than its capacity, whatever is pushed.
    #[test]
    fn queue_length_is_bounded(
        capacity in 1usize..8,
        chunks in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..16), 0..40),
    ) {
        let queue = ReceiveQueue::new(capacity);
        for data in &chunks {
            queue.push(AudioChunk::new(data.clone()));
            prop_assert!(queue.len() <= capacity);
        }
    }

    /// Overflow evicts from the front: the survivors are always the most
    /// recently pushed chunks, in arrival order.
    #[test]
    fn overflow_keeps_the_newest_chunks(
        capacity in 1usize..8,
        chunks in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..16), 1..40),
    ) {
        let queue = ReceiveQueue::new(capacity);
        for data in &chunks {
            queue.push(AudioChunk::new(data.clone()));
        }

        let kept = chunks.len().min(capacity);
        let expected = &chunks[chunks.len() - kept..];
        for data in expected {
            let chunk = queue.pop_front().expect("queue shorter than expected");
            prop_assert_eq!(chunk.data.as_ref(), data.as_slice());
        }
        prop_assert!(queue.pop_front().is_none());
    }

    /// The drop counter accounts for exactly the evicted chunks.
    #[test]
    fn dropped_counter_matches_evictions(
        capacity in 1usize..8,
        chunks in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..16), 0..40),
    ) {
        let queue = ReceiveQueue::new(capacity);
        for data in &chunks {
            queue.push(AudioChunk::new(data.clone()));
        }
        let expected_drops = chunks.len().saturating_sub(capacity) as u64;
        prop_assert_eq!(queue.dropped(), expected_drops);
        prop_assert_eq!(queue.len(), chunks.len().min(capacity));
    }

    /// Flush empties the queue and reports how much it discarded; the queue
    /// remains usable afterwards.
    #[test]
    fn flush_reports_and_empties(
        capacity in 1usize..8,
        chunks in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..16), 0..40),
    ) {
        let queue = ReceiveQueue::new(capacity);
        for data in &chunks {
            queue.push(AudioChunk::new(data.clone()));
        }
        let flushed = queue.flush();
        prop_assert_eq!(flushed, chunks.len().min(capacity));
        prop_assert!(queue.is_empty());

        queue.push(AudioChunk::new(vec![1u8, 2, 3]));
        prop_assert_eq!(queue.len(), 1);
    }
}
