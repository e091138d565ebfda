use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::types::RawMessage;

/// Bounded handoff between the transport and the decoder. Producers never
/// block: when the queue is full the frame is dropped and counted. A missed
/// frame is harmless because the book is snapshot-replace — the next frame
/// supersedes it.
pub fn ingest_queue(capacity: usize) -> (IngestProducer, IngestConsumer) {
    let (tx, rx) = mpsc::channel(capacity);
    let dropped = Arc::new(AtomicU64::new(0));
    (
        IngestProducer {
            tx,
            dropped: dropped.clone(),
        },
        IngestConsumer { rx, dropped },
    )
}

#[derive(Clone)]
pub struct IngestProducer {
    tx: mpsc::Sender<RawMessage>,
    dropped: Arc<AtomicU64>,
}

impl IngestProducer {
    /// Non-blocking enqueue; false when the frame was dropped (queue full
    /// or consumer gone).
    pub fn enqueue(&self, message: RawMessage) -> bool {
        match self.tx.try_send(message) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) | Err(TrySendError::Closed(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Frames dropped so far.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Current queue depth, approximate under concurrency.
    pub fn size_approx(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }
}

pub struct IngestConsumer {
    rx: mpsc::Receiver<RawMessage>,
    dropped: Arc<AtomicU64>,
}

impl IngestConsumer {
    /// Non-blocking dequeue; `None` when the queue is empty.
    pub fn dequeue(&mut self) -> Option<RawMessage> {
        self.rx.try_recv().ok()
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(payload: &str) -> RawMessage {
        RawMessage::new(payload.to_string())
    }

    #[test]
    fn delivers_in_fifo_order() {
        let (producer, mut consumer) = ingest_queue(8);

        assert!(producer.enqueue(message("a")));
        assert!(producer.enqueue(message("b")));
        assert_eq!(producer.size_approx(), 2);

        assert_eq!(consumer.dequeue().unwrap().payload, "a");
        assert_eq!(consumer.dequeue().unwrap().payload, "b");
        assert!(consumer.dequeue().is_none());
        assert_eq!(producer.size_approx(), 0);
    }

    #[test]
    fn drops_newest_when_full_and_counts() {
        let (producer, mut consumer) = ingest_queue(2);

        assert!(producer.enqueue(message("a")));
        assert!(producer.enqueue(message("b")));
        assert!(!producer.enqueue(message("c")));
        assert!(!producer.enqueue(message("d")));
        assert_eq!(producer.dropped(), 2);
        assert_eq!(consumer.dropped(), 2);

        // The retained frames are the oldest two.
        assert_eq!(consumer.dequeue().unwrap().payload, "a");
        assert_eq!(consumer.dequeue().unwrap().payload, "b");
        assert!(consumer.dequeue().is_none());

        // Space freed: accepting again.
        assert!(producer.enqueue(message("e")));
        assert_eq!(producer.dropped(), 2);
    }

    #[test]
    fn multiple_producers_share_the_drop_counter() {
        let (producer, _consumer) = ingest_queue(1);
        let second = producer.clone();

        assert!(producer.enqueue(message("a")));
        assert!(!second.enqueue(message("b")));
        assert!(!producer.enqueue(message("c")));
        assert_eq!(second.dropped(), 2);
    }

    #[test]
    fn enqueue_fails_once_consumer_is_gone() {
        let (producer, consumer) = ingest_queue(4);
        drop(consumer);
        assert!(!producer.enqueue(message("a")));
        assert_eq!(producer.dropped(), 1);
    }
}
