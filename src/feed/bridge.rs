use std::sync::Arc;
use std::time::Duration;

use tokio::time::interval;
use tracing::{debug, warn};

use crate::book::SharedOrderBook;
use crate::feed::queue::IngestConsumer;
use crate::simulator::Simulator;
use crate::types::{BookFrame, EventSink};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Decodes queued frames into book updates and drives a simulation tick per
/// frame. For each frame the sequence is update → simulate → emit, on this
/// task, in that order. A frame that fails to decode is dropped and the
/// book stays untouched.
pub struct Bridge {
    consumer: IngestConsumer,
    book: SharedOrderBook,
    simulator: Arc<Simulator>,
    sink: Option<Arc<dyn EventSink>>,
    poll_interval: Duration,
}

impl Bridge {
    pub fn new(
        consumer: IngestConsumer,
        book: SharedOrderBook,
        simulator: Arc<Simulator>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            consumer,
            book,
            simulator,
            sink: None,
            poll_interval,
        }
    }

    /// Register the in-process consumer of book and simulation updates.
    pub fn set_sink(&mut self, sink: Arc<dyn EventSink>) {
        self.sink = Some(sink);
    }

    /// Poll loop; runs until the task is dropped at shutdown.
    pub async fn run(mut self) {
        let mut ticker = interval(self.poll_interval);
        loop {
            ticker.tick().await;
            self.poll_once().await;
        }
    }

    /// Dequeue and process at most one frame.
    pub async fn poll_once(&mut self) {
        let Some(message) = self.consumer.dequeue() else {
            return;
        };

        if let Err(e) = self.process(&message.payload).await {
            warn!(error = %e, "dropping malformed feed frame");
        }
    }

    async fn process(&mut self, payload: &str) -> Result<(), BoxError> {
        let frame: BookFrame = serde_json::from_str(payload)?;

        {
            let mut book = self.book.write().await;
            book.update(
                &frame.exchange,
                &frame.symbol,
                &frame.bids,
                &frame.asks,
                &frame.timestamp,
            );
        }

        let book = self.book.read().await;
        let result = self.simulator.simulate(&book).await;
        debug!(
            symbol = %frame.symbol,
            latency_us = result.internal_latency_us,
            "processed book frame"
        );

        if let Some(sink) = &self.sink {
            sink.on_order_book_updated(&book.bids(), &book.asks());
            sink.on_simulation_updated(&result);
        }

        Ok(())
    }
}
