use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::time::{interval, sleep};
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::config::WebSocketConfig;
use crate::feed::queue::IngestProducer;
use crate::types::RawMessage;

/// Reconnect backoff is exponential on top of the configured base interval,
/// capped here.
const MAX_BACKOFF_SECS: u64 = 60;

/// How many consecutive drops go by between queue-full warnings.
const DROP_LOG_EVERY: u64 = 1000;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The transport edge: one task that owns the socket, stamps every text
/// frame with its receipt time, and hands it to the ingestion queue. It
/// never blocks longer than a queue enqueue.
pub struct FeedClient {
    endpoint: String,
    reconnect_interval: Duration,
    ping_interval: Duration,
    producer: IngestProducer,
}

impl FeedClient {
    pub fn new(config: &WebSocketConfig, producer: IngestProducer) -> Self {
        Self {
            endpoint: config.endpoint.clone(),
            reconnect_interval: Duration::from_millis(config.reconnect_interval_ms),
            ping_interval: Duration::from_millis(config.ping_interval_ms),
            producer,
        }
    }

    /// Connect-and-listen forever, reconnecting with exponential backoff.
    pub async fn start(self) {
        let mut retry_count: u32 = 0;

        loop {
            let backoff_secs = if retry_count == 0 {
                0
            } else {
                let base = self.reconnect_interval.as_secs().max(1);
                (base * 2u64.saturating_pow(retry_count.saturating_sub(1))).min(MAX_BACKOFF_SECS)
            };

            if backoff_secs > 0 {
                info!(backoff_secs, attempt = retry_count + 1, "⏳ waiting before reconnect");
                sleep(Duration::from_secs(backoff_secs)).await;
            }

            match self.connect_and_listen().await {
                Ok(()) => {
                    info!("✅ feed connection closed gracefully");
                    retry_count = 0;
                }
                Err(e) => {
                    retry_count = retry_count.saturating_add(1);
                    error!(attempt = retry_count, error = %e, "❌ feed connection error");
                }
            }
        }
    }

    async fn connect_and_listen(&self) -> Result<(), BoxError> {
        info!(endpoint = %self.endpoint, "🔌 connecting to market data feed");

        let url = Url::parse(&self.endpoint)?;
        let (ws_stream, _) = connect_async(url).await?;
        info!("✅ feed connected");

        let (mut write, mut read) = ws_stream.split();
        let mut ping_ticker = interval(self.ping_interval);
        // The first tick fires immediately; skip it.
        ping_ticker.tick().await;

        loop {
            tokio::select! {
                _ = ping_ticker.tick() => {
                    write.send(Message::Ping(Vec::new())).await?;
                    debug!("sent keepalive ping");
                }
                frame = read.next() => {
                    match frame {
                        Some(Ok(Message::Text(payload))) => {
                            if !self.producer.enqueue(RawMessage::new(payload)) {
                                let dropped = self.producer.dropped();
                                if dropped % DROP_LOG_EVERY == 1 {
                                    warn!(dropped, "ingestion queue full, dropping frames");
                                }
                            }
                        }
                        Some(Ok(Message::Ping(payload))) => {
                            write.send(Message::Pong(payload)).await?;
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            return Ok(());
                        }
                        Some(Ok(_)) => {
                            // Binary, pong and other frames are not part of
                            // the feed contract.
                        }
                        Some(Err(e)) => {
                            return Err(Box::new(e));
                        }
                    }
                }
            }
        }
    }
}
