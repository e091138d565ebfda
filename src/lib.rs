//! cost-engine - Real-time transaction cost simulator for spot crypto
//! markets.
//!
//! Maintains an in-memory L2 order book from a live venue feed and, on each
//! tick, estimates the expected execution cost of a configured order,
//! decomposed into slippage, exchange fees, market impact and the
//! maker/taker split, together with the internal processing latency.
//!
//! ## Architecture
//!
//! - **Feed**: WebSocket transport → bounded ingestion queue → decoding
//!   bridge
//! - **Book**: price-sorted snapshot-replace L2 book behind a single
//!   read/write lock
//! - **Models**: order-book slippage walk, Almgren–Chriss impact, tiered
//!   fees, logistic maker/taker split
//! - **Simulator**: composes the models per tick and publishes results to
//!   an in-process sink

pub mod book;
pub mod config;
pub mod feed;
pub mod models;
pub mod simulator;
pub mod types;

pub use book::{shared_order_book, OrderBook, SharedOrderBook};
pub use config::Config;
pub use feed::bridge::Bridge;
pub use feed::queue::{ingest_queue, IngestConsumer, IngestProducer};
pub use feed::stream::FeedClient;
pub use simulator::Simulator;
pub use types::{
    BookFrame, EventSink, OrderType, PriceLevel, QuantityUnit, RawMessage, SimulationInputs,
    SimulationResult,
};
