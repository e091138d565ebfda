use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use cost_engine::book::shared_order_book;
use cost_engine::config::Config;
use cost_engine::feed::bridge::Bridge;
use cost_engine::feed::queue::ingest_queue;
use cost_engine::feed::stream::FeedClient;
use cost_engine::simulator::Simulator;

/// Bridge poll cadence. The decoder drains one frame per tick; drops under
/// burst are absorbed by the snapshot-replace book semantics.
const BRIDGE_POLL_INTERVAL_MS: u64 = 100;

const STATS_INTERVAL_SECS: u64 = 10;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let config_path = match std::env::args().nth(1) {
        Some(path) => path,
        None => {
            eprintln!("usage: cost-engine <config.json>");
            std::process::exit(1);
        }
    };

    let config = match Config::load(&config_path) {
        Ok(config) => Arc::new(config),
        Err(e) => {
            eprintln!("failed to load configuration from {config_path}: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.logging.level.clone())),
        )
        .init();

    info!("🚀 starting cost-engine...");
    info!(endpoint = %config.websocket.endpoint, "📋 configuration loaded");

    let book = shared_order_book();
    let (producer, consumer) = ingest_queue(config.performance.buffer_size);
    let simulator = Arc::new(Simulator::new(config.clone()));

    // Transport task: socket → queue.
    let feed = FeedClient::new(&config.websocket, producer.clone());
    tokio::spawn(async move {
        feed.start().await;
    });

    // Decoder task: queue → book → simulator → sink.
    let bridge = Bridge::new(
        consumer,
        book.clone(),
        simulator.clone(),
        Duration::from_millis(BRIDGE_POLL_INTERVAL_MS),
    );

    if config.performance.measure_latency {
        simulator
            .register_result_callback(Box::new(|result| {
                debug!(
                    latency_us = result.internal_latency_us,
                    net_cost = result.net_cost,
                    "simulation tick"
                );
            }))
            .await;
    }

    tokio::spawn(async move {
        bridge.run().await;
    });

    // Fallback cadence for quiet feeds.
    simulator.start_continuous(book.clone()).await;

    // Periodic health line: queue depth, drops, book shape.
    {
        let book = book.clone();
        let producer = producer.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(STATS_INTERVAL_SECS));
            loop {
                ticker.tick().await;
                let guard = book.read().await;
                info!(
                    bid_levels = guard.levels_count(true),
                    ask_levels = guard.levels_count(false),
                    updates_per_sec = guard.update_frequency(),
                    queue_depth = producer.size_approx(),
                    dropped = producer.dropped(),
                    "📊 engine stats"
                );
            }
        });
    }

    info!("✅ cost-engine ready");

    tokio::signal::ctrl_c().await?;
    info!("🛑 shutdown signal received, stopping...");

    simulator.shutdown().await;
    info!("👋 cost-engine stopped gracefully");

    Ok(())
}
