//! End-to-end scenarios over the queue → bridge → book → simulator path,
//! with hand-computed expectations.

use std::sync::Arc;
use std::time::Duration;

use cost_engine::models::almgren_chriss::AlmgrenChrissModel;
use cost_engine::models::maker_taker::MakerTakerModel;
use cost_engine::models::slippage::order_book_slippage;
use cost_engine::{
    ingest_queue, shared_order_book, Bridge, Config, OrderBook, QuantityUnit, RawMessage,
    Simulator,
};

fn test_config() -> Arc<Config> {
    let config: Config = serde_json::from_str(
        r#"{
            "websocket": {"endpoint": "wss://feed.test/l2"},
            "exchanges": [{
                "name": "OKX",
                "fee_tiers": [{"tier": "VIP0", "maker": 0.0008, "taker": 0.001}],
                "spot_assets": ["BTC-USDT"]
            }],
            "simulator": {
                "default_exchange": "OKX",
                "default_asset": "BTC-USDT",
                "default_order_type": "MARKET",
                "default_quantity_usd": 100.0,
                "default_volatility": 0.2,
                "default_fee_tier": "VIP0",
                "update_interval_ms": 1000
            }
        }"#,
    )
    .unwrap();
    Arc::new(config)
}

fn pairs(levels: &[(&str, &str)]) -> Vec<(String, String)> {
    levels
        .iter()
        .map(|(p, q)| (p.to_string(), q.to_string()))
        .collect()
}

fn book_with(bids: &[(&str, &str)], asks: &[(&str, &str)]) -> OrderBook {
    let mut book = OrderBook::new();
    book.update(
        "OKX",
        "BTC-USDT",
        &pairs(bids),
        &pairs(asks),
        "2024-05-01T12:00:00.000Z",
    );
    book
}

// S1: simulating against an empty book yields an all-zero result while the
// latency measurement still runs.
#[tokio::test]
async fn empty_book_simulation_is_zeroed() {
    let simulator = Simulator::new(test_config());
    let result = simulator.simulate(&OrderBook::new()).await;

    assert_eq!(result.expected_slippage, 0.0);
    assert_eq!(result.expected_market_impact, 0.0);
    assert_eq!(result.expected_fees, 0.0);
    assert_eq!(result.net_cost, 0.0);
    assert_eq!(result.maker_ratio, 0.0);
    assert!(result.internal_latency_us > 0.0);
}

// S2: a small buy on a symmetric book fills at the best ask.
#[tokio::test]
async fn small_buy_on_symmetric_book_has_no_slippage() {
    let simulator = Simulator::new(test_config());
    simulator.set_quantity_unit(QuantityUnit::Base).await;
    simulator.set_quantity(0.5).await;

    let book = book_with(&[("100", "1"), ("99", "2")], &[("101", "1"), ("102", "2")]);
    let result = simulator.simulate(&book).await;

    assert!(result.expected_slippage.abs() < 1e-9);
    assert!(result.expected_market_impact > 0.0);
    assert!((0.0..=1.0).contains(&result.maker_ratio));

    // Fee sits between the pure-maker and pure-taker rates on the notional.
    let notional = 0.5 * book.mid_price();
    assert!(result.expected_fees >= notional * 0.0008 - 1e-12);
    assert!(result.expected_fees <= notional * 0.001 + 1e-12);

    // Identity: net = price * qty * (slip + impact) + fees.
    let reconstructed = book.mid_price()
        * 0.5
        * (result.expected_slippage / 100.0 + result.expected_market_impact / 100.0)
        + result.expected_fees;
    assert!((result.net_cost - reconstructed).abs() < 1e-9);
}

// S3: a deep walk across three ask levels.
#[test]
fn deep_walk_vwap_slippage() {
    let book = book_with(
        &[("100", "1")],
        &[("101", "1"), ("102", "2"), ("103", "3")],
    );

    // VWAP over 4 = (101*1 + 102*2 + 103*1) / 4 = 102.0.
    let slippage = order_book_slippage(&book, 4.0, true);
    assert!((slippage - (102.0 - 101.0) / 101.0).abs() < 1e-12);
}

// S4: liquidity exhaustion extends the last price (zero slippage) while the
// impact model prices the oversized participation rate.
#[test]
fn exhausted_book_slippage_and_impact() {
    let book = book_with(&[("100.999", "1")], &[("101.001", "1")]);

    assert!(order_book_slippage(&book, 3.0, true).abs() < 1e-12);

    let model = AlmgrenChrissModel::new();
    let impact = model.calculate_market_impact(&book, 3.0, true);

    let reference = book.mid_price();
    let relative_spread = book.spread() / reference;
    let expected_temporary = 0.1 * (1.0 + 10.0 * relative_spread) * reference * 3.0f64.sqrt();
    let expected_permanent = 0.1 * 0.1 * reference * 3.0 / 2.0;
    assert!((impact - (expected_temporary + expected_permanent)).abs() < 1e-9);

    // Ballpark of the square-root law: eta * ref * sqrt(3) ~= 17.49.
    assert!((expected_temporary - 17.49).abs() < 0.1);
}

// S5: the optimal schedule decreases monotonically from Q to 0 on the
// requested time grid.
#[test]
fn almgren_chriss_schedule_shape() {
    let book = book_with(&[("100", "5")], &[("101", "5")]);
    let model = AlmgrenChrissModel::new();

    let schedule = model.optimal_execution(&book, 100.0, 4, 1.0);

    assert_eq!(schedule.quantities.len(), 5);
    assert_eq!(schedule.quantities[0], 100.0);
    assert!(schedule.quantities[4].abs() < 1e-9);
    assert!(schedule.quantities.windows(2).all(|w| w[0] >= w[1]));

    for (t, expected) in schedule.times.iter().zip([0.0, 0.25, 0.5, 0.75, 1.0]) {
        assert!((t - expected).abs() < 1e-12);
    }
    assert!(schedule.total_cost > 0.0);
}

// S6: the documented operating point of the untrained logistic model.
#[test]
fn maker_taker_default_operating_point() {
    // Ask chosen so that spread / mid = 0.01 exactly.
    let book = book_with(&[("100", "5")], &[("101.00502512562815", "5")]);
    let model = MakerTakerModel::new();

    // q_hat = 100 / 100 = 1, s_hat = 0.01, v_hat = 0.2 -> z = -0.54.
    let ratio = model.predict_maker_ratio(&book, 100.0, 0.2);
    let expected = 1.0 / (1.0 + 0.54f64.exp());
    assert!((ratio - expected).abs() < 1e-6);
    assert!((ratio - 0.368).abs() < 0.001);
}

// The full decode path: frames flow through the queue and bridge into the
// book, and each frame produces a published result.
#[tokio::test]
async fn frames_flow_from_queue_to_result() {
    let (producer, consumer) = ingest_queue(64);
    let book = shared_order_book();
    let simulator = Arc::new(Simulator::new(test_config()));
    let mut bridge = Bridge::new(
        consumer,
        book.clone(),
        simulator.clone(),
        Duration::from_millis(10),
    );

    let frame = r#"{
        "exchange": "OKX",
        "symbol": "BTC-USDT",
        "timestamp": "2024-05-01T12:00:00.125Z",
        "bids": [["100.0", "1.0"], ["99.0", "2.0"]],
        "asks": [["101.0", "1.0"], ["102.0", "2.0"]]
    }"#;

    assert!(producer.enqueue(RawMessage::new(frame.to_string())));
    bridge.poll_once().await;

    {
        let guard = book.read().await;
        assert_eq!(guard.best_bid(), 100.0);
        assert_eq!(guard.best_ask(), 101.0);
        assert_eq!(guard.mid_price(), 100.5);
        assert_eq!(guard.feed_timestamp().timestamp_subsec_millis(), 125);
    }

    let result = simulator.latest_result().await.expect("result published");
    assert!(result.internal_latency_us > 0.0);
    assert!((0.0..=1.0).contains(&result.maker_ratio));

    // A garbage frame afterwards leaves everything standing.
    assert!(producer.enqueue(RawMessage::new("{broken".to_string())));
    bridge.poll_once().await;
    assert_eq!(book.read().await.best_bid(), 100.0);
}
