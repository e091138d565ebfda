use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One aggregated depth level. Both fields are strictly positive once stored
/// in a book; a zero quantity on the wire means "delete this price".
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: f64,
    pub quantity: f64,
}

/// One raw feed frame as delivered by the transport. Consumed exactly once
/// by the bridge.
#[derive(Debug, Clone)]
pub struct RawMessage {
    pub payload: String,
    pub received_at: DateTime<Utc>,
}

impl RawMessage {
    pub fn new(payload: String) -> Self {
        Self {
            payload,
            received_at: Utc::now(),
        }
    }
}

/// Inbound L2 snapshot frame. Prices and quantities arrive as decimal
/// strings; the book parses and re-sorts them on ingest.
#[derive(Debug, Clone, Deserialize)]
pub struct BookFrame {
    pub exchange: String,
    pub symbol: String,
    pub timestamp: String,
    pub bids: Vec<(String, String)>,
    pub asks: Vec<(String, String)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderType {
    Market,
    Limit,
}

/// Unit of the configured order size: USD notional or base-asset units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum QuantityUnit {
    Usd,
    Base,
}

/// What the user asked the simulator to price. Quantity is signed: buy when
/// non-negative, sell when negative.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationInputs {
    pub exchange: String,
    pub asset: String,
    pub order_type: OrderType,
    pub quantity_unit: QuantityUnit,
    pub quantity: f64,
    pub volatility: f64,
    pub fee_tier: String,
}

/// One simulation tick's output. Slippage and impact are percentages of the
/// reference price; fees and net cost are in quote currency.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationResult {
    pub expected_slippage: f64,
    pub expected_fees: f64,
    pub expected_market_impact: f64,
    pub net_cost: f64,
    pub maker_ratio: f64,
    pub internal_latency_us: f64,
    pub timestamp: DateTime<Utc>,
}

impl SimulationResult {
    pub fn zeroed(timestamp: DateTime<Utc>) -> Self {
        Self {
            expected_slippage: 0.0,
            expected_fees: 0.0,
            expected_market_impact: 0.0,
            net_cost: 0.0,
            maker_ratio: 0.0,
            internal_latency_us: 0.0,
            timestamp,
        }
    }
}

/// In-process consumer of bridge output (the view layer in the full
/// application). At most one sink is registered; callbacks must not call
/// back into the simulator.
pub trait EventSink: Send + Sync {
    fn on_order_book_updated(&self, bids: &[PriceLevel], asks: &[PriceLevel]);
    fn on_simulation_updated(&self, result: &SimulationResult);
}
