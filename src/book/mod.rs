use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::types::PriceLevel;

/// Number of local update timestamps retained for frequency estimation.
const UPDATE_HISTORY_LEN: usize = 100;

/// Book shared between the bridge (writer) and the simulator plus any other
/// readers. Writes are exclusive, reads shared; a reader never observes a
/// partially applied snapshot.
pub type SharedOrderBook = Arc<RwLock<OrderBook>>;

pub fn shared_order_book() -> SharedOrderBook {
    Arc::new(RwLock::new(OrderBook::new()))
}

/// Snapshot-style L2 book. Every feed frame replaces both sides entirely,
/// so there is no level-delta bookkeeping: parse, filter, sort, swap.
#[derive(Debug)]
pub struct OrderBook {
    exchange: String,
    symbol: String,
    feed_timestamp: DateTime<Utc>,
    local_timestamp: DateTime<Utc>,
    // bids descending, asks ascending
    bids: Vec<PriceLevel>,
    asks: Vec<PriceLevel>,
    update_history: VecDeque<DateTime<Utc>>,
}

impl Default for OrderBook {
    fn default() -> Self {
        Self::new()
    }
}

impl OrderBook {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            exchange: String::new(),
            symbol: String::new(),
            feed_timestamp: now,
            local_timestamp: now,
            bids: Vec::new(),
            asks: Vec::new(),
            update_history: VecDeque::with_capacity(UPDATE_HISTORY_LEN),
        }
    }

    /// Replace both sides from decimal-string pairs. Levels that fail to
    /// parse or are non-positive are skipped; the rest still apply. The feed
    /// timestamp falls back to the local clock when it does not parse.
    pub fn update(
        &mut self,
        exchange: &str,
        symbol: &str,
        bids: &[(String, String)],
        asks: &[(String, String)],
        timestamp: &str,
    ) {
        self.exchange = exchange.to_string();
        self.symbol = symbol.to_string();

        self.feed_timestamp = DateTime::parse_from_rfc3339(timestamp)
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());

        self.local_timestamp = Utc::now();
        self.update_history.push_back(self.local_timestamp);
        while self.update_history.len() > UPDATE_HISTORY_LEN {
            self.update_history.pop_front();
        }

        self.bids = parse_levels(bids);
        self.bids.sort_by(|a, b| b.price.partial_cmp(&a.price).unwrap());

        self.asks = parse_levels(asks);
        self.asks.sort_by(|a, b| a.price.partial_cmp(&b.price).unwrap());
    }

    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn feed_timestamp(&self) -> DateTime<Utc> {
        self.feed_timestamp
    }

    pub fn local_timestamp(&self) -> DateTime<Utc> {
        self.local_timestamp
    }

    /// Owned copy of the bid side, best (highest) price first.
    pub fn bids(&self) -> Vec<PriceLevel> {
        self.bids.clone()
    }

    /// Owned copy of the ask side, best (lowest) price first.
    pub fn asks(&self) -> Vec<PriceLevel> {
        self.asks.clone()
    }

    pub fn best_bid(&self) -> f64 {
        self.bids.first().map(|l| l.price).unwrap_or(0.0)
    }

    pub fn best_ask(&self) -> f64 {
        self.asks.first().map(|l| l.price).unwrap_or(0.0)
    }

    /// Arithmetic mid; 0 when either side is empty.
    pub fn mid_price(&self) -> f64 {
        let bid = self.best_bid();
        let ask = self.best_ask();
        if bid <= 0.0 || ask <= 0.0 {
            return 0.0;
        }
        (bid + ask) / 2.0
    }

    /// Best ask minus best bid; 0 when either side is empty.
    pub fn spread(&self) -> f64 {
        let bid = self.best_bid();
        let ask = self.best_ask();
        if bid <= 0.0 || ask <= 0.0 {
            return 0.0;
        }
        ask - bid
    }

    /// Quantity resting at exactly `price`, or 0.
    pub fn depth_at(&self, price: f64, is_bid: bool) -> f64 {
        let side = if is_bid { &self.bids } else { &self.asks };
        side.iter()
            .find(|l| l.price == price)
            .map(|l| l.quantity)
            .unwrap_or(0.0)
    }

    pub fn total_bid_volume(&self) -> f64 {
        self.bids.iter().map(|l| l.quantity).sum()
    }

    pub fn total_ask_volume(&self) -> f64 {
        self.asks.iter().map(|l| l.quantity).sum()
    }

    /// bid_vol / (bid_vol + ask_vol); 0 when either side is empty.
    pub fn imbalance(&self) -> f64 {
        let bid_volume = self.total_bid_volume();
        let ask_volume = self.total_ask_volume();
        if bid_volume <= 0.0 || ask_volume <= 0.0 {
            return 0.0;
        }
        bid_volume / (bid_volume + ask_volume)
    }

    pub fn levels_count(&self, is_bid: bool) -> usize {
        if is_bid {
            self.bids.len()
        } else {
            self.asks.len()
        }
    }

    /// Side-signed VWAP-versus-reference cost of sweeping `quantity`, in
    /// price units. When the walked side runs out of depth, the residual is
    /// filled at the last observed price. 0 when that side is empty.
    pub fn estimate_market_impact(&self, quantity: f64, is_buy: bool) -> f64 {
        if quantity <= 0.0 {
            return 0.0;
        }

        let reference = if is_buy { self.best_ask() } else { self.best_bid() };
        if reference <= 0.0 {
            return 0.0;
        }

        let levels = if is_buy { &self.asks } else { &self.bids };
        let vwap = match walk_levels(levels, quantity) {
            Some(v) => v,
            None => return 0.0,
        };

        if is_buy {
            vwap - reference
        } else {
            reference - vwap
        }
    }

    /// Updates per second over the retained history; 0 below two samples or
    /// zero elapsed time.
    pub fn update_frequency(&self) -> f64 {
        if self.update_history.len() < 2 {
            return 0.0;
        }

        let first = self.update_history.front().unwrap();
        let last = self.update_history.back().unwrap();
        let duration_ms = (*last - *first).num_milliseconds();
        if duration_ms <= 0 {
            return 0.0;
        }

        (self.update_history.len() - 1) as f64 * 1000.0 / duration_ms as f64
    }
}

/// Average fill price for sweeping `quantity` through `levels` in walk
/// order, extending the last observed price over any unfilled residual.
/// `None` when there are no levels at all.
pub(crate) fn walk_levels(levels: &[PriceLevel], quantity: f64) -> Option<f64> {
    if levels.is_empty() || quantity <= 0.0 {
        return None;
    }

    let mut remaining = quantity;
    let mut total_cost = 0.0;

    for level in levels {
        let taken = remaining.min(level.quantity);
        total_cost += level.price * taken;
        remaining -= taken;
        if remaining <= 0.0 {
            break;
        }
    }

    if remaining > 0.0 {
        let last_price = levels.last().unwrap().price;
        total_cost += last_price * remaining;
    }

    Some(total_cost / quantity)
}

fn parse_levels(raw: &[(String, String)]) -> Vec<PriceLevel> {
    raw.iter()
        .filter_map(|(price, quantity)| {
            let price: f64 = price.parse().ok()?;
            let quantity: f64 = quantity.parse().ok()?;
            if price > 0.0 && quantity > 0.0 && price.is_finite() && quantity.is_finite() {
                Some(PriceLevel { price, quantity })
            } else {
                None
            }
        })
        .collect()
}
