use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::book::{OrderBook, SharedOrderBook};
use crate::config::Config;
use crate::models::almgren_chriss::AlmgrenChrissModel;
use crate::models::fees::FeeModel;
use crate::models::maker_taker::MakerTakerModel;
use crate::models::slippage::SlippageModel;
use crate::types::{OrderType, QuantityUnit, SimulationInputs, SimulationResult};

pub type ResultCallback = Box<dyn Fn(&SimulationResult) + Send + Sync>;

/// Composes the four cost models over the live book. One `simulate` call is
/// one tick: read the configured inputs, evaluate each model, publish the
/// result. The call is total — it always yields a result, zero-filled when
/// the book cannot support pricing.
pub struct Simulator {
    config: Arc<Config>,
    inputs: RwLock<SimulationInputs>,
    impact_model: RwLock<AlmgrenChrissModel>,
    slippage_model: RwLock<SlippageModel>,
    fee_model: FeeModel,
    maker_taker_model: RwLock<MakerTakerModel>,
    latest_result: Mutex<Option<SimulationResult>>,
    result_callback: Mutex<Option<ResultCallback>>,
    running: AtomicBool,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Simulator {
    pub fn new(config: Arc<Config>) -> Self {
        let defaults = &config.simulator;

        let order_type = if defaults.default_order_type.eq_ignore_ascii_case("limit") {
            OrderType::Limit
        } else {
            OrderType::Market
        };

        let inputs = SimulationInputs {
            exchange: defaults.default_exchange.clone(),
            asset: defaults.default_asset.clone(),
            order_type,
            quantity_unit: QuantityUnit::Usd,
            quantity: defaults.default_quantity_usd,
            volatility: defaults.default_volatility,
            fee_tier: defaults.default_fee_tier.clone(),
        };

        let mut impact_model = AlmgrenChrissModel::new();
        impact_model.set_volatility(inputs.volatility);

        info!(
            exchange = %inputs.exchange,
            asset = %inputs.asset,
            "simulator initialized"
        );

        Self {
            fee_model: FeeModel::new(config.clone()),
            config,
            inputs: RwLock::new(inputs),
            impact_model: RwLock::new(impact_model),
            slippage_model: RwLock::new(SlippageModel::default()),
            maker_taker_model: RwLock::new(MakerTakerModel::new()),
            latest_result: Mutex::new(None),
            result_callback: Mutex::new(None),
            running: AtomicBool::new(false),
            worker: Mutex::new(None),
        }
    }

    pub async fn inputs(&self) -> SimulationInputs {
        self.inputs.read().await.clone()
    }

    pub async fn set_exchange(&self, exchange: &str) {
        self.inputs.write().await.exchange = exchange.to_string();
    }

    pub async fn set_asset(&self, asset: &str) {
        self.inputs.write().await.asset = asset.to_string();
    }

    pub async fn set_order_type(&self, order_type: OrderType) {
        self.inputs.write().await.order_type = order_type;
    }

    pub async fn set_quantity_unit(&self, unit: QuantityUnit) {
        self.inputs.write().await.quantity_unit = unit;
    }

    /// Signed size: buy when non-negative. Zero and non-finite values keep
    /// the previous setting.
    pub async fn set_quantity(&self, quantity: f64) {
        if quantity == 0.0 || !quantity.is_finite() {
            warn!(quantity, "invalid quantity, keeping previous value");
            return;
        }
        self.inputs.write().await.quantity = quantity;
    }

    pub async fn set_volatility(&self, volatility: f64) {
        if volatility <= 0.0 || !volatility.is_finite() {
            warn!(volatility, "invalid volatility, keeping previous value");
            return;
        }
        self.inputs.write().await.volatility = volatility;
        self.impact_model.write().await.set_volatility(volatility);
    }

    pub async fn set_fee_tier(&self, fee_tier: &str) {
        self.inputs.write().await.fee_tier = fee_tier.to_string();
    }

    /// One simulation tick against the caller-locked book.
    pub async fn simulate(&self, book: &OrderBook) -> SimulationResult {
        let start = Instant::now();
        let inputs = self.inputs.read().await.clone();

        let mut result = SimulationResult::zeroed(book.local_timestamp());

        let price = book.mid_price();
        if price <= 0.0 {
            result.internal_latency_us = elapsed_us(start);
            self.publish(&result).await;
            return result;
        }

        let is_buy = inputs.quantity >= 0.0;
        let abs_quantity = inputs.quantity.abs();
        let asset_quantity = match inputs.quantity_unit {
            QuantityUnit::Usd => abs_quantity / price,
            QuantityUnit::Base => abs_quantity,
        };

        let maker_ratio = self
            .maker_taker_model
            .read()
            .await
            .predict_maker_ratio(book, asset_quantity, inputs.volatility);

        let slippage_pct = self
            .slippage_model
            .read()
            .await
            .calculate(book, asset_quantity, is_buy);

        let impact_pct = self
            .impact_model
            .read()
            .await
            .calculate_market_impact(book, asset_quantity, is_buy)
            / price;

        let fees = self.fee_model.calculate(
            &inputs.exchange,
            &inputs.fee_tier,
            asset_quantity,
            price,
            maker_ratio,
        );

        let net_cost = price * asset_quantity * (slippage_pct + impact_pct) + fees;

        result.expected_slippage = slippage_pct * 100.0;
        result.expected_market_impact = impact_pct * 100.0;
        result.expected_fees = fees;
        result.net_cost = net_cost;
        result.maker_ratio = maker_ratio;
        result.timestamp = book.local_timestamp();
        result.internal_latency_us = elapsed_us(start);

        self.publish(&result).await;
        result
    }

    /// Launch the background worker that re-simulates on a fixed cadence.
    /// A second call while running is a no-op.
    pub async fn start_continuous(self: &Arc<Self>, book: SharedOrderBook) {
        if self.running.swap(true, Ordering::SeqCst) {
            info!("continuous simulation already running");
            return;
        }

        let interval = Duration::from_millis(self.config.simulator.update_interval_ms);
        let simulator = self.clone();

        let handle = tokio::spawn(async move {
            info!("continuous simulation started");
            while simulator.running.load(Ordering::SeqCst) {
                {
                    let guard = book.read().await;
                    simulator.simulate(&guard).await;
                }
                tokio::time::sleep(interval).await;
            }
            info!("continuous simulation stopped");
        });

        *self.worker.lock().await = Some(handle);
    }

    /// Cooperative stop: the worker observes the flag at its next loop top.
    pub fn stop_continuous(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Stop and wait for the worker to wind down.
    pub async fn shutdown(&self) {
        self.stop_continuous();
        if let Some(handle) = self.worker.lock().await.take() {
            let _ = handle.await;
        }
    }

    pub async fn latest_result(&self) -> Option<SimulationResult> {
        self.latest_result.lock().await.clone()
    }

    /// At most one subscriber; a later registration replaces the earlier
    /// one. The callback runs under the callback lock and must not call
    /// back into the simulator.
    pub async fn register_result_callback(&self, callback: ResultCallback) {
        *self.result_callback.lock().await = Some(callback);
    }

    pub async fn unregister_result_callback(&self) {
        *self.result_callback.lock().await = None;
    }

    pub async fn train_slippage(&self) -> bool {
        self.slippage_model.write().await.train()
    }

    pub async fn train_maker_taker(&self) -> bool {
        self.maker_taker_model.write().await.train()
    }

    async fn publish(&self, result: &SimulationResult) {
        {
            let mut latest = self.latest_result.lock().await;
            *latest = Some(result.clone());
        }
        let callback = self.result_callback.lock().await;
        if let Some(callback) = callback.as_ref() {
            callback(result);
        }
    }
}

fn elapsed_us(start: Instant) -> f64 {
    start.elapsed().as_nanos() as f64 / 1000.0
}
