use chrono::{Local, Timelike};
use tracing::warn;

use crate::book::{walk_levels, OrderBook};
use crate::models::stats::{self, LinearFit};

/// Fixed per-feature scaling applied before the quantile fit:
/// (volume, spread, volatility, time_of_day).
const FEATURE_WEIGHTS: [f64; 4] = [0.4, 0.3, 0.2, 0.1];

/// Quantiles fitted during training; prediction snaps to the nearest one.
const FITTED_QUANTILES: [f64; 5] = [0.10, 0.25, 0.50, 0.75, 0.90];

const GD_MAX_ITERATIONS: usize = 1000;
const GD_STEP: f64 = 0.01;
const GD_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SlippageMode {
    LinearRegression,
    QuantileRegression,
    #[default]
    OrderbookBased,
}

/// One observed execution used as quantile-regression training input.
/// `time_of_day` is local seconds-since-midnight / 86 400.
#[derive(Debug, Clone, Copy)]
pub struct SlippageSample {
    pub volume: f64,
    pub spread: f64,
    pub volatility: f64,
    pub time_of_day: f64,
}

impl SlippageSample {
    fn features(&self) -> [f64; 4] {
        [
            self.volume * FEATURE_WEIGHTS[0],
            self.spread * FEATURE_WEIGHTS[1],
            self.volatility * FEATURE_WEIGHTS[2],
            self.time_of_day * FEATURE_WEIGHTS[3],
        ]
    }
}

/// Expected slippage as a fraction of the reference price. The order-book
/// walk is the authoritative estimate; the learned modes exist for venues
/// or assets where historical executions are available.
#[derive(Debug)]
pub struct SlippageModel {
    mode: SlippageMode,
    linear: LinearFit,
    samples: Vec<SlippageSample>,
    targets: Vec<f64>,
    quantile_fits: Vec<(f64, [f64; 4])>,
    quantile: f64,
}

impl Default for SlippageModel {
    fn default() -> Self {
        Self::new(SlippageMode::default())
    }
}

impl SlippageModel {
    pub fn new(mode: SlippageMode) -> Self {
        Self {
            mode,
            linear: LinearFit::default(),
            samples: Vec::new(),
            targets: Vec::new(),
            quantile_fits: Vec::new(),
            quantile: 0.5,
        }
    }

    pub fn mode(&self) -> SlippageMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: SlippageMode) {
        self.mode = mode;
    }

    /// Requested prediction quantile, default 0.5.
    pub fn set_quantile(&mut self, quantile: f64) {
        if !(0.0..=1.0).contains(&quantile) {
            warn!(quantile, "invalid quantile, keeping previous value");
            return;
        }
        self.quantile = quantile;
    }

    pub fn set_training_data(&mut self, samples: Vec<SlippageSample>, slippages: Vec<f64>) {
        if samples.len() != slippages.len() {
            warn!(
                samples = samples.len(),
                targets = slippages.len(),
                "training sample and slippage lengths differ, ignoring"
            );
            return;
        }
        self.samples = samples;
        self.targets = slippages;
    }

    pub fn train(&mut self) -> bool {
        match self.mode {
            SlippageMode::OrderbookBased => true,
            SlippageMode::LinearRegression => {
                if self.samples.is_empty() {
                    warn!("cannot train slippage model with no data");
                    return false;
                }
                let quantities: Vec<f64> = self.samples.iter().map(|s| s.volume).collect();
                self.linear = stats::linear_regression(&quantities, &self.targets);
                true
            }
            SlippageMode::QuantileRegression => {
                if self.samples.is_empty() {
                    warn!("cannot train slippage model with no data");
                    return false;
                }
                self.quantile_fits = FITTED_QUANTILES
                    .iter()
                    .map(|&q| (q, self.fit_quantile(q)))
                    .collect();
                true
            }
        }
    }

    /// Authoritative order-book estimate, regardless of the trained mode.
    /// Non-negative for any book whose sides are sorted.
    pub fn calculate(&self, book: &OrderBook, quantity: f64, is_buy: bool) -> f64 {
        order_book_slippage(book, quantity, is_buy)
    }

    /// Mode-dispatching prediction. The learned modes need volatility for
    /// their feature vector; the book supplies volume context and spread.
    pub fn predict(&self, book: &OrderBook, quantity: f64, is_buy: bool, volatility: f64) -> f64 {
        match self.mode {
            SlippageMode::OrderbookBased => order_book_slippage(book, quantity, is_buy),
            SlippageMode::LinearRegression => self.predict_linear(quantity),
            SlippageMode::QuantileRegression => {
                let sample = SlippageSample {
                    volume: quantity,
                    spread: book.spread(),
                    volatility,
                    time_of_day: time_of_day_fraction(),
                };
                self.predict_quantile(&sample, self.quantile)
            }
        }
    }

    /// Slippage at `max_quantity * i / steps` for `i = 1..=steps`.
    pub fn slippage_profile(
        &self,
        book: &OrderBook,
        max_quantity: f64,
        is_buy: bool,
        steps: usize,
        volatility: f64,
    ) -> Vec<(f64, f64)> {
        if max_quantity <= 0.0 || steps == 0 {
            return Vec::new();
        }

        (1..=steps)
            .map(|i| {
                let quantity = max_quantity * i as f64 / steps as f64;
                (quantity, self.predict(book, quantity, is_buy, volatility))
            })
            .collect()
    }

    pub fn linear_fit(&self) -> LinearFit {
        self.linear
    }

    fn predict_linear(&self, quantity: f64) -> f64 {
        if self.linear.slope == 0.0 && self.linear.intercept == 0.0 {
            return 0.0;
        }
        self.linear.slope * quantity + self.linear.intercept
    }

    fn predict_quantile(&self, sample: &SlippageSample, quantile: f64) -> f64 {
        let Some((_, coefficients)) = self
            .quantile_fits
            .iter()
            .min_by(|a, b| {
                (a.0 - quantile)
                    .abs()
                    .partial_cmp(&(b.0 - quantile).abs())
                    .unwrap()
            })
        else {
            return self.predict_linear(sample.volume);
        };

        let x = sample.features();
        x.iter().zip(coefficients).map(|(xi, b)| xi * b).sum()
    }

    /// Subgradient descent on the pinball loss
    /// `L_q(r) = q*r if r >= 0 else (q-1)*r`, with `r = y - x.beta`.
    fn fit_quantile(&self, quantile: f64) -> [f64; 4] {
        let n = self.samples.len() as f64;
        let mut beta = [0.0f64; 4];

        for _ in 0..GD_MAX_ITERATIONS {
            let mut gradient = [0.0f64; 4];

            for (sample, &y) in self.samples.iter().zip(&self.targets) {
                let x = sample.features();
                let residual = y - x.iter().zip(&beta).map(|(xi, b)| xi * b).sum::<f64>();
                let factor = if residual >= 0.0 { -quantile } else { 1.0 - quantile };
                for (g, xi) in gradient.iter_mut().zip(&x) {
                    *g += factor * xi;
                }
            }

            let mut next = beta;
            let mut delta_sq = 0.0;
            for i in 0..4 {
                next[i] = beta[i] - GD_STEP * gradient[i] / n;
                delta_sq += (next[i] - beta[i]) * (next[i] - beta[i]);
            }
            beta = next;

            if delta_sq.sqrt() < GD_TOLERANCE {
                break;
            }
        }

        beta
    }
}

/// VWAP-versus-reference fraction for sweeping `quantity` through the
/// consumed side, extending the last price on exhaustion.
pub fn order_book_slippage(book: &OrderBook, quantity: f64, is_buy: bool) -> f64 {
    if quantity <= 0.0 {
        return 0.0;
    }

    let reference = if is_buy { book.best_ask() } else { book.best_bid() };
    if reference <= 0.0 {
        return 0.0;
    }

    let levels = if is_buy { book.asks() } else { book.bids() };
    let vwap = match walk_levels(&levels, quantity) {
        Some(v) => v,
        None => return 0.0,
    };

    let slippage = if is_buy {
        vwap - reference
    } else {
        reference - vwap
    };
    slippage / reference
}

fn time_of_day_fraction() -> f64 {
    let now = Local::now();
    now.num_seconds_from_midnight() as f64 / 86_400.0
}
