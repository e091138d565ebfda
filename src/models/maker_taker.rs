use tracing::{info, warn};

use crate::book::OrderBook;
use crate::models::stats;

/// Untrained coefficients: (intercept, quantity, spread, volatility).
const DEFAULT_COEFFICIENTS: [f64; 4] = [0.0, -0.5, 2.0, -0.3];

/// Order size treated as "large" when normalizing the quantity feature.
const QUANTITY_SCALE: f64 = 100.0;

const GD_LEARNING_RATE: f64 = 0.01;
const GD_MAX_ITERATIONS: usize = 1000;
const GD_TOLERANCE: f64 = 1e-4;

/// Logistic model of the passive (maker) fraction of an order as a function
/// of its size, the spread, and volatility. The target is a continuous
/// ratio in [0, 1], so the fit minimizes squared error rather than
/// log-loss; the logistic output keeps predictions inside (0, 1).
#[derive(Debug, Clone)]
pub struct MakerTakerModel {
    coefficients: [f64; 4],
    quantities: Vec<f64>,
    spreads: Vec<f64>,
    volatilities: Vec<f64>,
    maker_ratios: Vec<f64>,
}

impl Default for MakerTakerModel {
    fn default() -> Self {
        Self {
            coefficients: DEFAULT_COEFFICIENTS,
            quantities: Vec::new(),
            spreads: Vec::new(),
            volatilities: Vec::new(),
            maker_ratios: Vec::new(),
        }
    }
}

impl MakerTakerModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn coefficients(&self) -> [f64; 4] {
        self.coefficients
    }

    pub fn set_training_data(
        &mut self,
        quantities: Vec<f64>,
        spreads: Vec<f64>,
        volatilities: Vec<f64>,
        maker_ratios: Vec<f64>,
    ) {
        let n = quantities.len();
        if spreads.len() != n || volatilities.len() != n || maker_ratios.len() != n {
            warn!("maker/taker training data dimensions don't match, ignoring");
            return;
        }

        self.quantities = quantities;
        self.spreads = spreads;
        self.volatilities = volatilities;
        self.maker_ratios = maker_ratios;
        info!(samples = n, "maker/taker training data set");
    }

    /// Gradient descent on mean squared error over max-normalized features.
    pub fn train(&mut self) -> bool {
        if self.quantities.is_empty() {
            warn!("cannot train maker/taker model with empty data");
            return false;
        }

        let (norm_q, norm_s, norm_v) = self.normalized_training_features();
        let n = norm_q.len() as f64;

        self.coefficients = [0.0; 4];
        let mut prev_cost = f64::MAX;

        for iteration in 0..GD_MAX_ITERATIONS {
            let mut gradients = [0.0f64; 4];

            for i in 0..norm_q.len() {
                let prediction = self.predict_normalized(norm_q[i], norm_s[i], norm_v[i]);
                let error = prediction - self.maker_ratios[i];

                gradients[0] += error;
                gradients[1] += error * norm_q[i];
                gradients[2] += error * norm_s[i];
                gradients[3] += error * norm_v[i];
            }

            for (c, g) in self.coefficients.iter_mut().zip(&gradients) {
                *c -= GD_LEARNING_RATE * g / n;
            }

            let cost = (0..norm_q.len())
                .map(|i| {
                    let error =
                        self.predict_normalized(norm_q[i], norm_s[i], norm_v[i]) - self.maker_ratios[i];
                    error * error
                })
                .sum::<f64>()
                / n;

            if (prev_cost - cost).abs() < GD_TOLERANCE {
                info!(iteration, "maker/taker model converged");
                break;
            }
            prev_cost = cost;
        }

        true
    }

    /// Expected maker fraction for executing `quantity` on `book` at the
    /// given annualized volatility. 0 for non-positive quantities.
    pub fn predict_maker_ratio(&self, book: &OrderBook, quantity: f64, volatility: f64) -> f64 {
        if quantity <= 0.0 {
            return 0.0;
        }

        let mid = book.mid_price();
        let norm_quantity = quantity / QUANTITY_SCALE;
        let norm_spread = if mid > 0.0 { book.spread() / mid } else { 0.0 };

        self.predict_normalized(norm_quantity, norm_spread, volatility)
    }

    /// Maker probability across quantities `max_quantity * i / steps` for
    /// `i = 0..=steps`.
    pub fn probability_curve(
        &self,
        book: &OrderBook,
        max_quantity: f64,
        volatility: f64,
        steps: usize,
    ) -> Vec<(f64, f64)> {
        if max_quantity <= 0.0 || steps == 0 {
            return Vec::new();
        }

        (0..=steps)
            .map(|i| {
                let quantity = max_quantity * i as f64 / steps as f64;
                (quantity, self.predict_maker_ratio(book, quantity, volatility))
            })
            .collect()
    }

    /// `1 - SSE/SST` over the training set; 0 without data or variance.
    pub fn accuracy(&self) -> f64 {
        if self.quantities.is_empty() {
            return 0.0;
        }

        let (norm_q, norm_s, norm_v) = self.normalized_training_features();
        let mean_ratio = stats::mean(&self.maker_ratios);

        let mut sse = 0.0;
        let mut sst = 0.0;
        for i in 0..norm_q.len() {
            let error = self.predict_normalized(norm_q[i], norm_s[i], norm_v[i]) - self.maker_ratios[i];
            sse += error * error;

            let deviation = self.maker_ratios[i] - mean_ratio;
            sst += deviation * deviation;
        }

        if sst == 0.0 {
            return 0.0;
        }
        1.0 - sse / sst
    }

    fn normalized_training_features(&self) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
        (
            max_normalize(&self.quantities),
            max_normalize(&self.spreads),
            max_normalize(&self.volatilities),
        )
    }

    fn predict_normalized(&self, quantity: f64, spread: f64, volatility: f64) -> f64 {
        let z = self.coefficients[0]
            + self.coefficients[1] * quantity
            + self.coefficients[2] * spread
            + self.coefficients[3] * volatility;
        logistic(z)
    }
}

fn logistic(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

/// Divide each value by the column maximum; a non-positive maximum leaves
/// the column as-is rather than exploding it.
fn max_normalize(values: &[f64]) -> Vec<f64> {
    let max = values.iter().cloned().fold(0.0f64, f64::max);
    if max <= 0.0 {
        return values.to_vec();
    }
    values.iter().map(|v| v / max).collect()
}
