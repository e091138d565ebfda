use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::models::stats;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

const GD_LEARNING_RATE: f64 = 0.01;
const GD_MAX_ITERATIONS: usize = 1000;
const GD_TOLERANCE: f64 = 1e-4;

/// Fitting strategy. Each variant shares the coefficient vector and the
/// common `predict(x)` surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RegressionKind {
    #[default]
    Linear,
    Polynomial,
    Exponential,
    Logistic,
    Quantile,
}

impl RegressionKind {
    fn to_code(self) -> i32 {
        match self {
            RegressionKind::Linear => 0,
            RegressionKind::Polynomial => 1,
            RegressionKind::Exponential => 2,
            RegressionKind::Logistic => 3,
            RegressionKind::Quantile => 4,
        }
    }

    fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(RegressionKind::Linear),
            1 => Some(RegressionKind::Polynomial),
            2 => Some(RegressionKind::Exponential),
            3 => Some(RegressionKind::Logistic),
            4 => Some(RegressionKind::Quantile),
            _ => None,
        }
    }
}

/// On-disk form. Round-trips preserve coefficients to double precision.
#[derive(Debug, Serialize, Deserialize)]
struct PersistedModel {
    model_type: i32,
    polynomial_degree: usize,
    quantile: f64,
    coefficients: Vec<f64>,
}

/// Single-feature regression over `(x, y)` observations.
#[derive(Debug, Clone)]
pub struct RegressionModel {
    kind: RegressionKind,
    polynomial_degree: usize,
    quantile: f64,
    coefficients: Vec<f64>,
    x_data: Vec<f64>,
    y_data: Vec<f64>,
}

impl Default for RegressionModel {
    fn default() -> Self {
        Self::new(RegressionKind::Linear)
    }
}

impl RegressionModel {
    pub fn new(kind: RegressionKind) -> Self {
        Self {
            kind,
            polynomial_degree: 2,
            quantile: 0.5,
            coefficients: Vec::new(),
            x_data: Vec::new(),
            y_data: Vec::new(),
        }
    }

    pub fn kind(&self) -> RegressionKind {
        self.kind
    }

    pub fn set_kind(&mut self, kind: RegressionKind) {
        self.kind = kind;
    }

    pub fn set_polynomial_degree(&mut self, degree: usize) {
        if degree < 1 {
            warn!(degree, "invalid polynomial degree, keeping previous value");
            return;
        }
        self.polynomial_degree = degree;
    }

    pub fn set_quantile(&mut self, quantile: f64) {
        if !(0.0..=1.0).contains(&quantile) {
            warn!(quantile, "invalid quantile, keeping previous value");
            return;
        }
        self.quantile = quantile;
    }

    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    pub fn add_training_point(&mut self, x: f64, y: f64) {
        self.x_data.push(x);
        self.y_data.push(y);
    }

    pub fn set_training_data(&mut self, x: Vec<f64>, y: Vec<f64>) {
        if x.len() != y.len() {
            error!("x and y data must have the same size");
            return;
        }
        self.x_data = x;
        self.y_data = y;
    }

    pub fn clear_training_data(&mut self) {
        self.x_data.clear();
        self.y_data.clear();
    }

    pub fn train(&mut self) -> bool {
        if self.x_data.is_empty() {
            warn!("cannot train regression model with empty data");
            return false;
        }

        match self.kind {
            RegressionKind::Linear => self.train_linear(),
            RegressionKind::Polynomial => self.train_polynomial(),
            RegressionKind::Exponential => self.train_exponential(),
            RegressionKind::Logistic => self.train_logistic(),
            RegressionKind::Quantile => self.train_quantile(),
        }
    }

    pub fn predict(&self, x: f64) -> f64 {
        match self.kind {
            RegressionKind::Linear | RegressionKind::Quantile => self.predict_linear(x),
            RegressionKind::Polynomial => self.predict_polynomial(x),
            RegressionKind::Exponential => self.predict_exponential(x),
            RegressionKind::Logistic => self.predict_logistic(x),
        }
    }

    pub fn predict_batch(&self, xs: &[f64]) -> Vec<f64> {
        xs.iter().map(|&x| self.predict(x)).collect()
    }

    pub fn r_squared(&self) -> f64 {
        if self.x_data.is_empty() || self.coefficients.is_empty() {
            return 0.0;
        }

        let mean_y = stats::mean(&self.y_data);
        let mut residual = 0.0;
        let mut total = 0.0;
        for (x, y) in self.x_data.iter().zip(&self.y_data) {
            let predicted = self.predict(*x);
            residual += (y - predicted) * (y - predicted);
            total += (y - mean_y) * (y - mean_y);
        }

        if total == 0.0 {
            return 0.0;
        }
        1.0 - residual / total
    }

    pub fn mse(&self) -> f64 {
        if self.x_data.is_empty() || self.coefficients.is_empty() {
            return 0.0;
        }

        self.x_data
            .iter()
            .zip(&self.y_data)
            .map(|(x, y)| {
                let e = y - self.predict(*x);
                e * e
            })
            .sum::<f64>()
            / self.x_data.len() as f64
    }

    pub fn mae(&self) -> f64 {
        if self.x_data.is_empty() || self.coefficients.is_empty() {
            return 0.0;
        }

        self.x_data
            .iter()
            .zip(&self.y_data)
            .map(|(x, y)| (y - self.predict(*x)).abs())
            .sum::<f64>()
            / self.x_data.len() as f64
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), BoxError> {
        let persisted = PersistedModel {
            model_type: self.kind.to_code(),
            polynomial_degree: self.polynomial_degree,
            quantile: self.quantile,
            coefficients: self.coefficients.clone(),
        };
        std::fs::write(path.as_ref(), serde_json::to_string_pretty(&persisted)?)?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, BoxError> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let persisted: PersistedModel = serde_json::from_str(&raw)?;

        let kind = RegressionKind::from_code(persisted.model_type)
            .ok_or_else(|| format!("unknown model type {}", persisted.model_type))?;

        let mut model = RegressionModel::new(kind);
        model.polynomial_degree = persisted.polynomial_degree.max(1);
        model.quantile = persisted.quantile.clamp(0.0, 1.0);
        model.coefficients = persisted.coefficients;
        Ok(model)
    }

    fn train_linear(&mut self) -> bool {
        let fit = stats::linear_regression(&self.x_data, &self.y_data);
        self.coefficients = vec![fit.intercept, fit.slope];
        true
    }

    /// Normal equations solved by Gaussian elimination with partial
    /// pivoting. Adequate for the small degrees used here.
    fn train_polynomial(&mut self) -> bool {
        let n = self.x_data.len();
        let degree = self.polynomial_degree;
        let cols = degree + 1;

        let mut xtx = vec![vec![0.0f64; cols]; cols];
        let mut xty = vec![0.0f64; cols];
        for k in 0..n {
            let mut powers = Vec::with_capacity(cols);
            let mut p = 1.0;
            for _ in 0..cols {
                powers.push(p);
                p *= self.x_data[k];
            }
            for i in 0..cols {
                xty[i] += powers[i] * self.y_data[k];
                for j in 0..cols {
                    xtx[i][j] += powers[i] * powers[j];
                }
            }
        }

        let mut augmented = vec![vec![0.0f64; cols + 1]; cols];
        for i in 0..cols {
            augmented[i][..cols].copy_from_slice(&xtx[i]);
            augmented[i][cols] = xty[i];
        }

        for i in 0..cols {
            let mut max_row = i;
            let mut max_val = augmented[i][i].abs();
            for k in (i + 1)..cols {
                if augmented[k][i].abs() > max_val {
                    max_val = augmented[k][i].abs();
                    max_row = k;
                }
            }
            if max_val == 0.0 {
                error!("singular system in polynomial regression");
                return false;
            }
            augmented.swap(i, max_row);

            for k in (i + 1)..cols {
                let factor = augmented[k][i] / augmented[i][i];
                for j in i..=cols {
                    augmented[k][j] -= factor * augmented[i][j];
                }
            }
        }

        let mut coefficients = vec![0.0f64; cols];
        for i in (0..cols).rev() {
            let mut sum = 0.0;
            for j in (i + 1)..cols {
                sum += augmented[i][j] * coefficients[j];
            }
            coefficients[i] = (augmented[i][cols] - sum) / augmented[i][i];
        }

        self.coefficients = coefficients;
        true
    }

    /// `y = a * e^(bx)` via linear regression on `ln(y)`.
    fn train_exponential(&mut self) -> bool {
        if self.y_data.iter().any(|&y| y <= 0.0) {
            error!("exponential regression requires positive y values");
            return false;
        }

        let ln_y: Vec<f64> = self.y_data.iter().map(|y| y.ln()).collect();
        let fit = stats::linear_regression(&self.x_data, &ln_y);
        self.coefficients = vec![fit.intercept.exp(), fit.slope];
        true
    }

    /// `y = a / (1 + e^(-b(x - c)))` by gradient descent on squared error.
    fn train_logistic(&mut self) -> bool {
        let max_y = self.y_data.iter().cloned().fold(f64::MIN, f64::max);
        let min_y = self.y_data.iter().cloned().fold(f64::MAX, f64::min);
        let mean_x = stats::mean(&self.x_data);

        self.coefficients = vec![max_y - min_y, 1.0, mean_x];
        let n = self.x_data.len() as f64;
        let mut prev_cost = f64::MAX;

        for _ in 0..GD_MAX_ITERATIONS {
            let mut grad_a = 0.0;
            let mut grad_b = 0.0;
            let mut grad_c = 0.0;

            let a = self.coefficients[0];
            let b = self.coefficients[1];
            let c = self.coefficients[2];

            for (x, y) in self.x_data.iter().zip(&self.y_data) {
                let exp_term = (-b * (x - c)).exp();
                let denom = 1.0 + exp_term;
                let prediction = a / denom;
                let error = prediction - y;

                grad_a += error / denom;
                grad_b += error * a * exp_term * (x - c) / (denom * denom);
                grad_c += -error * a * exp_term * b / (denom * denom);
            }

            self.coefficients[0] -= GD_LEARNING_RATE * grad_a / n;
            self.coefficients[1] -= GD_LEARNING_RATE * grad_b / n;
            self.coefficients[2] -= GD_LEARNING_RATE * grad_c / n;

            let cost = self
                .x_data
                .iter()
                .zip(&self.y_data)
                .map(|(x, y)| {
                    let e = y - self.predict_logistic(*x);
                    e * e
                })
                .sum::<f64>()
                / n;

            if (prev_cost - cost).abs() < GD_TOLERANCE {
                break;
            }
            prev_cost = cost;
        }

        true
    }

    /// Binned quantile curve fitted with a straight line: sort by x, take
    /// the per-bin percentile of y, regress the bin representatives.
    fn train_quantile(&mut self) -> bool {
        let mut data: Vec<(f64, f64)> = self
            .x_data
            .iter()
            .cloned()
            .zip(self.y_data.iter().cloned())
            .collect();
        data.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap());

        let num_bins = (data.len() / 5).clamp(2, 20);

        let mut bin_x = Vec::with_capacity(num_bins);
        let mut bin_y = Vec::with_capacity(num_bins);
        for i in 0..num_bins {
            let start = i * data.len() / num_bins;
            let end = if i == num_bins - 1 {
                data.len()
            } else {
                (i + 1) * data.len() / num_bins
            };
            if start >= end {
                continue;
            }

            let xs: Vec<f64> = data[start..end].iter().map(|(x, _)| *x).collect();
            let ys: Vec<f64> = data[start..end].iter().map(|(_, y)| *y).collect();
            bin_x.push(stats::mean(&xs));
            bin_y.push(stats::percentile(&ys, self.quantile));
        }

        let fit = stats::linear_regression(&bin_x, &bin_y);
        self.coefficients = vec![fit.intercept, fit.slope];
        true
    }

    fn predict_linear(&self, x: f64) -> f64 {
        if self.coefficients.len() < 2 {
            return 0.0;
        }
        self.coefficients[0] + self.coefficients[1] * x
    }

    fn predict_polynomial(&self, x: f64) -> f64 {
        let mut result = 0.0;
        let mut power = 1.0;
        for c in &self.coefficients {
            result += c * power;
            power *= x;
        }
        result
    }

    fn predict_exponential(&self, x: f64) -> f64 {
        if self.coefficients.len() < 2 {
            return 0.0;
        }
        self.coefficients[0] * (self.coefficients[1] * x).exp()
    }

    fn predict_logistic(&self, x: f64) -> f64 {
        if self.coefficients.len() < 3 {
            return 0.0;
        }
        let a = self.coefficients[0];
        let b = self.coefficients[1];
        let c = self.coefficients[2];
        a / (1.0 + (-b * (x - c)).exp())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_fit_recovers_line_exactly() {
        let mut model = RegressionModel::new(RegressionKind::Linear);
        model.set_training_data(vec![0.0, 1.0, 2.0, 3.0], vec![1.0, 3.0, 5.0, 7.0]);
        assert!(model.train());

        assert!((model.predict(4.0) - 9.0).abs() < 1e-9);
        assert!((model.r_squared() - 1.0).abs() < 1e-9);
        assert!(model.mse() < 1e-18);
        assert!(model.mae() < 1e-9);
    }

    #[test]
    fn polynomial_fit_recovers_quadratic() {
        let mut model = RegressionModel::new(RegressionKind::Polynomial);
        model.set_polynomial_degree(2);

        let x: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let y: Vec<f64> = x.iter().map(|v| 2.0 + 0.5 * v - 0.25 * v * v).collect();
        model.set_training_data(x, y);
        assert!(model.train());

        assert_eq!(model.coefficients().len(), 3);
        assert!((model.predict(3.0) - (2.0 + 1.5 - 2.25)).abs() < 1e-6);
    }

    #[test]
    fn exponential_fit_recovers_growth_curve() {
        let mut model = RegressionModel::new(RegressionKind::Exponential);

        let x: Vec<f64> = (0..10).map(|i| i as f64 / 2.0).collect();
        let y: Vec<f64> = x.iter().map(|v| 1.5 * (0.4 * v).exp()).collect();
        model.set_training_data(x, y);
        assert!(model.train());

        assert!((model.coefficients()[0] - 1.5).abs() < 1e-6);
        assert!((model.coefficients()[1] - 0.4).abs() < 1e-6);
    }

    #[test]
    fn exponential_fit_rejects_non_positive_targets() {
        let mut model = RegressionModel::new(RegressionKind::Exponential);
        model.set_training_data(vec![0.0, 1.0], vec![1.0, -1.0]);
        assert!(!model.train());
    }

    #[test]
    fn logistic_predictions_stay_below_the_asymptote() {
        let mut model = RegressionModel::new(RegressionKind::Logistic);

        let x: Vec<f64> = (-10..=10).map(|i| i as f64 / 2.0).collect();
        let y: Vec<f64> = x.iter().map(|v| 1.0 / (1.0 + (-v).exp())).collect();
        model.set_training_data(x, y);
        assert!(model.train());

        let a = model.coefficients()[0];
        for x in [-5.0, -1.0, 0.0, 1.0, 5.0] {
            let p = model.predict(x);
            assert!(p >= 0.0 && p <= a + 1e-9);
        }
    }

    #[test]
    fn quantile_fit_tracks_the_requested_band() {
        let mut low = RegressionModel::new(RegressionKind::Quantile);
        low.set_quantile(0.1);
        let mut high = RegressionModel::new(RegressionKind::Quantile);
        high.set_quantile(0.9);

        let mut x = Vec::new();
        let mut y = Vec::new();
        for i in 0..100 {
            let xi = i as f64 / 10.0;
            x.push(xi);
            y.push(xi + (i % 5) as f64 * 0.2);
        }
        low.set_training_data(x.clone(), y.clone());
        high.set_training_data(x, y);
        assert!(low.train());
        assert!(high.train());

        assert!(low.predict(5.0) < high.predict(5.0));
    }

    #[test]
    fn untrained_predictions_are_zero() {
        let model = RegressionModel::new(RegressionKind::Linear);
        assert_eq!(model.predict(3.0), 0.0);
        assert_eq!(model.r_squared(), 0.0);
        assert_eq!(model.mse(), 0.0);
    }

    #[test]
    fn invalid_settings_keep_previous_values() {
        let mut model = RegressionModel::new(RegressionKind::Polynomial);
        model.set_polynomial_degree(3);
        model.set_polynomial_degree(0);
        assert_eq!(model.polynomial_degree, 3);

        model.set_quantile(0.75);
        model.set_quantile(1.5);
        assert_eq!(model.quantile, 0.75);
    }

    #[test]
    fn save_load_round_trip_preserves_coefficients() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");

        let mut model = RegressionModel::new(RegressionKind::Polynomial);
        model.set_polynomial_degree(3);
        model.set_quantile(0.25);
        let x: Vec<f64> = (0..20).map(|i| i as f64 / 3.0).collect();
        let y: Vec<f64> = x.iter().map(|v| 0.1 + 1.7 * v - 0.3 * v * v).collect();
        model.set_training_data(x, y);
        assert!(model.train());

        model.save(&path).unwrap();
        let restored = RegressionModel::load(&path).unwrap();

        assert_eq!(restored.kind(), RegressionKind::Polynomial);
        assert_eq!(restored.polynomial_degree, 3);
        assert_eq!(restored.quantile, 0.25);
        assert_eq!(restored.coefficients(), model.coefficients());

        for x in [0.0, 1.0, 2.5, 6.0] {
            assert_eq!(restored.predict(x), model.predict(x));
        }
    }

    #[test]
    fn load_rejects_unknown_model_type() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        std::fs::write(
            &path,
            r#"{"model_type": 9, "polynomial_degree": 2, "quantile": 0.5, "coefficients": []}"#,
        )
        .unwrap();

        assert!(RegressionModel::load(&path).is_err());
    }
}
