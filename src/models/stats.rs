//! Small statistical helpers shared by the fitting code.

/// Ordinary-least-squares fit of `y = slope * x + intercept`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
    pub r_squared: f64,
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Interpolated percentile of `values` at rank `q` in [0, 1].
pub fn percentile(values: &[f64], q: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());

    let index = q * (sorted.len() - 1) as f64;
    let lower = index.floor() as usize;
    let upper = index.ceil() as usize;
    if lower == upper {
        return sorted[lower];
    }

    let weight = index - lower as f64;
    sorted[lower] * (1.0 - weight) + sorted[upper] * weight
}

pub fn linear_regression(x: &[f64], y: &[f64]) -> LinearFit {
    if x.len() != y.len() || x.is_empty() {
        return LinearFit::default();
    }

    let n = x.len() as f64;
    let sum_x: f64 = x.iter().sum();
    let sum_y: f64 = y.iter().sum();
    let sum_xy: f64 = x.iter().zip(y).map(|(a, b)| a * b).sum();
    let sum_x2: f64 = x.iter().map(|a| a * a).sum();

    let x_mean = sum_x / n;
    let y_mean = sum_y / n;

    let numerator = sum_xy - sum_x * sum_y / n;
    let denominator = sum_x2 - sum_x * sum_x / n;
    if denominator == 0.0 {
        // Degenerate x: report the mean as a flat line.
        return LinearFit {
            slope: 0.0,
            intercept: y_mean,
            r_squared: 0.0,
        };
    }

    let slope = numerator / denominator;
    let intercept = y_mean - slope * x_mean;

    let mut residual = 0.0;
    let mut total = 0.0;
    for (xi, yi) in x.iter().zip(y) {
        let predicted = slope * xi + intercept;
        residual += (yi - predicted) * (yi - predicted);
        total += (yi - y_mean) * (yi - y_mean);
    }

    let r_squared = if total > 0.0 { 1.0 - residual / total } else { 1.0 };

    LinearFit {
        slope,
        intercept,
        r_squared,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regression_recovers_exact_line() {
        let x = [1.0, 2.0, 3.0, 4.0];
        let y = [3.0, 5.0, 7.0, 9.0];
        let fit = linear_regression(&x, &y);

        assert!((fit.slope - 2.0).abs() < 1e-12);
        assert!((fit.intercept - 1.0).abs() < 1e-12);
        assert!((fit.r_squared - 1.0).abs() < 1e-12);
    }

    #[test]
    fn regression_handles_degenerate_input() {
        assert_eq!(linear_regression(&[], &[]), LinearFit::default());

        let flat = linear_regression(&[2.0, 2.0, 2.0], &[1.0, 2.0, 3.0]);
        assert_eq!(flat.slope, 0.0);
        assert!((flat.intercept - 2.0).abs() < 1e-12);
    }

    #[test]
    fn percentile_interpolates() {
        let values = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(percentile(&values, 0.0), 1.0);
        assert_eq!(percentile(&values, 1.0), 4.0);
        assert!((percentile(&values, 0.5) - 2.5).abs() < 1e-12);
        assert_eq!(percentile(&[], 0.5), 0.0);
    }

    #[test]
    fn mean_of_empty_is_zero() {
        assert_eq!(mean(&[]), 0.0);
        assert!((mean(&[1.0, 2.0, 3.0]) - 2.0).abs() < 1e-12);
    }
}
