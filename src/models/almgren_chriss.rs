use tracing::warn;

use crate::book::OrderBook;

/// Almgren–Chriss execution impact. Temporary impact follows the square
/// root model scaled by the relative spread; permanent impact is linear in
/// the order's share of total resting volume. The permanent factor is
/// conventionally one tenth of the temporary one.
#[derive(Debug, Clone)]
pub struct AlmgrenChrissModel {
    volatility: f64,
    impact_factor: f64,
    risk_aversion: f64,
}

/// Optimal liquidation trajectory: remaining quantity and time at each of
/// the `N + 1` grid points, plus the modeled execution cost.
#[derive(Debug, Clone, Default)]
pub struct ExecutionSchedule {
    pub quantities: Vec<f64>,
    pub times: Vec<f64>,
    pub total_cost: f64,
}

impl Default for AlmgrenChrissModel {
    fn default() -> Self {
        Self {
            volatility: 0.3,
            impact_factor: 0.1,
            risk_aversion: 1.0,
        }
    }
}

impl AlmgrenChrissModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_volatility(&mut self, volatility: f64) {
        if volatility <= 0.0 || !volatility.is_finite() {
            warn!(volatility, "invalid volatility, keeping previous value");
            return;
        }
        self.volatility = volatility;
    }

    pub fn set_impact_factor(&mut self, factor: f64) {
        if factor <= 0.0 || !factor.is_finite() {
            warn!(factor, "invalid market impact factor, keeping previous value");
            return;
        }
        self.impact_factor = factor;
    }

    pub fn set_risk_aversion(&mut self, risk_aversion: f64) {
        if risk_aversion < 0.0 || !risk_aversion.is_finite() {
            warn!(risk_aversion, "invalid risk aversion, keeping previous value");
            return;
        }
        self.risk_aversion = risk_aversion;
    }

    pub fn volatility(&self) -> f64 {
        self.volatility
    }

    pub fn impact_factor(&self) -> f64 {
        self.impact_factor
    }

    pub fn risk_aversion(&self) -> f64 {
        self.risk_aversion
    }

    /// Expected price-unit impact of executing `quantity` immediately.
    /// 0 on degenerate input (empty book, zero reference or volume).
    pub fn calculate_market_impact(&self, book: &OrderBook, quantity: f64, is_buy: bool) -> f64 {
        if quantity <= 0.0 {
            return 0.0;
        }

        let reference = book.mid_price();
        if reference <= 0.0 {
            return 0.0;
        }

        let total_volume = if is_buy {
            book.total_ask_volume()
        } else {
            book.total_bid_volume()
        };
        if total_volume <= 0.0 {
            return 0.0;
        }

        let rate = quantity / total_volume;
        self.temporary_impact(rate, book) + self.permanent_impact(quantity, book)
    }

    /// Optimal execution trajectory for `total_quantity` over `time_horizon`
    /// in `num_steps` slices.
    pub fn optimal_execution(
        &self,
        book: &OrderBook,
        total_quantity: f64,
        num_steps: usize,
        time_horizon: f64,
    ) -> ExecutionSchedule {
        if total_quantity <= 0.0 || num_steps == 0 || time_horizon <= 0.0 {
            return ExecutionSchedule::default();
        }

        let reference = book.mid_price();
        if reference <= 0.0 {
            return ExecutionSchedule::default();
        }

        // Scale the configured fractions into absolute price units.
        let sigma = self.volatility * reference;
        let eta = self.impact_factor * reference;
        let gamma = self.impact_factor * 0.1 * reference;

        let tau = time_horizon / num_steps as f64;
        let kappa = (self.risk_aversion * sigma * sigma / eta).sqrt();
        let sinh_kt = (kappa * time_horizon).sinh();

        let mut quantities = vec![0.0; num_steps + 1];
        let mut times = vec![0.0; num_steps + 1];
        quantities[0] = total_quantity;

        for i in 1..=num_steps {
            let t = i as f64 * tau;
            times[i] = t;

            let remaining_ratio = if sinh_kt != 0.0 {
                (kappa * (time_horizon - t)).sinh() / sinh_kt
            } else {
                (num_steps - i) as f64 / num_steps as f64
            };
            quantities[i] = total_quantity * remaining_ratio;
        }

        let mut total_cost = 0.0;
        for i in 0..num_steps {
            let trade_size = quantities[i] - quantities[i + 1];
            let temporary = eta * (trade_size / tau).sqrt();
            let permanent = gamma * trade_size;
            total_cost += trade_size * (temporary + permanent / 2.0);
        }

        ExecutionSchedule {
            quantities,
            times,
            total_cost,
        }
    }

    fn temporary_impact(&self, rate: f64, book: &OrderBook) -> f64 {
        let reference = book.mid_price();
        if reference <= 0.0 {
            return 0.0;
        }

        let relative_spread = book.spread() / reference;
        let adjusted_factor = self.impact_factor * (1.0 + 10.0 * relative_spread);

        adjusted_factor * reference * rate.sqrt()
    }

    fn permanent_impact(&self, quantity: f64, book: &OrderBook) -> f64 {
        let reference = book.mid_price();
        let total_volume = book.total_bid_volume() + book.total_ask_volume();
        if reference <= 0.0 || total_volume <= 0.0 {
            return 0.0;
        }

        let gamma = self.impact_factor * 0.1;
        gamma * reference * quantity / total_volume
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::book::OrderBook;

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
            "2024-05-01T12:00:00Z",
        );
        book
    }

    #[test]
    fn invalid_parameters_are_rejected_and_previous_values_kept() {
        let mut model = AlmgrenChrissModel::new();
        model.set_volatility(0.5);
        model.set_volatility(-1.0);
        model.set_volatility(0.0);
        assert_eq!(model.volatility(), 0.5);

        model.set_impact_factor(-0.1);
        assert_eq!(model.impact_factor(), 0.1);

        model.set_risk_aversion(2.0);
        model.set_risk_aversion(-1.0);
        assert_eq!(model.risk_aversion(), 2.0);

        // Zero risk aversion is a legal (risk-neutral) setting.
        model.set_risk_aversion(0.0);
        assert_eq!(model.risk_aversion(), 0.0);
    }

    #[test]
    fn impact_is_zero_on_degenerate_input() {
        let model = AlmgrenChrissModel::new();
        let empty = OrderBook::new();
        assert_eq!(model.calculate_market_impact(&empty, 1.0, true), 0.0);

        let book = book_with(&[("100", "1")], &[("101", "1")]);
        assert_eq!(model.calculate_market_impact(&book, 0.0, true), 0.0);
        assert_eq!(model.calculate_market_impact(&book, -2.0, true), 0.0);

        // One-sided book has no mid price.
        let one_sided = book_with(&[], &[("101", "1")]);
        assert_eq!(model.calculate_market_impact(&one_sided, 1.0, true), 0.0);
    }

    #[test]
    fn thin_book_impact_matches_square_root_model() {
        // Near-zero spread so the adjustment term stays negligible: buying 3
        // against 1 unit of resting asks gives rate 3 and eta * ref * sqrt(3).
        let book = book_with(&[("100.999", "1")], &[("101.001", "1")]);
        let model = AlmgrenChrissModel::new();

        let impact = model.calculate_market_impact(&book, 3.0, true);
        let reference = book.mid_price();
        let expected_temp = 0.1 * reference * 3.0f64.sqrt();
        // Permanent part: 0.01 * ref * 3 / 2.
        let expected_perm = 0.01 * reference * 3.0 / 2.0;
        assert!((impact - (expected_temp + expected_perm)).abs() < 0.05);
        assert!((impact - 17.49).abs() < 2.0);
    }

    #[test]
    fn wider_spread_raises_temporary_impact() {
        let tight = book_with(&[("100.9", "1")], &[("101.1", "1")]);
        let wide = book_with(&[("99", "1")], &[("103", "1")]);
        let model = AlmgrenChrissModel::new();

        assert!(
            model.calculate_market_impact(&wide, 1.0, true)
                > model.calculate_market_impact(&tight, 1.0, true)
        );
    }

    #[test]
    fn schedule_decreases_monotonically_to_zero() {
        let book = book_with(&[("100", "5")], &[("101", "5")]);
        let model = AlmgrenChrissModel::new();

        let schedule = model.optimal_execution(&book, 100.0, 4, 1.0);
        assert_eq!(schedule.quantities.len(), 5);
        assert_eq!(schedule.times.len(), 5);
        assert_eq!(schedule.quantities[0], 100.0);
        assert!(schedule.quantities[4].abs() < 1e-9);
        assert!(schedule
            .quantities
            .windows(2)
            .all(|w| w[0] >= w[1] - 1e-9));

        let expected_times = [0.0, 0.25, 0.5, 0.75, 1.0];
        for (t, expected) in schedule.times.iter().zip(expected_times) {
            assert!((t - expected).abs() < 1e-12);
        }

        assert!(schedule.total_cost > 0.0);
    }

    #[test]
    fn schedule_is_empty_on_degenerate_input() {
        let book = book_with(&[("100", "5")], &[("101", "5")]);
        let model = AlmgrenChrissModel::new();

        assert!(model.optimal_execution(&book, 0.0, 4, 1.0).quantities.is_empty());
        assert!(model.optimal_execution(&book, 100.0, 0, 1.0).quantities.is_empty());
        assert!(model.optimal_execution(&book, 100.0, 4, 0.0).quantities.is_empty());
        assert!(model
            .optimal_execution(&OrderBook::new(), 100.0, 4, 1.0)
            .quantities
            .is_empty());
    }

    #[test]
    fn higher_risk_aversion_front_loads_the_schedule() {
        let book = book_with(&[("100", "5")], &[("101", "5")]);

        let mut impatient = AlmgrenChrissModel::new();
        impatient.set_risk_aversion(5.0);
        let mut patient = AlmgrenChrissModel::new();
        patient.set_risk_aversion(0.01);

        let fast = impatient.optimal_execution(&book, 100.0, 4, 1.0);
        let slow = patient.optimal_execution(&book, 100.0, 4, 1.0);

        // More risk aversion means less remaining at the first checkpoint.
        assert!(fast.quantities[1] < slow.quantities[1]);
    }
}
