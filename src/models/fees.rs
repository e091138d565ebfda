use std::sync::Arc;

use tracing::warn;

use crate::config::{Config, FeeTier};

/// Tiered maker/taker fee lookup on notional. Rates come from the loaded
/// configuration; unknown `(exchange, tier)` combinations price at zero.
#[derive(Debug, Clone)]
pub struct FeeModel {
    config: Arc<Config>,
}

impl FeeModel {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }

    /// Blended fee on `quantity * price` notional. An out-of-range maker
    /// ratio is treated as all-taker, the conservative side.
    pub fn calculate(
        &self,
        exchange: &str,
        fee_tier: &str,
        quantity: f64,
        price: f64,
        maker_ratio: f64,
    ) -> f64 {
        if quantity <= 0.0 || price <= 0.0 {
            warn!(quantity, price, "invalid quantity or price for fee calculation");
            return 0.0;
        }

        let maker_ratio = if !(0.0..=1.0).contains(&maker_ratio) {
            warn!(maker_ratio, "maker ratio outside [0, 1], assuming full taker");
            0.0
        } else {
            maker_ratio
        };

        let notional = quantity * price;
        let maker_rate = self.config.maker_fee(exchange, fee_tier);
        let taker_rate = self.config.taker_fee(exchange, fee_tier);

        notional * (maker_rate * maker_ratio + taker_rate * (1.0 - maker_ratio))
    }

    /// Fee if the whole order rests (pure maker).
    pub fn maker_fee(&self, exchange: &str, fee_tier: &str, quantity: f64, price: f64) -> f64 {
        if quantity <= 0.0 || price <= 0.0 {
            return 0.0;
        }
        quantity * price * self.config.maker_fee(exchange, fee_tier)
    }

    /// Fee if the whole order crosses (pure taker).
    pub fn taker_fee(&self, exchange: &str, fee_tier: &str, quantity: f64, price: f64) -> f64 {
        if quantity <= 0.0 || price <= 0.0 {
            return 0.0;
        }
        quantity * price * self.config.taker_fee(exchange, fee_tier)
    }

    pub fn fee_tiers(&self, exchange: &str) -> &[FeeTier] {
        self.config.fee_tiers(exchange)
    }
}
