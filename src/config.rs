use serde::Deserialize;
use std::path::Path;

/// Full engine configuration, loaded once at startup from the JSON file
/// given on the command line. Read-only afterwards.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub websocket: WebSocketConfig,
    #[serde(default)]
    pub exchanges: Vec<ExchangeConfig>,
    #[serde(default)]
    pub simulator: SimulatorConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub performance: PerformanceConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebSocketConfig {
    pub endpoint: String,
    #[serde(default = "default_reconnect_interval_ms")]
    pub reconnect_interval_ms: u64,
    #[serde(default = "default_ping_interval_ms")]
    pub ping_interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeConfig {
    pub name: String,
    #[serde(default)]
    pub fee_tiers: Vec<FeeTier>,
    #[serde(default)]
    pub spot_assets: Vec<String>,
}

/// One venue fee tier: maker/taker rates as fractions of notional.
#[derive(Debug, Clone, Deserialize)]
pub struct FeeTier {
    pub tier: String,
    pub maker: f64,
    pub taker: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    pub default_exchange: String,
    pub default_asset: String,
    pub default_order_type: String,
    pub default_quantity_usd: f64,
    pub default_volatility: f64,
    pub default_fee_tier: String,
    pub update_interval_ms: u64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            default_exchange: "OKX".to_string(),
            default_asset: "BTC-USDT".to_string(),
            default_order_type: "MARKET".to_string(),
            default_quantity_usd: 100.0,
            default_volatility: 0.3,
            default_fee_tier: "VIP0".to_string(),
            update_interval_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub console_output: bool,
    pub file_output: bool,
    pub file_path: String,
    pub max_file_size_mb: u64,
    pub max_files: u32,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            console_output: true,
            file_output: false,
            file_path: "logs/cost-engine.log".to_string(),
            max_file_size_mb: 10,
            max_files: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PerformanceConfig {
    pub measure_latency: bool,
    pub buffer_size: usize,
    pub processing_threads: usize,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            measure_latency: true,
            buffer_size: 100_000,
            processing_threads: 1,
        }
    }
}

impl Config {
    /// Load and parse the configuration file. Any I/O or syntax problem is a
    /// fatal startup error for the caller.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: Config = serde_json::from_str(&raw)?;
        Ok(config)
    }

    pub fn exchange(&self, name: &str) -> Option<&ExchangeConfig> {
        self.exchanges.iter().find(|e| e.name == name)
    }

    pub fn fee_tiers(&self, exchange: &str) -> &[FeeTier] {
        self.exchange(exchange)
            .map(|e| e.fee_tiers.as_slice())
            .unwrap_or(&[])
    }

    /// Maker rate for `(exchange, tier)`; 0 when the combination is unknown.
    pub fn maker_fee(&self, exchange: &str, tier: &str) -> f64 {
        self.fee_tiers(exchange)
            .iter()
            .find(|t| t.tier == tier)
            .map(|t| t.maker)
            .unwrap_or(0.0)
    }

    /// Taker rate for `(exchange, tier)`; 0 when the combination is unknown.
    pub fn taker_fee(&self, exchange: &str, tier: &str) -> f64 {
        self.fee_tiers(exchange)
            .iter()
            .find(|t| t.tier == tier)
            .map(|t| t.taker)
            .unwrap_or(0.0)
    }
}

fn default_reconnect_interval_ms() -> u64 {
    5000
}

fn default_ping_interval_ms() -> u64 {
    60_000
}
