//! Configuration management
//!
//! Handles loading and parsing of JSON configuration files with environment
//! variable support for API credentials and the Telegram bot.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::Symbol;

/// Stop-loss placement relative to the zone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlMethod {
    /// Zone low for longs, zone high for shorts
    Low,
    /// Zone midpoint for both directions
    Mid,
}

/// How the trailing stop advances once activated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrailingMode {
    /// Follow each bar's extreme with an optional buffer
    BarExtremes,
    /// Advance in discrete steps of `entry * step_pct / 100`
    Step,
}

/// Accumulation-breakout strategy parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyParams {
    pub atr_window: usize,
    pub bb_window: usize,
    pub bb_dev: f64,
    pub adx_window: usize,
    pub accumulation_period: usize,
    pub volume_window: usize,
    pub min_zone_size: usize,
    pub min_accumulation_score: u32,
    /// Quantile of the atr_pct distribution, in [0, 1]
    pub atr_threshold: f64,
    /// Quantile of the bb_width distribution, in [0, 1]
    pub bb_width_threshold: f64,
    pub adx_threshold: f64,
    pub bb_position_low: f64,
    pub bb_position_high: f64,
    /// Quantile of the range_pct distribution, in [0, 1]
    pub range_threshold: f64,
    pub sl_method: SlMethod,
    pub rr_ratio: f64,
    pub lookback_bars_for_tp: usize,
    pub risk_per_trade: f64,
    pub use_trailing_stop: bool,
    pub trailing_activate_rr: f64,
    pub trailing_mode: TrailingMode,
    pub trailing_step_pct: f64,
    pub trailing_buffer_pct: f64,
}

impl Default for StrategyParams {
    fn default() -> Self {
        StrategyParams {
            atr_window: 10,
            bb_window: 15,
            bb_dev: 2.0,
            adx_window: 30,
            accumulation_period: 25,
            volume_window: 20,
            min_zone_size: 3,
            min_accumulation_score: 3,
            atr_threshold: 0.3,
            bb_width_threshold: 0.3,
            adx_threshold: 30.0,
            bb_position_low: 0.3,
            bb_position_high: 0.7,
            range_threshold: 0.3,
            sl_method: SlMethod::Low,
            rr_ratio: 4.0,
            lookback_bars_for_tp: 1000,
            risk_per_trade: 0.03,
            use_trailing_stop: true,
            trailing_activate_rr: 1.0,
            trailing_mode: TrailingMode::Step,
            trailing_step_pct: 0.01,
            trailing_buffer_pct: 0.0,
        }
    }
}

impl StrategyParams {
    /// Reject parameter combinations that cannot produce meaningful signals
    pub fn validate(&self) -> Result<()> {
        for (name, q) in [
            ("atr_threshold", self.atr_threshold),
            ("bb_width_threshold", self.bb_width_threshold),
            ("range_threshold", self.range_threshold),
        ] {
            if !(0.0..=1.0).contains(&q) {
                bail!("{} must be a quantile in [0, 1], got {}", name, q);
            }
        }
        if self.rr_ratio <= 0.0 {
            bail!("rr_ratio must be positive, got {}", self.rr_ratio);
        }
        if self.risk_per_trade <= 0.0 {
            bail!("risk_per_trade must be positive, got {}", self.risk_per_trade);
        }
        if self.trailing_activate_rr < 0.0 {
            bail!(
                "trailing_activate_rr must be non-negative, got {}",
                self.trailing_activate_rr
            );
        }
        if self.trailing_buffer_pct < 0.0 {
            bail!(
                "trailing_buffer_pct must be non-negative, got {}",
                self.trailing_buffer_pct
            );
        }
        if self.bb_position_low >= self.bb_position_high {
            bail!(
                "bb_position_low ({}) must be below bb_position_high ({})",
                self.bb_position_low,
                self.bb_position_high
            );
        }
        if self.min_zone_size == 0 {
            bail!("min_zone_size must be at least 1");
        }
        Ok(())
    }
}

/// Exchange connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_secret: Option<String>,
    /// Requests per second against the exchange REST API
    pub rate_limit: u32,
    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        ExchangeConfig {
            api_key: None,
            api_secret: None,
            rate_limit: 10,
            request_timeout_secs: 15,
        }
    }
}

/// Live trading configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TradingConfig {
    pub symbols: Vec<String>,
    pub interval: String,
    pub lookback_days: u32,
    pub leverage: u32,
    /// Seconds between live polling cycles
    pub update_interval_secs: u64,
    /// Seconds between full data refresh + zone recomputation
    pub data_refresh_interval_secs: u64,
    /// Zones older than this are no longer monitored for breakouts
    pub zone_max_age_hours: i64,
}

impl Default for TradingConfig {
    fn default() -> Self {
        TradingConfig {
            symbols: vec!["BTCUSDT".to_string()],
            interval: "5m".to_string(),
            lookback_days: 30,
            leverage: 15,
            update_interval_secs: 15,
            data_refresh_interval_secs: 300,
            zone_max_age_hours: 48,
        }
    }
}

impl TradingConfig {
    pub fn symbols(&self) -> Vec<Symbol> {
        self.symbols.iter().map(Symbol::new).collect()
    }
}

/// Backtest configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestConfig {
    pub data_dir: String,
    pub initial_capital: f64,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        BacktestConfig {
            data_dir: "data".to_string(),
            initial_capital: 10_000.0,
        }
    }
}

/// Telegram notification configuration; token and chat id come from the
/// environment so they never land in a committed config file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    pub enabled: bool,
    #[serde(skip)]
    pub bot_token: Option<String>,
    #[serde(skip)]
    pub chat_id: Option<String>,
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub exchange: ExchangeConfig,
    pub trading: TradingConfig,
    pub strategy: StrategyParams,
    pub backtest: BacktestConfig,
    pub telegram: TelegramConfig,
}

impl Config {
    /// Load configuration from a JSON file, then overlay credentials from
    /// the environment (`.env` is honored when present)
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref()).context("Failed to read config file")?;
        let mut config: Config =
            serde_json::from_str(&contents).context("Failed to parse config JSON")?;

        config.apply_env();
        config.strategy.validate()?;
        Ok(config)
    }

    /// Pull credentials from the environment
    pub fn apply_env(&mut self) {
        if let Ok(api_key) = std::env::var("BINANCE_API_KEY") {
            self.exchange.api_key = Some(api_key);
        }
        if let Ok(api_secret) = std::env::var("BINANCE_API_SECRET") {
            self.exchange.api_secret = Some(api_secret);
        }
        if let Ok(token) = std::env::var("TELEGRAM_BOT_TOKEN") {
            self.telegram.bot_token = Some(token);
        }
        if let Ok(chat_id) = std::env::var("TELEGRAM_CHAT_ID") {
            self.telegram.chat_id = Some(chat_id);
        }
    }
}
