//! Core data types used across the trading system

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Validation failure for a single OHLCV candle
#[derive(Debug, Error, PartialEq)]
pub enum CandleError {
    #[error("non-positive price: open={open} high={high} low={low} close={close}")]
    NonPositivePrice {
        open: f64,
        high: f64,
        low: f64,
        close: f64,
    },
    #[error("high {high} below body top {body_top}")]
    HighBelowBody { high: f64, body_top: f64 },
    #[error("low {low} above body bottom {body_bottom}")]
    LowAboveBody { low: f64, body_bottom: f64 },
    #[error("negative volume {0}")]
    NegativeVolume(f64),
}

/// OHLCV candlestick data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    /// Close timestamp of the interval, when the source provides one
    pub close_time: Option<DateTime<Utc>>,
}

impl Candle {
    /// Construct a candle, rejecting values that violate OHLCV invariants
    pub fn new(
        open_time: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Result<Self, CandleError> {
        if !(open > 0.0 && high > 0.0 && low > 0.0 && close > 0.0) {
            return Err(CandleError::NonPositivePrice {
                open,
                high,
                low,
                close,
            });
        }
        let body_top = open.max(close);
        let body_bottom = open.min(close);
        if high < body_top {
            return Err(CandleError::HighBelowBody { high, body_top });
        }
        if low > body_bottom {
            return Err(CandleError::LowAboveBody { low, body_bottom });
        }
        if volume < 0.0 {
            return Err(CandleError::NegativeVolume(volume));
        }
        Ok(Candle {
            open_time,
            open,
            high,
            low,
            close,
            volume,
            close_time: None,
        })
    }

    pub fn with_close_time(mut self, close_time: DateTime<Utc>) -> Self {
        self.close_time = Some(close_time);
        self
    }

    /// True once the candle's interval has fully elapsed
    pub fn is_closed(&self, now: DateTime<Utc>) -> bool {
        match self.close_time {
            Some(ct) => ct < now,
            None => true,
        }
    }
}

/// Trading pair symbol (e.g. "BTCUSDT")
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Symbol(pub String);

impl Symbol {
    pub fn new(s: impl Into<String>) -> Self {
        Symbol(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Trade direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    /// Order side that closes a position in this direction
    pub fn closing_side(&self) -> OrderSide {
        match self {
            Direction::Long => OrderSide::Sell,
            Direction::Short => OrderSide::Buy,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Long => write!(f, "LONG"),
            Direction::Short => write!(f, "SHORT"),
        }
    }
}

/// Order side as understood by the exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        }
    }
}

/// A detected accumulation zone.
///
/// Immutable once produced by a detection run. `id` is the group ordinal
/// within that run and is only stable for the series it was detected on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    pub id: u32,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub high: f64,
    pub low: f64,
    /// Number of member candles
    pub size: usize,
    /// Mean accumulation score over member candles
    pub score_avg: f64,
}

impl Zone {
    pub fn midpoint(&self) -> f64 {
        (self.high + self.low) / 2.0
    }
}

/// Why a trade left the market
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitReason {
    TakeProfit,
    StopLoss,
    Trailing,
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExitReason::TakeProfit => write!(f, "TP"),
            ExitReason::StopLoss => write!(f, "SL"),
            ExitReason::Trailing => write!(f, "TRAIL"),
        }
    }
}

/// Outcome classification of a simulated trade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeResult {
    Win,
    Loss,
    /// Data ended before either level was reached
    Open,
}

/// Planned entry derived from a zone and its breakout candle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradePlan {
    pub zone_id: u32,
    pub direction: Direction,
    pub entry_price: f64,
    pub entry_time: DateTime<Utc>,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub position_size: f64,
    pub risk_amount: f64,
    /// |entry - stop| per unit
    pub risk_per_unit: f64,
    /// |take_profit - entry| per unit
    pub reward_per_unit: f64,
    /// Realized reward/risk after TP tightening
    pub rr_ratio: f64,
}

/// A fully simulated (or closed) trade
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub plan: TradePlan,
    pub result: TradeResult,
    pub exit_time: DateTime<Utc>,
    pub exit_price: f64,
    /// None when the trade is still open at end of data
    pub exit_reason: Option<ExitReason>,
    pub pnl_pct: f64,
    pub pnl_usd: f64,
    /// Minutes between entry and exit
    pub duration_min: f64,
    pub zone_score: f64,
}
