//! Binance USD-M futures API response types
//!
//! Values arrive as strings or heterogeneous JSON arrays; everything is
//! converted into typed records at this boundary so the rest of the crate
//! never touches untyped maps.

use serde::Deserialize;

use crate::{Candle, CandleError};
use chrono::DateTime;

/// Kline row as returned by `/fapi/v1/klines`:
/// [open_time, open, high, low, close, volume, close_time, ...]
#[derive(Debug, Clone)]
pub struct FuturesKline {
    pub open_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub close_time: i64,
}

impl FuturesKline {
    /// Parse one raw kline array; rows that do not match the documented
    /// shape are dropped by the caller
    pub fn from_raw(raw: &[serde_json::Value]) -> Option<Self> {
        if raw.len() < 7 {
            return None;
        }
        Some(FuturesKline {
            open_time: raw[0].as_i64()?,
            open: raw[1].as_str()?.parse().ok()?,
            high: raw[2].as_str()?.parse().ok()?,
            low: raw[3].as_str()?.parse().ok()?,
            close: raw[4].as_str()?.parse().ok()?,
            volume: raw[5].as_str()?.parse().ok()?,
            close_time: raw[6].as_i64()?,
        })
    }
}

impl TryFrom<FuturesKline> for Candle {
    type Error = CandleError;

    fn try_from(k: FuturesKline) -> Result<Self, Self::Error> {
        let open_time = DateTime::from_timestamp_millis(k.open_time).unwrap_or_default();
        let candle = Candle::new(open_time, k.open, k.high, k.low, k.close, k.volume)?;
        Ok(match DateTime::from_timestamp_millis(k.close_time) {
            Some(ct) => candle.with_close_time(ct),
            None => candle,
        })
    }
}

/// Row from `/fapi/v2/positionRisk`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPositionRisk {
    pub symbol: String,
    pub position_amt: String,
    pub entry_price: String,
    #[serde(rename = "unRealizedProfit")]
    pub unrealized_profit: String,
}

/// Row from `/fapi/v2/balance`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawBalance {
    pub asset: String,
    pub balance: String,
    pub available_balance: String,
}

/// Order acknowledgement from `/fapi/v1/order`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawOrderAck {
    pub order_id: u64,
    pub symbol: String,
    pub status: String,
}

/// Open order row from `/fapi/v1/openOrders`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawOpenOrder {
    pub order_id: u64,
    pub symbol: String,
    #[serde(rename = "type")]
    pub order_type: String,
}

impl RawOpenOrder {
    /// Stop and take-profit order types that protect a position
    pub fn is_conditional(&self) -> bool {
        matches!(
            self.order_type.as_str(),
            "STOP" | "STOP_MARKET" | "TAKE_PROFIT" | "TAKE_PROFIT_MARKET"
        )
    }
}

/// `/fapi/v1/ticker/price` response
#[derive(Debug, Clone, Deserialize)]
pub struct RawTickerPrice {
    pub symbol: String,
    pub price: String,
}

/// Filter entries inside `/fapi/v1/exchangeInfo`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSymbolFilter {
    pub filter_type: String,
    #[serde(default)]
    pub tick_size: Option<String>,
    #[serde(default)]
    pub step_size: Option<String>,
    #[serde(default)]
    pub min_qty: Option<String>,
    #[serde(default)]
    pub notional: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSymbolInfo {
    pub symbol: String,
    pub filters: Vec<RawSymbolFilter>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawExchangeInfo {
    pub symbols: Vec<RawSymbolInfo>,
}

/// Valid Binance futures kline intervals
pub const FUTURES_INTERVALS: &[&str] = &[
    "1m", "3m", "5m", "15m", "30m", "1h", "2h", "4h", "6h", "8h", "12h", "1d", "3d", "1w", "1M",
];

pub fn is_valid_interval(interval: &str) -> bool {
    FUTURES_INTERVALS.contains(&interval)
}
