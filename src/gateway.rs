//! Abstract exchange capability consumed by the live trading core
//!
//! The core never talks to a REST client directly: everything it needs
//! from the venue goes through this trait, so tests can drive the live
//! state machines with a scripted gateway. Implementations own retries,
//! rate limiting and pagination; a failed read is an `Err`, never a
//! silent zero.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::binance::filters::ExchangeFilters;
use crate::{Candle, Direction, OrderSide, Symbol};

/// One open position as reported by the venue
#[derive(Debug, Clone, PartialEq)]
pub struct PositionSnapshot {
    pub direction: Direction,
    pub entry_price: f64,
    pub quantity: f64,
    pub unrealized_pnl: f64,
}

/// Acknowledgement for a placed or cancelled order
#[derive(Debug, Clone, PartialEq)]
pub struct OrderReceipt {
    pub order_id: u64,
    pub status: String,
}

#[async_trait]
pub trait ExchangeGateway: Send + Sync {
    /// Historical candles over a time range, paginated internally
    async fn fetch_historical_candles(
        &self,
        symbol: &Symbol,
        interval: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Candle>>;

    /// The most recent `limit` candles, newest last
    async fn fetch_recent_candles(
        &self,
        symbol: &Symbol,
        interval: &str,
        limit: u32,
    ) -> Result<Vec<Candle>>;

    /// Current market price; implementations may serve a short-lived cache
    async fn current_price(&self, symbol: &Symbol) -> Result<f64>;

    /// Tick/step/notional filters; constant per symbol for a whole run
    async fn exchange_filters(&self, symbol: &Symbol) -> Result<ExchangeFilters>;

    async fn open_position(
        &self,
        symbol: &Symbol,
        direction: Direction,
        quantity: f64,
    ) -> Result<OrderReceipt>;

    async fn place_stop(
        &self,
        symbol: &Symbol,
        side: OrderSide,
        quantity: f64,
        stop_price: f64,
    ) -> Result<OrderReceipt>;

    async fn place_take_profit(
        &self,
        symbol: &Symbol,
        side: OrderSide,
        quantity: f64,
        tp_price: f64,
    ) -> Result<OrderReceipt>;

    /// Cancel-then-place a protective stop. Must fail fast, without side
    /// effects, when `new_stop` is within the minimum safety distance of
    /// `current_price_hint` (see `ExchangeFilters::validate_stop_distance`).
    async fn replace_stop(
        &self,
        symbol: &Symbol,
        side: OrderSide,
        quantity: f64,
        new_stop: f64,
        current_price_hint: f64,
    ) -> Result<OrderReceipt>;

    /// Cancel every remaining stop / take-profit order for the symbol
    async fn cancel_conditional_orders(&self, symbol: &Symbol) -> Result<()>;

    async fn open_positions(&self, symbol: &Symbol) -> Result<Vec<PositionSnapshot>>;

    async fn available_margin(&self, symbol: &Symbol) -> Result<f64>;

    async fn balance(&self, asset: &str) -> Result<f64>;

    async fn set_leverage(&self, symbol: &Symbol, leverage: u32) -> Result<()>;

    async fn set_isolated_margin(&self, symbol: &Symbol) -> Result<()>;
}
