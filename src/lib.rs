//! Accumulation Breakout Trading System
//!
//! Detects accumulation zones (stretches of low-volatility, range-bound
//! price action) in OHLCV candle data, waits for a confirmed breakout
//! from a zone, and opens a leveraged futures position with a stop-loss,
//! take-profit and optional trailing stop.
//!
//! Backtesting and live trading share the same detection, planning and
//! trailing-stop code, so simulated results stay representative of live
//! behavior on the same candles.
//!
//! # Backtest example
//! ```no_run
//! use zonebreak::backtest::BacktestEngine;
//! use zonebreak::config::StrategyParams;
//!
//! let engine = BacktestEngine::new(StrategyParams::default(), 10_000.0);
//! let candles = vec![]; // load from the CSV cache
//! let report = engine.simulate_all(&candles);
//! println!("{} trades", report.trades.len());
//! ```

pub mod backtest;
pub mod binance;
pub mod common;
pub mod config;
pub mod data;
pub mod gateway;
pub mod indicators;
pub mod live;
pub mod notify;
pub mod planner;
pub mod trailing;
pub mod types;
pub mod zones;

pub use config::Config;
pub use types::*;

// Re-export the exchange client for convenience
pub use binance::BinanceFuturesClient;
