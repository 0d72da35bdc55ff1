//! Binance USD-M futures integration: REST client, typed responses and
//! per-symbol exchange filters

pub mod client;
pub mod filters;
pub mod types;

pub use client::{ApiError, BinanceFuturesClient, ClientConfig};
pub use filters::{ExchangeFilters, StopTooClose};
pub use types::{is_valid_interval, FuturesKline, FUTURES_INTERVALS};
