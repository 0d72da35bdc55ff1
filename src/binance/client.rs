//! Binance USD-M futures API client
//!
//! Public market data needs no credentials; trading endpoints sign each
//! request with HMAC-SHA256. All calls go through a shared token-bucket
//! rate limiter and bounded retry with exponential backoff. Per-symbol
//! exchange filters are cached for the lifetime of the client and ticker
//! prices are cached for one second to keep request volume down.

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::Client;
use sha2::Sha256;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use super::filters::ExchangeFilters;
use super::types::{
    FuturesKline, RawBalance, RawExchangeInfo, RawOpenOrder, RawOrderAck, RawPositionRisk,
    RawTickerPrice,
};
use crate::common::RateLimiter;
use crate::gateway::{ExchangeGateway, OrderReceipt, PositionSnapshot};
use crate::{Candle, Direction, OrderSide, Symbol};

/// Base URL for the USD-M futures API
const FUTURES_API_BASE: &str = "https://fapi.binance.com";

/// Maximum klines per request (exchange limit)
const MAX_KLINES_PER_REQUEST: u32 = 1500;

/// How long a cached ticker price stays fresh
const TICKER_CACHE_TTL: Duration = Duration::from_secs(1);

/// Error code returned when the margin type is already what we asked for
const ERR_NO_NEED_TO_CHANGE_MARGIN: i64 = -4046;

type HmacSha256 = Hmac<Sha256>;

/// Error reported by the exchange itself (as opposed to transport)
#[derive(Debug, Error, Clone)]
#[error("exchange error {code}: {msg}")]
pub struct ApiError {
    pub code: i64,
    pub msg: String,
}

/// Client construction options
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
    pub rate_limit_per_sec: u32,
    pub timeout: Duration,
    pub max_retries: u32,
    pub recv_window_ms: u64,
    /// Log instead of placing real orders
    pub dry_run: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            api_key: None,
            api_secret: None,
            rate_limit_per_sec: 10,
            timeout: Duration::from_secs(15),
            max_retries: 3,
            recv_window_ms: 5_000,
            dry_run: false,
        }
    }
}

impl ClientConfig {
    pub fn with_credentials(mut self, key: impl Into<String>, secret: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self.api_secret = Some(secret.into());
        self
    }

    pub fn with_rate_limit(mut self, per_sec: u32) -> Self {
        self.rate_limit_per_sec = per_sec;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}

/// Binance USD-M futures client
#[derive(Clone)]
pub struct BinanceFuturesClient {
    http: Client,
    config: ClientConfig,
    rate_limiter: RateLimiter,
    ticker_cache: Arc<Mutex<HashMap<String, (f64, Instant)>>>,
    filters_cache: Arc<Mutex<HashMap<String, ExchangeFilters>>>,
}

impl BinanceFuturesClient {
    pub fn new(config: ClientConfig) -> Self {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .expect("Failed to build HTTP client");

        BinanceFuturesClient {
            http,
            rate_limiter: RateLimiter::per_second(config.rate_limit_per_sec),
            ticker_cache: Arc::new(Mutex::new(HashMap::new())),
            filters_cache: Arc::new(Mutex::new(HashMap::new())),
            config,
        }
    }

    fn api_key(&self) -> Result<&str> {
        self.config
            .api_key
            .as_deref()
            .ok_or_else(|| anyhow!("BINANCE_API_KEY is not configured"))
    }

    fn sign(&self, query: &str) -> Result<String> {
        let secret = self
            .config
            .api_secret
            .as_deref()
            .ok_or_else(|| anyhow!("BINANCE_API_SECRET is not configured"))?;
        let mut mac =
            HmacSha256::new_from_slice(secret.as_bytes()).context("invalid API secret")?;
        mac.update(query.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Run a request closure with rate limiting and exponential backoff.
    /// Exchange-reported errors are not retried; transport errors are.
    async fn with_retry<F, Fut, T>(&self, operation: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(2u64.pow(attempt - 1));
                debug!("retrying after {}ms", delay.as_millis());
                sleep(delay).await;
            }

            self.rate_limiter.acquire().await;

            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    if e.downcast_ref::<ApiError>().is_some() {
                        return Err(e);
                    }
                    warn!(
                        "request failed (attempt {}/{}): {}",
                        attempt + 1,
                        self.config.max_retries + 1,
                        e
                    );
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow!("request failed")))
    }

    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T> {
        let status = response.status();
        let body = response.text().await.context("failed to read response")?;
        if !status.is_success() {
            #[derive(serde::Deserialize)]
            struct ErrBody {
                code: i64,
                msg: String,
            }
            if let Ok(err) = serde_json::from_str::<ErrBody>(&body) {
                return Err(ApiError {
                    code: err.code,
                    msg: err.msg,
                }
                .into());
            }
            bail!("HTTP {}: {}", status, body);
        }
        serde_json::from_str(&body).with_context(|| format!("unexpected response: {}", body))
    }

    async fn public_get<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T> {
        let url = format!("{}{}", FUTURES_API_BASE, path);
        let response = self
            .http
            .get(&url)
            .query(params)
            .send()
            .await
            .context("request failed")?;
        Self::parse_response(response).await
    }

    async fn signed_request<T: serde::de::DeserializeOwned>(
        &self,
        method: reqwest::Method,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T> {
        let timestamp = Utc::now().timestamp_millis();
        let mut query: Vec<String> = params
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        query.push(format!("recvWindow={}", self.config.recv_window_ms));
        query.push(format!("timestamp={}", timestamp));
        let query = query.join("&");
        let signature = self.sign(&query)?;

        let url = format!(
            "{}{}?{}&signature={}",
            FUTURES_API_BASE, path, query, signature
        );
        let response = self
            .http
            .request(method, &url)
            .header("X-MBX-APIKEY", self.api_key()?)
            .send()
            .await
            .context("request failed")?;
        Self::parse_response(response).await
    }

    /// Fetch one page of klines
    pub async fn get_klines(
        &self,
        symbol: &str,
        interval: &str,
        start_time: Option<i64>,
        end_time: Option<i64>,
        limit: Option<u32>,
    ) -> Result<Vec<FuturesKline>> {
        let mut params = vec![
            ("symbol", symbol.to_string()),
            ("interval", interval.to_string()),
        ];
        if let Some(start) = start_time {
            params.push(("startTime", start.to_string()));
        }
        if let Some(end) = end_time {
            params.push(("endTime", end.to_string()));
        }
        let limit = limit
            .unwrap_or(MAX_KLINES_PER_REQUEST)
            .min(MAX_KLINES_PER_REQUEST);
        params.push(("limit", limit.to_string()));

        let raw: Vec<Vec<serde_json::Value>> = self
            .with_retry(|| self.public_get("/fapi/v1/klines", &params))
            .await?;

        Ok(raw.iter().filter_map(|row| FuturesKline::from_raw(row)).collect())
    }

    /// Paginate through a full time range of klines
    pub async fn fetch_history(
        &self,
        symbol: &str,
        interval: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<FuturesKline>> {
        let end_ms = end.timestamp_millis();
        let mut current_start = start.timestamp_millis();
        let mut all = Vec::new();

        info!("fetching {} {} history", symbol, interval);

        while current_start < end_ms {
            let klines = self
                .get_klines(
                    symbol,
                    interval,
                    Some(current_start),
                    Some(end_ms),
                    Some(MAX_KLINES_PER_REQUEST),
                )
                .await?;

            if klines.is_empty() {
                break;
            }
            current_start = klines.last().map(|k| k.open_time + 1).unwrap_or(end_ms);
            all.extend(klines);
        }

        all.sort_by_key(|k| k.open_time);
        all.dedup_by_key(|k| k.open_time);

        info!("fetched {} candles for {} {}", all.len(), symbol, interval);
        Ok(all)
    }

    /// Current price with a 1-second cache. On a failed read the last
    /// cached price is served with a warning; if nothing was ever cached
    /// the failure propagates so callers can tell it apart from a real
    /// zero.
    pub async fn ticker_price(&self, symbol: &str) -> Result<f64> {
        {
            let cache = self.ticker_cache.lock().await;
            if let Some((price, at)) = cache.get(symbol) {
                if at.elapsed() < TICKER_CACHE_TTL {
                    return Ok(*price);
                }
            }
        }

        let params = [("symbol", symbol.to_string())];
        let fetched: Result<RawTickerPrice> = self
            .with_retry(|| self.public_get("/fapi/v1/ticker/price", &params))
            .await;

        match fetched {
            Ok(ticker) => {
                let price: f64 = ticker.price.parse().context("unparseable ticker price")?;
                let mut cache = self.ticker_cache.lock().await;
                cache.insert(symbol.to_string(), (price, Instant::now()));
                Ok(price)
            }
            Err(e) => {
                let cache = self.ticker_cache.lock().await;
                if let Some((price, _)) = cache.get(symbol) {
                    warn!("{} price read failed, serving stale cache: {}", symbol, e);
                    Ok(*price)
                } else {
                    Err(e)
                }
            }
        }
    }

    /// Exchange filters, cached for the lifetime of the client
    pub async fn symbol_filters(&self, symbol: &str) -> Result<ExchangeFilters> {
        {
            let cache = self.filters_cache.lock().await;
            if let Some(filters) = cache.get(symbol) {
                return Ok(*filters);
            }
        }

        let params = [("symbol", symbol.to_string())];
        let info: RawExchangeInfo = self
            .with_retry(|| self.public_get("/fapi/v1/exchangeInfo", &params))
            .await?;

        let symbol_info = info
            .symbols
            .iter()
            .find(|s| s.symbol == symbol)
            .ok_or_else(|| anyhow!("symbol {} not found in exchange info", symbol))?;

        let mut filters = ExchangeFilters::default();
        for f in &symbol_info.filters {
            match f.filter_type.as_str() {
                "PRICE_FILTER" => {
                    filters.price_tick = parse_opt(&f.tick_size);
                }
                "LOT_SIZE" => {
                    filters.quantity_step = parse_opt(&f.step_size);
                    filters.min_quantity = parse_opt(&f.min_qty);
                }
                "MIN_NOTIONAL" => {
                    filters.min_notional = parse_opt(&f.notional);
                }
                _ => {}
            }
        }

        let mut cache = self.filters_cache.lock().await;
        cache.insert(symbol.to_string(), filters);
        Ok(filters)
    }

    async fn market_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: f64,
    ) -> Result<OrderReceipt> {
        let filters = self.symbol_filters(symbol).await?;
        let qty_str = filters.format_quantity(quantity);

        if self.config.dry_run {
            info!("[dry-run] {} {} {}", side.as_str(), qty_str, symbol);
            return Ok(dry_run_receipt());
        }

        let params = [
            ("symbol", symbol.to_string()),
            ("side", side.as_str().to_string()),
            ("type", "MARKET".to_string()),
            ("quantity", qty_str),
        ];
        let ack: RawOrderAck = self
            .with_retry(|| self.signed_request(reqwest::Method::POST, "/fapi/v1/order", &params))
            .await?;
        Ok(receipt(ack))
    }

    async fn conditional_order(
        &self,
        symbol: &str,
        side: OrderSide,
        order_type: &str,
        quantity: f64,
        trigger_price: f64,
    ) -> Result<OrderReceipt> {
        let filters = self.symbol_filters(symbol).await?;
        let trigger = filters.round_price(trigger_price);

        if self.config.dry_run {
            info!(
                "[dry-run] {} {} {} @ {}",
                order_type,
                side.as_str(),
                symbol,
                filters.format_price(trigger)
            );
            return Ok(dry_run_receipt());
        }

        let params = [
            ("symbol", symbol.to_string()),
            ("side", side.as_str().to_string()),
            ("type", order_type.to_string()),
            ("stopPrice", filters.format_price(trigger)),
            ("quantity", filters.format_quantity(quantity)),
        ];
        let ack: RawOrderAck = self
            .with_retry(|| self.signed_request(reqwest::Method::POST, "/fapi/v1/order", &params))
            .await?;
        Ok(receipt(ack))
    }

    async fn get_open_orders(&self, symbol: &str) -> Result<Vec<RawOpenOrder>> {
        if self.config.dry_run {
            return Ok(Vec::new());
        }
        let params = [("symbol", symbol.to_string())];
        self.with_retry(|| {
            self.signed_request(reqwest::Method::GET, "/fapi/v1/openOrders", &params)
        })
        .await
    }

    async fn cancel_order(&self, symbol: &str, order_id: u64) -> Result<()> {
        let params = [
            ("symbol", symbol.to_string()),
            ("orderId", order_id.to_string()),
        ];
        let _: serde_json::Value = self
            .with_retry(|| {
                self.signed_request(reqwest::Method::DELETE, "/fapi/v1/order", &params)
            })
            .await?;
        Ok(())
    }

    /// Cancel only STOP orders, leaving take-profits in place
    async fn cancel_stop_orders(&self, symbol: &str) -> Result<()> {
        for order in self.get_open_orders(symbol).await? {
            if matches!(order.order_type.as_str(), "STOP" | "STOP_MARKET") {
                if let Err(e) = self.cancel_order(symbol, order.order_id).await {
                    warn!("failed to cancel stop order {}: {}", order.order_id, e);
                }
            }
        }
        Ok(())
    }
}

fn parse_opt(value: &Option<String>) -> f64 {
    value
        .as_deref()
        .and_then(|v| v.parse().ok())
        .unwrap_or(0.0)
}

fn receipt(ack: RawOrderAck) -> OrderReceipt {
    OrderReceipt {
        order_id: ack.order_id,
        status: ack.status,
    }
}

fn dry_run_receipt() -> OrderReceipt {
    OrderReceipt {
        order_id: 0,
        status: "DRY_RUN".to_string(),
    }
}

#[async_trait::async_trait]
impl ExchangeGateway for BinanceFuturesClient {
    async fn fetch_historical_candles(
        &self,
        symbol: &Symbol,
        interval: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Candle>> {
        let klines = self.fetch_history(symbol.as_str(), interval, start, end).await?;
        Ok(klines
            .into_iter()
            .filter_map(|k| Candle::try_from(k).ok())
            .collect())
    }

    async fn fetch_recent_candles(
        &self,
        symbol: &Symbol,
        interval: &str,
        limit: u32,
    ) -> Result<Vec<Candle>> {
        let klines = self
            .get_klines(symbol.as_str(), interval, None, None, Some(limit))
            .await?;
        Ok(klines
            .into_iter()
            .filter_map(|k| Candle::try_from(k).ok())
            .collect())
    }

    async fn current_price(&self, symbol: &Symbol) -> Result<f64> {
        self.ticker_price(symbol.as_str()).await
    }

    async fn exchange_filters(&self, symbol: &Symbol) -> Result<ExchangeFilters> {
        self.symbol_filters(symbol.as_str()).await
    }

    async fn open_position(
        &self,
        symbol: &Symbol,
        direction: Direction,
        quantity: f64,
    ) -> Result<OrderReceipt> {
        let side = match direction {
            Direction::Long => OrderSide::Buy,
            Direction::Short => OrderSide::Sell,
        };
        self.market_order(symbol.as_str(), side, quantity).await
    }

    async fn place_stop(
        &self,
        symbol: &Symbol,
        side: OrderSide,
        quantity: f64,
        stop_price: f64,
    ) -> Result<OrderReceipt> {
        self.conditional_order(symbol.as_str(), side, "STOP_MARKET", quantity, stop_price)
            .await
    }

    async fn place_take_profit(
        &self,
        symbol: &Symbol,
        side: OrderSide,
        quantity: f64,
        tp_price: f64,
    ) -> Result<OrderReceipt> {
        self.conditional_order(
            symbol.as_str(),
            side,
            "TAKE_PROFIT_MARKET",
            quantity,
            tp_price,
        )
        .await
    }

    async fn replace_stop(
        &self,
        symbol: &Symbol,
        side: OrderSide,
        quantity: f64,
        new_stop: f64,
        current_price_hint: f64,
    ) -> Result<OrderReceipt> {
        let filters = self.symbol_filters(symbol.as_str()).await?;
        let rounded = filters.round_price(new_stop);
        // fail fast before touching any order
        filters.validate_stop_distance(rounded, current_price_hint, side == OrderSide::Sell)?;

        self.cancel_stop_orders(symbol.as_str()).await?;
        self.conditional_order(symbol.as_str(), side, "STOP_MARKET", quantity, rounded)
            .await
    }

    async fn cancel_conditional_orders(&self, symbol: &Symbol) -> Result<()> {
        let orders = self.get_open_orders(symbol.as_str()).await?;
        let conditional: Vec<_> = orders.into_iter().filter(|o| o.is_conditional()).collect();
        if conditional.is_empty() {
            debug!("{} has no conditional orders to cancel", symbol);
            return Ok(());
        }
        for order in conditional {
            match self.cancel_order(symbol.as_str(), order.order_id).await {
                Ok(()) => info!("cancelled {} order {}", order.order_type, order.order_id),
                Err(e) => {
                    // an already-filled or already-cancelled order is fine
                    if let Some(api) = e.downcast_ref::<ApiError>() {
                        debug!("order {} already gone: {}", order.order_id, api);
                    } else {
                        warn!("failed to cancel order {}: {}", order.order_id, e);
                    }
                }
            }
        }
        Ok(())
    }

    async fn open_positions(&self, symbol: &Symbol) -> Result<Vec<PositionSnapshot>> {
        let params = [("symbol", symbol.as_str().to_string())];
        let raw: Vec<RawPositionRisk> = self
            .with_retry(|| {
                self.signed_request(reqwest::Method::GET, "/fapi/v2/positionRisk", &params)
            })
            .await?;

        Ok(raw
            .into_iter()
            .filter_map(|p| {
                let amt: f64 = p.position_amt.parse().ok()?;
                if amt == 0.0 {
                    return None;
                }
                Some(PositionSnapshot {
                    direction: if amt > 0.0 {
                        Direction::Long
                    } else {
                        Direction::Short
                    },
                    entry_price: p.entry_price.parse().ok()?,
                    quantity: amt.abs(),
                    unrealized_pnl: p.unrealized_profit.parse().unwrap_or(0.0),
                })
            })
            .collect())
    }

    async fn available_margin(&self, _symbol: &Symbol) -> Result<f64> {
        self.balance_of("USDT", true).await
    }

    async fn balance(&self, asset: &str) -> Result<f64> {
        self.balance_of(asset, false).await
    }

    async fn set_leverage(&self, symbol: &Symbol, leverage: u32) -> Result<()> {
        if self.config.dry_run {
            info!("[dry-run] set leverage {}x for {}", leverage, symbol);
            return Ok(());
        }
        let params = [
            ("symbol", symbol.as_str().to_string()),
            ("leverage", leverage.to_string()),
        ];
        let _: serde_json::Value = self
            .with_retry(|| {
                self.signed_request(reqwest::Method::POST, "/fapi/v1/leverage", &params)
            })
            .await?;
        Ok(())
    }

    async fn set_isolated_margin(&self, symbol: &Symbol) -> Result<()> {
        if self.config.dry_run {
            info!("[dry-run] set isolated margin for {}", symbol);
            return Ok(());
        }
        let params = [
            ("symbol", symbol.as_str().to_string()),
            ("marginType", "ISOLATED".to_string()),
        ];
        let result: Result<serde_json::Value> = self
            .with_retry(|| {
                self.signed_request(reqwest::Method::POST, "/fapi/v1/marginType", &params)
            })
            .await;
        match result {
            Ok(_) => Ok(()),
            Err(e) => match e.downcast_ref::<ApiError>() {
                Some(api) if api.code == ERR_NO_NEED_TO_CHANGE_MARGIN => Ok(()),
                _ => Err(e),
            },
        }
    }
}

impl BinanceFuturesClient {
    async fn balance_of(&self, asset: &str, available: bool) -> Result<f64> {
        let balances: Vec<RawBalance> = self
            .with_retry(|| self.signed_request(reqwest::Method::GET, "/fapi/v2/balance", &[]))
            .await?;
        let entry = balances
            .iter()
            .find(|b| b.asset == asset)
            .ok_or_else(|| anyhow!("no balance entry for {}", asset))?;
        let value = if available {
            &entry.available_balance
        } else {
            &entry.balance
        };
        value.parse().context("unparseable balance")
    }
}
