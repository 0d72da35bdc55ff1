//! Per-symbol live trading task
//!
//! One task per symbol: refreshes data, recomputes zones, watches for a
//! confirmed breakout, opens at most one position and hands trailing
//! management to a dedicated task. Errors on one cycle are logged and
//! retried on the next; a persistently failing symbol never takes the
//! others down.

use anyhow::{Context, Result};
use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::gateway::ExchangeGateway;
use crate::live::position::PositionManager;
use crate::live::trailing_task::TrailingStopTask;
use crate::live::SessionStats;
use crate::notify::Notifier;
use crate::trailing::{TrailingSettings, TrailingState};
use crate::{data, planner, zones, Candle, Symbol, Zone};

/// How many recent candles each breakout check pulls
const BREAKOUT_POLL_LIMIT: u32 = 20;

pub struct SymbolTrader {
    symbol: Symbol,
    config: Arc<Config>,
    gateway: Arc<dyn ExchangeGateway>,
    notifier: Arc<dyn Notifier>,
    stats: Arc<SessionStats>,
    positions: PositionManager,
    candles: Vec<Candle>,
    zones: Vec<Zone>,
    /// Zone backing the currently open position; only this zone is
    /// excluded from breakout monitoring, so a false breakout does not
    /// permanently burn its zone
    current_zone_id: Option<u32>,
    trailing_handle: Option<JoinHandle<()>>,
    last_refresh: Option<tokio::time::Instant>,
}

impl SymbolTrader {
    pub fn new(
        symbol: Symbol,
        config: Arc<Config>,
        gateway: Arc<dyn ExchangeGateway>,
        notifier: Arc<dyn Notifier>,
        stats: Arc<SessionStats>,
    ) -> Self {
        let positions = PositionManager::new(
            Arc::clone(&gateway),
            Arc::clone(&notifier),
            Arc::clone(&stats),
            symbol.clone(),
        );
        SymbolTrader {
            symbol,
            config,
            gateway,
            notifier,
            stats,
            positions,
            candles: Vec::new(),
            zones: Vec::new(),
            current_zone_id: None,
            trailing_handle: None,
            last_refresh: None,
        }
    }

    /// Margin setup, historical data load and the first zone pass
    pub async fn initialize(&mut self) -> Result<()> {
        info!("{} initializing", self.symbol);

        if let Err(e) = self.gateway.set_isolated_margin(&self.symbol).await {
            warn!("{} failed to set isolated margin: {}", self.symbol, e);
        }
        if let Err(e) = self
            .gateway
            .set_leverage(&self.symbol, self.config.trading.leverage)
            .await
        {
            warn!("{} failed to set leverage: {}", self.symbol, e);
        }

        let existing = self.gateway.open_positions(&self.symbol).await;
        if let Ok(positions) = existing {
            for p in &positions {
                warn!(
                    "{} found existing {} position: qty={:.6} @ {:.4}",
                    self.symbol, p.direction, p.quantity, p.entry_price
                );
            }
        }

        self.candles = data::ensure_history(
            self.gateway.as_ref(),
            &self.symbol,
            &self.config.trading.interval,
            self.config.trading.lookback_days,
            &self.config.backtest.data_dir,
        )
        .await
        .context("failed to load history")?;

        self.recompute_zones();
        Ok(())
    }

    /// Main loop; exits when the shutdown signal flips
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        if let Err(e) = self.initialize().await {
            error!("{} initialization failed: {:#}", self.symbol, e);
            return;
        }

        let update_interval = Duration::from_secs(self.config.trading.update_interval_secs);

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = sleep(update_interval) => {}
            }
            if *shutdown.borrow() {
                break;
            }

            if let Err(e) = self.cycle().await {
                // one bad cycle never kills the symbol's task
                error!("{} cycle error: {:#}", self.symbol, e);
            }
        }

        self.cleanup().await;
    }

    async fn cycle(&mut self) -> Result<()> {
        if self.positions.check_position_closed().await {
            self.current_zone_id = None;
            // the trailing task must be gone before any new entry so
            // stop updates never target a position they don't own
            if let Some(handle) = self.trailing_handle.take() {
                handle.abort();
            }
        }

        if !self.positions.has_tracked_position() {
            self.check_breakouts().await?;
        }

        let refresh_due = self
            .last_refresh
            .map(|at| at.elapsed().as_secs() >= self.config.trading.data_refresh_interval_secs)
            .unwrap_or(true);
        if refresh_due {
            self.refresh_data().await;
            self.last_refresh = Some(tokio::time::Instant::now());
        }

        Ok(())
    }

    fn recompute_zones(&mut self) {
        self.zones = zones::detect_zones(&self.candles, &self.config.strategy);
        debug!("{}: {} accumulation zone(s)", self.symbol, self.zones.len());
    }

    /// Newest zone that is eligible for breakout monitoring: already
    /// ended, not older than the age limit, and not backing the open
    /// position
    fn eligible_zone(&self) -> Option<&Zone> {
        let now = Utc::now();
        let max_age = ChronoDuration::hours(self.config.trading.zone_max_age_hours);
        self.zones
            .iter()
            .filter(|z| Some(z.id) != self.current_zone_id)
            .filter(|z| z.end < now && now - z.end <= max_age)
            .max_by_key(|z| z.end)
    }

    async fn check_breakouts(&mut self) -> Result<()> {
        if self.zones.is_empty() {
            return Ok(());
        }

        let recent = self
            .gateway
            .fetch_recent_candles(
                &self.symbol,
                &self.config.trading.interval,
                BREAKOUT_POLL_LIMIT,
            )
            .await
            .context("failed to fetch recent candles")?;

        // the forming candle never triggers an entry
        let now = Utc::now();
        let latest_closed = match recent.iter().rev().find(|c| c.is_closed(now)) {
            Some(c) => c.clone(),
            None => return Ok(()),
        };

        let existing = std::mem::take(&mut self.candles);
        self.candles = data::merge_candles(existing, recent);

        let zone = match self.eligible_zone() {
            Some(z) => z.clone(),
            None => return Ok(()),
        };

        if let Some(direction) = planner::breakout_direction(&zone, &latest_closed) {
            info!(
                "{} breakout detected: zone {} [{:.4}, {:.4}] {}",
                self.symbol, zone.id, zone.low, zone.high, direction
            );
            self.enter_position(&zone).await?;
        }

        Ok(())
    }

    async fn enter_position(&mut self, zone: &Zone) -> Result<()> {
        let balance = self
            .gateway
            .balance("USDT")
            .await
            .context("failed to read balance")?;

        let plan = match planner::plan_trade(zone, &self.candles, &self.config.strategy, balance) {
            Some(plan) => plan,
            None => {
                debug!("{} zone {} has no confirmed breakout yet", self.symbol, zone.id);
                return Ok(());
            }
        };

        let filters = self
            .gateway
            .exchange_filters(&self.symbol)
            .await
            .context("failed to read exchange filters")?;

        let quantity = filters.round_quantity(plan.position_size);
        if quantity <= 0.0 || !filters.validate_notional(plan.entry_price, quantity) {
            warn!(
                "{} entry rejected: qty {:.8} below exchange minimums",
                self.symbol, quantity
            );
            self.notifier
                .send_alert(&format!(
                    "[{}] Entry skipped: size below exchange minimum notional",
                    self.symbol
                ))
                .await;
            return Ok(());
        }

        if !self
            .positions
            .validate_margin(plan.entry_price, quantity, self.config.trading.leverage)
            .await
        {
            return Ok(());
        }

        let guard = self
            .positions
            .open_position(
                plan.direction,
                plan.entry_price,
                quantity,
                plan.stop_loss,
                plan.take_profit,
                zone.id,
            )
            .await?;

        self.current_zone_id = Some(zone.id);

        if self.config.strategy.use_trailing_stop {
            let state = TrailingState::new(
                plan.direction,
                plan.entry_price,
                plan.stop_loss,
                TrailingSettings::from(&self.config.strategy),
            );
            let task = TrailingStopTask::new(
                Arc::clone(&self.gateway),
                Arc::clone(&self.notifier),
                Arc::clone(&self.stats),
                self.symbol.clone(),
                self.config.trading.interval.clone(),
                plan.direction,
                plan.entry_price,
                quantity,
                state,
                guard,
                Duration::from_secs(self.config.trading.update_interval_secs),
            );
            self.trailing_handle = Some(tokio::spawn(task.run()));
            info!("{} trailing stop task spawned", self.symbol);
        }

        Ok(())
    }

    async fn refresh_data(&mut self) {
        let limit = data::candles_needed(
            &self.config.trading.interval,
            self.config.trading.lookback_days,
            1_500,
        );
        match self
            .gateway
            .fetch_recent_candles(&self.symbol, &self.config.trading.interval, limit)
            .await
        {
            Ok(fresh) if !fresh.is_empty() => {
                let existing = std::mem::take(&mut self.candles);
                self.candles = data::merge_candles(existing, fresh);
                self.recompute_zones();
            }
            Ok(_) => {}
            Err(e) => warn!("{} data refresh failed: {}", self.symbol, e),
        }
    }

    async fn cleanup(&mut self) {
        info!("{} shutting down", self.symbol);
        if let Some(handle) = self.trailing_handle.take() {
            if !handle.is_finished() {
                handle.abort();
            }
        }
    }
}
