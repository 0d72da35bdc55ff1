//! Live trailing-stop task
//!
//! Drives the shared `trailing::TrailingState` with one polled candle at
//! a time and mirrors the backtest semantics on the same data. When the
//! internal stop moves far enough, the task asks the exchange to replace
//! the protective stop; a rejected replacement (stop too close to the
//! market) keeps the previous stop and is retried on a later candle.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::binance::StopTooClose;
use crate::gateway::ExchangeGateway;
use crate::live::position::{finalize_closed_position, PositionGuard};
use crate::live::SessionStats;
use crate::notify::{Notifier, TrailingEvent};
use crate::trailing::TrailingState;
use crate::{Direction, Symbol};

/// Stop changes at or below this absolute size skip the exchange call
const MIN_STOP_DELTA: f64 = 0.01;

/// Consecutive empty position polls before the closure path runs
const CLOSE_CONFIRM_POLLS: u32 = 2;

pub struct TrailingStopTask {
    gateway: Arc<dyn ExchangeGateway>,
    notifier: Arc<dyn Notifier>,
    stats: Arc<SessionStats>,
    symbol: Symbol,
    interval: String,
    direction: Direction,
    entry_price: f64,
    quantity: f64,
    state: TrailingState,
    guard: Arc<PositionGuard>,
    /// Stop currently resting on the venue
    exchange_stop: f64,
    update_interval: Duration,
}

impl TrailingStopTask {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        gateway: Arc<dyn ExchangeGateway>,
        notifier: Arc<dyn Notifier>,
        stats: Arc<SessionStats>,
        symbol: Symbol,
        interval: String,
        direction: Direction,
        entry_price: f64,
        quantity: f64,
        state: TrailingState,
        guard: Arc<PositionGuard>,
        update_interval: Duration,
    ) -> Self {
        let exchange_stop = state.current_stop();
        TrailingStopTask {
            gateway,
            notifier,
            stats,
            symbol,
            interval,
            direction,
            entry_price,
            quantity,
            state,
            guard,
            exchange_stop,
            update_interval,
        }
    }

    /// Run until the position disappears from the venue
    pub async fn run(mut self) {
        info!(
            "{} trailing task started: entry={:.4} stop={:.4} threshold={:.4}",
            self.symbol,
            self.entry_price,
            self.state.current_stop(),
            self.state.activation_threshold()
        );

        let mut empty_polls: u32 = 0;

        loop {
            match self.position_quantity().await {
                Some(qty) if qty > 0.0 => empty_polls = 0,
                Some(_) => {
                    empty_polls += 1;
                    if empty_polls >= CLOSE_CONFIRM_POLLS {
                        finalize_closed_position(
                            self.gateway.as_ref(),
                            self.notifier.as_ref(),
                            &self.stats,
                            &self.symbol,
                            self.direction,
                            self.entry_price,
                            self.quantity,
                            &self.guard,
                        )
                        .await;
                        break;
                    }
                }
                // a failed read is treated as "position still there"
                None => empty_polls = 0,
            }

            if let Some((high, low, close)) = self.latest_closed_candle().await {
                self.observe(high, low, close).await;
            }

            sleep(self.update_interval).await;
        }

        info!("{} trailing task stopped", self.symbol);
    }

    async fn position_quantity(&self) -> Option<f64> {
        match self.gateway.open_positions(&self.symbol).await {
            Ok(positions) => Some(positions.iter().map(|p| p.quantity).sum()),
            Err(e) => {
                warn!("{} trailing position poll failed: {}", self.symbol, e);
                None
            }
        }
    }

    async fn latest_closed_candle(&self) -> Option<(f64, f64, f64)> {
        match self
            .gateway
            .fetch_recent_candles(&self.symbol, &self.interval, 2)
            .await
        {
            Ok(candles) => {
                let now = Utc::now();
                candles
                    .iter()
                    .rev()
                    .find(|c| c.is_closed(now))
                    .map(|c| (c.high, c.low, c.close))
            }
            Err(e) => {
                warn!("{} trailing candle fetch failed: {}", self.symbol, e);
                None
            }
        }
    }

    /// Feed one candle through the state machine and sync the venue stop
    async fn observe(&mut self, high: f64, low: f64, close: f64) {
        let update = self.state.observe_bar(high, low, close);

        if update.activated {
            self.guard.mark_trailing_active();
            info!(
                "{} trailing activated at stop {:.4}",
                self.symbol,
                self.state.current_stop()
            );
            self.notifier
                .notify_trailing_activated(&TrailingEvent {
                    symbol: self.symbol.clone(),
                    direction: self.direction,
                    entry_price: self.entry_price,
                    current_price: close,
                    stop_price: self.state.current_stop(),
                    rr_ratio: self.state.settings().activate_rr,
                })
                .await;
        }

        if !self.state.is_active() {
            return;
        }

        let new_stop = self.state.current_stop();
        if (new_stop - self.exchange_stop).abs() <= MIN_STOP_DELTA {
            return;
        }

        let side = self.direction.closing_side();
        match self
            .gateway
            .replace_stop(&self.symbol, side, self.quantity, new_stop, close)
            .await
        {
            Ok(_) => {
                info!(
                    "{} stop replaced: {:.4} -> {:.4}",
                    self.symbol, self.exchange_stop, new_stop
                );
                self.exchange_stop = new_stop;
            }
            Err(e) => {
                if let Some(too_close) = e.downcast_ref::<StopTooClose>() {
                    warn!(
                        "{} stop replacement rejected, keeping {:.4}: {}",
                        self.symbol, self.exchange_stop, too_close
                    );
                } else {
                    warn!("{} stop replacement failed: {}", self.symbol, e);
                }
            }
        }
    }
}
