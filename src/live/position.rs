//! Live position management
//!
//! Owns the single open position a symbol is allowed, detects external
//! closure (stop or take-profit filled on the venue) and runs the
//! close-out sequence exactly once even when the trailing task observes
//! the same closure concurrently.

use anyhow::{bail, Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

use crate::gateway::ExchangeGateway;
use crate::live::SessionStats;
use crate::notify::{ClosedEvent, Notifier, OpenedEvent};
use crate::{Direction, Symbol};

/// Consecutive zero-quantity polls required before a closure is trusted;
/// a single empty read may be a transient API glitch
const CLOSE_CONFIRM_POLLS: u32 = 2;

/// Flags shared between the position manager and the trailing task for
/// one open position. Whoever claims the guard first runs the close-out
/// sequence; the loser does nothing.
#[derive(Debug, Default)]
pub struct PositionGuard {
    close_handled: AtomicBool,
    trailing_active: AtomicBool,
}

impl PositionGuard {
    /// True exactly once per position
    pub fn claim_close(&self) -> bool {
        !self.close_handled.swap(true, Ordering::SeqCst)
    }

    pub fn mark_trailing_active(&self) {
        self.trailing_active.store(true, Ordering::SeqCst);
    }

    pub fn trailing_active(&self) -> bool {
        self.trailing_active.load(Ordering::SeqCst)
    }
}

/// The one position this symbol's task currently holds
#[derive(Debug, Clone)]
pub struct TrackedPosition {
    pub direction: Direction,
    pub entry_price: f64,
    pub quantity: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub zone_id: u32,
    pub guard: Arc<PositionGuard>,
}

pub struct PositionManager {
    gateway: Arc<dyn ExchangeGateway>,
    notifier: Arc<dyn Notifier>,
    stats: Arc<SessionStats>,
    symbol: Symbol,
    tracked: Option<TrackedPosition>,
    empty_polls: u32,
}

impl PositionManager {
    pub fn new(
        gateway: Arc<dyn ExchangeGateway>,
        notifier: Arc<dyn Notifier>,
        stats: Arc<SessionStats>,
        symbol: Symbol,
    ) -> Self {
        PositionManager {
            gateway,
            notifier,
            stats,
            symbol,
            tracked: None,
            empty_polls: 0,
        }
    }

    pub fn tracked(&self) -> Option<&TrackedPosition> {
        self.tracked.as_ref()
    }

    pub fn has_tracked_position(&self) -> bool {
        self.tracked.is_some()
    }

    /// Open a position with protective orders, enforcing one position per
    /// symbol. Returns the guard shared with the trailing task.
    #[allow(clippy::too_many_arguments)]
    pub async fn open_position(
        &mut self,
        direction: Direction,
        entry_price: f64,
        quantity: f64,
        stop_loss: f64,
        take_profit: f64,
        zone_id: u32,
    ) -> Result<Arc<PositionGuard>> {
        if self.tracked.is_some() {
            bail!("{} already has an open position", self.symbol);
        }

        self.gateway
            .open_position(&self.symbol, direction, quantity)
            .await
            .context("failed to open position")?;

        let closing_side = direction.closing_side();
        self.gateway
            .place_stop(&self.symbol, closing_side, quantity, stop_loss)
            .await
            .context("failed to place stop loss")?;
        self.gateway
            .place_take_profit(&self.symbol, closing_side, quantity, take_profit)
            .await
            .context("failed to place take profit")?;

        info!(
            "{} {} opened: qty={:.6} entry={:.4} SL={:.4} TP={:.4}",
            self.symbol, direction, quantity, entry_price, stop_loss, take_profit
        );

        let guard = Arc::new(PositionGuard::default());
        self.tracked = Some(TrackedPosition {
            direction,
            entry_price,
            quantity,
            stop_loss,
            take_profit,
            zone_id,
            guard: Arc::clone(&guard),
        });
        self.empty_polls = 0;

        self.notifier
            .notify_position_opened(&OpenedEvent {
                symbol: self.symbol.clone(),
                direction,
                entry_price,
                quantity,
                stop_loss,
                take_profit,
                zone_id,
            })
            .await;

        Ok(guard)
    }

    /// Poll the venue and handle an external closure once it is confirmed
    /// by more than one consecutive empty read. Returns true when the
    /// position was finalized on this call.
    pub async fn check_position_closed(&mut self) -> bool {
        let tracked = match &self.tracked {
            Some(t) => t.clone(),
            None => return false,
        };

        match self.gateway.open_positions(&self.symbol).await {
            Ok(positions) => {
                let live_qty: f64 = positions.iter().map(|p| p.quantity).sum();
                if live_qty > 0.0 {
                    self.empty_polls = 0;
                    return false;
                }
                self.empty_polls += 1;
                if self.empty_polls < CLOSE_CONFIRM_POLLS {
                    info!(
                        "{} position read empty ({}/{}), awaiting confirmation",
                        self.symbol, self.empty_polls, CLOSE_CONFIRM_POLLS
                    );
                    return false;
                }
            }
            Err(e) => {
                // a failed read is not evidence of closure
                warn!("{} position poll failed: {}", self.symbol, e);
                self.empty_polls = 0;
                return false;
            }
        }

        finalize_closed_position(
            self.gateway.as_ref(),
            self.notifier.as_ref(),
            &self.stats,
            &self.symbol,
            tracked.direction,
            tracked.entry_price,
            tracked.quantity,
            &tracked.guard,
        )
        .await;

        self.tracked = None;
        self.empty_polls = 0;
        true
    }

    /// Required margin must fit inside the available balance. A failed or
    /// timed-out margin read degrades to "assume sufficient" with a
    /// warning rather than blocking the entry.
    pub async fn validate_margin(&self, entry_price: f64, quantity: f64, leverage: u32) -> bool {
        let required = entry_price * quantity / leverage.max(1) as f64;

        let available = match self.gateway.available_margin(&self.symbol).await {
            Ok(amount) => amount,
            Err(e) => {
                warn!(
                    "{} margin read failed, assuming sufficient: {}",
                    self.symbol, e
                );
                return true;
            }
        };

        if required > available {
            warn!(
                "{} insufficient margin: required {:.2}, available {:.2}",
                self.symbol, required, available
            );
            self.notifier
                .send_alert(&format!(
                    "[{}] Insufficient margin\nRequired: ${:.2}\nAvailable: ${:.2}",
                    self.symbol, required, available
                ))
                .await;
            return false;
        }
        true
    }
}

/// Close-out sequence for an externally closed position, in order:
/// best-effort exit price, P&L, exit classification, one notification,
/// then cancellation of remaining protective orders. The guard makes the
/// whole sequence idempotent across the manager and the trailing task.
#[allow(clippy::too_many_arguments)]
pub async fn finalize_closed_position(
    gateway: &dyn ExchangeGateway,
    notifier: &dyn Notifier,
    stats: &SessionStats,
    symbol: &Symbol,
    direction: Direction,
    entry_price: f64,
    quantity: f64,
    guard: &PositionGuard,
) {
    if !guard.claim_close() {
        return;
    }

    let exit_price = match gateway.current_price(symbol).await {
        Ok(price) => price,
        Err(e) => {
            warn!(
                "{} exit price read failed, falling back to entry: {}",
                symbol, e
            );
            entry_price
        }
    };

    let pnl = match direction {
        Direction::Long => (exit_price - entry_price) * quantity,
        Direction::Short => (entry_price - exit_price) * quantity,
    };

    let by_trailing = guard.trailing_active();
    let reason = if by_trailing {
        "Trailing Stop"
    } else if pnl > 0.0 {
        "Take Profit"
    } else {
        "Stop Loss"
    };

    info!(
        "{} position closed: exit={:.4} pnl={:+.2} ({})",
        symbol, exit_price, pnl, reason
    );

    notifier
        .notify_position_closed(&ClosedEvent {
            symbol: symbol.clone(),
            direction,
            entry_price,
            exit_price,
            quantity,
            pnl,
            by_trailing,
            reason: reason.to_string(),
        })
        .await;

    stats.record_close(pnl, by_trailing);

    if let Err(e) = gateway.cancel_conditional_orders(symbol).await {
        warn!("{} failed to cancel protective orders: {}", symbol, e);
    }
}
