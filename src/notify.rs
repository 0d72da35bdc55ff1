//! Event notifications
//!
//! The core fires these at most once per logical event and never lets a
//! delivery failure affect trading, so every method is infallible from
//! the caller's perspective; implementations log their own errors.

use async_trait::async_trait;
use tracing::{info, warn};

use crate::{Direction, Symbol};

/// Details for a position-opened notification
#[derive(Debug, Clone)]
pub struct OpenedEvent {
    pub symbol: Symbol,
    pub direction: Direction,
    pub entry_price: f64,
    pub quantity: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub zone_id: u32,
}

/// Details for a position-closed notification
#[derive(Debug, Clone)]
pub struct ClosedEvent {
    pub symbol: Symbol,
    pub direction: Direction,
    pub entry_price: f64,
    pub exit_price: f64,
    pub quantity: f64,
    pub pnl: f64,
    pub by_trailing: bool,
    pub reason: String,
}

/// Details for a trailing-activated notification
#[derive(Debug, Clone)]
pub struct TrailingEvent {
    pub symbol: Symbol,
    pub direction: Direction,
    pub entry_price: f64,
    pub current_price: f64,
    pub stop_price: f64,
    pub rr_ratio: f64,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_position_opened(&self, event: &OpenedEvent);
    async fn notify_position_closed(&self, event: &ClosedEvent);
    async fn notify_trailing_activated(&self, event: &TrailingEvent);
    /// Free-form alert (margin problems, rejected orders)
    async fn send_alert(&self, text: &str);
}

/// Discards every notification; used when Telegram is not configured
pub struct NullNotifier;

#[async_trait]
impl Notifier for NullNotifier {
    async fn notify_position_opened(&self, event: &OpenedEvent) {
        info!(
            "{} {} opened @ {:.4} (qty {:.6}, SL {:.4}, TP {:.4})",
            event.symbol, event.direction, event.entry_price, event.quantity,
            event.stop_loss, event.take_profit
        );
    }

    async fn notify_position_closed(&self, event: &ClosedEvent) {
        info!(
            "{} {} closed @ {:.4} (P&L {:+.2}, {})",
            event.symbol, event.direction, event.exit_price, event.pnl, event.reason
        );
    }

    async fn notify_trailing_activated(&self, event: &TrailingEvent) {
        info!(
            "{} trailing activated (price {:.4}, stop {:.4})",
            event.symbol, event.current_price, event.stop_price
        );
    }

    async fn send_alert(&self, text: &str) {
        info!("alert: {}", text);
    }
}

/// Sends notifications through the Telegram Bot API
pub struct TelegramNotifier {
    http: reqwest::Client,
    token: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(token: impl Into<String>, chat_id: impl Into<String>) -> Self {
        TelegramNotifier {
            http: reqwest::Client::new(),
            token: token.into(),
            chat_id: chat_id.into(),
        }
    }

    async fn send(&self, text: String) {
        let url = format!("https://api.telegram.org/bot{}/sendMessage", self.token);
        let result = self
            .http
            .post(&url)
            .form(&[("chat_id", self.chat_id.as_str()), ("text", text.as_str())])
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {}
            Ok(response) => {
                let body = response.text().await.unwrap_or_default();
                warn!("telegram rejected message: {}", body);
            }
            Err(e) => warn!("failed to send telegram message: {}", e),
        }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify_position_opened(&self, event: &OpenedEvent) {
        self.send(format!(
            "🚀 Position opened\n\n\
             Pair: {}\n\
             Direction: {}\n\
             Entry: ${:.2}\n\
             Quantity: {:.6}\n\
             Stop: ${:.2}\n\
             Target: ${:.2}\n\
             Zone: {}",
            event.symbol,
            event.direction,
            event.entry_price,
            event.quantity,
            event.stop_loss,
            event.take_profit,
            event.zone_id,
        ))
        .await;
    }

    async fn notify_position_closed(&self, event: &ClosedEvent) {
        let emoji = if event.pnl > 0.0 { "✅" } else { "❌" };
        let notional = event.entry_price * event.quantity;
        let pnl_pct = if notional.abs() > f64::EPSILON {
            event.pnl / notional * 100.0
        } else {
            0.0
        };
        let mut message = format!(
            "{} Position closed\n\n\
             Pair: {}\n\
             Direction: {}\n\
             Entry: ${:.2}\n\
             Exit: ${:.2}\n\
             Quantity: {:.6}\n\
             P&L: ${:.2} ({:+.2}%)\n\
             Reason: {}",
            emoji,
            event.symbol,
            event.direction,
            event.entry_price,
            event.exit_price,
            event.quantity,
            event.pnl,
            pnl_pct,
            event.reason,
        );
        if event.by_trailing {
            message.push_str("\n🎯 Closed by trailing stop");
        }
        self.send(message).await;
    }

    async fn notify_trailing_activated(&self, event: &TrailingEvent) {
        self.send(format!(
            "🎯 Trailing stop activated\n\n\
             Pair: {}\n\
             Direction: {}\n\
             Entry: ${:.2}\n\
             Current price: ${:.2}\n\
             Stop: ${:.2}\n\
             RR: {:.2}",
            event.symbol,
            event.direction,
            event.entry_price,
            event.current_price,
            event.stop_price,
            event.rr_ratio,
        ))
        .await;
    }

    async fn send_alert(&self, text: &str) {
        self.send(format!("⚠️ {}", text)).await;
    }
}
