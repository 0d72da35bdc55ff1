//! Live trading orchestration
//!
//! Spawns one independent task per symbol so a slow or failing symbol
//! never blocks the others, aggregates session statistics through an
//! explicit shared object rather than globals, and coordinates graceful
//! shutdown: the first interrupt asks every task to wind down and waits
//! briefly, a second interrupt exits immediately.

pub mod position;
pub mod trader;
pub mod trailing_task;

use anyhow::Result;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::config::Config;
use crate::gateway::ExchangeGateway;
use crate::notify::Notifier;
use trader::SymbolTrader;

/// How long shutdown waits for in-flight notification/cleanup work
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Session-wide trade counters, shared by reference across symbol tasks
#[derive(Debug, Default)]
pub struct SessionStats {
    inner: Mutex<StatsInner>,
}

#[derive(Debug, Default, Clone)]
struct StatsInner {
    wins: u64,
    losses: u64,
    trailing_exits: u64,
    total_pnl: f64,
}

impl SessionStats {
    pub fn record_close(&self, pnl: f64, by_trailing: bool) {
        let mut inner = self.inner.lock().expect("stats lock poisoned");
        if pnl > 0.0 {
            inner.wins += 1;
        } else {
            inner.losses += 1;
        }
        if by_trailing {
            inner.trailing_exits += 1;
        }
        inner.total_pnl += pnl;
    }

    pub fn summary(&self) -> String {
        let inner = self.inner.lock().expect("stats lock poisoned").clone();
        format!(
            "wins={} losses={} trailing_exits={} total_pnl={:+.2}",
            inner.wins, inner.losses, inner.trailing_exits, inner.total_pnl
        )
    }
}

/// Run live trading until interrupted
pub async fn run(
    config: Config,
    gateway: Arc<dyn ExchangeGateway>,
    notifier: Arc<dyn Notifier>,
) -> Result<()> {
    let config = Arc::new(config);
    let stats = Arc::new(SessionStats::default());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let symbols = config.trading.symbols();
    info!(
        "starting live trading for {} symbol(s): {}",
        symbols.len(),
        config.trading.symbols.join(", ")
    );

    let mut handles = Vec::with_capacity(symbols.len());
    for symbol in symbols {
        let trader = SymbolTrader::new(
            symbol,
            Arc::clone(&config),
            Arc::clone(&gateway),
            Arc::clone(&notifier),
            Arc::clone(&stats),
        );
        handles.push(tokio::spawn(trader.run(shutdown_rx.clone())));
    }

    tokio::signal::ctrl_c().await?;
    info!("interrupt received, stopping symbol tasks");
    let _ = shutdown_tx.send(true);

    let drain = async {
        for handle in handles {
            let _ = handle.await;
        }
    };
    tokio::select! {
        result = timeout(SHUTDOWN_GRACE, drain) => {
            if result.is_err() {
                warn!("shutdown grace period elapsed, exiting anyway");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            warn!("second interrupt, skipping graceful wait");
        }
    }

    info!("session stats: {}", stats.summary());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_aggregate_across_closes() {
        let stats = SessionStats::default();
        stats.record_close(120.0, false);
        stats.record_close(-40.0, false);
        stats.record_close(60.0, true);
        let summary = stats.summary();
        assert!(summary.contains("wins=2"));
        assert!(summary.contains("losses=1"));
        assert!(summary.contains("trailing_exits=1"));
        assert!(summary.contains("+140.00"));
    }
}
