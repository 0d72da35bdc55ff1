//! Backtest simulator
//!
//! Replays candles forward from each zone's breakout entry to determine
//! the exit (take-profit, stop, trailing stop, or still open at end of
//! data) and the resulting P&L, then aggregates summary and risk
//! statistics across all trades. The trailing formulas are the shared
//! `trailing::TrailingState` — the same state machine the live path runs.

use serde::Serialize;
use statrs::statistics::Statistics;

use crate::config::StrategyParams;
use crate::trailing::{TrailingSettings, TrailingState};
use crate::{planner, zones, Candle, Direction, ExitReason, Trade, TradeResult, Zone};

/// What happened to a single zone during simulation
#[derive(Debug, Clone)]
pub enum ZoneOutcome {
    Trade(Box<Trade>),
    /// Candles after the zone never confirmed a breakout
    NoBreakout,
    /// The zone ends at the very end of the data
    NoCandleAfterZone,
    /// A breakout candle exists but nothing follows it to scan for exits
    NoCandleAfterEntry,
}

/// Aggregated result of simulating every zone in a series
#[derive(Debug, Default)]
pub struct BacktestReport {
    pub zones: Vec<Zone>,
    pub trades: Vec<Trade>,
    pub no_breakout: usize,
    pub no_candle_after_zone: usize,
    pub no_candle_after_entry: usize,
}

impl BacktestReport {
    pub fn total_zones(&self) -> usize {
        self.zones.len()
    }
}

/// Summary statistics over a set of simulated trades
#[derive(Debug, Clone, Default, Serialize)]
pub struct BacktestSummary {
    pub total_trades: usize,
    pub wins: usize,
    pub losses: usize,
    pub open: usize,
    pub trailing_exits: usize,
    pub win_rate_pct: f64,
    pub total_pnl_usd: f64,
    pub avg_pnl_usd: f64,
    pub avg_duration_min: f64,
    pub avg_zone_score: f64,
    pub min_zone_score: f64,
    pub max_zone_score: f64,
}

/// Risk statistics derived from the equity curve and trade distribution
#[derive(Debug, Clone, Default, Serialize)]
pub struct EnhancedStats {
    /// Capital after each trade, starting from the initial capital
    pub equity_curve: Vec<f64>,
    pub equity_end: f64,
    pub max_drawdown_usd: f64,
    pub max_drawdown_pct: f64,
    pub sharpe_per_trade: f64,
    pub expectancy_usd: f64,
    pub profit_factor: f64,
    pub avg_win_usd: f64,
    pub avg_loss_usd: f64,
    pub max_consecutive_wins: usize,
    pub max_consecutive_losses: usize,
}

/// Backtest engine for one symbol's candle series
pub struct BacktestEngine {
    params: StrategyParams,
    capital: f64,
}

impl BacktestEngine {
    pub fn new(params: StrategyParams, capital: f64) -> Self {
        BacktestEngine { params, capital }
    }

    pub fn params(&self) -> &StrategyParams {
        &self.params
    }

    /// Detect every accumulation zone in the series
    pub fn zones(&self, candles: &[Candle]) -> Vec<Zone> {
        zones::detect_zones(candles, &self.params)
    }

    /// Simulate the single trade a zone produces, if any.
    ///
    /// Exit scanning starts at the candle after the entry candle: the
    /// entry bar itself can never also produce the exit.
    pub fn simulate_zone(&self, zone: &Zone, candles: &[Candle]) -> ZoneOutcome {
        let has_candle_after_zone = candles.iter().any(|c| c.open_time > zone.end);

        let plan = match planner::plan_trade(zone, candles, &self.params, self.capital) {
            Some(plan) => plan,
            None => {
                return if has_candle_after_zone {
                    ZoneOutcome::NoBreakout
                } else {
                    ZoneOutcome::NoCandleAfterZone
                };
            }
        };

        let entry_idx = candles
            .iter()
            .position(|c| c.open_time == plan.entry_time)
            .expect("breakout candle comes from this series");
        let future = &candles[entry_idx + 1..];
        if future.is_empty() {
            return ZoneOutcome::NoCandleAfterEntry;
        }

        let mut trail = self
            .params
            .use_trailing_stop
            .then(|| TrailingState::new(plan.direction, plan.entry_price, plan.stop_loss, TrailingSettings::from(&self.params)));

        let mut exit: Option<(TradeResult, usize, f64, ExitReason)> = None;

        for (i, bar) in future.iter().enumerate() {
            if let Some(state) = trail.as_mut() {
                state.observe_bar(bar.high, bar.low, bar.close);
            }
            let current_stop = trail
                .as_ref()
                .map(|s| s.current_stop())
                .unwrap_or(plan.stop_loss);
            let stop_has_moved = trail.as_ref().is_some_and(|s| s.has_moved());

            // take-profit wins over the stop when both trigger in one bar
            match plan.direction {
                Direction::Long => {
                    if bar.high >= plan.take_profit {
                        exit = Some((TradeResult::Win, i, plan.take_profit, ExitReason::TakeProfit));
                        break;
                    }
                    if bar.low <= current_stop {
                        let reason = if stop_has_moved {
                            ExitReason::Trailing
                        } else {
                            ExitReason::StopLoss
                        };
                        exit = Some((TradeResult::Loss, i, current_stop, reason));
                        break;
                    }
                }
                Direction::Short => {
                    if bar.low <= plan.take_profit {
                        exit = Some((TradeResult::Win, i, plan.take_profit, ExitReason::TakeProfit));
                        break;
                    }
                    if bar.high >= current_stop {
                        let reason = if stop_has_moved {
                            ExitReason::Trailing
                        } else {
                            ExitReason::StopLoss
                        };
                        exit = Some((TradeResult::Loss, i, current_stop, reason));
                        break;
                    }
                }
            }
        }

        let (result, exit_time, exit_price, exit_reason) = match exit {
            Some((result, i, price, reason)) => {
                (result, future[i].open_time, price, Some(reason))
            }
            None => {
                let last = future.last().expect("future is non-empty");
                (TradeResult::Open, last.open_time, last.close, None)
            }
        };

        let (pnl_pct, pnl_usd) = pnl(plan.direction, plan.entry_price, exit_price, plan.position_size);
        let duration_min = (exit_time - plan.entry_time).num_seconds() as f64 / 60.0;

        ZoneOutcome::Trade(Box::new(Trade {
            zone_score: zone.score_avg,
            plan,
            result,
            exit_time,
            exit_price,
            exit_reason,
            pnl_pct,
            pnl_usd,
            duration_min,
        }))
    }

    /// Detect zones and simulate each of them in order
    pub fn simulate_all(&self, candles: &[Candle]) -> BacktestReport {
        let zones = self.zones(candles);
        let mut report = BacktestReport {
            zones: zones.clone(),
            ..Default::default()
        };

        for zone in &zones {
            match self.simulate_zone(zone, candles) {
                ZoneOutcome::Trade(trade) => report.trades.push(*trade),
                ZoneOutcome::NoBreakout => report.no_breakout += 1,
                ZoneOutcome::NoCandleAfterZone => report.no_candle_after_zone += 1,
                ZoneOutcome::NoCandleAfterEntry => report.no_candle_after_entry += 1,
            }
        }

        tracing::info!(
            total_zones = report.total_zones(),
            trades = report.trades.len(),
            no_breakout = report.no_breakout,
            no_candle_after_zone = report.no_candle_after_zone,
            no_candle_after_entry = report.no_candle_after_entry,
            "zone simulation complete"
        );

        report
    }
}

/// P&L for a closed trade: percent of entry, and absolute in capital units
pub fn pnl(direction: Direction, entry: f64, exit: f64, size: f64) -> (f64, f64) {
    match direction {
        Direction::Long => (
            (exit - entry) / entry * 100.0,
            (exit - entry) * size,
        ),
        Direction::Short => (
            (entry - exit) / entry * 100.0,
            (entry - exit) * size,
        ),
    }
}

/// Summarize a set of trades
pub fn summarize(trades: &[Trade]) -> BacktestSummary {
    if trades.is_empty() {
        return BacktestSummary::default();
    }

    let wins = trades.iter().filter(|t| t.result == TradeResult::Win).count();
    let losses = trades.iter().filter(|t| t.result == TradeResult::Loss).count();
    let open = trades.iter().filter(|t| t.result == TradeResult::Open).count();
    let trailing_exits = trades
        .iter()
        .filter(|t| t.exit_reason == Some(ExitReason::Trailing))
        .count();
    let total_pnl: f64 = trades.iter().map(|t| t.pnl_usd).sum();
    let n = trades.len() as f64;

    let scores: Vec<f64> = trades.iter().map(|t| t.zone_score).collect();

    BacktestSummary {
        total_trades: trades.len(),
        wins,
        losses,
        open,
        trailing_exits,
        win_rate_pct: wins as f64 / n * 100.0,
        total_pnl_usd: total_pnl,
        avg_pnl_usd: total_pnl / n,
        avg_duration_min: trades.iter().map(|t| t.duration_min).sum::<f64>() / n,
        avg_zone_score: scores.iter().sum::<f64>() / n,
        min_zone_score: scores.iter().copied().fold(f64::INFINITY, f64::min),
        max_zone_score: scores.iter().copied().fold(f64::NEG_INFINITY, f64::max),
    }
}

/// Equity-curve and distribution statistics over a set of trades
pub fn enhanced_statistics(trades: &[Trade], initial_capital: f64) -> EnhancedStats {
    if trades.is_empty() {
        return EnhancedStats::default();
    }

    // equity curve and drawdown from the running peak
    let mut equity = initial_capital;
    let mut peak = initial_capital;
    let mut max_dd_abs = 0.0_f64;
    let mut max_dd_pct = 0.0_f64;
    let mut equity_curve = Vec::with_capacity(trades.len());
    for trade in trades {
        equity += trade.pnl_usd;
        equity_curve.push(equity);
        if equity > peak {
            peak = equity;
        }
        let dd = peak - equity;
        if dd > max_dd_abs {
            max_dd_abs = dd;
            max_dd_pct = if peak != 0.0 { dd / peak * 100.0 } else { 0.0 };
        }
    }

    let returns: Vec<f64> = trades.iter().map(|t| t.pnl_pct / 100.0).collect();
    let sharpe_per_trade = if returns.len() > 1 {
        let mean = returns.as_slice().mean();
        let std_dev = returns.as_slice().std_dev();
        if std_dev > 0.0 {
            mean / std_dev
        } else {
            0.0
        }
    } else {
        0.0
    };

    let win_pnls: Vec<f64> = trades
        .iter()
        .filter(|t| t.result == TradeResult::Win)
        .map(|t| t.pnl_usd)
        .collect();
    let loss_pnls: Vec<f64> = trades
        .iter()
        .filter(|t| t.result == TradeResult::Loss)
        .map(|t| t.pnl_usd)
        .collect();

    let avg_win = if win_pnls.is_empty() {
        0.0
    } else {
        win_pnls.iter().sum::<f64>() / win_pnls.len() as f64
    };
    let avg_loss = if loss_pnls.is_empty() {
        0.0
    } else {
        loss_pnls.iter().sum::<f64>() / loss_pnls.len() as f64
    };
    let total_win: f64 = win_pnls.iter().sum();
    let total_loss: f64 = loss_pnls.iter().map(|p| p.abs()).sum();

    let profit_factor = if total_loss > 0.0 {
        total_win / total_loss
    } else if total_win > 0.0 {
        f64::INFINITY
    } else {
        0.0
    };

    let p_win = win_pnls.len() as f64 / trades.len() as f64;
    let expectancy = p_win * avg_win + (1.0 - p_win) * avg_loss;

    // streaks; open trades neither extend nor break a streak
    let mut max_wins = 0usize;
    let mut max_losses = 0usize;
    let mut cur_wins = 0usize;
    let mut cur_losses = 0usize;
    for trade in trades {
        match trade.result {
            TradeResult::Win => {
                cur_wins += 1;
                cur_losses = 0;
                max_wins = max_wins.max(cur_wins);
            }
            TradeResult::Loss => {
                cur_losses += 1;
                cur_wins = 0;
                max_losses = max_losses.max(cur_losses);
            }
            TradeResult::Open => {}
        }
    }

    EnhancedStats {
        equity_curve,
        equity_end: equity,
        max_drawdown_usd: max_dd_abs,
        max_drawdown_pct: max_dd_pct,
        sharpe_per_trade,
        expectancy_usd: expectancy,
        profit_factor,
        avg_win_usd: avg_win,
        avg_loss_usd: avg_loss,
        max_consecutive_wins: max_wins,
        max_consecutive_losses: max_losses,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{SlMethod, TrailingMode};
    use crate::TradePlan;
    use chrono::{DateTime, TimeZone, Utc};

    fn ts(mins: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(mins * 60, 0).unwrap()
    }

    fn candle(mins: i64, open: f64, high: f64, low: f64, close: f64) -> Candle {
        Candle::new(ts(mins), open, high, low, close, 1000.0).unwrap()
    }

    fn zone(start_min: i64, end_min: i64, low: f64, high: f64) -> Zone {
        Zone {
            id: 0,
            start: ts(start_min),
            end: ts(end_min),
            high,
            low,
            size: 5,
            score_avg: 4.0,
        }
    }

    fn params(use_trailing: bool) -> StrategyParams {
        StrategyParams {
            sl_method: SlMethod::Low,
            rr_ratio: 2.0,
            lookback_bars_for_tp: 0,
            risk_per_trade: 0.03,
            use_trailing_stop: use_trailing,
            trailing_activate_rr: 1.0,
            trailing_mode: TrailingMode::Step,
            trailing_step_pct: 1.0,
            trailing_buffer_pct: 0.0,
            ..Default::default()
        }
    }

    /// Zone candles plus a LONG breakout at close 104 (stop 100, tp 112)
    fn base_candles() -> Vec<Candle> {
        vec![
            candle(0, 100.2, 100.9, 100.0, 100.5),
            candle(5, 100.4, 100.8, 100.1, 100.6),
            candle(10, 100.5, 100.9, 100.3, 100.6),
            candle(15, 100.8, 105.0, 100.5, 104.0),
        ]
    }

    fn trade_from(outcome: ZoneOutcome) -> Trade {
        match outcome {
            ZoneOutcome::Trade(t) => *t,
            other => panic!("expected a trade, got {:?}", other),
        }
    }

    #[test]
    fn take_profit_exit_is_a_win() {
        let mut candles = base_candles();
        candles.push(candle(20, 104.0, 113.0, 103.5, 112.5));
        let engine = BacktestEngine::new(params(false), 10_000.0);
        let trade = trade_from(engine.simulate_zone(&zone(0, 10, 100.0, 101.0), &candles));
        assert_eq!(trade.result, TradeResult::Win);
        assert_eq!(trade.exit_reason, Some(ExitReason::TakeProfit));
        assert_eq!(trade.exit_price, 112.0);
        assert_eq!(trade.exit_time, ts(20));
    }

    #[test]
    fn stop_exit_is_a_loss() {
        let mut candles = base_candles();
        candles.push(candle(20, 104.0, 104.5, 99.5, 99.8));
        let engine = BacktestEngine::new(params(false), 10_000.0);
        let trade = trade_from(engine.simulate_zone(&zone(0, 10, 100.0, 101.0), &candles));
        assert_eq!(trade.result, TradeResult::Loss);
        assert_eq!(trade.exit_reason, Some(ExitReason::StopLoss));
        assert_eq!(trade.exit_price, 100.0);
    }

    #[test]
    fn tp_beats_stop_when_both_hit_in_one_bar() {
        let mut candles = base_candles();
        // a single wild bar crosses both levels
        candles.push(candle(20, 104.0, 113.0, 99.0, 100.5));
        let engine = BacktestEngine::new(params(false), 10_000.0);
        let trade = trade_from(engine.simulate_zone(&zone(0, 10, 100.0, 101.0), &candles));
        assert_eq!(trade.result, TradeResult::Win);
        assert_eq!(trade.exit_price, 112.0);
    }

    #[test]
    fn entry_bar_cannot_exit() {
        // breakout bar itself touches the stop level; exit scanning starts
        // on the next bar, which hits take-profit
        let mut candles = vec![
            candle(0, 100.2, 100.9, 100.0, 100.5),
            candle(5, 100.4, 100.8, 100.1, 100.6),
            candle(10, 100.5, 100.9, 100.3, 100.6),
            candle(15, 100.8, 105.0, 99.5, 104.0),
        ];
        candles.push(candle(20, 104.0, 113.0, 103.0, 112.0));
        let engine = BacktestEngine::new(params(false), 10_000.0);
        let trade = trade_from(engine.simulate_zone(&zone(0, 10, 100.0, 101.0), &candles));
        assert_eq!(trade.result, TradeResult::Win);
        assert!(trade.exit_time > trade.plan.entry_time);
    }

    #[test]
    fn no_exit_leaves_trade_open_at_last_close() {
        let mut candles = base_candles();
        candles.push(candle(20, 104.0, 106.0, 103.0, 105.0));
        candles.push(candle(25, 105.0, 107.0, 104.0, 106.0));
        let engine = BacktestEngine::new(params(false), 10_000.0);
        let trade = trade_from(engine.simulate_zone(&zone(0, 10, 100.0, 101.0), &candles));
        assert_eq!(trade.result, TradeResult::Open);
        assert_eq!(trade.exit_reason, None);
        assert_eq!(trade.exit_price, 106.0);
        assert_eq!(trade.exit_time, ts(25));
    }

    #[test]
    fn breakout_with_no_following_candle_is_insufficient_data() {
        let candles = base_candles();
        let engine = BacktestEngine::new(params(false), 10_000.0);
        let outcome = engine.simulate_zone(&zone(0, 10, 100.0, 101.0), &candles);
        assert!(matches!(outcome, ZoneOutcome::NoCandleAfterEntry));
    }

    #[test]
    fn zone_at_end_of_data_is_no_candle_after_zone() {
        let candles = vec![
            candle(0, 100.2, 100.9, 100.0, 100.5),
            candle(5, 100.4, 100.8, 100.1, 100.6),
            candle(10, 100.5, 100.9, 100.3, 100.6),
        ];
        let engine = BacktestEngine::new(params(false), 10_000.0);
        let outcome = engine.simulate_zone(&zone(0, 10, 100.0, 101.0), &candles);
        assert!(matches!(outcome, ZoneOutcome::NoCandleAfterZone));
    }

    #[test]
    fn range_bound_candles_after_zone_are_no_breakout() {
        let mut candles = vec![
            candle(0, 100.2, 100.9, 100.0, 100.5),
            candle(5, 100.4, 100.8, 100.1, 100.6),
            candle(10, 100.5, 100.9, 100.3, 100.6),
        ];
        // stays inside [low, high] forever
        candles.push(candle(15, 100.5, 101.0, 100.0, 100.7));
        candles.push(candle(20, 100.7, 100.9, 100.2, 100.4));
        let engine = BacktestEngine::new(params(false), 10_000.0);
        let outcome = engine.simulate_zone(&zone(0, 10, 100.0, 101.0), &candles);
        assert!(matches!(outcome, ZoneOutcome::NoBreakout));
    }

    #[test]
    fn trailing_exit_is_classified_as_trail() {
        let mut candles = base_candles();
        // activation threshold 108 (entry 104, risk 4, rr 1); 107 stays below
        candles.push(candle(20, 104.0, 107.0, 103.5, 106.0));
        // reaches 109: activates, step=1.04; (109-104)/1.04 = 4 steps
        // stop = 100 + 4*1.04 = 104.16, clamped under close 108.5
        candles.push(candle(25, 106.0, 109.0, 105.5, 108.5));
        // falls through the trailed stop
        candles.push(candle(30, 108.0, 108.2, 103.0, 103.5));
        let engine = BacktestEngine::new(params(true), 10_000.0);
        let trade = trade_from(engine.simulate_zone(&zone(0, 10, 100.0, 101.0), &candles));
        assert_eq!(trade.result, TradeResult::Loss);
        assert_eq!(trade.exit_reason, Some(ExitReason::Trailing));
        assert!(trade.exit_price > trade.plan.stop_loss);
        // the loss is smaller than the initial risk
        assert!(trade.exit_price > 100.0);
    }

    #[test]
    fn untouched_trailing_stop_is_plain_stop_loss() {
        let mut candles = base_candles();
        // never reaches activation at 108, then collapses
        candles.push(candle(20, 104.0, 105.0, 99.0, 99.5));
        let engine = BacktestEngine::new(params(true), 10_000.0);
        let trade = trade_from(engine.simulate_zone(&zone(0, 10, 100.0, 101.0), &candles));
        assert_eq!(trade.exit_reason, Some(ExitReason::StopLoss));
        assert_eq!(trade.exit_price, 100.0);
    }

    #[test]
    fn pnl_sign_correctness() {
        let (pct, usd) = pnl(Direction::Long, 100.0, 110.0, 10.0);
        assert_eq!(pct, 10.0);
        assert_eq!(usd, 100.0);

        let (pct, usd) = pnl(Direction::Short, 100.0, 90.0, 10.0);
        assert_eq!(pct, 10.0);
        assert_eq!(usd, 100.0);

        let (pct, usd) = pnl(Direction::Long, 100.0, 95.0, 10.0);
        assert_eq!(pct, -5.0);
        assert_eq!(usd, -50.0);
    }

    fn make_trade(result: TradeResult, pnl_usd: f64, pnl_pct: f64) -> Trade {
        Trade {
            plan: TradePlan {
                zone_id: 0,
                direction: Direction::Long,
                entry_price: 100.0,
                entry_time: ts(0),
                stop_loss: 95.0,
                take_profit: 110.0,
                position_size: 1.0,
                risk_amount: 5.0,
                risk_per_unit: 5.0,
                reward_per_unit: 10.0,
                rr_ratio: 2.0,
            },
            result,
            exit_time: ts(60),
            exit_price: 100.0 + pnl_usd,
            exit_reason: None,
            pnl_pct,
            pnl_usd,
            duration_min: 60.0,
            zone_score: 4.0,
        }
    }

    #[test]
    fn summary_counts_and_rates() {
        let trades = vec![
            make_trade(TradeResult::Win, 100.0, 10.0),
            make_trade(TradeResult::Loss, -50.0, -5.0),
            make_trade(TradeResult::Win, 80.0, 8.0),
            make_trade(TradeResult::Open, 10.0, 1.0),
        ];
        let summary = summarize(&trades);
        assert_eq!(summary.total_trades, 4);
        assert_eq!(summary.wins, 2);
        assert_eq!(summary.losses, 1);
        assert_eq!(summary.open, 1);
        assert_eq!(summary.win_rate_pct, 50.0);
        assert_eq!(summary.total_pnl_usd, 140.0);
        assert_eq!(summary.avg_pnl_usd, 35.0);
    }

    #[test]
    fn empty_trades_summarize_to_default() {
        let summary = summarize(&[]);
        assert_eq!(summary.total_trades, 0);
        assert_eq!(summary.total_pnl_usd, 0.0);
    }

    #[test]
    fn drawdown_tracks_running_peak() {
        let trades = vec![
            make_trade(TradeResult::Win, 100.0, 10.0),  // equity 10100, peak
            make_trade(TradeResult::Loss, -200.0, -2.0), // equity 9900, dd 200
            make_trade(TradeResult::Win, 50.0, 5.0),    // equity 9950
        ];
        let stats = enhanced_statistics(&trades, 10_000.0);
        assert_eq!(stats.equity_curve, vec![10_100.0, 9_900.0, 9_950.0]);
        assert_eq!(stats.equity_end, 9_950.0);
        assert_eq!(stats.max_drawdown_usd, 200.0);
        assert!((stats.max_drawdown_pct - 200.0 / 10_100.0 * 100.0).abs() < 1e-9);
    }

    #[test]
    fn profit_factor_edge_cases() {
        let only_wins = vec![make_trade(TradeResult::Win, 100.0, 10.0)];
        assert_eq!(enhanced_statistics(&only_wins, 10_000.0).profit_factor, f64::INFINITY);

        let only_losses = vec![make_trade(TradeResult::Loss, -100.0, -10.0)];
        assert_eq!(enhanced_statistics(&only_losses, 10_000.0).profit_factor, 0.0);
    }

    #[test]
    fn sharpe_is_zero_for_single_trade_or_flat_returns() {
        let single = vec![make_trade(TradeResult::Win, 100.0, 10.0)];
        assert_eq!(enhanced_statistics(&single, 10_000.0).sharpe_per_trade, 0.0);

        let flat = vec![
            make_trade(TradeResult::Win, 100.0, 10.0),
            make_trade(TradeResult::Win, 100.0, 10.0),
        ];
        assert_eq!(enhanced_statistics(&flat, 10_000.0).sharpe_per_trade, 0.0);
    }

    #[test]
    fn streaks_ignore_open_trades() {
        let trades = vec![
            make_trade(TradeResult::Win, 10.0, 1.0),
            make_trade(TradeResult::Win, 10.0, 1.0),
            make_trade(TradeResult::Open, 0.0, 0.0),
            make_trade(TradeResult::Win, 10.0, 1.0),
            make_trade(TradeResult::Loss, -10.0, -1.0),
            make_trade(TradeResult::Loss, -10.0, -1.0),
        ];
        let stats = enhanced_statistics(&trades, 10_000.0);
        assert_eq!(stats.max_consecutive_wins, 3);
        assert_eq!(stats.max_consecutive_losses, 2);
    }

    #[test]
    fn expectancy_weights_wins_and_losses() {
        let trades = vec![
            make_trade(TradeResult::Win, 100.0, 10.0),
            make_trade(TradeResult::Loss, -50.0, -5.0),
        ];
        let stats = enhanced_statistics(&trades, 10_000.0);
        // p_win 0.5 * 100 + p_loss 0.5 * (-50) = 25
        assert_eq!(stats.expectancy_usd, 25.0);
    }
}
