//! Trade planning from a detected zone
//!
//! Finds the confirmed breakout candle for a zone, then derives entry,
//! stop-loss, take-profit and position size. The breakout test here is the
//! single definition used by both the backtest simulator and the live
//! loop, so the two paths cannot drift apart.

use crate::config::{SlMethod, StrategyParams};
use crate::{Candle, Direction, TradePlan, Zone};

/// Confirmed breakout test for one candle against a zone boundary.
///
/// A wick through the boundary is not enough: the close must also clear
/// it, otherwise the move is treated as a failed test of the level.
pub fn breakout_direction(zone: &Zone, candle: &Candle) -> Option<Direction> {
    if candle.high > zone.high && candle.close > zone.high {
        Some(Direction::Long)
    } else if candle.low < zone.low && candle.close < zone.low {
        Some(Direction::Short)
    } else {
        None
    }
}

/// The breakout candle for a zone, if one exists in the series.
///
/// The zone's own final candle is tested first: a candle can satisfy the
/// accumulation criteria and still close beyond the boundary, since zone
/// membership is scored on indicators rather than price levels. After
/// that, candles strictly after the zone end are scanned in order.
/// Returns the candle index and direction.
pub fn find_breakout(zone: &Zone, candles: &[Candle]) -> Option<(usize, Direction)> {
    let last_zone_idx = candles.iter().position(|c| c.open_time == zone.end);
    if let Some(idx) = last_zone_idx {
        if let Some(direction) = breakout_direction(zone, &candles[idx]) {
            return Some((idx, direction));
        }
    }

    candles
        .iter()
        .enumerate()
        .filter(|(_, c)| c.open_time > zone.end)
        .find_map(|(i, c)| breakout_direction(zone, c).map(|d| (i, d)))
}

/// Plan a trade for a zone, or `None` when no breakout candle exists
/// before the series ends.
pub fn plan_trade(
    zone: &Zone,
    candles: &[Candle],
    params: &StrategyParams,
    capital: f64,
) -> Option<TradePlan> {
    let (breakout_idx, direction) = find_breakout(zone, candles)?;
    let breakout = &candles[breakout_idx];
    let entry_price = breakout.close;

    let stop_loss = match params.sl_method {
        SlMethod::Low => match direction {
            Direction::Long => zone.low,
            Direction::Short => zone.high,
        },
        SlMethod::Mid => zone.midpoint(),
    };

    let risk_per_unit = (entry_price - stop_loss).abs();
    let take_profit = resolve_take_profit(zone, candles, params, direction, entry_price, risk_per_unit);

    let risk_amount = capital * params.risk_per_trade;
    let position_size = if risk_per_unit > 0.0 {
        risk_amount / risk_per_unit
    } else {
        0.0
    };
    let reward_per_unit = (take_profit - entry_price).abs();
    let rr_ratio = if risk_per_unit > 0.0 {
        reward_per_unit / risk_per_unit
    } else {
        0.0
    };

    Some(TradePlan {
        zone_id: zone.id,
        direction,
        entry_price,
        entry_time: breakout.open_time,
        stop_loss,
        take_profit,
        position_size,
        risk_amount,
        risk_per_unit,
        reward_per_unit,
        rr_ratio,
    })
}

/// Raw target = entry ± rr * risk; then look for a prior extreme beyond
/// the target in the bars immediately preceding the zone and tighten the
/// target to the nearest such level.
fn resolve_take_profit(
    zone: &Zone,
    candles: &[Candle],
    params: &StrategyParams,
    direction: Direction,
    entry_price: f64,
    risk_per_unit: f64,
) -> f64 {
    let raw_target = match direction {
        Direction::Long => entry_price + params.rr_ratio * risk_per_unit,
        Direction::Short => entry_price - params.rr_ratio * risk_per_unit,
    };

    let before_zone: Vec<&Candle> = candles
        .iter()
        .filter(|c| c.open_time < zone.start)
        .collect();
    let lookback_start = before_zone.len().saturating_sub(params.lookback_bars_for_tp);
    let lookback = &before_zone[lookback_start..];

    match direction {
        Direction::Long => lookback
            .iter()
            .map(|c| c.high)
            .filter(|&h| h >= raw_target)
            .fold(None, |acc: Option<f64>, h| {
                Some(acc.map_or(h, |a| a.min(h)))
            })
            .unwrap_or(raw_target),
        Direction::Short => lookback
            .iter()
            .map(|c| c.low)
            .filter(|&l| l <= raw_target)
            .fold(None, |acc: Option<f64>, l| {
                Some(acc.map_or(l, |a| a.max(l)))
            })
            .unwrap_or(raw_target),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
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

    #[test]
    fn wick_alone_is_not_a_breakout() {
        let z = zone(0, 50, 100.0, 101.0);
        // high pierces the boundary, close falls back inside
        let wick = candle(55, 100.5, 102.0, 100.4, 100.8);
        assert_eq!(breakout_direction(&z, &wick), None);

        let confirmed = candle(55, 100.5, 102.0, 100.4, 101.5);
        assert_eq!(breakout_direction(&z, &confirmed), Some(Direction::Long));
    }

    #[test]
    fn short_breakout_mirrors_long() {
        let z = zone(0, 50, 100.0, 101.0);
        let wick = candle(55, 100.5, 100.8, 99.0, 100.2);
        assert_eq!(breakout_direction(&z, &wick), None);

        let confirmed = candle(55, 100.5, 100.8, 99.0, 99.5);
        assert_eq!(breakout_direction(&z, &confirmed), Some(Direction::Short));
    }

    #[test]
    fn zone_final_candle_can_be_the_breakout() {
        let z = zone(0, 10, 100.0, 101.0);
        let candles = vec![
            candle(0, 100.2, 100.9, 100.0, 100.5),
            candle(5, 100.4, 100.8, 100.1, 100.6),
            // the zone's own last candle closes above the boundary
            candle(10, 100.5, 102.0, 100.3, 101.8),
            candle(15, 101.8, 103.0, 101.5, 102.5),
        ];
        let (idx, direction) = find_breakout(&z, &candles).unwrap();
        assert_eq!(idx, 2);
        assert_eq!(direction, Direction::Long);
    }

    #[test]
    fn first_breakout_after_zone_wins() {
        let z = zone(0, 10, 100.0, 101.0);
        let candles = vec![
            candle(0, 100.2, 100.9, 100.0, 100.5),
            candle(5, 100.4, 100.8, 100.1, 100.6),
            candle(10, 100.5, 100.9, 100.3, 100.6),
            candle(15, 100.6, 101.5, 100.4, 100.9), // wick only
            candle(20, 100.9, 102.0, 100.8, 101.6), // confirmed
            candle(25, 101.6, 103.0, 101.4, 102.8), // later breakout, ignored
        ];
        let (idx, direction) = find_breakout(&z, &candles).unwrap();
        assert_eq!(idx, 4);
        assert_eq!(direction, Direction::Long);
    }

    #[test]
    fn no_breakout_before_series_end_yields_no_plan() {
        let z = zone(0, 10, 100.0, 101.0);
        let candles = vec![
            candle(0, 100.2, 100.9, 100.0, 100.5),
            candle(5, 100.4, 100.8, 100.1, 100.6),
            candle(10, 100.5, 100.9, 100.3, 100.6),
            candle(15, 100.6, 101.0, 100.4, 100.9),
        ];
        assert!(plan_trade(&z, &candles, &StrategyParams::default(), 10_000.0).is_none());
    }

    #[test]
    fn plan_levels_and_sizing() {
        let z = zone(0, 10, 100.0, 101.0);
        let candles = vec![
            candle(0, 100.2, 100.9, 100.0, 100.5),
            candle(5, 100.4, 100.8, 100.1, 100.6),
            candle(10, 100.5, 100.9, 100.3, 100.6),
            candle(15, 100.8, 105.0, 100.5, 104.0),
        ];
        let params = StrategyParams {
            rr_ratio: 2.0,
            lookback_bars_for_tp: 0,
            risk_per_trade: 0.03,
            ..Default::default()
        };
        let plan = plan_trade(&z, &candles, &params, 10_000.0).unwrap();
        assert_eq!(plan.direction, Direction::Long);
        assert_eq!(plan.entry_price, 104.0);
        assert_eq!(plan.stop_loss, 100.0);
        assert_eq!(plan.risk_per_unit, 4.0);
        assert_eq!(plan.take_profit, 112.0);
        // (10_000 * 0.03) / 4
        assert_eq!(plan.position_size, 75.0);
        assert_eq!(plan.rr_ratio, 2.0);
    }

    #[test]
    fn mid_stop_method_uses_zone_midpoint() {
        let z = zone(0, 10, 100.0, 101.0);
        let candles = vec![
            candle(10, 100.5, 100.9, 100.3, 100.6),
            candle(15, 100.8, 105.0, 100.5, 104.0),
        ];
        let params = StrategyParams {
            sl_method: SlMethod::Mid,
            lookback_bars_for_tp: 0,
            ..Default::default()
        };
        let plan = plan_trade(&z, &candles, &params, 10_000.0).unwrap();
        assert_eq!(plan.stop_loss, 100.5);
    }

    #[test]
    fn take_profit_tightens_to_nearest_prior_extreme() {
        // prior bars carry highs at 113 and 120, both beyond the raw target
        let z = zone(20, 30, 100.0, 101.0);
        let candles = vec![
            candle(0, 112.0, 120.0, 111.0, 111.5),
            candle(5, 111.5, 113.0, 110.0, 110.5),
            candle(10, 110.5, 111.0, 105.0, 106.0),
            candle(20, 100.5, 101.0, 100.0, 100.6),
            candle(25, 100.5, 101.0, 100.0, 100.6),
            candle(30, 100.5, 101.0, 100.0, 100.6),
            candle(35, 100.8, 105.0, 100.5, 104.0),
        ];
        let params = StrategyParams {
            rr_ratio: 2.0,
            lookback_bars_for_tp: 50,
            ..Default::default()
        };
        let plan = plan_trade(&z, &candles, &params, 10_000.0).unwrap();
        // raw target 112; nearest prior high at or beyond it is 113
        assert_eq!(plan.take_profit, 113.0);
    }

    #[test]
    fn take_profit_lookback_window_is_bounded() {
        let z = zone(20, 30, 100.0, 101.0);
        let candles = vec![
            candle(0, 112.0, 120.0, 111.0, 111.5), // outside the lookback
            candle(10, 110.5, 111.0, 105.0, 106.0),
            candle(15, 106.0, 107.0, 100.2, 100.8),
            candle(20, 100.5, 101.0, 100.0, 100.6),
            candle(30, 100.5, 101.0, 100.0, 100.6),
            candle(35, 100.8, 105.0, 100.5, 104.0),
        ];
        let params = StrategyParams {
            rr_ratio: 2.0,
            lookback_bars_for_tp: 2,
            ..Default::default()
        };
        let plan = plan_trade(&z, &candles, &params, 10_000.0).unwrap();
        // only the two bars right before the zone are searched; neither
        // reaches the raw target of 112
        assert_eq!(plan.take_profit, 112.0);
    }

    #[test]
    fn close_on_the_boundary_is_not_a_breakout() {
        let z = zone(0, 10, 100.0, 101.0);
        // close lands exactly on the boundary: not confirmed
        let at_boundary = candle(15, 100.5, 101.5, 100.4, 101.0);
        assert_eq!(breakout_direction(&z, &at_boundary), None);
        let at_low = candle(15, 100.5, 100.6, 99.5, 100.0);
        assert_eq!(breakout_direction(&z, &at_low), None);
    }
}
