//! Accumulation zone detection
//!
//! Scores every candle against the accumulation criteria, then groups
//! contiguous qualifying candles into zones. Quantile thresholds are taken
//! over the whole scored series in one batch; a live run scores whatever
//! history is currently loaded, so zone quality depends on the loaded
//! window. Detection is a pure function of the series and parameters.

use chrono::Duration;

use crate::config::StrategyParams;
use crate::indicators::{self, IndicatorSeries};
use crate::{Candle, Zone};

/// Gap between qualifying candles that splits two zones
const ZONE_SPLIT_GAP_MINUTES: i64 = 30;

/// Per-candle accumulation score; `None` when any scored indicator is
/// still inside its warmup window
pub fn score_series(series: &IndicatorSeries, params: &StrategyParams) -> Vec<Option<u32>> {
    let atr_cut = indicators::quantile(&series.atr_pct, params.atr_threshold);
    let bb_cut = indicators::quantile(&series.bb_width, params.bb_width_threshold);
    let range_cut = indicators::quantile(&series.range_pct, params.range_threshold);

    (0..series.len())
        .map(|i| {
            let (atr_pct, bb_width, bb_position, adx, range_pct, obv_trend) = match (
                series.atr_pct[i],
                series.bb_width[i],
                series.bb_position[i],
                series.adx[i],
                series.range_pct[i],
                series.obv_trend[i],
            ) {
                (Some(a), Some(w), Some(p), Some(x), Some(r), Some(o)) => (a, w, p, x, r, o),
                _ => return None,
            };

            let mut score = 0;
            if atr_cut.is_some_and(|cut| atr_pct < cut) {
                score += 1;
            }
            if bb_cut.is_some_and(|cut| bb_width < cut) {
                score += 1;
            }
            if adx < params.adx_threshold {
                score += 1;
            }
            if bb_position > params.bb_position_low && bb_position < params.bb_position_high {
                score += 1;
            }
            if range_cut.is_some_and(|cut| range_pct < cut) {
                score += 1;
            }
            if obv_trend {
                score += 1;
            }
            Some(score)
        })
        .collect()
}

/// Detect accumulation zones over a candle series.
///
/// Empty input or a series with no qualifying candles yields an empty set.
/// Zone ids are group ordinals within this run, counted over every
/// candidate group including those rejected for size, so an id stays
/// attached to the same stretch of candles when parameters change.
pub fn detect_zones(candles: &[Candle], params: &StrategyParams) -> Vec<Zone> {
    if candles.is_empty() {
        return Vec::new();
    }

    let series = indicators::compute(candles, params);
    let scores = score_series(&series, params);

    // (candle index, score) for every qualifying candle, in time order
    let qualifying: Vec<(usize, u32)> = scores
        .iter()
        .enumerate()
        .filter_map(|(i, s)| match s {
            Some(score) if *score >= params.min_accumulation_score => Some((i, *score)),
            _ => None,
        })
        .collect();

    if qualifying.is_empty() {
        return Vec::new();
    }

    let split_gap = Duration::minutes(ZONE_SPLIT_GAP_MINUTES);
    let mut zones = Vec::new();
    let mut group_id: u32 = 0;
    let mut group: Vec<(usize, u32)> = Vec::new();

    let flush = |group: &mut Vec<(usize, u32)>, group_id: u32, zones: &mut Vec<Zone>| {
        if group.len() >= params.min_zone_size {
            let members: Vec<&Candle> = group.iter().map(|&(i, _)| &candles[i]).collect();
            let high = members.iter().map(|c| c.high).fold(f64::MIN, f64::max);
            let low = members.iter().map(|c| c.low).fold(f64::MAX, f64::min);
            let score_sum: u32 = group.iter().map(|&(_, s)| s).sum();
            zones.push(Zone {
                id: group_id,
                start: members[0].open_time,
                end: members[members.len() - 1].open_time,
                high,
                low,
                size: group.len(),
                score_avg: score_sum as f64 / group.len() as f64,
            });
        }
        group.clear();
    };

    for &(idx, score) in &qualifying {
        if let Some(&(prev_idx, _)) = group.last() {
            let gap = candles[idx].open_time - candles[prev_idx].open_time;
            if gap > split_gap {
                flush(&mut group, group_id, &mut zones);
                group_id += 1;
            }
        }
        group.push((idx, score));
    }
    flush(&mut group, group_id, &mut zones);

    zones
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{SlMethod, TrailingMode};
    use chrono::{DateTime, TimeZone, Utc};

    fn ts(mins: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(mins * 60, 0).unwrap()
    }

    /// Short windows so tests need little warmup. ADX below threshold and a
    /// rising OBV are enough to qualify a candle, which the flat leg of
    /// `declining_then_flat` guarantees.
    fn test_params() -> StrategyParams {
        StrategyParams {
            atr_window: 3,
            bb_window: 5,
            bb_dev: 2.0,
            adx_window: 3,
            accumulation_period: 5,
            volume_window: 5,
            min_zone_size: 3,
            min_accumulation_score: 2,
            atr_threshold: 0.3,
            bb_width_threshold: 0.3,
            adx_threshold: 30.0,
            bb_position_low: 0.3,
            bb_position_high: 0.7,
            range_threshold: 0.3,
            sl_method: SlMethod::Low,
            rr_ratio: 2.0,
            lookback_bars_for_tp: 0,
            risk_per_trade: 0.03,
            use_trailing_stop: false,
            trailing_activate_rr: 1.0,
            trailing_mode: TrailingMode::Step,
            trailing_step_pct: 1.0,
            trailing_buffer_pct: 0.0,
        }
    }

    /// A strongly declining leg (high ADX, falling OBV — never qualifies)
    /// followed by a quiet base inside [100, 101] with a gently rising
    /// close, where ADX decays and OBV climbs.
    fn declining_then_flat(prefix: usize, flat: usize) -> Vec<Candle> {
        let mut candles = Vec::with_capacity(prefix + flat);
        let step = 28.0 / prefix as f64;
        for i in 0..prefix {
            let close = 130.0 - i as f64 * step;
            let open = close + 0.8;
            candles.push(
                Candle::new(ts(5 * i as i64), open, open + 1.2, close - 1.0, close, 1500.0)
                    .unwrap(),
            );
        }
        for j in 0..flat {
            let close = 100.3 + 0.01 * j as f64;
            let (high, low) = if j % 2 == 0 {
                (101.0, 100.05)
            } else {
                (100.95, 100.0)
            };
            candles.push(
                Candle::new(
                    ts(5 * (prefix + j) as i64),
                    close - 0.02,
                    high,
                    low,
                    close,
                    1000.0,
                )
                .unwrap(),
            );
        }
        candles
    }

    #[test]
    fn empty_input_yields_no_zones() {
        assert!(detect_zones(&[], &StrategyParams::default()).is_empty());
    }

    #[test]
    fn warmup_rows_never_score() {
        let candles = declining_then_flat(30, 40);
        let params = test_params();
        let series = indicators::compute(&candles, &params);
        let scores = score_series(&series, &params);
        // ADX needs 2*3 - 1 bars, the longest warmup with these windows
        assert!(scores[..4].iter().all(|s| s.is_none()));
        assert!(scores[10..].iter().all(|s| s.is_some()));
    }

    #[test]
    fn quiet_base_becomes_a_zone_with_exact_bounds() {
        let candles = declining_then_flat(30, 40);
        let zones = detect_zones(&candles, &test_params());
        assert_eq!(zones.len(), 1, "one contiguous base expected");
        let zone = &zones[0];
        assert!(zone.size >= 3);
        assert_eq!(zone.low, 100.0);
        assert_eq!(zone.high, 101.0);
        assert!(zone.end > zone.start);
        // the base runs to the very end of the series
        assert_eq!(zone.end, candles.last().unwrap().open_time);
        assert!(zone.score_avg >= 2.0);
    }

    #[test]
    fn declining_leg_never_qualifies() {
        let candles = declining_then_flat(30, 40);
        let params = test_params();
        let series = indicators::compute(&candles, &params);
        let scores = score_series(&series, &params);
        for score in scores[..30].iter().flatten() {
            assert!(*score < params.min_accumulation_score);
        }
    }

    #[test]
    fn zones_respect_min_size() {
        let candles = declining_then_flat(30, 40);
        let params = StrategyParams {
            min_zone_size: 10_000,
            ..test_params()
        };
        assert!(detect_zones(&candles, &params).is_empty());
    }

    #[test]
    fn time_gap_splits_zones() {
        let mut candles = declining_then_flat(30, 80);
        // push the last 30 base candles an extra ninety minutes out
        for c in candles.iter_mut().skip(80) {
            c.open_time += Duration::minutes(90);
        }
        let zones = detect_zones(&candles, &test_params());
        assert_eq!(zones.len(), 2, "gap should split the base in two");
        assert!(zones[0].id < zones[1].id);
        assert!(zones[0].end < zones[1].start);
    }
}
