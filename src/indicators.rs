//! Rolling technical indicators over OHLCV series
//!
//! Bollinger bands and on-balance volume come from the `ta` crate; ATR and
//! ADX use Wilder's smoothing, implemented by hand so warmup handling is
//! explicit. Values are `None` until the rolling window has filled, and
//! undefined rows are excluded from all downstream scoring.

use ta::indicators::{BollingerBands, OnBalanceVolume};
use ta::{DataItem, Next};

use crate::config::StrategyParams;
use crate::Candle;

/// Per-candle indicator values, 1:1 with the input series
#[derive(Debug, Clone, Default)]
pub struct IndicatorSeries {
    pub atr_pct: Vec<Option<f64>>,
    pub bb_width: Vec<Option<f64>>,
    pub bb_position: Vec<Option<f64>>,
    pub adx: Vec<Option<f64>>,
    pub volume_ratio: Vec<Option<f64>>,
    pub range_pct: Vec<Option<f64>>,
    pub obv_trend: Vec<Option<bool>>,
}

impl IndicatorSeries {
    pub fn len(&self) -> usize {
        self.atr_pct.len()
    }

    pub fn is_empty(&self) -> bool {
        self.atr_pct.is_empty()
    }
}

/// Compute every indicator the zone detector scores
pub fn compute(candles: &[Candle], params: &StrategyParams) -> IndicatorSeries {
    if candles.is_empty() {
        return IndicatorSeries::default();
    }

    let high: Vec<f64> = candles.iter().map(|c| c.high).collect();
    let low: Vec<f64> = candles.iter().map(|c| c.low).collect();
    let close: Vec<f64> = candles.iter().map(|c| c.close).collect();
    let volume: Vec<f64> = candles.iter().map(|c| c.volume).collect();

    let atr_vals = atr(&high, &low, &close, params.atr_window);
    let atr_pct = atr_vals
        .iter()
        .zip(&close)
        .map(|(a, &c)| a.map(|a| if c > 0.0 { a / c } else { 0.0 }))
        .collect();

    let (bb_upper, _, bb_lower) = bollinger_bands(&close, params.bb_window, params.bb_dev);
    let mut bb_width = Vec::with_capacity(close.len());
    let mut bb_position = Vec::with_capacity(close.len());
    for i in 0..close.len() {
        match (bb_upper[i], bb_lower[i]) {
            (Some(upper), Some(lower)) => {
                bb_width.push(Some((upper - lower) / close[i]));
                let span = upper - lower;
                if span > 0.0 {
                    bb_position.push(Some((close[i] - lower) / span));
                } else {
                    bb_position.push(None);
                }
            }
            _ => {
                bb_width.push(None);
                bb_position.push(None);
            }
        }
    }

    let adx_vals = adx(&high, &low, &close, params.adx_window);

    let volume_sma = sma(&volume, params.volume_window);
    let volume_ratio = volume_sma
        .iter()
        .zip(&volume)
        .map(|(s, &v)| s.map(|s| if s > 0.0 { v / s } else { 0.0 }))
        .collect();

    let high_roll = rolling_max(&high, params.accumulation_period);
    let low_roll = rolling_min(&low, params.accumulation_period);
    let range_pct = high_roll
        .iter()
        .zip(&low_roll)
        .zip(&close)
        .map(|((h, l), &c)| match (h, l) {
            (Some(h), Some(l)) if c > 0.0 => Some((h - l) / c),
            _ => None,
        })
        .collect();

    let obv_vals = obv(&close, &volume);
    let n = params.accumulation_period;
    let obv_trend = (0..close.len())
        .map(|i| {
            if i < n {
                None
            } else {
                Some(obv_vals[i] - obv_vals[i - n] > 0.0)
            }
        })
        .collect();

    IndicatorSeries {
        atr_pct,
        bb_width,
        bb_position,
        adx: adx_vals,
        volume_ratio,
        range_pct,
        obv_trend,
    }
}

/// True range per bar (first bar falls back to high - low)
fn true_range(high: &[f64], low: &[f64], close: &[f64]) -> Vec<f64> {
    (0..high.len())
        .map(|i| {
            if i == 0 {
                high[0] - low[0]
            } else {
                let hl = high[i] - low[i];
                let hc = (high[i] - close[i - 1]).abs();
                let lc = (low[i] - close[i - 1]).abs();
                hl.max(hc).max(lc)
            }
        })
        .collect()
}

/// Average True Range using Wilder's smoothing:
/// ATR = (prev_ATR * (period - 1) + current_TR) / period
pub fn atr(high: &[f64], low: &[f64], close: &[f64], period: usize) -> Vec<Option<f64>> {
    if high.is_empty() || period == 0 || high.len() != low.len() || high.len() != close.len() {
        return vec![None; high.len()];
    }

    let tr = true_range(high, low, close);
    wilders_smooth(&tr, period)
}

/// Wilder's smoothing over a raw series; first value is the SMA of the
/// initial `period` inputs
fn wilders_smooth(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut result = Vec::with_capacity(values.len());
    let mut smoothed: Option<f64> = None;

    for (i, &v) in values.iter().enumerate() {
        if i + 1 < period {
            result.push(None);
        } else if i + 1 == period {
            let sum: f64 = values[..period].iter().sum();
            smoothed = Some(sum / period as f64);
            result.push(smoothed);
        } else if let Some(prev) = smoothed {
            let next = (prev * (period - 1) as f64 + v) / period as f64;
            smoothed = Some(next);
            result.push(smoothed);
        } else {
            result.push(None);
        }
    }

    result
}

/// Simple moving average
pub fn sma(values: &[f64], period: usize) -> Vec<Option<f64>> {
    if values.is_empty() || period == 0 {
        return vec![None; values.len()];
    }

    let mut result = Vec::with_capacity(values.len());
    let mut window_sum = 0.0;

    for i in 0..values.len() {
        window_sum += values[i];
        if i >= period {
            window_sum -= values[i - period];
        }
        if i + 1 >= period {
            result.push(Some(window_sum / period as f64));
        } else {
            result.push(None);
        }
    }

    result
}

/// Rolling maximum over the trailing `period` values
pub fn rolling_max(values: &[f64], period: usize) -> Vec<Option<f64>> {
    rolling_extreme(values, period, f64::max)
}

/// Rolling minimum over the trailing `period` values
pub fn rolling_min(values: &[f64], period: usize) -> Vec<Option<f64>> {
    rolling_extreme(values, period, f64::min)
}

fn rolling_extreme(values: &[f64], period: usize, pick: fn(f64, f64) -> f64) -> Vec<Option<f64>> {
    if values.is_empty() || period == 0 {
        return vec![None; values.len()];
    }

    (0..values.len())
        .map(|i| {
            if i + 1 < period {
                None
            } else {
                values[i + 1 - period..=i].iter().copied().reduce(pick)
            }
        })
        .collect()
}

/// Bollinger bands via the `ta` crate, returning (upper, middle, lower)
pub fn bollinger_bands(
    values: &[f64],
    period: usize,
    num_std: f64,
) -> (Vec<Option<f64>>, Vec<Option<f64>>, Vec<Option<f64>>) {
    let blank = || vec![None; values.len()];
    if values.is_empty() || period == 0 {
        return (blank(), blank(), blank());
    }

    let mut indicator = match BollingerBands::new(period, num_std) {
        Ok(i) => i,
        Err(_) => return (blank(), blank(), blank()),
    };

    let mut upper = Vec::with_capacity(values.len());
    let mut middle = Vec::with_capacity(values.len());
    let mut lower = Vec::with_capacity(values.len());

    for (i, &value) in values.iter().enumerate() {
        let bb = indicator.next(value);
        if i + 1 >= period {
            upper.push(Some(bb.upper));
            middle.push(Some(bb.average));
            lower.push(Some(bb.lower));
        } else {
            upper.push(None);
            middle.push(None);
            lower.push(None);
        }
    }

    (upper, middle, lower)
}

/// Average Directional Index using Wilder's smoothing.
///
/// Needs 2*period - 1 warmup bars: one period for the DI values, a second
/// for smoothing the DX series.
pub fn adx(high: &[f64], low: &[f64], close: &[f64], period: usize) -> Vec<Option<f64>> {
    if high.is_empty() || period == 0 {
        return vec![None; high.len()];
    }

    let mut plus_dm = vec![0.0; high.len()];
    let mut minus_dm = vec![0.0; high.len()];
    for i in 1..high.len() {
        let up_move = high[i] - high[i - 1];
        let down_move = low[i - 1] - low[i];
        if up_move > down_move && up_move > 0.0 {
            plus_dm[i] = up_move;
        }
        if down_move > up_move && down_move > 0.0 {
            minus_dm[i] = down_move;
        }
    }

    let smoothed_plus = wilders_smooth(&plus_dm, period);
    let smoothed_minus = wilders_smooth(&minus_dm, period);
    let atr_vals = atr(high, low, close, period);

    // DI becomes valid at index period - 1; DX follows immediately
    let di_start = period - 1;
    let mut dx_values: Vec<f64> = Vec::new();
    for i in di_start..high.len() {
        let dx = match (smoothed_plus[i], smoothed_minus[i], atr_vals[i]) {
            (Some(pdm), Some(mdm), Some(atr_val)) if atr_val > 0.0 => {
                let pdi = pdm / atr_val * 100.0;
                let mdi = mdm / atr_val * 100.0;
                let sum = pdi + mdi;
                if sum > 0.0 {
                    (pdi - mdi).abs() / sum * 100.0
                } else {
                    0.0
                }
            }
            _ => 0.0,
        };
        dx_values.push(dx);
    }

    let mut result = vec![None; high.len()];
    for (j, smoothed) in wilders_smooth(&dx_values, period).into_iter().enumerate() {
        result[di_start + j] = smoothed;
    }

    result
}

/// On-balance volume via the `ta` crate
pub fn obv(close: &[f64], volume: &[f64]) -> Vec<f64> {
    if close.is_empty() || close.len() != volume.len() {
        return vec![];
    }

    let mut indicator = OnBalanceVolume::new();
    close
        .iter()
        .zip(volume)
        .map(|(&c, &v)| {
            let item = DataItem::builder()
                .open(c)
                .high(c)
                .low(c)
                .close(c)
                .volume(v)
                .build()
                .expect("constant OHLC is always a valid data item");
            indicator.next(&item)
        })
        .collect()
}

/// Quantile with linear interpolation over the defined values of a series.
///
/// Undefined entries are skipped; returns `None` when nothing is defined.
pub fn quantile(values: &[Option<f64>], q: f64) -> Option<f64> {
    let mut defined: Vec<f64> = values.iter().flatten().copied().collect();
    if defined.is_empty() {
        return None;
    }
    defined.sort_by(|a, b| a.partial_cmp(b).expect("indicator values are finite"));

    let q = q.clamp(0.0, 1.0);
    let pos = q * (defined.len() - 1) as f64;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    if lower == upper {
        Some(defined[lower])
    } else {
        let frac = pos - lower as f64;
        Some(defined[lower] * (1.0 - frac) + defined[upper] * frac)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn sma_warmup_and_values() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0];
        let result = sma(&values, 3);
        assert_eq!(result[0], None);
        assert_eq!(result[1], None);
        assert_relative_eq!(result[2].unwrap(), 2.0);
        assert_relative_eq!(result[4].unwrap(), 4.0);
    }

    #[test]
    fn atr_first_value_is_sma_of_true_range() {
        let high = [11.0, 12.0, 13.0];
        let low = [9.0, 10.0, 11.0];
        let close = [10.0, 11.0, 12.0];
        let result = atr(&high, &low, &close, 2);
        assert_eq!(result[0], None);
        // TR = [2, 2, 2] for this series
        assert_relative_eq!(result[1].unwrap(), 2.0);
        assert_relative_eq!(result[2].unwrap(), 2.0);
    }

    #[test]
    fn rolling_max_min() {
        let values = [3.0, 1.0, 4.0, 1.0, 5.0];
        let maxes = rolling_max(&values, 3);
        let mins = rolling_min(&values, 3);
        assert_eq!(maxes[1], None);
        assert_relative_eq!(maxes[2].unwrap(), 4.0);
        assert_relative_eq!(maxes[4].unwrap(), 5.0);
        assert_relative_eq!(mins[3].unwrap(), 1.0);
    }

    #[test]
    fn quantile_linear_interpolation() {
        let values: Vec<Option<f64>> = vec![Some(1.0), Some(2.0), Some(3.0), Some(4.0)];
        assert_relative_eq!(quantile(&values, 0.0).unwrap(), 1.0);
        assert_relative_eq!(quantile(&values, 1.0).unwrap(), 4.0);
        assert_relative_eq!(quantile(&values, 0.5).unwrap(), 2.5);
    }

    #[test]
    fn quantile_skips_undefined() {
        let values: Vec<Option<f64>> = vec![None, Some(10.0), None, Some(20.0)];
        assert_relative_eq!(quantile(&values, 0.5).unwrap(), 15.0);
        assert_eq!(quantile(&[None, None], 0.5), None);
    }

    #[test]
    fn obv_accumulates_signed_volume() {
        let close = [10.0, 11.0, 10.5, 10.5];
        let volume = [100.0, 50.0, 30.0, 20.0];
        let result = obv(&close, &volume);
        // up bar adds, down bar subtracts, flat bar leaves unchanged
        assert_relative_eq!(result[1] - result[0], 50.0);
        assert_relative_eq!(result[2] - result[1], -30.0);
        assert_relative_eq!(result[3], result[2]);
    }

    #[test]
    fn compute_handles_empty_input() {
        let series = compute(&[], &StrategyParams::default());
        assert!(series.is_empty());
    }
}
