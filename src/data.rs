//! Candle data loading and on-disk caching
//!
//! Historical klines are cached per `{symbol}_{interval}` as CSV so
//! repeated backtests and live restarts don't re-download the full
//! range. Fresh data is merged by open time with duplicates dropped.

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::gateway::ExchangeGateway;
use crate::{Candle, Symbol};

/// Seconds covered by one candle of the given interval ("5m", "1h", ...)
pub fn interval_seconds(interval: &str) -> i64 {
    let (value, unit) = interval.split_at(interval.len().saturating_sub(1));
    let value: i64 = value.parse().unwrap_or(1);
    let multiplier = match unit {
        "m" => 60,
        "h" => 3_600,
        "d" => 86_400,
        "w" => 604_800,
        _ => 60,
    };
    value * multiplier
}

/// How many candles cover `lookback_days`, capped at the exchange's
/// single-request maximum
pub fn candles_needed(interval: &str, lookback_days: u32, max_limit: u32) -> u32 {
    let per_day = 86_400 / interval_seconds(interval).max(1);
    let needed = per_day.saturating_mul(lookback_days as i64);
    (needed.clamp(1, max_limit as i64)) as u32
}

/// Cache file path for one symbol/interval pair
pub fn cache_path(data_dir: &str, symbol: &Symbol, interval: &str) -> PathBuf {
    Path::new(data_dir).join(format!("{}_{}.csv", symbol, interval))
}

/// Write candles to a CSV cache file, creating the directory if needed
pub fn save_candles(path: &Path, candles: &[Candle]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("failed to create data directory")?;
    }
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("failed to open {} for writing", path.display()))?;
    for candle in candles {
        writer.serialize(candle)?;
    }
    writer.flush()?;
    Ok(())
}

/// Load candles from a CSV cache file; `None` when no cache exists
pub fn load_candles(path: &Path) -> Result<Option<Vec<Candle>>> {
    if !path.exists() {
        return Ok(None);
    }
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let mut candles = Vec::new();
    for row in reader.deserialize() {
        let candle: Candle = row.context("malformed cached candle")?;
        candles.push(candle);
    }
    Ok(Some(candles))
}

/// Merge fresh candles into an existing series: union by open time,
/// sorted, with the fresh copy winning on duplicates
pub fn merge_candles(existing: Vec<Candle>, fresh: Vec<Candle>) -> Vec<Candle> {
    let mut merged = existing;
    merged.extend(fresh);
    merged.sort_by_key(|c| c.open_time);
    // keep the later (fresher) entry for duplicate timestamps
    merged.reverse();
    merged.dedup_by_key(|c| c.open_time);
    merged.reverse();
    merged
}

/// Load cached history for a symbol, top it up from the gateway, and
/// persist the merged result. Returns the full series, oldest first.
pub async fn ensure_history<G: ExchangeGateway + ?Sized>(
    gateway: &G,
    symbol: &Symbol,
    interval: &str,
    lookback_days: u32,
    data_dir: &str,
) -> Result<Vec<Candle>> {
    let path = cache_path(data_dir, symbol, interval);
    let cached = match load_candles(&path) {
        Ok(candles) => candles.unwrap_or_default(),
        Err(e) => {
            warn!("ignoring unreadable cache {}: {}", path.display(), e);
            Vec::new()
        }
    };

    let now = Utc::now();
    let range_start = now - Duration::days(lookback_days as i64);
    // resume from the cache tail when it overlaps the requested range
    let fetch_start = cached
        .last()
        .map(|c| c.open_time)
        .filter(|t| *t > range_start)
        .unwrap_or(range_start);

    let fresh = gateway
        .fetch_historical_candles(symbol, interval, fetch_start, now)
        .await?;

    let merged = merge_candles(cached, fresh);
    let trimmed: Vec<Candle> = merged
        .into_iter()
        .filter(|c| c.open_time >= range_start)
        .collect();

    if let Err(e) = save_candles(&path, &trimmed) {
        warn!("failed to write cache {}: {}", path.display(), e);
    }

    info!(
        "{} {}: {} candles covering {} days",
        symbol,
        interval,
        trimmed.len(),
        lookback_days
    );
    Ok(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone};

    fn ts(mins: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(mins * 60, 0).unwrap()
    }

    fn candle(mins: i64, close: f64) -> Candle {
        Candle::new(ts(mins), close, close + 1.0, close - 1.0, close, 10.0).unwrap()
    }

    #[test]
    fn interval_parsing() {
        assert_eq!(interval_seconds("5m"), 300);
        assert_eq!(interval_seconds("1h"), 3_600);
        assert_eq!(interval_seconds("4h"), 14_400);
        assert_eq!(interval_seconds("1d"), 86_400);
    }

    #[test]
    fn candles_needed_is_capped() {
        assert_eq!(candles_needed("1h", 2, 1_500), 48);
        assert_eq!(candles_needed("1m", 30, 1_500), 1_500);
    }

    #[test]
    fn merge_dedupes_and_sorts() {
        let existing = vec![candle(0, 100.0), candle(5, 101.0)];
        let fresh = vec![candle(5, 999.0), candle(10, 102.0)];
        let merged = merge_candles(existing, fresh);
        assert_eq!(merged.len(), 3);
        assert_eq!(merged[0].open_time, ts(0));
        // the fresher copy wins for the duplicate timestamp
        assert_eq!(merged[1].close, 999.0);
        assert_eq!(merged[2].open_time, ts(10));
    }

    #[test]
    fn csv_round_trip() {
        let dir = std::env::temp_dir().join("zonebreak-data-test");
        let path = dir.join("BTCUSDT_5m.csv");
        let candles = vec![
            candle(0, 100.0),
            candle(5, 101.0).with_close_time(ts(10)),
        ];
        save_candles(&path, &candles).unwrap();
        let loaded = load_candles(&path).unwrap().unwrap();
        assert_eq!(loaded, candles);
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn missing_cache_loads_none() {
        let path = Path::new("/nonexistent/zonebreak/BTCUSDT_5m.csv");
        assert!(load_candles(path).unwrap().is_none());
    }
}
