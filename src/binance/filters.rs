//! Per-symbol exchange filters and price/quantity normalization
//!
//! Filters never change during a run, so clients cache them per symbol.
//! Rounding always truncates toward zero steps, then enforces minimums.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Rounding guard against binary-float division artifacts
/// (e.g. 0.07 / 0.01 evaluating to 6.999...)
const STEP_EPSILON: f64 = 1e-9;

/// Tradeability constraints for one symbol
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExchangeFilters {
    /// Minimum price increment; 0 means unconstrained
    pub price_tick: f64,
    /// Minimum quantity increment; 0 means unconstrained
    pub quantity_step: f64,
    pub min_quantity: f64,
    /// Minimum order value (price * quantity); 0 means no minimum
    pub min_notional: f64,
}

impl Default for ExchangeFilters {
    fn default() -> Self {
        ExchangeFilters {
            price_tick: 0.0,
            quantity_step: 0.0,
            min_quantity: 0.0,
            min_notional: 0.0,
        }
    }
}

/// A stop replacement rejected because the new level sits too close to
/// the market; recoverable — the caller keeps the previous stop
#[derive(Debug, Error, Clone, Copy, PartialEq)]
#[error("stop {stop} within {min_distance} of price {price}")]
pub struct StopTooClose {
    pub stop: f64,
    pub price: f64,
    pub min_distance: f64,
}

/// Truncate a value down to a multiple of `step`
fn round_step(value: f64, step: f64) -> f64 {
    if step <= 0.0 {
        return value;
    }
    (value / step + STEP_EPSILON).floor() * step
}

impl ExchangeFilters {
    /// Round a price down to the tick grid
    pub fn round_price(&self, price: f64) -> f64 {
        round_step(price, self.price_tick)
    }

    /// Round a quantity down to the step grid, then enforce the minimum
    pub fn round_quantity(&self, qty: f64) -> f64 {
        let mut qty = round_step(qty, self.quantity_step);
        if self.min_quantity > 0.0 && qty < self.min_quantity {
            qty = self.min_quantity;
        }
        qty.max(0.0)
    }

    /// True iff the order value satisfies the minimum notional, or no
    /// minimum is configured
    pub fn validate_notional(&self, price: f64, qty: f64) -> bool {
        self.min_notional <= 0.0 || price * qty >= self.min_notional
    }

    /// Minimum distance a protective stop must keep from the market
    /// price: at least two ticks or 0.01% of price, whichever is larger
    pub fn min_stop_distance(&self, price: f64) -> f64 {
        (self.price_tick * 2.0).max(price * 0.0001)
    }

    /// Reject a stop that would trigger immediately on placement.
    /// `closing_sell` is true for a LONG position's stop (stop below price).
    pub fn validate_stop_distance(
        &self,
        stop: f64,
        price: f64,
        closing_sell: bool,
    ) -> Result<(), StopTooClose> {
        let min_distance = self.min_stop_distance(price);
        let too_close = if closing_sell {
            stop >= price - min_distance
        } else {
            stop <= price + min_distance
        };
        if too_close {
            Err(StopTooClose {
                stop,
                price,
                min_distance,
            })
        } else {
            Ok(())
        }
    }

    /// Decimal string for the API, trimmed to the tick precision
    pub fn format_price(&self, price: f64) -> String {
        format_with_step(price, self.price_tick)
    }

    /// Decimal string for the API, trimmed to the step precision
    pub fn format_quantity(&self, qty: f64) -> String {
        format_with_step(qty, self.quantity_step)
    }
}

fn decimals_of(step: f64) -> usize {
    if step <= 0.0 {
        return 8;
    }
    let mut decimals = 0;
    let mut scaled = step;
    while scaled.fract().abs() > STEP_EPSILON && decimals < 12 {
        scaled *= 10.0;
        decimals += 1;
    }
    decimals
}

fn format_with_step(value: f64, step: f64) -> String {
    let formatted = format!("{:.*}", decimals_of(step), value);
    if formatted.contains('.') {
        let trimmed = formatted.trim_end_matches('0').trim_end_matches('.');
        if trimmed.is_empty() {
            "0".to_string()
        } else {
            trimmed.to_string()
        }
    } else {
        formatted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn filters() -> ExchangeFilters {
        ExchangeFilters {
            price_tick: 0.1,
            quantity_step: 0.001,
            min_quantity: 0.001,
            min_notional: 100.0,
        }
    }

    #[test]
    fn price_rounding_truncates_to_tick() {
        let f = filters();
        assert_relative_eq!(f.round_price(100.19), 100.1);
        assert_relative_eq!(f.round_price(100.10), 100.1);
        assert_relative_eq!(f.round_price(0.07), 0.0);
    }

    #[test]
    fn price_rounding_is_idempotent() {
        let f = filters();
        for price in [100.19, 0.07, 12345.678, 0.123456] {
            let once = f.round_price(price);
            assert_eq!(f.round_price(once), once);
        }
    }

    #[test]
    fn rounded_price_is_a_tick_multiple() {
        let f = filters();
        let rounded = f.round_price(100.19);
        let ticks = rounded / f.price_tick;
        assert_relative_eq!(ticks, ticks.round(), epsilon = 1e-6);
    }

    #[test]
    fn quantity_rounding_enforces_minimum() {
        let f = filters();
        assert_relative_eq!(f.round_quantity(0.0015), 0.001);
        // below the step, bumped up to min quantity
        assert_relative_eq!(f.round_quantity(0.0004), 0.001);
    }

    #[test]
    fn zero_step_leaves_values_alone() {
        let f = ExchangeFilters::default();
        assert_eq!(f.round_price(123.456), 123.456);
        assert_eq!(f.round_quantity(0.987), 0.987);
    }

    #[test]
    fn notional_validation() {
        let f = filters();
        assert!(f.validate_notional(100.0, 1.0));
        assert!(!f.validate_notional(100.0, 0.5));
        assert!(ExchangeFilters::default().validate_notional(1.0, 0.0001));
    }

    #[test]
    fn stop_distance_floor_is_two_ticks_or_a_basis_fraction() {
        let f = filters();
        // 2 ticks = 0.2, 0.01% of 100 = 0.01 -> 0.2 wins
        assert_relative_eq!(f.min_stop_distance(100.0), 0.2);
        // at a high price the relative floor takes over
        assert_relative_eq!(f.min_stop_distance(50_000.0), 5.0);
    }

    #[test]
    fn stop_validation_rejects_stops_near_price() {
        let f = filters();
        // LONG stop must be below price - 0.2
        assert!(f.validate_stop_distance(99.9, 100.0, true).is_err());
        assert!(f.validate_stop_distance(99.7, 100.0, true).is_ok());
        // SHORT stop must be above price + 0.2
        assert!(f.validate_stop_distance(100.1, 100.0, false).is_err());
        assert!(f.validate_stop_distance(100.3, 100.0, false).is_ok());
    }

    #[test]
    fn formatting_trims_trailing_zeros() {
        let f = filters();
        assert_eq!(f.format_price(100.1), "100.1");
        assert_eq!(f.format_quantity(0.5), "0.5");
        assert_eq!(f.format_quantity(1.0), "1");
    }
}
