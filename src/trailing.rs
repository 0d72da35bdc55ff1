//! Trailing-stop state machine
//!
//! One pure implementation of the trailing formulas, consumed per-bar by
//! the backtest simulator and per-poll by the live trailing task. Keeping
//! a single definition means backtest results stay representative of live
//! behavior on the same candles.
//!
//! Activation is one-way: once price reaches the activation threshold the
//! state never returns to inactive while the position is open. The stop
//! only ever ratchets in the favorable direction.

use serde::{Deserialize, Serialize};

use crate::config::{StrategyParams, TrailingMode};
use crate::Direction;

/// Fraction used by the step-mode safety clamp: a stop that would land on
/// the wrong side of the market is pulled to 0.1% beyond the current price
const CLAMP_PCT: f64 = 0.001;

/// Trailing parameters, detached from the rest of the strategy config
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TrailingSettings {
    pub mode: TrailingMode,
    pub activate_rr: f64,
    pub step_pct: f64,
    pub buffer_pct: f64,
}

impl From<&StrategyParams> for TrailingSettings {
    fn from(p: &StrategyParams) -> Self {
        TrailingSettings {
            mode: p.trailing_mode,
            activate_rr: p.trailing_activate_rr,
            step_pct: p.trailing_step_pct,
            buffer_pct: p.trailing_buffer_pct,
        }
    }
}

/// What a single bar observation did to the state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BarUpdate {
    /// Trailing switched from inactive to active on this bar
    pub activated: bool,
    /// The stop level changed on this bar
    pub stop_moved: bool,
}

/// Mutable trailing state for one open position
#[derive(Debug, Clone)]
pub struct TrailingState {
    direction: Direction,
    entry_price: f64,
    initial_stop: f64,
    settings: TrailingSettings,
    current_stop: f64,
    active: bool,
    last_step_applied: u64,
    threshold: f64,
}

impl TrailingState {
    pub fn new(
        direction: Direction,
        entry_price: f64,
        initial_stop: f64,
        settings: TrailingSettings,
    ) -> Self {
        let risk = (entry_price - initial_stop).abs();
        let threshold = match direction {
            Direction::Long => entry_price + settings.activate_rr * risk,
            Direction::Short => entry_price - settings.activate_rr * risk,
        };
        TrailingState {
            direction,
            entry_price,
            initial_stop,
            settings,
            current_stop: initial_stop,
            active: false,
            last_step_applied: 0,
            threshold,
        }
    }

    pub fn current_stop(&self) -> f64 {
        self.current_stop
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Price level that flips the state to active
    pub fn activation_threshold(&self) -> f64 {
        self.threshold
    }

    pub fn settings(&self) -> &TrailingSettings {
        &self.settings
    }

    /// True once the stop has moved away from its initial level; an exit
    /// at the stop is then a trailing exit rather than a plain stop-loss
    pub fn has_moved(&self) -> bool {
        self.current_stop != self.initial_stop
    }

    /// Feed one bar (or one polled candle) through the state machine.
    ///
    /// Checks activation first, then — if active — recomputes and ratchets
    /// the stop. The activating bar itself already receives a stop update.
    pub fn observe_bar(&mut self, high: f64, low: f64, close: f64) -> BarUpdate {
        let mut update = BarUpdate::default();

        if !self.active {
            let reached = match self.direction {
                Direction::Long => high >= self.threshold,
                Direction::Short => low <= self.threshold,
            };
            if reached {
                self.active = true;
                update.activated = true;
            }
        }

        if self.active {
            let previous = self.current_stop;
            match self.settings.mode {
                TrailingMode::BarExtremes => self.trail_bar_extremes(high, low),
                TrailingMode::Step => self.trail_step(high, low, close),
            }
            update.stop_moved = self.current_stop != previous;
        }

        update
    }

    fn trail_bar_extremes(&mut self, high: f64, low: f64) {
        match self.direction {
            Direction::Long => {
                let buffer = low * self.settings.buffer_pct / 100.0;
                let proposed = low - buffer;
                self.current_stop = self.current_stop.max(proposed);
            }
            Direction::Short => {
                let buffer = high * self.settings.buffer_pct / 100.0;
                let proposed = high + buffer;
                self.current_stop = self.current_stop.min(proposed);
            }
        }
    }

    fn trail_step(&mut self, high: f64, low: f64, close: f64) {
        if self.settings.step_pct <= 0.0 {
            return;
        }
        let step_amount = self.entry_price * self.settings.step_pct / 100.0;

        match self.direction {
            Direction::Long => {
                let progress = (high - self.entry_price) / step_amount;
                let steps = if progress > 0.0 { progress as u64 } else { 0 };
                if steps > self.last_step_applied {
                    let target = self.initial_stop + steps as f64 * step_amount;
                    let buffer = target * self.settings.buffer_pct / 100.0;
                    // clamp before ratcheting so the stop never loosens
                    let proposed = (target - buffer).min(close * (1.0 - CLAMP_PCT));
                    self.current_stop = self.current_stop.max(proposed);
                    self.last_step_applied = steps;
                }
            }
            Direction::Short => {
                let progress = (self.entry_price - low) / step_amount;
                let steps = if progress > 0.0 { progress as u64 } else { 0 };
                if steps > self.last_step_applied {
                    let target = self.initial_stop - steps as f64 * step_amount;
                    let buffer = target.abs() * self.settings.buffer_pct / 100.0;
                    let proposed = (target + buffer).max(close * (1.0 + CLAMP_PCT));
                    self.current_stop = self.current_stop.min(proposed);
                    self.last_step_applied = steps;
                }
            }
        }
    }
}
