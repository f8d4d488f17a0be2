//! TRIX direction-change rule.
//!
//! Tracks the sign of successive TRIX deltas. BUY when TRIX has been rising for
//! exactly `patience` updates, SELL when it has been falling for exactly
//! `patience` updates.

use super::state::{Direction, DirectionState};
use crate::domain::{Bar, Decision};
use crate::indicators::{Indicator, Trix};

#[derive(Debug, Clone)]
pub struct DirectionRule {
    trix: Trix,
    prev: Option<f64>,
    state: DirectionState,
    patience: u64,
}

impl DirectionRule {
    pub fn new(period: usize, patience: u64) -> Self {
        Self {
            trix: Trix::new(period),
            prev: None,
            state: DirectionState::new(),
            patience,
        }
    }

    pub fn prime(&mut self, bar: &Bar) {
        self.trix.update(bar);
    }

    pub fn update(&mut self, bar: &Bar) -> Decision {
        self.trix.update(bar);
        let Some(value) = self.trix.value() else {
            return Decision::Wait;
        };
        self.observe(value)
    }

    fn observe(&mut self, value: f64) -> Decision {
        // first reading only seeds the delta
        let Some(prev) = self.prev.replace(value) else {
            return Decision::Wait;
        };
        self.state.update(value - prev);

        match self.state.direction() {
            Direction::Rising if self.state.run() == self.patience => Decision::Buy,
            Direction::Falling if self.state.run() == self.patience => Decision::Sell,
            _ => Decision::Wait,
        }
    }
}
