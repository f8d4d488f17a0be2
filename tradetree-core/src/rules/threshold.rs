//! RSI level rule.
//!
//! BUY fires once, on the update where RSI has been back above `lower` for
//! exactly `patience` updates. SELL keeps firing on every update while RSI has
//! been above `upper` for at least `patience` updates.

use super::state::{CrossoverState, UNCROSSED};
use crate::domain::{Bar, Decision};
use crate::indicators::{Indicator, Rsi};

#[derive(Debug, Clone)]
pub struct ThresholdRule {
    rsi: Rsi,
    lower: f64,
    upper: f64,
    lower_state: CrossoverState,
    upper_state: CrossoverState,
    patience: u64,
}

impl ThresholdRule {
    pub fn new(period: usize, lower: f64, upper: f64, patience: u64) -> Self {
        Self {
            rsi: Rsi::new(period),
            lower,
            upper,
            lower_state: CrossoverState::new(),
            upper_state: CrossoverState::new(),
            patience,
        }
    }

    pub fn prime(&mut self, bar: &Bar) {
        self.rsi.update(bar);
    }

    pub fn update(&mut self, bar: &Bar) -> Decision {
        self.rsi.update(bar);
        let Some(value) = self.rsi.value() else {
            return Decision::Wait;
        };
        self.observe(value)
    }

    fn observe(&mut self, value: f64) -> Decision {
        self.lower_state.update(value, self.lower);
        self.upper_state.update(value, self.upper);

        let above_upper = self.upper_state.a_over_b();
        if self.lower_state.a_over_b() == self.patience {
            Decision::Buy
        } else if above_upper >= self.patience && above_upper != UNCROSSED {
            Decision::Sell
        } else {
            Decision::Wait
        }
    }
}
