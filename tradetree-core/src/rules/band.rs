//! Bollinger band re-entry rules.
//!
//! Each variant watches two crossovers: the close re-entering the band from
//! below (BUY leg) and the close falling back under an upper line (SELL leg).

use super::state::CrossoverState;
use crate::domain::{Bar, Decision};
use crate::indicators::{Bollinger, BollingerState, Indicator};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BandVariant {
    /// BUY above lower, SELL back below upper.
    LowerUpper,
    /// BUY above lower, SELL back below middle.
    LowerMid,
    /// BUY above middle, SELL back below upper.
    UpperMid,
}

impl BandVariant {
    fn buy_line(self, s: &BollingerState) -> f64 {
        match self {
            Self::LowerUpper | Self::LowerMid => s.lower,
            Self::UpperMid => s.middle,
        }
    }

    fn sell_line(self, s: &BollingerState) -> f64 {
        match self {
            Self::LowerUpper | Self::UpperMid => s.upper,
            Self::LowerMid => s.middle,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BandRule {
    bollinger: Bollinger,
    variant: BandVariant,
    // close vs buy line
    buy_state: CrossoverState,
    // sell line vs close
    sell_state: CrossoverState,
    patience: u64,
}

impl BandRule {
    pub fn new(period: usize, multiplier: f64, variant: BandVariant, patience: u64) -> Self {
        Self {
            bollinger: Bollinger::new(period, multiplier),
            variant,
            buy_state: CrossoverState::new(),
            sell_state: CrossoverState::new(),
            patience,
        }
    }

    pub fn prime(&mut self, bar: &Bar) {
        self.bollinger.update(bar);
    }

    pub fn update(&mut self, bar: &Bar) -> Decision {
        self.bollinger.update(bar);
        let Some(bands) = self.bollinger.value() else {
            return Decision::Wait;
        };
        self.buy_state
            .update(bands.close, self.variant.buy_line(&bands));
        self.sell_state
            .update(self.variant.sell_line(&bands), bands.close);

        if self.buy_state.a_over_b() == self.patience {
            Decision::Buy
        } else if self.sell_state.a_over_b() == self.patience {
            Decision::Sell
        } else {
            Decision::Wait
        }
    }
}
