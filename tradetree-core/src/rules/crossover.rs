//! Two-line crossover rules.
//!
//! BUY when the fast line has been above the slow line for exactly `patience`
//! updates, SELL when the slow line has been at or above the fast line for
//! exactly `patience` updates.

use super::state::CrossoverState;
use crate::domain::{Bar, Decision};
use crate::indicators::{Ema, Ichimoku, Indicator, Macd, Sma};

/// Which pair of Ichimoku readings is compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IchimokuLines {
    /// Tenkan-sen against kijun-sen.
    TenkanKijun,
    /// Senkou span A against senkou span B.
    Senkou,
    /// Close against the close `kijun` bars ago.
    Chikou,
}

/// The indicator(s) producing the (fast, slow) pair.
#[derive(Debug, Clone)]
pub enum CrossoverSource {
    Sma { fast: Sma, slow: Sma },
    Ema { fast: Ema, slow: Ema },
    Ichimoku { ichimoku: Ichimoku, lines: IchimokuLines },
    Macd(Macd),
}

impl CrossoverSource {
    pub fn sma(fast: usize, slow: usize) -> Self {
        Self::Sma {
            fast: Sma::new(fast),
            slow: Sma::new(slow),
        }
    }

    pub fn ema(fast: usize, slow: usize) -> Self {
        Self::Ema {
            fast: Ema::new(fast),
            slow: Ema::new(slow),
        }
    }

    pub fn ichimoku(tenkan: usize, kijun: usize, senkou: usize, lines: IchimokuLines) -> Self {
        Self::Ichimoku {
            ichimoku: Ichimoku::new(tenkan, kijun, senkou),
            lines,
        }
    }

    pub fn macd(fast: usize, slow: usize, signal: usize) -> Self {
        Self::Macd(Macd::new(fast, slow, signal))
    }

    fn update(&mut self, bar: &Bar) {
        match self {
            Self::Sma { fast, slow } => {
                fast.update(bar);
                slow.update(bar);
            }
            Self::Ema { fast, slow } => {
                fast.update(bar);
                slow.update(bar);
            }
            Self::Ichimoku { ichimoku, .. } => ichimoku.update(bar),
            Self::Macd(macd) => macd.update(bar),
        }
    }

    /// Current (fast, slow) pair, once every indicator involved is warm.
    pub fn reading(&self) -> Option<(f64, f64)> {
        match self {
            Self::Sma { fast, slow } => Some((fast.value()?, slow.value()?)),
            Self::Ema { fast, slow } => Some((fast.value()?, slow.value()?)),
            Self::Ichimoku { ichimoku, lines } => {
                let s = ichimoku.value()?;
                Some(match lines {
                    IchimokuLines::TenkanKijun => (s.tenkan, s.kijun),
                    IchimokuLines::Senkou => (s.senkou_a, s.senkou_b),
                    IchimokuLines::Chikou => (s.close, s.lagging_close),
                })
            }
            Self::Macd(macd) => macd.value().map(|s| (s.macd, s.signal)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CrossoverRule {
    source: CrossoverSource,
    state: CrossoverState,
    patience: u64,
}

impl CrossoverRule {
    pub fn new(source: CrossoverSource, patience: u64) -> Self {
        Self {
            source,
            state: CrossoverState::new(),
            patience,
        }
    }

    pub fn prime(&mut self, bar: &Bar) {
        self.source.update(bar);
    }

    pub fn update(&mut self, bar: &Bar) -> Decision {
        self.source.update(bar);
        let Some((fast, slow)) = self.source.reading() else {
            return Decision::Wait;
        };
        self.state.update(fast, slow);

        if self.state.a_over_b() == self.patience {
            Decision::Buy
        } else if self.state.b_over_a() == self.patience {
            Decision::Sell
        } else {
            Decision::Wait
        }
    }
}
