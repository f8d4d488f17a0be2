//! Bollinger Bands: moving average +/- standard deviation multiplier.
//!
//! - Middle: SMA(close, period)
//! - Upper: middle + mult * stddev(close, period)
//! - Lower: middle - mult * stddev(close, period)
//!
//! Uses population stddev (divide by N).
//! Lookback: period - 1.

use std::collections::VecDeque;

use super::Indicator;
use crate::domain::Bar;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BollingerState {
    pub lower: f64,
    pub middle: f64,
    pub upper: f64,
    pub close: f64,
}

#[derive(Debug, Clone)]
pub struct Bollinger {
    period: usize,
    multiplier: f64,
    name: String,
    window: VecDeque<f64>,
}

impl Bollinger {
    pub fn new(period: usize, multiplier: f64) -> Self {
        assert!(period >= 1, "Bollinger period must be >= 1");
        Self {
            period,
            multiplier,
            name: format!("bollinger_{period}_{multiplier}"),
            window: VecDeque::with_capacity(period + 1),
        }
    }

    pub fn value(&self) -> Option<BollingerState> {
        if !self.is_ready() {
            return None;
        }
        let n = self.period as f64;
        let mean = self.window.iter().sum::<f64>() / n;
        let variance = self
            .window
            .iter()
            .map(|c| {
                let diff = c - mean;
                diff * diff
            })
            .sum::<f64>()
            / n;
        let width = self.multiplier * variance.sqrt();
        let close = *self.window.back()?;
        Some(BollingerState {
            lower: mean - width,
            middle: mean,
            upper: mean + width,
            close,
        })
    }
}

impl Indicator for Bollinger {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period.saturating_sub(1)
    }

    fn update(&mut self, bar: &Bar) {
        if bar.close.is_nan() {
            return;
        }
        self.window.push_back(bar.close);
        if self.window.len() > self.period {
            self.window.pop_front();
        }
    }

    fn is_ready(&self) -> bool {
        self.window.len() == self.period
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, feed, make_bars, DEFAULT_EPSILON};

    #[test]
    fn bollinger_middle_is_sma() {
        let bars = make_bars(&[10.0, 11.0, 12.0, 13.0]);
        let mut bb = Bollinger::new(3, 2.0);
        feed(&mut bb, &bars[..2]);
        assert!(bb.value().is_none());

        bb.update(&bars[2]);
        assert_approx(bb.value().unwrap().middle, 11.0, DEFAULT_EPSILON);
        bb.update(&bars[3]);
        assert_approx(bb.value().unwrap().middle, 12.0, DEFAULT_EPSILON);
    }

    #[test]
    fn bollinger_bands_symmetric() {
        let bars = make_bars(&[10.0, 11.0, 12.0, 13.0, 14.0]);
        let mut bb = Bollinger::new(3, 2.0);
        feed(&mut bb, &bars);
        let s = bb.value().unwrap();
        assert_approx(s.upper - s.middle, s.middle - s.lower, DEFAULT_EPSILON);
        // population stddev of (12, 13, 14) = sqrt(2/3)
        assert_approx(s.upper - s.middle, 2.0 * (2.0f64 / 3.0).sqrt(), DEFAULT_EPSILON);
        assert_approx(s.close, 14.0, DEFAULT_EPSILON);
    }

    #[test]
    fn bollinger_constant_price_zero_width() {
        let bars = make_bars(&[100.0, 100.0, 100.0, 100.0]);
        let mut bb = Bollinger::new(3, 2.0);
        feed(&mut bb, &bars);
        let s = bb.value().unwrap();
        assert_approx(s.upper, 100.0, DEFAULT_EPSILON);
        assert_approx(s.lower, 100.0, DEFAULT_EPSILON);
    }

    #[test]
    fn bollinger_lookback() {
        assert_eq!(Bollinger::new(20, 2.0).lookback(), 19);
    }
}
