//! Moving Average Convergence Divergence (MACD).
//!
//! MACD line = EMA(close, fast) - EMA(close, slow)
//! Signal line = EMA(MACD line, signal)
//! Lookback: slow - 1 + signal - 1.

use super::{ExpSmoother, Indicator};
use crate::domain::Bar;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MacdState {
    pub macd: f64,
    pub signal: f64,
}

impl MacdState {
    pub fn histogram(&self) -> f64 {
        self.macd - self.signal
    }
}

#[derive(Debug, Clone)]
pub struct Macd {
    fast_period: usize,
    slow_period: usize,
    signal_period: usize,
    name: String,
    fast: ExpSmoother,
    slow: ExpSmoother,
    signal: ExpSmoother,
    value: Option<MacdState>,
}

impl Macd {
    pub fn new(fast: usize, slow: usize, signal: usize) -> Self {
        assert!(fast < slow, "MACD fast period must be < slow period");
        Self {
            fast_period: fast,
            slow_period: slow,
            signal_period: signal,
            name: format!("macd_{fast}_{slow}_{signal}"),
            fast: ExpSmoother::new(fast),
            slow: ExpSmoother::new(slow),
            signal: ExpSmoother::new(signal),
            value: None,
        }
    }

    pub fn value(&self) -> Option<MacdState> {
        self.value
    }

    pub fn periods(&self) -> (usize, usize, usize) {
        (self.fast_period, self.slow_period, self.signal_period)
    }
}

impl Indicator for Macd {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.slow_period.saturating_sub(1) + self.signal_period.saturating_sub(1)
    }

    fn update(&mut self, bar: &Bar) {
        if bar.close.is_nan() {
            return;
        }
        let fast = self.fast.push(bar.close);
        let slow = self.slow.push(bar.close);
        let (Some(fast), Some(slow)) = (fast, slow) else {
            return;
        };
        let macd = fast - slow;
        if let Some(signal) = self.signal.push(macd) {
            self.value = Some(MacdState { macd, signal });
        }
    }

    fn is_ready(&self) -> bool {
        self.value.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, feed, make_bars, DEFAULT_EPSILON};

    #[test]
    fn macd_warms_up_after_lookback() {
        let closes: Vec<f64> = (0..20).map(|i| 100.0 + (i as f64).sin()).collect();
        let bars = make_bars(&closes);
        let mut macd = Macd::new(3, 5, 2);
        let lookback = macd.lookback();
        assert_eq!(lookback, 5);

        feed(&mut macd, &bars[..lookback]);
        assert!(!macd.is_ready());
        macd.update(&bars[lookback]);
        assert!(macd.is_ready());
    }

    #[test]
    fn macd_constant_price_is_flat() {
        let bars = make_bars(&[50.0; 12]);
        let mut macd = Macd::new(2, 4, 3);
        feed(&mut macd, &bars);
        let s = macd.value().unwrap();
        assert_approx(s.macd, 0.0, DEFAULT_EPSILON);
        assert_approx(s.histogram(), 0.0, DEFAULT_EPSILON);
    }

    #[test]
    fn macd_positive_in_uptrend() {
        let closes: Vec<f64> = (0..40).map(|i| 100.0 + 2.0 * i as f64).collect();
        let mut macd = Macd::new(3, 8, 3);
        feed(&mut macd, &make_bars(&closes));
        assert!(macd.value().unwrap().macd > 0.0);
    }
}
