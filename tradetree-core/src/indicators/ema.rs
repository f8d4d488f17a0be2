//! Exponential Moving Average (EMA).
//!
//! Recursive: EMA[t] = alpha * x[t] + (1 - alpha) * EMA[t-1]
//! Seed: the SMA of the first `period` values.
//! Lookback: period - 1.

use super::Indicator;
use crate::domain::Bar;

/// Streaming EMA over an arbitrary f64 series.
///
/// Used directly by composed indicators (TRIX, MACD) that smooth something
/// other than the close.
#[derive(Debug, Clone)]
pub struct ExpSmoother {
    period: usize,
    alpha: f64,
    seen: usize,
    seed_sum: f64,
    value: Option<f64>,
}

impl ExpSmoother {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "EMA period must be >= 1");
        Self {
            period,
            alpha: 2.0 / (period as f64 + 1.0),
            seen: 0,
            seed_sum: 0.0,
            value: None,
        }
    }

    /// Push one value and return the smoothed value, if seeded.
    pub fn push(&mut self, x: f64) -> Option<f64> {
        if x.is_nan() {
            return self.value;
        }
        match self.value {
            Some(prev) => {
                self.value = Some(self.alpha * x + (1.0 - self.alpha) * prev);
            }
            None => {
                self.seen += 1;
                self.seed_sum += x;
                if self.seen == self.period {
                    self.value = Some(self.seed_sum / self.period as f64);
                }
            }
        }
        self.value
    }

    pub fn value(&self) -> Option<f64> {
        self.value
    }

    pub fn period(&self) -> usize {
        self.period
    }
}

#[derive(Debug, Clone)]
pub struct Ema {
    name: String,
    smoother: ExpSmoother,
}

impl Ema {
    pub fn new(period: usize) -> Self {
        Self {
            name: format!("ema_{period}"),
            smoother: ExpSmoother::new(period),
        }
    }

    pub fn value(&self) -> Option<f64> {
        self.smoother.value()
    }
}

impl Indicator for Ema {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.smoother.period().saturating_sub(1)
    }

    fn update(&mut self, bar: &Bar) {
        self.smoother.push(bar.close);
    }

    fn is_ready(&self) -> bool {
        self.smoother.value().is_some()
    }
}
