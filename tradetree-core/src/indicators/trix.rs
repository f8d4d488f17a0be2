//! Triple Exponential Average (TRIX).
//!
//! Triple-smoothed EMA of close; TRIX is the one-bar percent change of the
//! third smoothing. Lookback: 3 * (period - 1) + 1.

use super::{ExpSmoother, Indicator};
use crate::domain::Bar;

#[derive(Debug, Clone)]
pub struct Trix {
    period: usize,
    name: String,
    first: ExpSmoother,
    second: ExpSmoother,
    third: ExpSmoother,
    prev_triple: Option<f64>,
    value: Option<f64>,
}

impl Trix {
    pub fn new(period: usize) -> Self {
        Self {
            period,
            name: format!("trix_{period}"),
            first: ExpSmoother::new(period),
            second: ExpSmoother::new(period),
            third: ExpSmoother::new(period),
            prev_triple: None,
            value: None,
        }
    }

    pub fn value(&self) -> Option<f64> {
        self.value
    }
}

impl Indicator for Trix {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        3 * self.period.saturating_sub(1) + 1
    }

    fn update(&mut self, bar: &Bar) {
        if bar.close.is_nan() {
            return;
        }
        let triple = self
            .first
            .push(bar.close)
            .and_then(|e1| self.second.push(e1))
            .and_then(|e2| self.third.push(e2));

        if let Some(triple) = triple {
            if let Some(prev) = self.prev_triple {
                if prev != 0.0 {
                    self.value = Some(100.0 * (triple - prev) / prev);
                }
            }
            self.prev_triple = Some(triple);
        }
    }

    fn is_ready(&self) -> bool {
        self.value.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{feed, make_bars};

    #[test]
    fn trix_warms_up_after_lookback() {
        let closes: Vec<f64> = (0..20).map(|i| 100.0 + i as f64).collect();
        let bars = make_bars(&closes);
        let mut trix = Trix::new(3);
        let lookback = trix.lookback();

        feed(&mut trix, &bars[..lookback]);
        assert!(!trix.is_ready());
        trix.update(&bars[lookback]);
        assert!(trix.is_ready());
    }

    #[test]
    fn trix_sign_follows_trend() {
        let up: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        let mut trix = Trix::new(3);
        feed(&mut trix, &make_bars(&up));
        assert!(trix.value().unwrap() > 0.0);

        let down: Vec<f64> = (0..30).map(|i| 200.0 - i as f64).collect();
        let mut trix = Trix::new(3);
        feed(&mut trix, &make_bars(&down));
        assert!(trix.value().unwrap() < 0.0);
    }
}
