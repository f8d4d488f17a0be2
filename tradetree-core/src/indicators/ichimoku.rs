//! Ichimoku Kinko Hyo.
//!
//! - Tenkan-sen: midpoint of the highest high and lowest low over `tenkan` bars
//! - Kijun-sen: same over `kijun` bars
//! - Senkou span A: (tenkan + kijun) / 2
//! - Senkou span B: midpoint over `senkou` bars
//! - Lagging close: the close `kijun` bars ago (what the chikou span is compared to)
//!
//! Spans are reported at the bar they are computed on; the forward/backward
//! plotting displacement is a charting concern and is not applied.

use std::collections::VecDeque;

use super::Indicator;
use crate::domain::Bar;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IchimokuState {
    pub tenkan: f64,
    pub kijun: f64,
    pub senkou_a: f64,
    pub senkou_b: f64,
    pub close: f64,
    pub lagging_close: f64,
}

#[derive(Debug, Clone)]
pub struct Ichimoku {
    tenkan: usize,
    kijun: usize,
    senkou: usize,
    name: String,
    // (high, low, close), newest last, capped at max(senkou, kijun + 1)
    bars: VecDeque<(f64, f64, f64)>,
}

impl Ichimoku {
    pub fn new(tenkan: usize, kijun: usize, senkou: usize) -> Self {
        assert!(tenkan >= 1, "Ichimoku tenkan period must be >= 1");
        assert!(kijun >= tenkan, "Ichimoku kijun period must be >= tenkan");
        assert!(senkou >= kijun, "Ichimoku senkou period must be >= kijun");
        Self {
            tenkan,
            kijun,
            senkou,
            name: format!("ichimoku_{tenkan}_{kijun}_{senkou}"),
            bars: VecDeque::with_capacity(senkou.max(kijun + 1) + 1),
        }
    }

    fn capacity(&self) -> usize {
        self.senkou.max(self.kijun + 1)
    }

    fn midpoint(&self, period: usize) -> f64 {
        let (hi, lo) = self
            .bars
            .iter()
            .rev()
            .take(period)
            .fold((f64::MIN, f64::MAX), |(hi, lo), &(h, l, _)| {
                (hi.max(h), lo.min(l))
            });
        (hi + lo) / 2.0
    }

    pub fn value(&self) -> Option<IchimokuState> {
        if !self.is_ready() {
            return None;
        }
        let tenkan = self.midpoint(self.tenkan);
        let kijun = self.midpoint(self.kijun);
        let n = self.bars.len();
        let close = self.bars[n - 1].2;
        let lagging_close = self.bars[n - 1 - self.kijun].2;
        Some(IchimokuState {
            tenkan,
            kijun,
            senkou_a: (tenkan + kijun) / 2.0,
            senkou_b: self.midpoint(self.senkou),
            close,
            lagging_close,
        })
    }
}

impl Indicator for Ichimoku {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.capacity() - 1
    }

    fn update(&mut self, bar: &Bar) {
        if bar.is_void() {
            return;
        }
        self.bars.push_back((bar.high, bar.low, bar.close));
        if self.bars.len() > self.capacity() {
            self.bars.pop_front();
        }
    }

    fn is_ready(&self) -> bool {
        self.bars.len() == self.capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, feed, make_bars, DEFAULT_EPSILON};

    #[test]
    fn ichimoku_lines() {
        // Rising closes 10..15: high = close + 1, low = close - 2 (after the first bar)
        let closes: Vec<f64> = (0..6).map(|i| 10.0 + i as f64).collect();
        let bars = make_bars(&closes);
        let mut ich = Ichimoku::new(2, 3, 4);
        feed(&mut ich, &bars[..3]);
        assert!(ich.value().is_none());

        feed(&mut ich, &bars[3..]);
        let state = ich.value().unwrap();
        // last two bars: high 16, low 12
        assert_approx(state.tenkan, 14.0, DEFAULT_EPSILON);
        // last three bars: high 16, low 11
        assert_approx(state.kijun, 13.5, DEFAULT_EPSILON);
        assert_approx(state.senkou_a, 13.75, DEFAULT_EPSILON);
        // last four bars: high 16, low 10
        assert_approx(state.senkou_b, 13.0, DEFAULT_EPSILON);
        assert_approx(state.close, 15.0, DEFAULT_EPSILON);
        assert_approx(state.lagging_close, 12.0, DEFAULT_EPSILON);
    }

    #[test]
    #[should_panic(expected = "kijun period must be >= tenkan")]
    fn rejects_kijun_below_tenkan() {
        Ichimoku::new(9, 5, 52);
    }
}
