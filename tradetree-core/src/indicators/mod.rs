//! Streaming indicator implementations.
//!
//! Every indicator consumes one bar at a time through [`Indicator::update`] and
//! exposes its current reading through an inherent `value()` method returning
//! `None` until enough bars have been seen. Rules read those values; nothing
//! else about the math leaks out of this module.
//!
//! Multi-line indicators (Ichimoku, Bollinger, MACD) return a small state struct
//! from `value()` instead of a scalar.

pub mod bollinger;
pub mod ema;
pub mod ichimoku;
pub mod macd;
pub mod rsi;
pub mod sma;
pub mod trix;

pub use bollinger::{Bollinger, BollingerState};
pub use ema::{Ema, ExpSmoother};
pub use ichimoku::{Ichimoku, IchimokuState};
pub use macd::{Macd, MacdState};
pub use rsi::Rsi;
pub use sma::Sma;
pub use trix::Trix;

use crate::domain::Bar;

/// Trait for streaming indicators.
///
/// # Ordering contract
/// `update` must be called once per bar, in timestamp order, without gaps.
/// Void bars (NaN fields) are ignored and do not advance the indicator.
pub trait Indicator: Send + Sync {
    /// Human-readable name (e.g., "sma_20", "rsi_14").
    fn name(&self) -> &str;

    /// Number of bars needed before the indicator produces a value.
    fn lookback(&self) -> usize;

    /// Push one new bar.
    fn update(&mut self, bar: &Bar);

    /// True once `value()` would return `Some`.
    fn is_ready(&self) -> bool;
}

/// Create synthetic bars from close prices for testing.
///
/// Generates plausible OHLCV: open = prev_close (or close for first bar),
/// high = max(open,close) + 1.0, low = min(open,close) - 1.0, volume = 1000,
/// one-minute spacing.
#[cfg(test)]
pub fn make_bars(closes: &[f64]) -> Vec<Bar> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            let open_time = 1_700_000_000_000 + i as i64 * 60_000;
            Bar {
                open_time,
                open,
                high: open.max(close) + 1.0,
                low: open.min(close) - 1.0,
                close,
                volume: 1000.0,
                close_time: open_time + 59_999,
            }
        })
        .collect()
}

/// Feed every bar into an indicator.
#[cfg(test)]
pub fn feed<I: Indicator>(indicator: &mut I, bars: &[Bar]) {
    for bar in bars {
        indicator.update(bar);
    }
}

/// Assert two f64 values are approximately equal (within epsilon).
#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}

/// Default epsilon for indicator tests.
#[cfg(test)]
pub const DEFAULT_EPSILON: f64 = 1e-10;
