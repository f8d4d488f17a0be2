//! Cached backtest estimate carried by every node.

use serde::{Deserialize, Serialize};

/// Profit is percent per simulated day; `None` means not estimated yet, or
/// the estimating run closed no round trip.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Estimate {
    pub profit: Option<f64>,
    pub ntrades: usize,
}

impl Estimate {
    pub const UNKNOWN: Estimate = Estimate {
        profit: None,
        ntrades: 0,
    };

    pub fn new(profit: Option<f64>, ntrades: usize) -> Self {
        Self { profit, ntrades }
    }

    pub fn is_known(&self) -> bool {
        self.profit.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_unknown() {
        assert_eq!(Estimate::default(), Estimate::UNKNOWN);
        assert!(!Estimate::default().is_known());
        assert!(Estimate::new(Some(0.0), 0).is_known());
    }
}
