//! Decision: the three-way output of every rule and expert.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    Buy,
    Sell,
    #[default]
    Wait,
}

impl Decision {
    /// Vote value used by aggregation: BUY = +1, SELL = -1, WAIT = 0.
    pub fn sign(self) -> f64 {
        match self {
            Self::Buy => 1.0,
            Self::Sell => -1.0,
            Self::Wait => 0.0,
        }
    }

    pub fn is_wait(self) -> bool {
        matches!(self, Self::Wait)
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
            Self::Wait => "WAIT",
        };
        f.write_str(s)
    }
}

/// A decision together with the confidence behind it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub decision: Decision,
    pub confidence: f64,
}

impl Verdict {
    pub const WAIT: Verdict = Verdict {
        decision: Decision::Wait,
        confidence: 0.0,
    };

    /// Full-confidence verdict for a rule output; WAIT carries no confidence.
    pub fn certain(decision: Decision) -> Self {
        let confidence = if decision.is_wait() { 0.0 } else { 1.0 };
        Self {
            decision,
            confidence,
        }
    }

    /// Signed contribution of this verdict to a weighted vote.
    pub fn vote(&self) -> f64 {
        self.decision.sign() * self.confidence
    }
}
