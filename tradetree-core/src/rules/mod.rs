//! Rules: indicator readings in, BUY/SELL/WAIT out.
//!
//! The catalogue is closed. [`RuleKind`] names the variants, [`RuleSpec`]
//! carries their constructor parameters (and is what gets serialized), and
//! [`Rule`] is the runtime object built from a spec. A rule owns its
//! indicator(s), so the only thing it ever needs from the outside world is the
//! next bar of its own timeframe.
//!
//! Every rule observes two contracts:
//! - A rule whose indicator is not yet warm emits WAIT and leaves its state
//!   machine untouched.
//! - Decisions fire on exact `patience` counts, except the RSI SELL leg which
//!   re-fires for as long as the value stays over the upper level.

pub mod band;
pub mod crossover;
pub mod direction;
pub mod state;
pub mod threshold;

pub use band::{BandRule, BandVariant};
pub use crossover::{CrossoverRule, CrossoverSource, IchimokuLines};
pub use direction::DirectionRule;
pub use state::{CrossoverState, Direction, DirectionState, UNCROSSED};
pub use threshold::ThresholdRule;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{Bar, Decision};

/// The closed set of rule families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RuleKind {
    MovingAverageCrossover,
    ExponentialMovingAverageCrossover,
    RelativeStrengthIndexThreshold,
    TripleExponentialDirectionChange,
    IchimokuTenkanKijunCrossover,
    IchimokuSenkouCrossover,
    IchimokuChikouCrossover,
    BollingerLowerUpperCrossover,
    BollingerLowerMidCrossover,
    BollingerUpperMidCrossover,
    MacdSignalCrossover,
}

impl RuleKind {
    pub const ALL: [RuleKind; 11] = [
        RuleKind::MovingAverageCrossover,
        RuleKind::ExponentialMovingAverageCrossover,
        RuleKind::RelativeStrengthIndexThreshold,
        RuleKind::TripleExponentialDirectionChange,
        RuleKind::IchimokuTenkanKijunCrossover,
        RuleKind::IchimokuSenkouCrossover,
        RuleKind::IchimokuChikouCrossover,
        RuleKind::BollingerLowerUpperCrossover,
        RuleKind::BollingerLowerMidCrossover,
        RuleKind::BollingerUpperMidCrossover,
        RuleKind::MacdSignalCrossover,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::MovingAverageCrossover => "MovingAverageCrossover",
            Self::ExponentialMovingAverageCrossover => "ExponentialMovingAverageCrossover",
            Self::RelativeStrengthIndexThreshold => "RelativeStrengthIndexThreshold",
            Self::TripleExponentialDirectionChange => "TripleExponentialDirectionChange",
            Self::IchimokuTenkanKijunCrossover => "IchimokuTenkanKijunCrossover",
            Self::IchimokuSenkouCrossover => "IchimokuSenkouCrossover",
            Self::IchimokuChikouCrossover => "IchimokuChikouCrossover",
            Self::BollingerLowerUpperCrossover => "BollingerLowerUpperCrossover",
            Self::BollingerLowerMidCrossover => "BollingerLowerMidCrossover",
            Self::BollingerUpperMidCrossover => "BollingerUpperMidCrossover",
            Self::MacdSignalCrossover => "MacdSignalCrossover",
        }
    }
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown rule kind: {0}")]
pub struct ParseRuleKindError(pub String);

impl FromStr for RuleKind {
    type Err = ParseRuleKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ParseRuleKindError(s.to_string()))
    }
}

/// Constructor parameters of one rule candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum RuleSpec {
    MovingAverageCrossover {
        fast: usize,
        slow: usize,
        patience: u64,
    },
    ExponentialMovingAverageCrossover {
        fast: usize,
        slow: usize,
        patience: u64,
    },
    RelativeStrengthIndexThreshold {
        period: usize,
        lower: f64,
        upper: f64,
        patience: u64,
    },
    TripleExponentialDirectionChange {
        period: usize,
        patience: u64,
    },
    IchimokuTenkanKijunCrossover {
        tenkan: usize,
        kijun: usize,
        senkou: usize,
        patience: u64,
    },
    IchimokuSenkouCrossover {
        tenkan: usize,
        kijun: usize,
        senkou: usize,
        patience: u64,
    },
    IchimokuChikouCrossover {
        tenkan: usize,
        kijun: usize,
        senkou: usize,
        patience: u64,
    },
    BollingerLowerUpperCrossover {
        period: usize,
        multiplier: f64,
        patience: u64,
    },
    BollingerLowerMidCrossover {
        period: usize,
        multiplier: f64,
        patience: u64,
    },
    BollingerUpperMidCrossover {
        period: usize,
        multiplier: f64,
        patience: u64,
    },
    MacdSignalCrossover {
        fast: usize,
        slow: usize,
        signal: usize,
        patience: u64,
    },
}

/// Rejected rule parameters.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("invalid {kind} parameters: {reason}")]
pub struct RuleError {
    pub kind: RuleKind,
    pub reason: String,
}

impl RuleSpec {
    pub fn kind(&self) -> RuleKind {
        match self {
            Self::MovingAverageCrossover { .. } => RuleKind::MovingAverageCrossover,
            Self::ExponentialMovingAverageCrossover { .. } => {
                RuleKind::ExponentialMovingAverageCrossover
            }
            Self::RelativeStrengthIndexThreshold { .. } => RuleKind::RelativeStrengthIndexThreshold,
            Self::TripleExponentialDirectionChange { .. } => {
                RuleKind::TripleExponentialDirectionChange
            }
            Self::IchimokuTenkanKijunCrossover { .. } => RuleKind::IchimokuTenkanKijunCrossover,
            Self::IchimokuSenkouCrossover { .. } => RuleKind::IchimokuSenkouCrossover,
            Self::IchimokuChikouCrossover { .. } => RuleKind::IchimokuChikouCrossover,
            Self::BollingerLowerUpperCrossover { .. } => RuleKind::BollingerLowerUpperCrossover,
            Self::BollingerLowerMidCrossover { .. } => RuleKind::BollingerLowerMidCrossover,
            Self::BollingerUpperMidCrossover { .. } => RuleKind::BollingerUpperMidCrossover,
            Self::MacdSignalCrossover { .. } => RuleKind::MacdSignalCrossover,
        }
    }

    pub fn patience(&self) -> u64 {
        match *self {
            Self::MovingAverageCrossover { patience, .. }
            | Self::ExponentialMovingAverageCrossover { patience, .. }
            | Self::RelativeStrengthIndexThreshold { patience, .. }
            | Self::TripleExponentialDirectionChange { patience, .. }
            | Self::IchimokuTenkanKijunCrossover { patience, .. }
            | Self::IchimokuSenkouCrossover { patience, .. }
            | Self::IchimokuChikouCrossover { patience, .. }
            | Self::BollingerLowerUpperCrossover { patience, .. }
            | Self::BollingerLowerMidCrossover { patience, .. }
            | Self::BollingerUpperMidCrossover { patience, .. }
            | Self::MacdSignalCrossover { patience, .. } => patience,
        }
    }

    /// Check parameters before any indicator is built.
    pub fn validate(&self) -> Result<(), RuleError> {
        let fail = |reason: &str| {
            Err(RuleError {
                kind: self.kind(),
                reason: reason.to_string(),
            })
        };
        if self.patience() == 0 {
            return fail("patience must be >= 1");
        }
        match *self {
            Self::MovingAverageCrossover { fast, slow, .. }
            | Self::ExponentialMovingAverageCrossover { fast, slow, .. } => {
                if fast == 0 || fast >= slow {
                    return fail("need 1 <= fast < slow");
                }
            }
            Self::RelativeStrengthIndexThreshold {
                period,
                lower,
                upper,
                ..
            } => {
                if period == 0 {
                    return fail("period must be >= 1");
                }
                if !(0.0..=100.0).contains(&lower) || !(0.0..=100.0).contains(&upper) {
                    return fail("levels must lie in [0, 100]");
                }
                if lower >= upper {
                    return fail("lower level must be below upper level");
                }
            }
            Self::TripleExponentialDirectionChange { period, .. } => {
                if period == 0 {
                    return fail("period must be >= 1");
                }
            }
            Self::IchimokuTenkanKijunCrossover {
                tenkan,
                kijun,
                senkou,
                ..
            }
            | Self::IchimokuSenkouCrossover {
                tenkan,
                kijun,
                senkou,
                ..
            }
            | Self::IchimokuChikouCrossover {
                tenkan,
                kijun,
                senkou,
                ..
            } => {
                if tenkan == 0 || tenkan > kijun || kijun > senkou {
                    return fail("need 1 <= tenkan <= kijun <= senkou");
                }
            }
            Self::BollingerLowerUpperCrossover {
                period, multiplier, ..
            }
            | Self::BollingerLowerMidCrossover {
                period, multiplier, ..
            }
            | Self::BollingerUpperMidCrossover {
                period, multiplier, ..
            } => {
                if period < 2 {
                    return fail("period must be >= 2");
                }
                if !(multiplier > 0.0 && multiplier.is_finite()) {
                    return fail("multiplier must be positive");
                }
            }
            Self::MacdSignalCrossover {
                fast, slow, signal, ..
            } => {
                if fast == 0 || fast >= slow || signal == 0 {
                    return fail("need 1 <= fast < slow and signal >= 1");
                }
            }
        }
        Ok(())
    }
}

impl fmt::Display for RuleSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::MovingAverageCrossover {
                fast,
                slow,
                patience,
            } => write!(f, "SMA({fast},{slow}) p={patience}"),
            Self::ExponentialMovingAverageCrossover {
                fast,
                slow,
                patience,
            } => write!(f, "EMA({fast},{slow}) p={patience}"),
            Self::RelativeStrengthIndexThreshold {
                period,
                lower,
                upper,
                patience,
            } => write!(f, "RSI({period}) {lower}/{upper} p={patience}"),
            Self::TripleExponentialDirectionChange { period, patience } => {
                write!(f, "TRIX({period}) p={patience}")
            }
            Self::IchimokuTenkanKijunCrossover {
                tenkan,
                kijun,
                senkou,
                patience,
            } => write!(f, "Ichimoku-TK({tenkan},{kijun},{senkou}) p={patience}"),
            Self::IchimokuSenkouCrossover {
                tenkan,
                kijun,
                senkou,
                patience,
            } => write!(f, "Ichimoku-Senkou({tenkan},{kijun},{senkou}) p={patience}"),
            Self::IchimokuChikouCrossover {
                tenkan,
                kijun,
                senkou,
                patience,
            } => write!(f, "Ichimoku-Chikou({tenkan},{kijun},{senkou}) p={patience}"),
            Self::BollingerLowerUpperCrossover {
                period,
                multiplier,
                patience,
            } => write!(f, "BB-LU({period},{multiplier}) p={patience}"),
            Self::BollingerLowerMidCrossover {
                period,
                multiplier,
                patience,
            } => write!(f, "BB-LM({period},{multiplier}) p={patience}"),
            Self::BollingerUpperMidCrossover {
                period,
                multiplier,
                patience,
            } => write!(f, "BB-UM({period},{multiplier}) p={patience}"),
            Self::MacdSignalCrossover {
                fast,
                slow,
                signal,
                patience,
            } => write!(f, "MACD({fast},{slow},{signal}) p={patience}"),
        }
    }
}

#[derive(Debug, Clone)]
enum Machine {
    Crossover(CrossoverRule),
    Band(BandRule),
    Threshold(ThresholdRule),
    Direction(DirectionRule),
}

/// Runtime rule: spec plus indicator and state-machine state.
#[derive(Debug, Clone)]
pub struct Rule {
    spec: RuleSpec,
    machine: Machine,
}

impl Rule {
    pub fn new(spec: RuleSpec) -> Result<Self, RuleError> {
        spec.validate()?;
        let machine = build_machine(&spec);
        Ok(Self { spec, machine })
    }

    /// The constructor parameters this rule was built from.
    pub fn parameters(&self) -> &RuleSpec {
        &self.spec
    }

    pub fn kind(&self) -> RuleKind {
        self.spec.kind()
    }

    /// Feed a bar to the indicator(s) without touching the state machine.
    pub fn prime(&mut self, bar: &Bar) {
        match &mut self.machine {
            Machine::Crossover(rule) => rule.prime(bar),
            Machine::Band(rule) => rule.prime(bar),
            Machine::Threshold(rule) => rule.prime(bar),
            Machine::Direction(rule) => rule.prime(bar),
        }
    }

    /// Push one bar of the rule's timeframe and return its decision.
    pub fn update(&mut self, bar: &Bar) -> Decision {
        match &mut self.machine {
            Machine::Crossover(rule) => rule.update(bar),
            Machine::Band(rule) => rule.update(bar),
            Machine::Threshold(rule) => rule.update(bar),
            Machine::Direction(rule) => rule.update(bar),
        }
    }

    /// Drop all indicator and state-machine state.
    pub fn reset(&mut self) {
        self.machine = build_machine(&self.spec);
    }
}

fn build_machine(spec: &RuleSpec) -> Machine {
    let patience = spec.patience();
    match *spec {
        RuleSpec::MovingAverageCrossover { fast, slow, .. } => Machine::Crossover(
            CrossoverRule::new(CrossoverSource::sma(fast, slow), patience),
        ),
        RuleSpec::ExponentialMovingAverageCrossover { fast, slow, .. } => Machine::Crossover(
            CrossoverRule::new(CrossoverSource::ema(fast, slow), patience),
        ),
        RuleSpec::RelativeStrengthIndexThreshold {
            period,
            lower,
            upper,
            ..
        } => Machine::Threshold(ThresholdRule::new(period, lower, upper, patience)),
        RuleSpec::TripleExponentialDirectionChange { period, .. } => {
            Machine::Direction(DirectionRule::new(period, patience))
        }
        RuleSpec::IchimokuTenkanKijunCrossover {
            tenkan,
            kijun,
            senkou,
            ..
        } => Machine::Crossover(CrossoverRule::new(
            CrossoverSource::ichimoku(tenkan, kijun, senkou, IchimokuLines::TenkanKijun),
            patience,
        )),
        RuleSpec::IchimokuSenkouCrossover {
            tenkan,
            kijun,
            senkou,
            ..
        } => Machine::Crossover(CrossoverRule::new(
            CrossoverSource::ichimoku(tenkan, kijun, senkou, IchimokuLines::Senkou),
            patience,
        )),
        RuleSpec::IchimokuChikouCrossover {
            tenkan,
            kijun,
            senkou,
            ..
        } => Machine::Crossover(CrossoverRule::new(
            CrossoverSource::ichimoku(tenkan, kijun, senkou, IchimokuLines::Chikou),
            patience,
        )),
        RuleSpec::BollingerLowerUpperCrossover {
            period, multiplier, ..
        } => Machine::Band(BandRule::new(
            period,
            multiplier,
            BandVariant::LowerUpper,
            patience,
        )),
        RuleSpec::BollingerLowerMidCrossover {
            period, multiplier, ..
        } => Machine::Band(BandRule::new(
            period,
            multiplier,
            BandVariant::LowerMid,
            patience,
        )),
        RuleSpec::BollingerUpperMidCrossover {
            period, multiplier, ..
        } => Machine::Band(BandRule::new(
            period,
            multiplier,
            BandVariant::UpperMid,
            patience,
        )),
        RuleSpec::MacdSignalCrossover {
            fast, slow, signal, ..
        } => Machine::Crossover(CrossoverRule::new(
            CrossoverSource::macd(fast, slow, signal),
            patience,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_round_trips_through_str() {
        for kind in RuleKind::ALL {
            assert_eq!(kind.as_str().parse::<RuleKind>().unwrap(), kind);
        }
        assert!("Stochastic".parse::<RuleKind>().is_err());
    }

    #[test]
    fn spec_kind_matches_tag() {
        let spec = RuleSpec::MacdSignalCrossover {
            fast: 12,
            slow: 26,
            signal: 9,
            patience: 1,
        };
        assert_eq!(spec.kind(), RuleKind::MacdSignalCrossover);
        let json = serde_json::to_value(&spec).unwrap();
        assert_eq!(json["kind"], "MacdSignalCrossover");
        let back: RuleSpec = serde_json::from_value(json).unwrap();
        assert_eq!(back, spec);
    }

    #[test]
    fn validate_rejects_bad_parameters() {
        let zero_patience = RuleSpec::MovingAverageCrossover {
            fast: 5,
            slow: 20,
            patience: 0,
        };
        assert!(zero_patience.validate().is_err());

        let inverted = RuleSpec::ExponentialMovingAverageCrossover {
            fast: 20,
            slow: 5,
            patience: 1,
        };
        assert!(inverted.validate().is_err());

        let levels = RuleSpec::RelativeStrengthIndexThreshold {
            period: 14,
            lower: 70.0,
            upper: 30.0,
            patience: 1,
        };
        let err = levels.validate().unwrap_err();
        assert_eq!(err.kind, RuleKind::RelativeStrengthIndexThreshold);

        let ichimoku = RuleSpec::IchimokuSenkouCrossover {
            tenkan: 26,
            kijun: 9,
            senkou: 52,
            patience: 1,
        };
        assert!(Rule::new(ichimoku).is_err());
    }

    #[test]
    fn parameters_return_constructor_spec() {
        let spec = RuleSpec::TripleExponentialDirectionChange {
            period: 9,
            patience: 2,
        };
        let rule = Rule::new(spec.clone()).unwrap();
        assert_eq!(rule.parameters(), &spec);
        assert_eq!(rule.kind(), RuleKind::TripleExponentialDirectionChange);
    }

    #[test]
    fn every_kind_builds_from_a_valid_spec() {
        let specs = [
            RuleSpec::MovingAverageCrossover { fast: 2, slow: 4, patience: 1 },
            RuleSpec::ExponentialMovingAverageCrossover { fast: 2, slow: 4, patience: 1 },
            RuleSpec::RelativeStrengthIndexThreshold {
                period: 3,
                lower: 30.0,
                upper: 70.0,
                patience: 1,
            },
            RuleSpec::TripleExponentialDirectionChange { period: 3, patience: 1 },
            RuleSpec::IchimokuTenkanKijunCrossover { tenkan: 2, kijun: 3, senkou: 5, patience: 1 },
            RuleSpec::IchimokuSenkouCrossover { tenkan: 2, kijun: 3, senkou: 5, patience: 1 },
            RuleSpec::IchimokuChikouCrossover { tenkan: 2, kijun: 3, senkou: 5, patience: 1 },
            RuleSpec::BollingerLowerUpperCrossover { period: 5, multiplier: 2.0, patience: 1 },
            RuleSpec::BollingerLowerMidCrossover { period: 5, multiplier: 2.0, patience: 1 },
            RuleSpec::BollingerUpperMidCrossover { period: 5, multiplier: 2.0, patience: 1 },
            RuleSpec::MacdSignalCrossover { fast: 2, slow: 4, signal: 2, patience: 1 },
        ];
        let kinds: Vec<RuleKind> = specs.iter().map(RuleSpec::kind).collect();
        assert_eq!(kinds, RuleKind::ALL.to_vec());

        let bars = crate::indicators::make_bars(&[
            10.0, 11.0, 12.0, 11.0, 10.0, 9.0, 10.0, 12.0, 13.0, 12.0, 11.0, 10.0,
        ]);
        for spec in specs {
            let mut rule = Rule::new(spec).unwrap();
            for bar in &bars {
                rule.update(bar);
            }
        }
    }

    #[test]
    fn reset_restores_fresh_state() {
        let spec = RuleSpec::MovingAverageCrossover {
            fast: 1,
            slow: 2,
            patience: 1,
        };
        let bars = crate::indicators::make_bars(&[10.0, 9.0, 8.0, 9.0, 10.0]);

        let mut rule = Rule::new(spec).unwrap();
        let first: Vec<Decision> = bars.iter().map(|b| rule.update(b)).collect();
        rule.reset();
        let second: Vec<Decision> = bars.iter().map(|b| rule.update(b)).collect();
        assert_eq!(first, second);
    }
}
