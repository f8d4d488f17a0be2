//! Candidate enumeration and full-tree assembly.
//!
//! A [`SearchSpace`] lists rule parameterizations per (timeframe, kind);
//! [`construct_system`] turns every candidate into a leaf and groups the
//! leaves into the four-level tree.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use tradetree_core::domain::{Pair, Timeframe};
use tradetree_core::expert::{PairExpert, RuleClassExpert, RuleExpert, TimeFrameExpert};
use tradetree_core::rules::{RuleError, RuleKind, RuleSpec};

/// Source of rule candidates.
pub trait SearchSpace: Send + Sync {
    fn candidates(&self, timeframe: Timeframe, kind: RuleKind) -> Vec<RuleSpec>;
}

/// Parameter grid specification.
///
/// Every rule kind draws from its own lists; invalid combinations
/// (e.g. fast >= slow) are skipped when candidates are generated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParamGrid {
    /// Confirmation delays tried for every kind.
    pub patience: Vec<u64>,

    pub ma_fast: Vec<usize>,
    pub ma_slow: Vec<usize>,

    pub ema_fast: Vec<usize>,
    pub ema_slow: Vec<usize>,

    pub rsi_period: Vec<usize>,
    /// Levels are placed at `50 - offset` and `50 + offset`.
    pub rsi_offset: Vec<f64>,

    pub trix_period: Vec<usize>,

    /// (tenkan, kijun, senkou) triples.
    pub ichimoku: Vec<[usize; 3]>,

    pub bollinger_period: Vec<usize>,
    pub bollinger_multiplier: Vec<f64>,

    pub macd_fast: Vec<usize>,
    pub macd_slow: Vec<usize>,
    pub macd_signal: Vec<usize>,
}

impl Default for ParamGrid {
    fn default() -> Self {
        Self {
            patience: vec![1, 2],
            ma_fast: vec![5, 10, 20],
            ma_slow: vec![20, 50, 100],
            ema_fast: vec![5, 10, 20],
            ema_slow: vec![20, 50, 100],
            rsi_period: vec![7, 14, 21],
            rsi_offset: vec![10.0, 20.0, 30.0],
            trix_period: vec![9, 15, 21],
            ichimoku: vec![[9, 26, 52], [7, 22, 44], [10, 30, 60]],
            bollinger_period: vec![20, 30],
            bollinger_multiplier: vec![1.5, 2.0, 2.5],
            macd_fast: vec![8, 12],
            macd_slow: vec![21, 26],
            macd_signal: vec![5, 9],
        }
    }
}

impl ParamGrid {
    /// All valid specs of one kind, in grid order.
    pub fn candidates(&self, kind: RuleKind) -> Vec<RuleSpec> {
        let mut specs = Vec::new();
        for &patience in &self.patience {
            match kind {
                RuleKind::MovingAverageCrossover => {
                    for (&fast, &slow) in pairs(&self.ma_fast, &self.ma_slow) {
                        specs.push(RuleSpec::MovingAverageCrossover {
                            fast,
                            slow,
                            patience,
                        });
                    }
                }
                RuleKind::ExponentialMovingAverageCrossover => {
                    for (&fast, &slow) in pairs(&self.ema_fast, &self.ema_slow) {
                        specs.push(RuleSpec::ExponentialMovingAverageCrossover {
                            fast,
                            slow,
                            patience,
                        });
                    }
                }
                RuleKind::RelativeStrengthIndexThreshold => {
                    for (&period, &offset) in pairs(&self.rsi_period, &self.rsi_offset) {
                        specs.push(RuleSpec::RelativeStrengthIndexThreshold {
                            period,
                            lower: 50.0 - offset,
                            upper: 50.0 + offset,
                            patience,
                        });
                    }
                }
                RuleKind::TripleExponentialDirectionChange => {
                    for &period in &self.trix_period {
                        specs.push(RuleSpec::TripleExponentialDirectionChange { period, patience });
                    }
                }
                RuleKind::IchimokuTenkanKijunCrossover
                | RuleKind::IchimokuSenkouCrossover
                | RuleKind::IchimokuChikouCrossover => {
                    for &[tenkan, kijun, senkou] in &self.ichimoku {
                        specs.push(ichimoku_spec(kind, tenkan, kijun, senkou, patience));
                    }
                }
                RuleKind::BollingerLowerUpperCrossover
                | RuleKind::BollingerLowerMidCrossover
                | RuleKind::BollingerUpperMidCrossover => {
                    for (&period, &multiplier) in
                        pairs(&self.bollinger_period, &self.bollinger_multiplier)
                    {
                        specs.push(bollinger_spec(kind, period, multiplier, patience));
                    }
                }
                RuleKind::MacdSignalCrossover => {
                    for (&fast, &slow) in pairs(&self.macd_fast, &self.macd_slow) {
                        for &signal in &self.macd_signal {
                            specs.push(RuleSpec::MacdSignalCrossover {
                                fast,
                                slow,
                                signal,
                                patience,
                            });
                        }
                    }
                }
            }
        }
        specs.retain(|spec| spec.validate().is_ok());
        specs
    }
}

fn pairs<'a, A, B>(a: &'a [A], b: &'a [B]) -> impl Iterator<Item = (&'a A, &'a B)> {
    a.iter().flat_map(move |x| b.iter().map(move |y| (x, y)))
}

fn ichimoku_spec(
    kind: RuleKind,
    tenkan: usize,
    kijun: usize,
    senkou: usize,
    patience: u64,
) -> RuleSpec {
    match kind {
        RuleKind::IchimokuSenkouCrossover => RuleSpec::IchimokuSenkouCrossover {
            tenkan,
            kijun,
            senkou,
            patience,
        },
        RuleKind::IchimokuChikouCrossover => RuleSpec::IchimokuChikouCrossover {
            tenkan,
            kijun,
            senkou,
            patience,
        },
        _ => RuleSpec::IchimokuTenkanKijunCrossover {
            tenkan,
            kijun,
            senkou,
            patience,
        },
    }
}

fn bollinger_spec(kind: RuleKind, period: usize, multiplier: f64, patience: u64) -> RuleSpec {
    match kind {
        RuleKind::BollingerLowerMidCrossover => RuleSpec::BollingerLowerMidCrossover {
            period,
            multiplier,
            patience,
        },
        RuleKind::BollingerUpperMidCrossover => RuleSpec::BollingerUpperMidCrossover {
            period,
            multiplier,
            patience,
        },
        _ => RuleSpec::BollingerLowerUpperCrossover {
            period,
            multiplier,
            patience,
        },
    }
}

/// A default grid with optional per-timeframe replacements.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridSearchSpace {
    pub grid: ParamGrid,
    /// Replacement grids keyed by timeframe.
    pub timeframe: BTreeMap<Timeframe, ParamGrid>,
}

impl GridSearchSpace {
    pub fn new(grid: ParamGrid) -> Self {
        Self {
            grid,
            timeframe: BTreeMap::new(),
        }
    }

    pub fn with_override(mut self, timeframe: Timeframe, grid: ParamGrid) -> Self {
        self.timeframe.insert(timeframe, grid);
        self
    }

    pub fn grid_for(&self, timeframe: Timeframe) -> &ParamGrid {
        self.timeframe.get(&timeframe).unwrap_or(&self.grid)
    }
}

impl SearchSpace for GridSearchSpace {
    fn candidates(&self, timeframe: Timeframe, kind: RuleKind) -> Vec<RuleSpec> {
        self.grid_for(timeframe).candidates(kind)
    }
}

/// Decision thresholds of the three interior levels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LevelThresholds {
    pub pair: f64,
    pub timeframe: f64,
    pub rule_class: f64,
}

impl Default for LevelThresholds {
    fn default() -> Self {
        Self {
            pair: 0.0,
            timeframe: 0.0,
            rule_class: 0.0,
        }
    }
}

/// Build the full candidate tree for `pair`.
///
/// Rule classes without candidates and timeframes without rule classes are
/// left out, so every interior node has at least one child.
pub fn construct_system(
    pair: &Pair,
    timeframes: &[Timeframe],
    kinds: &[RuleKind],
    space: &dyn SearchSpace,
    thresholds: &LevelThresholds,
) -> Result<PairExpert, RuleError> {
    let mut timeframe_experts = Vec::with_capacity(timeframes.len());
    let mut total = 0usize;

    for &tf in timeframes {
        info!(timeframe = %tf, "loading timeframe");
        let mut classes = Vec::with_capacity(kinds.len());
        for &kind in kinds {
            let leaves = space
                .candidates(tf, kind)
                .into_iter()
                .map(|spec| RuleExpert::new(tf, spec))
                .collect::<Result<Vec<_>, _>>()?;
            info!(timeframe = %tf, rule = %kind, candidates = leaves.len(), "rule class");
            if leaves.is_empty() {
                debug!(timeframe = %tf, rule = %kind, "no candidates, skipping class");
                continue;
            }
            total += leaves.len();
            classes.push(RuleClassExpert::new(kind, leaves, thresholds.rule_class));
        }
        if classes.is_empty() {
            continue;
        }
        timeframe_experts.push(TimeFrameExpert::new(tf, classes, thresholds.timeframe));
    }

    info!(
        pair = %pair,
        timeframes = timeframe_experts.len(),
        candidates = total,
        "system constructed"
    );
    Ok(PairExpert::new(
        pair.clone(),
        timeframe_experts,
        thresholds.pair,
    ))
}
