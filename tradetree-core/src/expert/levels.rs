//! Interior levels of the tree: rule class, timeframe, pair.

use std::collections::BTreeSet;

use super::{Committee, Interior, RuleExpert, Voter};
use crate::domain::{Bar, BarUpdate, Pair, Timeframe, Verdict};
use crate::rules::RuleKind;

/// Candidates of a single rule family on one timeframe.
#[derive(Debug, Clone)]
pub struct RuleClassExpert {
    kind: RuleKind,
    committee: Committee<RuleExpert>,
}

impl RuleClassExpert {
    pub fn new(kind: RuleKind, rules: Vec<RuleExpert>, threshold: f64) -> Self {
        Self {
            kind,
            committee: Committee::new(rules, threshold),
        }
    }

    pub fn from_committee(kind: RuleKind, committee: Committee<RuleExpert>) -> Self {
        Self { kind, committee }
    }

    pub fn kind(&self) -> RuleKind {
        self.kind
    }
}

/// Rule classes evaluated on one timeframe.
#[derive(Debug, Clone)]
pub struct TimeFrameExpert {
    timeframe: Timeframe,
    committee: Committee<RuleClassExpert>,
}

impl TimeFrameExpert {
    pub fn new(timeframe: Timeframe, classes: Vec<RuleClassExpert>, threshold: f64) -> Self {
        Self {
            timeframe,
            committee: Committee::new(classes, threshold),
        }
    }

    pub fn from_committee(timeframe: Timeframe, committee: Committee<RuleClassExpert>) -> Self {
        Self {
            timeframe,
            committee,
        }
    }

    pub fn timeframe(&self) -> Timeframe {
        self.timeframe
    }
}

/// Root of a trading tree.
#[derive(Debug, Clone)]
pub struct PairExpert {
    pair: Pair,
    committee: Committee<TimeFrameExpert>,
}

impl PairExpert {
    pub fn new(pair: Pair, timeframes: Vec<TimeFrameExpert>, threshold: f64) -> Self {
        Self {
            pair,
            committee: Committee::new(timeframes, threshold),
        }
    }

    pub fn from_committee(pair: Pair, committee: Committee<TimeFrameExpert>) -> Self {
        Self { pair, committee }
    }

    pub fn pair(&self) -> &Pair {
        &self.pair
    }

    /// Every timeframe a leaf below this node listens to, shortest first.
    pub fn timeframes(&self) -> BTreeSet<Timeframe> {
        let mut out = BTreeSet::new();
        self.collect_timeframes(&mut out);
        out
    }

    /// Number of rule leaves in the tree.
    pub fn rule_count(&self) -> usize {
        self.committee
            .members()
            .iter()
            .flat_map(|tf| tf.committee.members())
            .map(|class| class.committee.len())
            .sum()
    }
}

macro_rules! interior {
    ($node:ty, $member:ty, $label:expr) => {
        impl Voter for $node {
            fn prime(&mut self, timeframe: Timeframe, bar: &Bar) {
                self.committee.prime(timeframe, bar);
            }

            fn update(&mut self, update: &BarUpdate) {
                self.committee.update(update);
            }

            fn decide(&self) -> Verdict {
                self.committee.decide()
            }

            fn reset(&mut self) {
                self.committee.reset();
            }

            fn collect_timeframes(&self, out: &mut BTreeSet<Timeframe>) {
                self.committee.collect_timeframes(out);
            }
        }

        impl Interior for $node {
            type Member = $member;

            fn committee(&self) -> &Committee<$member> {
                &self.committee
            }

            fn committee_mut(&mut self) -> &mut Committee<$member> {
                &mut self.committee
            }

            fn label(&self) -> String {
                let label: fn(&$node) -> String = $label;
                label(self)
            }
        }
    };
}

interior!(RuleClassExpert, RuleExpert, |n| n.kind.to_string());
interior!(TimeFrameExpert, RuleClassExpert, |n| n.timeframe.to_string());
interior!(PairExpert, TimeFrameExpert, |n| n.pair.to_string());
