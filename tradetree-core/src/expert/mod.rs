//! The expert tree: Pair → TimeFrame → RuleClass → Rule.
//!
//! Each level is its own type so the tree shape is enforced by construction;
//! [`Expert`] wraps any of them when a caller needs to hold "some node"
//! (serialization, upcasting, the optimizer's per-node work).
//!
//! Decisions flow bottom-up through [`Voter`]; interior levels share their
//! weighting logic through [`Committee`].

pub mod committee;
pub mod document;
pub mod estimate;
pub mod levels;
pub mod rule_expert;

pub use committee::{aggregate, normalize_l1, Committee};
pub use document::{DocumentError, TreeDocument, SCHEMA_VERSION};
pub use estimate::Estimate;
pub use levels::{PairExpert, RuleClassExpert, TimeFrameExpert};
pub use rule_expert::RuleExpert;

use std::collections::BTreeSet;
use std::fmt::Write as _;

use thiserror::Error;

use crate::domain::{Bar, BarUpdate, Pair, Timeframe, Verdict};
use crate::rules::{RuleError, RuleKind};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExpertError {
    #[error("expected {expected} weights, got {found}")]
    WeightLength { expected: usize, found: usize },

    #[error("weights must be finite")]
    NonFiniteWeight,

    #[error("rule experts have no weights")]
    NotInterior,

    #[error("cannot wrap {node} without a {missing} in its lineage")]
    MissingLineage {
        node: &'static str,
        missing: &'static str,
    },

    #[error(transparent)]
    Rule(#[from] RuleError),
}

/// Per-step behaviour shared by every node.
pub trait Voter {
    /// Warm indicators with a historical bar, without producing decisions.
    fn prime(&mut self, timeframe: Timeframe, bar: &Bar);

    /// Push the bars that closed during this step.
    fn update(&mut self, update: &BarUpdate);

    /// Decision and confidence after the latest `update`.
    fn decide(&self) -> Verdict;

    /// Discard all indicator and rule state.
    fn reset(&mut self);

    fn collect_timeframes(&self, out: &mut BTreeSet<Timeframe>);
}

/// An interior level: a typed node around a [`Committee`].
pub trait Interior: Voter + Clone + Into<Expert> {
    type Member: Voter + Clone;

    fn committee(&self) -> &Committee<Self::Member>;

    /// Mutable access to the committee. Callers that mutate members should go
    /// through [`Committee::members_mut`], which invalidates the estimate.
    fn committee_mut(&mut self) -> &mut Committee<Self::Member>;

    fn label(&self) -> String;

    fn weights(&self) -> &[f64] {
        self.committee().weights()
    }

    fn set_weights(&mut self, weights: Option<Vec<f64>>) -> Result<(), ExpertError> {
        self.committee_mut().set_weights(weights)
    }

    fn estimate(&self) -> Estimate {
        self.committee().estimate()
    }

    fn set_estimate(&mut self, estimate: Estimate) {
        self.committee_mut().set_estimate(estimate);
    }
}

/// Any node of the tree.
#[derive(Debug, Clone)]
pub enum Expert {
    Pair(PairExpert),
    TimeFrame(TimeFrameExpert),
    RuleClass(RuleClassExpert),
    Rule(RuleExpert),
}

impl From<PairExpert> for Expert {
    fn from(node: PairExpert) -> Self {
        Self::Pair(node)
    }
}

impl From<TimeFrameExpert> for Expert {
    fn from(node: TimeFrameExpert) -> Self {
        Self::TimeFrame(node)
    }
}

impl From<RuleClassExpert> for Expert {
    fn from(node: RuleClassExpert) -> Self {
        Self::RuleClass(node)
    }
}

impl From<RuleExpert> for Expert {
    fn from(node: RuleExpert) -> Self {
        Self::Rule(node)
    }
}

impl Expert {
    pub fn node_type(&self) -> &'static str {
        match self {
            Self::Pair(_) => "Pair",
            Self::TimeFrame(_) => "TimeFrame",
            Self::RuleClass(_) => "RuleClass",
            Self::Rule(_) => "Rule",
        }
    }

    pub fn label(&self) -> String {
        match self {
            Self::Pair(n) => n.label(),
            Self::TimeFrame(n) => n.label(),
            Self::RuleClass(n) => n.label(),
            Self::Rule(n) => n.label(),
        }
    }

    /// Child weights; empty for a rule leaf.
    pub fn weights(&self) -> &[f64] {
        match self {
            Self::Pair(n) => n.weights(),
            Self::TimeFrame(n) => n.weights(),
            Self::RuleClass(n) => n.weights(),
            Self::Rule(_) => &[],
        }
    }

    /// Set this node's weights (`None` = uniform). With `recursive`, every
    /// interior descendant is reset to uniform weights as well.
    pub fn set_weights(
        &mut self,
        weights: Option<Vec<f64>>,
        recursive: bool,
    ) -> Result<(), ExpertError> {
        match self {
            Self::Pair(n) => {
                n.set_weights(weights)?;
                if recursive {
                    for tf in n.committee_mut().members_mut() {
                        uniform_below_timeframe(tf)?;
                    }
                }
            }
            Self::TimeFrame(n) => {
                n.set_weights(weights)?;
                if recursive {
                    for class in n.committee_mut().members_mut() {
                        class.set_weights(None)?;
                    }
                }
            }
            Self::RuleClass(n) => n.set_weights(weights)?,
            Self::Rule(_) => {
                if weights.is_some() {
                    return Err(ExpertError::NotInterior);
                }
            }
        }
        Ok(())
    }

    pub fn estimate(&self) -> Estimate {
        match self {
            Self::Pair(n) => n.estimate(),
            Self::TimeFrame(n) => n.estimate(),
            Self::RuleClass(n) => n.estimate(),
            Self::Rule(n) => n.estimate(),
        }
    }

    pub fn set_estimate(&mut self, estimate: Estimate) {
        match self {
            Self::Pair(n) => n.set_estimate(estimate),
            Self::TimeFrame(n) => n.set_estimate(estimate),
            Self::RuleClass(n) => n.set_estimate(estimate),
            Self::Rule(n) => n.set_estimate(estimate),
        }
    }

    pub fn child_count(&self) -> usize {
        match self {
            Self::Pair(n) => n.committee().len(),
            Self::TimeFrame(n) => n.committee().len(),
            Self::RuleClass(n) => n.committee().len(),
            Self::Rule(_) => 0,
        }
    }

    /// Indented multi-line rendering of the tree with weights and estimates.
    pub fn outline(&self) -> String {
        let mut out = String::new();
        outline_into(self, 1.0, 0, &mut out);
        out
    }
}

impl Voter for Expert {
    fn prime(&mut self, timeframe: Timeframe, bar: &Bar) {
        match self {
            Self::Pair(n) => n.prime(timeframe, bar),
            Self::TimeFrame(n) => n.prime(timeframe, bar),
            Self::RuleClass(n) => n.prime(timeframe, bar),
            Self::Rule(n) => n.prime(timeframe, bar),
        }
    }

    fn update(&mut self, update: &BarUpdate) {
        match self {
            Self::Pair(n) => n.update(update),
            Self::TimeFrame(n) => n.update(update),
            Self::RuleClass(n) => n.update(update),
            Self::Rule(n) => n.update(update),
        }
    }

    fn decide(&self) -> Verdict {
        match self {
            Self::Pair(n) => n.decide(),
            Self::TimeFrame(n) => n.decide(),
            Self::RuleClass(n) => n.decide(),
            Self::Rule(n) => n.decide(),
        }
    }

    fn reset(&mut self) {
        match self {
            Self::Pair(n) => n.reset(),
            Self::TimeFrame(n) => n.reset(),
            Self::RuleClass(n) => n.reset(),
            Self::Rule(n) => n.reset(),
        }
    }

    fn collect_timeframes(&self, out: &mut BTreeSet<Timeframe>) {
        match self {
            Self::Pair(n) => n.collect_timeframes(out),
            Self::TimeFrame(n) => n.collect_timeframes(out),
            Self::RuleClass(n) => n.collect_timeframes(out),
            Self::Rule(n) => n.collect_timeframes(out),
        }
    }
}

fn uniform_below_timeframe(tf: &mut TimeFrameExpert) -> Result<(), ExpertError> {
    tf.set_weights(None)?;
    for class in tf.committee_mut().members_mut() {
        class.set_weights(None)?;
    }
    Ok(())
}

fn outline_into(expert: &Expert, weight: f64, depth: usize, out: &mut String) {
    let estimate = expert.estimate();
    let profit = estimate
        .profit
        .map(|p| format!("{p:+.4}%/day"))
        .unwrap_or_else(|| "unestimated".to_string());
    let _ = writeln!(
        out,
        "{:indent$}[{}] {} w={weight:.3} {profit} trades={}",
        "",
        expert.node_type(),
        expert.label(),
        estimate.ntrades,
        indent = depth * 2
    );

    fn children<N: Interior>(node: &N, depth: usize, out: &mut String)
    where
        N::Member: Into<Expert>,
    {
        let committee = node.committee();
        for (member, w) in committee.members().iter().zip(committee.weights()) {
            outline_into(&member.clone().into(), *w, depth + 1, out);
        }
    }

    match expert {
        Expert::Pair(n) => children(n, depth, out),
        Expert::TimeFrame(n) => children(n, depth, out),
        Expert::RuleClass(n) => children(n, depth, out),
        Expert::Rule(_) => {}
    }
}

/// Where a node sits in a full tree; enough to rebuild its missing parents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lineage {
    pub pair: Pair,
    pub timeframe: Option<Timeframe>,
    pub rule: Option<RuleKind>,
}

impl Lineage {
    pub fn new(pair: Pair) -> Self {
        Self {
            pair,
            timeframe: None,
            rule: None,
        }
    }

    pub fn with_timeframe(&self, timeframe: Timeframe) -> Self {
        Self {
            timeframe: Some(timeframe),
            ..self.clone()
        }
    }

    pub fn with_rule(&self, rule: RuleKind) -> Self {
        Self {
            rule: Some(rule),
            ..self.clone()
        }
    }
}

/// Wrap `expert` as the single child of fresh parents until it is a
/// standalone [`PairExpert`]. Wrappers are pass-through (weight 1, threshold 0).
pub fn cast_to_pair_expert(
    expert: impl Into<Expert>,
    lineage: &Lineage,
) -> Result<PairExpert, ExpertError> {
    let mut node = expert.into();
    loop {
        node = match node {
            Expert::Pair(pair) => return Ok(pair),
            Expert::TimeFrame(tf) => {
                PairExpert::from_committee(lineage.pair.clone(), Committee::solo(tf)).into()
            }
            Expert::RuleClass(class) => {
                let timeframe = lineage.timeframe.ok_or(ExpertError::MissingLineage {
                    node: "RuleClass",
                    missing: "timeframe",
                })?;
                TimeFrameExpert::from_committee(timeframe, Committee::solo(class)).into()
            }
            // a leaf carries its own timeframe
            Expert::Rule(rule) => {
                let timeframe = rule.timeframe();
                let class = RuleClassExpert::from_committee(rule.kind(), Committee::solo(rule));
                TimeFrameExpert::from_committee(timeframe, Committee::solo(class)).into()
            }
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Decision;
    use crate::indicators::make_bars;
    use crate::rules::RuleSpec;

    fn leaf() -> RuleExpert {
        RuleExpert::new(
            Timeframe::D1,
            RuleSpec::MovingAverageCrossover {
                fast: 1,
                slow: 3,
                patience: 1,
            },
        )
        .unwrap()
    }

    fn lineage() -> Lineage {
        Lineage::new(Pair::new("ETH", "USDT"))
    }

    #[test]
    fn rule_leaf_upcasts_to_pair() {
        let pair = cast_to_pair_expert(leaf(), &lineage()).unwrap();
        assert_eq!(pair.pair(), &Pair::new("ETH", "USDT"));
        assert_eq!(pair.rule_count(), 1);
        let tf = &pair.committee().members()[0];
        assert_eq!(tf.timeframe(), Timeframe::D1);
        assert_eq!(
            tf.committee().members()[0].kind(),
            RuleKind::MovingAverageCrossover
        );
    }

    #[test]
    fn leaf_timeframe_wins_over_lineage() {
        let lineage = lineage().with_timeframe(Timeframe::H4);
        let pair = cast_to_pair_expert(leaf(), &lineage).unwrap();
        assert_eq!(pair.committee().members()[0].timeframe(), Timeframe::D1);
        assert_eq!(pair.timeframes().into_iter().collect::<Vec<_>>(), vec![Timeframe::D1]);
    }

    #[test]
    fn rule_class_needs_timeframe_lineage() {
        let class = RuleClassExpert::new(RuleKind::MovingAverageCrossover, vec![leaf()], 0.0);
        let err = cast_to_pair_expert(class.clone(), &lineage()).unwrap_err();
        assert!(matches!(err, ExpertError::MissingLineage { .. }));

        let pair = cast_to_pair_expert(class, &lineage().with_timeframe(Timeframe::D1)).unwrap();
        assert_eq!(pair.committee().members()[0].timeframe(), Timeframe::D1);
    }

    #[test]
    fn wrapped_leaf_passes_decision_through() {
        let mut pair = cast_to_pair_expert(leaf(), &lineage()).unwrap();
        for bar in make_bars(&[12.0, 11.0, 10.0, 13.0]) {
            pair.update(&BarUpdate::from_iter([(Timeframe::D1, bar)]));
        }
        let verdict = pair.decide();
        assert_eq!(verdict.decision, Decision::Buy);
        assert!((verdict.confidence - 1.0).abs() < 1e-12);
    }

    #[test]
    fn recursive_set_weights_resets_descendants() {
        let class = RuleClassExpert::new(
            RuleKind::MovingAverageCrossover,
            vec![leaf(), leaf()],
            0.0,
        );
        let mut tf = TimeFrameExpert::new(Timeframe::D1, vec![class.clone(), class], 0.0);
        tf.committee_mut().members_mut()[0]
            .set_weights(Some(vec![0.9, 0.1]))
            .unwrap();

        let mut node = Expert::from(tf);
        node.set_weights(Some(vec![3.0, 1.0]), true).unwrap();
        assert_eq!(node.weights(), &[0.75, 0.25]);
        let Expert::TimeFrame(tf) = &node else {
            unreachable!()
        };
        assert_eq!(tf.committee().members()[0].weights(), &[0.5, 0.5]);
    }

    #[test]
    fn leaf_rejects_weights() {
        let mut node = Expert::from(leaf());
        assert_eq!(
            node.set_weights(Some(vec![1.0]), false),
            Err(ExpertError::NotInterior)
        );
        assert!(node.set_weights(None, true).is_ok());
    }

    #[test]
    fn outline_lists_every_node() {
        let pair = cast_to_pair_expert(leaf(), &lineage()).unwrap();
        let text = Expert::from(pair).outline();
        assert_eq!(text.lines().count(), 4);
        assert!(text.starts_with("[Pair] ETH/USDT"));
        assert!(text.contains("[Rule] SMA(1,3) p=1 @ 1d"));
    }
}
