//! Bottom-up pruning of rule candidates.
//!
//! Every rule leaf is scored standalone (wrapped into a single-rule pair
//! tree) over a timeframe-dependent number of days. Scores are cached on the
//! leaf, so a leaf is only ever replayed once. Each rule class then keeps
//! the candidates that pass the configured [`PrunePolicy`]; classes and
//! timeframes left empty are removed.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};
use tradetree_core::expert::{
    cast_to_pair_expert, ExpertError, Interior, Lineage, PairExpert, RuleClassExpert, RuleExpert,
};

use crate::backtest::BacktestError;
use crate::fitness::{EstimateDays, FitnessEvaluator};

#[derive(Debug, Error)]
pub enum SelectError {
    #[error("invalid prune config: {0}")]
    InvalidPruneConfig(String),

    #[error(transparent)]
    Expert(#[from] ExpertError),

    #[error(transparent)]
    Backtest(#[from] BacktestError),
}

/// How survivors are chosen inside a rule class.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PrunePolicy {
    /// Keep candidates whose profit is strictly greater than the threshold.
    Threshold(f64),
    /// Keep the N most profitable candidates.
    TopN(usize),
    /// Keep the most profitable fraction (0, 1] of candidates, rounded down.
    TopPercent(f64),
}

/// One pruning pass as written in configuration: a minimum trade count plus
/// exactly one of `threshold`, `nbest`, `percent`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PruneOptions {
    pub min_trades: Option<usize>,
    pub threshold: Option<f64>,
    pub nbest: Option<usize>,
    pub percent: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PruneConfig {
    pub min_trades: Option<usize>,
    pub policy: PrunePolicy,
}

impl PruneConfig {
    pub fn from_options(options: &PruneOptions) -> Result<Self, SelectError> {
        let policy = match (options.threshold, options.nbest, options.percent) {
            (Some(t), None, None) => {
                if !t.is_finite() {
                    return Err(SelectError::InvalidPruneConfig(
                        "threshold must be finite".into(),
                    ));
                }
                PrunePolicy::Threshold(t)
            }
            (None, Some(n), None) => PrunePolicy::TopN(n),
            (None, None, Some(p)) => {
                if !(p > 0.0 && p <= 1.0) {
                    return Err(SelectError::InvalidPruneConfig(format!(
                        "percent must lie in (0, 1], got {p}"
                    )));
                }
                PrunePolicy::TopPercent(p)
            }
            (None, None, None) => {
                return Err(SelectError::InvalidPruneConfig(
                    "one of threshold, nbest or percent is required".into(),
                ))
            }
            _ => {
                return Err(SelectError::InvalidPruneConfig(
                    "threshold, nbest and percent are mutually exclusive".into(),
                ))
            }
        };
        Ok(Self {
            min_trades: options.min_trades,
            policy,
        })
    }

    /// Indices of `scores` that survive, given each candidate's
    /// `(profit, ntrades)`. Unknown profits never survive.
    pub fn survivors(&self, scores: &[(Option<f64>, usize)]) -> Vec<bool> {
        let mut ranked: Vec<(usize, f64)> = scores
            .iter()
            .enumerate()
            .filter_map(|(i, (profit, ntrades))| {
                let profit = (*profit)?;
                let enough = self.min_trades.map_or(true, |min| *ntrades >= min);
                enough.then_some((i, profit))
            })
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));

        let keep = match self.policy {
            PrunePolicy::Threshold(t) => ranked.iter().take_while(|(_, p)| *p > t).count(),
            PrunePolicy::TopN(n) => n.min(ranked.len()),
            PrunePolicy::TopPercent(p) => ((p * scores.len() as f64) as usize).min(ranked.len()),
        };

        let mut alive = vec![false; scores.len()];
        for (i, _) in &ranked[..keep] {
            alive[*i] = true;
        }
        alive
    }
}

/// Counts from one pruning pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PruneReport {
    /// Candidates replayed during this pass.
    pub estimated: usize,
    /// Candidates whose replay hit missing history.
    pub data_gaps: usize,
    pub kept: usize,
    pub removed: usize,
}

impl PruneReport {
    fn absorb(&mut self, other: PruneReport) {
        self.estimated += other.estimated;
        self.data_gaps += other.data_gaps;
        self.kept += other.kept;
        self.removed += other.removed;
    }
}

enum Estimated {
    Cached,
    Ran,
    Gap,
}

pub struct Selector<'a> {
    evaluator: &'a dyn FitnessEvaluator,
    days: &'a EstimateDays,
}

impl<'a> Selector<'a> {
    pub fn new(evaluator: &'a dyn FitnessEvaluator, days: &'a EstimateDays) -> Self {
        Self { evaluator, days }
    }

    /// Score a leaf unless it already carries a profit.
    fn estimate_rule(
        &self,
        leaf: &mut RuleExpert,
        lineage: &Lineage,
    ) -> Result<Estimated, SelectError> {
        if leaf.estimate().is_known() {
            return Ok(Estimated::Cached);
        }
        let timeframe = leaf.timeframe();
        let lineage = lineage.with_timeframe(timeframe).with_rule(leaf.kind());
        let candidate = cast_to_pair_expert(leaf.clone(), &lineage)?;
        match self
            .evaluator
            .evaluate(&candidate, self.days.for_timeframe(timeframe))
        {
            Ok(estimate) => {
                leaf.set_estimate(estimate);
                Ok(Estimated::Ran)
            }
            Err(BacktestError::DataGap {
                pair,
                timeframe,
                reason,
            }) => {
                warn!(%pair, %timeframe, %reason, rule = %leaf.label(), "estimate skipped");
                Ok(Estimated::Gap)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Estimate every candidate of one class and keep the survivors.
    pub fn best_rule_experts(
        &self,
        class: &mut RuleClassExpert,
        lineage: &Lineage,
        config: &PruneConfig,
    ) -> Result<PruneReport, SelectError> {
        let outcomes = class
            .committee_mut()
            .members_mut()
            .par_iter_mut()
            .map(|leaf| self.estimate_rule(leaf, lineage))
            .collect::<Result<Vec<_>, _>>()?;

        let mut report = PruneReport::default();
        for outcome in &outcomes {
            match outcome {
                Estimated::Ran => report.estimated += 1,
                Estimated::Gap => report.data_gaps += 1,
                Estimated::Cached => {}
            }
        }

        let scores: Vec<(Option<f64>, usize)> = class
            .committee()
            .members()
            .iter()
            .map(|leaf| {
                let e = leaf.estimate();
                (e.profit, e.ntrades)
            })
            .collect();
        let alive = config.survivors(&scores);
        let mut index = 0;
        report.removed = class.committee_mut().retain(|_| {
            let keep = alive[index];
            index += 1;
            keep
        });
        report.kept = class.committee().len();

        debug!(
            class = %class.label(),
            estimated = report.estimated,
            kept = report.kept,
            removed = report.removed,
            "class pruned"
        );
        Ok(report)
    }

    /// One pruning pass over a whole tree.
    pub fn trim_bad_experts(
        &self,
        root: &mut PairExpert,
        config: &PruneConfig,
    ) -> Result<PruneReport, SelectError> {
        let lineage = Lineage::new(root.pair().clone());
        let mut report = PruneReport::default();

        for tf in root.committee_mut().members_mut() {
            let tf_lineage = lineage.with_timeframe(tf.timeframe());
            info!(timeframe = %tf.timeframe(), "trim");
            for class in tf.committee_mut().members_mut() {
                let class_lineage = tf_lineage.with_rule(class.kind());
                report.absorb(self.best_rule_experts(class, &class_lineage, config)?);
            }
            let dropped = tf.committee_mut().retain(|class| !class.committee().is_empty());
            if dropped > 0 {
                debug!(timeframe = %tf.timeframe(), dropped, "empty rule classes removed");
            }
        }
        let dropped = root.committee_mut().retain(|tf| !tf.committee().is_empty());
        if dropped > 0 {
            debug!(dropped, "empty timeframes removed");
        }

        info!(
            pair = %root.pair(),
            estimated = report.estimated,
            data_gaps = report.data_gaps,
            kept = report.kept,
            removed = report.removed,
            "pruning pass finished"
        );
        Ok(report)
    }

    /// Run several passes in order.
    pub fn prune(
        &self,
        root: &mut PairExpert,
        passes: &[PruneConfig],
    ) -> Result<PruneReport, SelectError> {
        let mut total = PruneReport::default();
        for (i, pass) in passes.iter().enumerate() {
            info!(pass = i + 1, of = passes.len(), "pruning");
            let report = self.trim_bad_experts(root, pass)?;
            total.estimated += report.estimated;
            total.data_gaps += report.data_gaps;
            total.removed += report.removed;
            total.kept = report.kept;
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts(threshold: Option<f64>, nbest: Option<usize>, percent: Option<f64>) -> PruneOptions {
        PruneOptions {
            min_trades: None,
            threshold,
            nbest,
            percent,
        }
    }

    #[test]
    fn exactly_one_policy_is_required() {
        assert!(PruneConfig::from_options(&opts(None, None, None)).is_err());
        assert!(PruneConfig::from_options(&opts(Some(0.1), Some(3), None)).is_err());
        assert!(PruneConfig::from_options(&opts(Some(0.1), None, Some(0.5))).is_err());
        assert!(PruneConfig::from_options(&opts(None, None, Some(0.0))).is_err());
        assert!(PruneConfig::from_options(&opts(None, None, Some(1.5))).is_err());

        let cfg = PruneConfig::from_options(&opts(None, Some(3), None)).unwrap();
        assert_eq!(cfg.policy, PrunePolicy::TopN(3));
    }

    fn scores() -> Vec<(Option<f64>, usize)> {
        vec![
            (Some(0.5), 20),
            (None, 0),
            (Some(0.1), 20),
            (Some(0.9), 4),
            (Some(0.3), 12),
        ]
    }

    #[test]
    fn threshold_is_strict() {
        let cfg = PruneConfig {
            min_trades: None,
            policy: PrunePolicy::Threshold(0.3),
        };
        assert_eq!(cfg.survivors(&scores()), vec![true, false, false, true, false]);
    }

    #[test]
    fn top_n_respects_min_trades() {
        let cfg = PruneConfig {
            min_trades: Some(10),
            policy: PrunePolicy::TopN(2),
        };
        assert_eq!(cfg.survivors(&scores()), vec![true, false, false, false, true]);
    }

    #[test]
    fn top_percent_rounds_down() {
        let cfg = PruneConfig {
            min_trades: None,
            policy: PrunePolicy::TopPercent(0.5),
        };
        // 5 candidates * 0.5 = 2
        assert_eq!(cfg.survivors(&scores()), vec![true, false, false, true, false]);
    }

    #[test]
    fn unknown_profit_never_survives() {
        let cfg = PruneConfig {
            min_trades: None,
            policy: PrunePolicy::TopN(100),
        };
        let alive = cfg.survivors(&scores());
        assert!(!alive[1]);
        assert_eq!(alive.iter().filter(|a| **a).count(), 4);
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        fn arb_scores() -> impl Strategy<Value = Vec<(Option<f64>, usize)>> {
            prop::collection::vec(
                (prop::option::of(-5.0..5.0_f64), 0usize..30),
                0..40,
            )
        }

        fn arb_policy() -> impl Strategy<Value = PrunePolicy> {
            prop_oneof![
                (-5.0..5.0_f64).prop_map(PrunePolicy::Threshold),
                (0usize..50).prop_map(PrunePolicy::TopN),
                (0.01..=1.0_f64).prop_map(PrunePolicy::TopPercent),
            ]
        }

        proptest! {
            #[test]
            fn survivors_are_known_and_trade_enough(
                scores in arb_scores(),
                policy in arb_policy(),
                min_trades in prop::option::of(0usize..30),
            ) {
                let cfg = PruneConfig { min_trades, policy };
                let alive = cfg.survivors(&scores);
                prop_assert_eq!(alive.len(), scores.len());
                for (keep, (profit, ntrades)) in alive.iter().zip(&scores) {
                    if *keep {
                        prop_assert!(profit.is_some());
                        prop_assert!(min_trades.map_or(true, |m| *ntrades >= m));
                    }
                }
            }

            #[test]
            fn no_dropped_candidate_beats_a_survivor(
                scores in arb_scores(),
                policy in arb_policy(),
            ) {
                let cfg = PruneConfig { min_trades: None, policy };
                let alive = cfg.survivors(&scores);
                let worst_kept = scores
                    .iter()
                    .zip(&alive)
                    .filter(|(_, keep)| **keep)
                    .filter_map(|((p, _), _)| *p)
                    .fold(f64::INFINITY, f64::min);
                for ((profit, _), keep) in scores.iter().zip(&alive) {
                    if let (Some(p), false) = (profit, keep) {
                        prop_assert!(*p <= worst_kept);
                    }
                }
                match policy {
                    PrunePolicy::Threshold(t) => {
                        prop_assert!(worst_kept.is_infinite() || worst_kept > t);
                    }
                    PrunePolicy::TopN(n) => {
                        prop_assert!(alive.iter().filter(|a| **a).count() <= n);
                    }
                    PrunePolicy::TopPercent(pct) => {
                        let slots = (pct * scores.len() as f64) as usize;
                        prop_assert!(alive.iter().filter(|a| **a).count() <= slots);
                    }
                }
            }
        }
    }
}
