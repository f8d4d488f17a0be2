//! Fitness evaluation: how a candidate tree is scored.
//!
//! Pruning and weight fitting both score a standalone [`PairExpert`]; the
//! scorer is pluggable so tests can substitute a known landscape for the
//! backtest.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tradetree_core::domain::Timeframe;
use tradetree_core::engine::PairTrader;
use tradetree_core::expert::{Estimate, PairExpert};

use crate::backtest::{simulate, BacktestError};
use crate::store::HistoryStore;

/// Scores one candidate tree over `ndays` of history.
///
/// The returned profit is percent per simulated day.
pub trait FitnessEvaluator: Send + Sync {
    fn evaluate(&self, candidate: &PairExpert, ndays: u64) -> Result<Estimate, BacktestError>;
}

/// Replays history from a store.
#[derive(Clone)]
pub struct BacktestFitness {
    store: Arc<dyn HistoryStore>,
}

impl BacktestFitness {
    pub fn new(store: Arc<dyn HistoryStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &dyn HistoryStore {
        self.store.as_ref()
    }
}

impl std::fmt::Debug for BacktestFitness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BacktestFitness").finish_non_exhaustive()
    }
}

impl FitnessEvaluator for BacktestFitness {
    fn evaluate(&self, candidate: &PairExpert, ndays: u64) -> Result<Estimate, BacktestError> {
        let mut trader = PairTrader::new(candidate.clone());
        let outcome = simulate(&mut trader, self.store.as_ref(), ndays)?;
        Ok(Estimate::new(outcome.profit_per_day(ndays), outcome.ntrades))
    }
}

/// Days of history replayed when estimating a rule, per timeframe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EstimateDays(pub BTreeMap<Timeframe, u64>);

impl EstimateDays {
    /// Days for `timeframe`; finer timeframes default to shorter windows.
    pub fn for_timeframe(&self, timeframe: Timeframe) -> u64 {
        self.0
            .get(&timeframe)
            .copied()
            .unwrap_or_else(|| default_days(timeframe))
    }
}

impl Default for EstimateDays {
    fn default() -> Self {
        Self(
            Timeframe::ALL
                .into_iter()
                .map(|tf| (tf, default_days(tf)))
                .collect(),
        )
    }
}

fn default_days(timeframe: Timeframe) -> u64 {
    match timeframe {
        Timeframe::D1 | Timeframe::H4 => 180,
        Timeframe::H1 => 90,
        Timeframe::M15 => 30,
        Timeframe::M1 => 3,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::synthetic::{synthetic_store, SyntheticConfig};
    use tradetree_core::domain::Pair;
    use tradetree_core::expert::{cast_to_pair_expert, Lineage, RuleExpert};
    use tradetree_core::rules::RuleSpec;

    fn candidate() -> PairExpert {
        let leaf = RuleExpert::new(
            Timeframe::D1,
            RuleSpec::MovingAverageCrossover {
                fast: 2,
                slow: 5,
                patience: 1,
            },
        )
        .unwrap();
        cast_to_pair_expert(leaf, &Lineage::new(Pair::new("BTC", "USDT"))).unwrap()
    }

    #[test]
    fn default_days_per_timeframe() {
        let days = EstimateDays::default();
        assert_eq!(days.for_timeframe(Timeframe::D1), 180);
        assert_eq!(days.for_timeframe(Timeframe::H1), 90);
        assert_eq!(days.for_timeframe(Timeframe::M1), 3);

        let partial = EstimateDays(BTreeMap::from([(Timeframe::H1, 10)]));
        assert_eq!(partial.for_timeframe(Timeframe::H1), 10);
        assert_eq!(partial.for_timeframe(Timeframe::M15), 30);
    }

    #[test]
    fn backtest_fitness_is_deterministic() {
        let pair = Pair::new("BTC", "USDT");
        let store = synthetic_store(&pair, &[Timeframe::D1], &SyntheticConfig::default()).unwrap();
        let fitness = BacktestFitness::new(Arc::new(store));
        let a = fitness.evaluate(&candidate(), 200).unwrap();
        let b = fitness.evaluate(&candidate(), 200).unwrap();
        assert_eq!(a, b);
        assert!(a.ntrades > 0);
    }

    #[test]
    fn backtest_fitness_reports_gaps() {
        let fitness = BacktestFitness::new(Arc::new(MemoryStore::new()));
        assert!(matches!(
            fitness.evaluate(&candidate(), 10),
            Err(BacktestError::DataGap { .. })
        ));
    }
}
