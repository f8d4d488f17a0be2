//! The training workflow: build → prune → fit → simulate.

use std::sync::Arc;

use thiserror::Error;
use tracing::info;
use tradetree_core::engine::PairTrader;
use tradetree_core::expert::PairExpert;
use tradetree_core::rules::RuleError;

use crate::backtest::{simulate, BacktestError, BacktestOutcome};
use crate::builder::construct_system;
use crate::config::{ConfigError, TrainerConfig};
use crate::csv_store::CsvStore;
use crate::fitness::{BacktestFitness, FitnessEvaluator};
use crate::optimizer::{FitReport, OptimizeError, Optimizer};
use crate::selector::{PruneReport, SelectError, Selector};
use crate::store::HistoryStore;

#[derive(Debug, Error)]
pub enum TrainError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Rule(#[from] RuleError),

    #[error(transparent)]
    Select(#[from] SelectError),

    #[error(transparent)]
    Optimize(#[from] OptimizeError),

    #[error(transparent)]
    Backtest(#[from] BacktestError),
}

pub struct Trainer {
    config: TrainerConfig,
    store: Arc<dyn HistoryStore>,
    evaluator: Arc<dyn FitnessEvaluator>,
}

impl Trainer {
    /// Trainer over an explicit store, scoring candidates by backtest.
    pub fn new(config: TrainerConfig, store: Arc<dyn HistoryStore>) -> Self {
        let evaluator = Arc::new(BacktestFitness::new(Arc::clone(&store)));
        Self {
            config,
            store,
            evaluator,
        }
    }

    /// Trainer reading CSV history from `trainer.history_dir`.
    pub fn from_config(config: TrainerConfig) -> Self {
        let store = Arc::new(CsvStore::new(config.trainer.history_dir.clone()));
        Self::new(config, store)
    }

    /// Swap the fitness evaluator used for pruning and fitting.
    pub fn with_evaluator(mut self, evaluator: Arc<dyn FitnessEvaluator>) -> Self {
        self.evaluator = evaluator;
        self
    }

    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    pub fn store(&self) -> &dyn HistoryStore {
        self.store.as_ref()
    }

    pub fn construct_system(&self) -> Result<PairExpert, TrainError> {
        let pair = self.config.pair()?;
        Ok(construct_system(
            &pair,
            &self.config.trainer.timeframes,
            &self.config.trainer.rules,
            &self.config.search,
            &self.config.aggregation,
        )?)
    }

    /// Apply every configured pruning pass in order.
    pub fn prune(&self, tree: &mut PairExpert) -> Result<PruneReport, TrainError> {
        let passes = self.config.prune_passes()?;
        let selector = Selector::new(self.evaluator.as_ref(), &self.config.estimate);
        Ok(selector.prune(tree, &passes)?)
    }

    pub fn fit_weights(&self, tree: &mut PairExpert) -> Result<FitReport, TrainError> {
        let optimizer = Optimizer::new(
            Arc::clone(&self.evaluator),
            self.config.fit.clone(),
            self.config.trainer.seed,
        )?;
        let report = optimizer.fit_weights(tree)?;
        info!(nodes = report.nodes.len(), "weights fitted");
        Ok(report)
    }

    /// Replay the last `ndays` days; the trader is returned for its trade log.
    pub fn simulate(
        &self,
        tree: PairExpert,
        ndays: u64,
    ) -> Result<(PairTrader, BacktestOutcome), TrainError> {
        let mut trader = PairTrader::new(tree);
        let outcome = simulate(&mut trader, self.store.as_ref(), ndays)?;
        info!(
            ndays,
            profit = ?outcome.profit,
            ntrades = outcome.ntrades,
            "simulation finished"
        );
        Ok((trader, outcome))
    }
}
