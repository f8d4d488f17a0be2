//! Population-based weight search.
//!
//! `fit_weights` walks the tree depth-first and, at every interior node with
//! more than one child, runs a fixed number of epochs of (μ + λ) local
//! search over the node's weight vector:
//!
//! 1. every parent spawns `nchildren` mutants with N(0, σ) noise per
//!    coordinate, σ = `lr · exp(−decay · epoch)`;
//! 2. parents and mutants are wrapped into standalone pair trees and scored
//!    in parallel;
//! 3. the best `population` members become the next parents;
//! 4. the node adopts the epoch's best weights when they beat its best-ever
//!    profit.
//!
//! Rule classes are fitted but their leaves are not recursed into.

use std::sync::Arc;
use std::time::Duration;

use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};
use tradetree_core::expert::{
    cast_to_pair_expert, Estimate, ExpertError, Interior, Lineage, PairExpert,
};
use tradetree_core::rng::RngHierarchy;

use crate::fitness::FitnessEvaluator;
use crate::workers::{WorkerFailure, WorkerPool};

#[derive(Debug, Error)]
pub enum OptimizeError {
    #[error("invalid fit config: {0}")]
    InvalidConfig(String),

    #[error("every evaluation failed for {node} in epoch {epoch}")]
    AllWorkersFailed { node: String, epoch: usize },

    #[error(transparent)]
    Expert(#[from] ExpertError),

    #[error("failed to start worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

/// Weight search settings (`[fit]` in the trainer config).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitConfig {
    pub epochs: usize,
    /// Parents kept after each epoch.
    pub population: usize,
    /// Mutants per parent per epoch.
    pub nchildren: usize,
    /// Initial noise scale.
    pub lr: f64,
    /// Exponential decay of the noise scale per epoch.
    pub decay: f64,
    /// Members with fewer trades receive `penalty` instead of their profit.
    pub min_trades: usize,
    pub penalty: f64,
    /// Days replayed per evaluation.
    pub fit_days: u64,
    pub worker_timeout_secs: u64,
    /// Worker threads; 0 = one per core.
    pub threads: usize,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            epochs: 15,
            population: 10,
            nchildren: 3,
            lr: 1.0,
            decay: 0.2,
            min_trades: 10,
            penalty: -999.0,
            fit_days: 90,
            worker_timeout_secs: 600,
            threads: 0,
        }
    }
}

impl FitConfig {
    pub fn validate(&self) -> Result<(), OptimizeError> {
        let fail = |msg: &str| Err(OptimizeError::InvalidConfig(msg.to_string()));
        if self.population == 0 {
            return fail("population must be >= 1");
        }
        if !(self.lr.is_finite() && self.lr >= 0.0) {
            return fail("lr must be finite and >= 0");
        }
        if !self.decay.is_finite() {
            return fail("decay must be finite");
        }
        if !self.penalty.is_finite() {
            return fail("penalty must be finite");
        }
        if self.fit_days == 0 {
            return fail("fit_days must be >= 1");
        }
        if self.worker_timeout_secs == 0 {
            return fail("worker_timeout_secs must be >= 1");
        }
        Ok(())
    }

    /// Noise scale for `epoch`.
    pub fn sigma(&self, epoch: usize) -> f64 {
        self.lr * (-self.decay * epoch as f64).exp()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EpochReport {
    pub epoch: usize,
    pub sigma: f64,
    /// Best fitness of the epoch, penalty included.
    pub best_fitness: f64,
    /// Node's best-ever profit after the epoch.
    pub best_ever: Option<f64>,
    pub evaluated: usize,
    pub failures: Vec<WorkerFailure>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeReport {
    pub node: String,
    pub children: usize,
    pub epochs: Vec<EpochReport>,
    pub best_profit: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FitReport {
    pub nodes: Vec<NodeReport>,
}

pub struct Optimizer {
    evaluator: Arc<dyn FitnessEvaluator>,
    pool: WorkerPool,
    config: FitConfig,
    rng: RngHierarchy,
}

impl std::fmt::Debug for Optimizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Optimizer")
            .field("pool", &self.pool)
            .field("config", &self.config)
            .field("rng", &self.rng)
            .finish_non_exhaustive()
    }
}

struct Scored {
    weights: Vec<f64>,
    fitness: f64,
    penalized: bool,
    ntrades: usize,
}

impl Optimizer {
    pub fn new(
        evaluator: Arc<dyn FitnessEvaluator>,
        config: FitConfig,
        seed: u64,
    ) -> Result<Self, OptimizeError> {
        config.validate()?;
        let pool = WorkerPool::new(
            config.threads,
            Duration::from_secs(config.worker_timeout_secs),
        )?;
        Ok(Self {
            evaluator,
            pool,
            config,
            rng: RngHierarchy::new(seed),
        })
    }

    /// Replace the worker pool, e.g. to use a sub-second timeout.
    pub fn with_pool(mut self, pool: WorkerPool) -> Self {
        self.pool = pool;
        self
    }

    pub fn config(&self) -> &FitConfig {
        &self.config
    }

    /// Fit every interior node of the tree, children before parents.
    pub fn fit_weights(&self, root: &mut PairExpert) -> Result<FitReport, OptimizeError> {
        let lineage = Lineage::new(root.pair().clone());
        let mut report = FitReport::default();

        for tf in root.committee_mut().members_mut() {
            let timeframe = tf.timeframe();
            let class_lineage = lineage.with_timeframe(timeframe);
            for class in tf.committee_mut().members_mut() {
                let path = format!("{}/{}/{}", lineage.pair, timeframe, class.label());
                if let Some(node) = self.fit_node(class, &class_lineage, &path)? {
                    report.nodes.push(node);
                }
            }
            let path = format!("{}/{}", lineage.pair, timeframe);
            if let Some(node) = self.fit_node(tf, &lineage, &path)? {
                report.nodes.push(node);
            }
        }
        let path = lineage.pair.to_string();
        if let Some(node) = self.fit_node(root, &lineage, &path)? {
            report.nodes.push(node);
        }
        Ok(report)
    }

    /// Search one node's weights. Returns `None` for nodes with fewer than
    /// two children.
    pub fn fit_node<N: Interior>(
        &self,
        node: &mut N,
        lineage: &Lineage,
        path: &str,
    ) -> Result<Option<NodeReport>, OptimizeError> {
        let children = node.committee().len();
        if children < 2 {
            return Ok(None);
        }
        info!(node = path, children, "fitting weights");

        let mut parents: Vec<Vec<f64>> = vec![node.weights().to_vec()];
        let mut best_ever = node.estimate().profit;
        let mut epochs = Vec::with_capacity(self.config.epochs);

        for epoch in 0..self.config.epochs {
            let sigma = self.config.sigma(epoch);
            let noise = Normal::new(0.0, sigma)
                .map_err(|e| OptimizeError::InvalidConfig(format!("sigma {sigma}: {e}")))?;
            let mut rng = self.rng.rng_for(path, epoch as u64);

            let mut members = parents.clone();
            for parent in &parents {
                for _ in 0..self.config.nchildren {
                    members.push(parent.iter().map(|w| w + noise.sample(&mut rng)).collect());
                }
            }

            let candidates = members
                .iter()
                .map(|weights| {
                    let mut trial = node.clone();
                    trial.set_weights(Some(weights.clone()))?;
                    cast_to_pair_expert(trial, lineage)
                })
                .collect::<Result<Vec<_>, _>>()?;

            let results = self
                .pool
                .evaluate(&self.evaluator, candidates, self.config.fit_days);

            let mut failures = Vec::new();
            let mut scored: Vec<Scored> = Vec::with_capacity(members.len());
            for (weights, result) in members.into_iter().zip(results) {
                match result {
                    Ok(estimate) => scored.push(self.score(weights, estimate)),
                    Err(failure) => failures.push(failure),
                }
            }
            if scored.is_empty() {
                return Err(OptimizeError::AllWorkersFailed {
                    node: path.to_string(),
                    epoch,
                });
            }

            scored.sort_by(|a, b| b.fitness.total_cmp(&a.fitness));
            let best_fitness = scored[0].fitness;
            if let Some(best) = scored.iter().find(|s| !s.penalized) {
                if best_ever.map_or(true, |b| best.fitness > b) {
                    node.set_weights(Some(best.weights.clone()))?;
                    node.set_estimate(Estimate::new(Some(best.fitness), best.ntrades));
                    best_ever = Some(best.fitness);
                }
            }

            let evaluated = scored.len();
            scored.truncate(self.config.population);
            parents = scored.into_iter().map(|s| s.weights).collect();

            info!(
                node = path,
                epoch = epoch + 1,
                of = self.config.epochs,
                sigma,
                best_fitness,
                best_ever = ?best_ever,
                failures = failures.len(),
                "epoch"
            );
            epochs.push(EpochReport {
                epoch,
                sigma,
                best_fitness,
                best_ever,
                evaluated,
                failures,
            });
        }

        debug!(node = path, best = ?best_ever, weights = ?node.weights(), "node fitted");
        Ok(Some(NodeReport {
            node: path.to_string(),
            children,
            epochs,
            best_profit: best_ever,
        }))
    }

    fn score(&self, weights: Vec<f64>, estimate: Estimate) -> Scored {
        match estimate.profit {
            Some(profit) if estimate.ntrades >= self.config.min_trades => Scored {
                weights,
                fitness: profit,
                penalized: false,
                ntrades: estimate.ntrades,
            },
            _ => Scored {
                weights,
                fitness: self.config.penalty,
                penalized: true,
                ntrades: estimate.ntrades,
            },
        }
    }
}
