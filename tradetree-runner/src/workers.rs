//! Parallel fitness evaluation.
//!
//! Each candidate is scored on its own task in a rayon thread pool. Tasks
//! report `(TraderId, result)` over a channel; the coordinator collects them
//! until every task has answered or the deadline passes. A task that panics
//! or errors is reported as a [`WorkerFailure`] for its slot, never as a
//! score. Once a batch is abandoned its queued tasks are skipped.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use thiserror::Error;
use tracing::warn;
use tradetree_core::expert::{Estimate, PairExpert};

use crate::fitness::FitnessEvaluator;

/// Position of a candidate in the batch handed to [`WorkerPool::evaluate`].
pub type TraderId = usize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
pub enum WorkerFailure {
    #[error("no result before the deadline")]
    TimedOut,

    #[error("worker panicked: {0}")]
    Panicked(String),

    #[error("evaluation failed: {0}")]
    Evaluation(String),
}

pub struct WorkerPool {
    pool: rayon::ThreadPool,
    timeout: Duration,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("threads", &self.pool.current_num_threads())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl WorkerPool {
    /// `threads == 0` lets rayon pick one thread per core. `timeout` bounds
    /// one whole batch.
    ///
    /// An evaluation that is still running at the deadline cannot be
    /// interrupted and keeps its thread until it returns; tasks of that batch
    /// that have not started yet are dropped.
    pub fn new(threads: usize, timeout: Duration) -> Result<Self, rayon::ThreadPoolBuildError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("tradetree-worker-{i}"))
            .build()?;
        Ok(Self { pool, timeout })
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Score every candidate over `ndays`; results come back in input order.
    pub fn evaluate(
        &self,
        evaluator: &Arc<dyn FitnessEvaluator>,
        candidates: Vec<PairExpert>,
        ndays: u64,
    ) -> Vec<Result<Estimate, WorkerFailure>> {
        let total = candidates.len();
        let (tx, rx) = mpsc::channel::<(TraderId, Result<Estimate, WorkerFailure>)>();
        let abandoned = Arc::new(AtomicBool::new(false));

        for (id, candidate) in candidates.into_iter().enumerate() {
            let tx = tx.clone();
            let evaluator = Arc::clone(evaluator);
            let abandoned = Arc::clone(&abandoned);
            self.pool.spawn(move || {
                if abandoned.load(Ordering::Acquire) {
                    return;
                }
                let result = catch_unwind(AssertUnwindSafe(|| {
                    evaluator.evaluate(&candidate, ndays)
                }));
                let message = match result {
                    Ok(Ok(estimate)) => Ok(estimate),
                    Ok(Err(e)) => Err(WorkerFailure::Evaluation(e.to_string())),
                    Err(payload) => Err(WorkerFailure::Panicked(panic_message(payload.as_ref()))),
                };
                // the coordinator may have given up on this batch already
                let _ = tx.send((id, message));
            });
        }
        drop(tx);

        let mut results: Vec<Option<Result<Estimate, WorkerFailure>>> = vec![None; total];
        let deadline = Instant::now() + self.timeout;
        let mut received = 0;
        while received < total {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match rx.recv_timeout(remaining) {
                Ok((id, result)) => {
                    if let Some(slot) = results.get_mut(id) {
                        if slot.is_none() {
                            received += 1;
                        }
                        *slot = Some(result);
                    }
                }
                Err(mpsc::RecvTimeoutError::Timeout) => {
                    abandoned.store(true, Ordering::Release);
                    warn!(
                        missing = total - received,
                        timeout_ms = self.timeout.as_millis() as u64,
                        "workers timed out"
                    );
                    break;
                }
                Err(mpsc::RecvTimeoutError::Disconnected) => break,
            }
        }

        results
            .into_iter()
            .map(|slot| slot.unwrap_or(Err(WorkerFailure::TimedOut)))
            .collect()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
