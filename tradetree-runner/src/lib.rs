//! tradetree runner: history, backtests and training for expert trees.
//!
//! This crate builds on `tradetree-core` to provide:
//! - History stores (in-memory, CSV) and a synthetic history generator
//! - The multi-timeframe backtest replay
//! - Candidate search spaces and full-tree construction
//! - Bottom-up pruning with memoized rule estimates
//! - Parallel population-based weight fitting
//! - TOML trainer configuration

pub mod backtest;
pub mod builder;
pub mod config;
pub mod csv_store;
pub mod fitness;
pub mod optimizer;
pub mod selector;
pub mod store;
pub mod synthetic;
pub mod trainer;
pub mod workers;

pub use backtest::{simulate, BacktestError, BacktestOutcome, INIT_BARS};
pub use builder::{construct_system, GridSearchSpace, LevelThresholds, ParamGrid, SearchSpace};
pub use config::{ConfigError, TrainerConfig, TrainerSection};
pub use csv_store::CsvStore;
pub use fitness::{BacktestFitness, EstimateDays, FitnessEvaluator};
pub use optimizer::{EpochReport, FitConfig, FitReport, NodeReport, OptimizeError, Optimizer};
pub use selector::{PruneConfig, PruneOptions, PrunePolicy, PruneReport, SelectError, Selector};
pub use store::{HistoryStore, MemoryStore, Series, StoreError};
pub use synthetic::{synthetic_store, SyntheticConfig};
pub use trainer::{TrainError, Trainer};
pub use workers::{TraderId, WorkerFailure, WorkerPool};
