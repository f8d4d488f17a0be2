//! Trainer configuration (TOML).
//!
//! Every field has a default, so an empty file is a valid configuration:
//!
//! ```toml
//! [trainer]
//! pair = "BTC/USDT"
//! timeframes = ["1d", "4h"]
//! history_dir = "data/history"
//! seed = 42
//!
//! [estimate]
//! "1d" = 180
//!
//! [[prune]]
//! nbest = 99999
//!
//! [[prune]]
//! min_trades = 10
//! threshold = 0.15
//!
//! [fit]
//! epochs = 15
//!
//! [search.grid]
//! ma_fast = [5, 10]
//!
//! [aggregation]
//! pair = 0.0
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tradetree_core::domain::{Pair, Timeframe};
use tradetree_core::rules::RuleKind;

use crate::builder::{GridSearchSpace, LevelThresholds};
use crate::fitness::EstimateDays;
use crate::optimizer::FitConfig;
use crate::selector::{PruneConfig, PruneOptions};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerSection {
    /// Traded pair as `BASE/QUOTE`.
    pub pair: String,
    pub timeframes: Vec<Timeframe>,
    pub rules: Vec<RuleKind>,
    /// Root of the `<BASEQUOTE>/<timeframe>.csv` history layout.
    pub history_dir: PathBuf,
    /// Master seed of the optimizer's RNG hierarchy.
    pub seed: u64,
}

impl Default for TrainerSection {
    fn default() -> Self {
        Self {
            pair: "BTC/USDT".to_string(),
            timeframes: vec![
                Timeframe::D1,
                Timeframe::H4,
                Timeframe::H1,
                Timeframe::M15,
                Timeframe::M1,
            ],
            rules: RuleKind::ALL.to_vec(),
            history_dir: PathBuf::from("data/history"),
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    pub trainer: TrainerSection,
    /// Days replayed per timeframe when scoring a single rule.
    pub estimate: EstimateDays,
    /// Pruning passes, applied in order.
    pub prune: Vec<PruneOptions>,
    pub fit: FitConfig,
    pub search: GridSearchSpace,
    pub aggregation: LevelThresholds,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            trainer: TrainerSection::default(),
            estimate: EstimateDays::default(),
            prune: vec![
                PruneOptions {
                    nbest: Some(99_999),
                    ..PruneOptions::default()
                },
                PruneOptions {
                    min_trades: Some(10),
                    threshold: Some(0.15),
                    ..PruneOptions::default()
                },
            ],
            fit: FitConfig::default(),
            search: GridSearchSpace::default(),
            aggregation: LevelThresholds::default(),
        }
    }
}

impl TrainerConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.pair()?;
        if self.trainer.timeframes.is_empty() {
            return Err(ConfigError::Invalid("trainer.timeframes is empty".into()));
        }
        if self.trainer.rules.is_empty() {
            return Err(ConfigError::Invalid("trainer.rules is empty".into()));
        }
        if let Some((tf, _)) = self.estimate.0.iter().find(|(_, days)| **days == 0) {
            return Err(ConfigError::Invalid(format!("estimate.{tf} must be >= 1 day")));
        }
        self.prune_passes()?;
        self.fit
            .validate()
            .map_err(|e| ConfigError::Invalid(format!("fit: {e}")))?;
        let t = &self.aggregation;
        if [t.pair, t.timeframe, t.rule_class]
            .iter()
            .any(|x| !(x.is_finite() && *x >= 0.0))
        {
            return Err(ConfigError::Invalid(
                "aggregation thresholds must be finite and >= 0".into(),
            ));
        }
        Ok(())
    }

    pub fn pair(&self) -> Result<Pair, ConfigError> {
        self.trainer
            .pair
            .parse()
            .map_err(|e| ConfigError::Invalid(format!("trainer.pair: {e}")))
    }

    pub fn prune_passes(&self) -> Result<Vec<PruneConfig>, ConfigError> {
        self.prune
            .iter()
            .enumerate()
            .map(|(i, options)| {
                PruneConfig::from_options(options)
                    .map_err(|e| ConfigError::Invalid(format!("prune[{i}]: {e}")))
            })
            .collect()
    }
}
