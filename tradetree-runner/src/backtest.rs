//! Multi-timeframe replay of stored history through a [`PairTrader`].
//!
//! The last `ndays + 1` daily bars mark the split: everything before it is
//! indicator warm-up (up to [`INIT_BARS`] per timeframe), everything after
//! it is replayed on a virtual minute clock stepping by the trader's shortest
//! timeframe. At each step every timeframe whose bar length divides the
//! elapsed minutes contributes its next bar; then the trader acts.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use tradetree_core::domain::{Bar, BarUpdate, Timeframe};
use tradetree_core::engine::PairTrader;

use crate::store::{HistoryStore, StoreError};

/// Maximum number of pre-split bars fed to indicators per timeframe.
pub const INIT_BARS: usize = 1000;

#[derive(Debug, Error)]
pub enum BacktestError {
    #[error("not enough history for {pair} {timeframe}: {reason}")]
    DataGap {
        pair: String,
        timeframe: Timeframe,
        reason: String,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result of one replay.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BacktestOutcome {
    /// Compounded percent profit over closed round trips; `None` when no
    /// round trip closed.
    pub profit: Option<f64>,
    /// Length of the trade log, open position included.
    pub ntrades: usize,
}

impl BacktestOutcome {
    /// Profit spread over the simulated days.
    pub fn profit_per_day(&self, ndays: u64) -> Option<f64> {
        self.profit.map(|p| p / ndays.max(1) as f64)
    }
}

/// Replay the last `ndays` days of history through `trader`.
///
/// Deterministic for identical history and trees. The trader keeps its trade
/// log and profit curve afterwards for inspection.
pub fn simulate(
    trader: &mut PairTrader,
    store: &dyn HistoryStore,
    ndays: u64,
) -> Result<BacktestOutcome, BacktestError> {
    let pair = trader.expert().pair().clone();
    let gap = |timeframe: Timeframe, reason: String| BacktestError::DataGap {
        pair: pair.to_string(),
        timeframe,
        reason,
    };

    let daily = store
        .series(&pair, Timeframe::D1)?
        .ok_or_else(|| gap(Timeframe::D1, "no daily series".into()))?;
    let needed = ndays as usize + 1;
    if daily.len() < needed {
        return Err(gap(
            Timeframe::D1,
            format!("{} daily bars, need {needed}", daily.len()),
        ));
    }
    let split_time = daily[daily.len() - needed].close_time;

    let Some(min_tf) = trader.min_timeframe() else {
        return Ok(BacktestOutcome {
            profit: None,
            ntrades: 0,
        });
    };

    let mut held = Vec::new();
    for tf in trader.timeframes().clone() {
        let series = store
            .series(&pair, tf)?
            .ok_or_else(|| gap(tf, "no series".into()))?;
        let split = series.first_at_or_after(split_time);
        for bar in &series.bars()[split.saturating_sub(INIT_BARS)..split] {
            trader.prime(tf, bar);
        }
        held.push((tf, series, split));
    }
    let mut streams: BTreeMap<Timeframe, std::slice::Iter<'_, Bar>> = held
        .iter()
        .map(|(tf, series, split)| (*tf, series.bars()[*split..].iter()))
        .collect();

    let total_minutes = 1440 * ndays;
    let step = min_tf.minutes();
    let mut elapsed = 0;
    while elapsed < total_minutes {
        let update: BarUpdate = streams
            .iter_mut()
            .filter(|(tf, _)| tf.is_due(elapsed))
            .filter_map(|(tf, stream)| stream.next().map(|bar| (*tf, *bar)))
            .collect();
        trader.update(&update);
        trader.act();
        elapsed += step;
    }

    let outcome = BacktestOutcome {
        profit: trader.evaluate_profit(),
        ntrades: trader.trades().len(),
    };
    debug!(
        pair = %pair,
        ndays,
        profit = ?outcome.profit,
        ntrades = outcome.ntrades,
        "replay finished"
    );
    Ok(outcome)
}
