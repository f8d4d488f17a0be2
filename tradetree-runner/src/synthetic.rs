//! Deterministic synthetic history for development runs and tests.
//!
//! One random walk is generated at the finest requested timeframe and every
//! coarser timeframe is aggregated from it, so the series agree with each
//! other the way real exchange klines do. The walk is seeded from the pair
//! symbol, so the same pair always produces the same history.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tradetree_core::domain::{Bar, Pair, Timeframe};

use crate::store::{MemoryStore, StoreError};

const MINUTE_MS: i64 = 60_000;

#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticConfig {
    /// Days of history to generate.
    pub days: u64,
    /// Open time (ms) of the first bar; should sit on a day boundary.
    pub start_ms: i64,
    pub start_price: f64,
    /// Maximum absolute return of one daily step; finer steps scale by √t.
    pub daily_volatility: f64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            days: 400,
            // 2023-01-01T00:00:00Z
            start_ms: 1_672_531_200_000,
            start_price: 100.0,
            daily_volatility: 0.03,
        }
    }
}

/// Generate aligned series for every timeframe in `timeframes`.
pub fn generate(
    pair: &Pair,
    timeframes: &[Timeframe],
    config: &SyntheticConfig,
) -> BTreeMap<Timeframe, Vec<Bar>> {
    let Some(finest) = timeframes.iter().copied().min() else {
        return BTreeMap::new();
    };

    let fine = random_walk(pair, finest, config);
    timeframes
        .iter()
        .map(|&tf| {
            let per_bar = (tf.minutes() / finest.minutes()) as usize;
            (tf, aggregate(&fine, per_bar, tf))
        })
        .collect()
}

/// A [`MemoryStore`] filled with [`generate`] output.
pub fn synthetic_store(
    pair: &Pair,
    timeframes: &[Timeframe],
    config: &SyntheticConfig,
) -> Result<MemoryStore, StoreError> {
    let mut store = MemoryStore::new();
    for (tf, bars) in generate(pair, timeframes, config) {
        store.insert(pair, tf, bars)?;
    }
    Ok(store)
}

fn random_walk(pair: &Pair, timeframe: Timeframe, config: &SyntheticConfig) -> Vec<Bar> {
    let seed: [u8; 32] = *blake3::hash(pair.symbol().as_bytes()).as_bytes();
    let mut rng = StdRng::from_seed(seed);

    let step_ms = timeframe.minutes() as i64 * MINUTE_MS;
    let count = config.days * 1440 / timeframe.minutes();
    let max_return = config.daily_volatility * (timeframe.minutes() as f64 / 1440.0).sqrt();

    let mut price = config.start_price;
    (0..count as i64)
        .map(|i| {
            let ret: f64 = rng.gen_range(-max_return..=max_return);
            let open = price;
            let close = price * (1.0 + ret);
            let high = open.max(close) * (1.0 + rng.gen_range(0.0..max_return / 3.0 + f64::EPSILON));
            let low = open.min(close) * (1.0 - rng.gen_range(0.0..max_return / 3.0 + f64::EPSILON));
            let volume = rng.gen_range(10.0..1_000.0);
            price = close;

            let open_time = config.start_ms + i * step_ms;
            Bar {
                open_time,
                open,
                high,
                low,
                close,
                volume,
                close_time: open_time + step_ms - 1,
            }
        })
        .collect()
}

fn aggregate(fine: &[Bar], per_bar: usize, timeframe: Timeframe) -> Vec<Bar> {
    if per_bar <= 1 {
        return fine.to_vec();
    }
    let step_ms = timeframe.minutes() as i64 * MINUTE_MS;
    fine.chunks_exact(per_bar)
        .map(|chunk| {
            let first = chunk[0];
            Bar {
                open_time: first.open_time,
                open: first.open,
                high: chunk.iter().map(|b| b.high).fold(f64::MIN, f64::max),
                low: chunk.iter().map(|b| b.low).fold(f64::MAX, f64::min),
                close: chunk[chunk.len() - 1].close,
                volume: chunk.iter().map(|b| b.volume).sum(),
                close_time: first.open_time + step_ms - 1,
            }
        })
        .collect()
}
