//! Historical bar stores.
//!
//! The backtest engine only sees the [`HistoryStore`] trait: an ordered bar
//! table per (pair, timeframe). `MemoryStore` backs tests and synthetic runs;
//! `CsvStore` (see `csv_store`) reads exchange kline exports from disk.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tradetree_core::domain::{Bar, Pair, Timeframe};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{pair} {timeframe}: bars out of order at index {index}")]
    Unordered {
        pair: String,
        timeframe: Timeframe,
        index: usize,
    },

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

/// Bars of one (pair, timeframe), ordered by close time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Series {
    bars: Vec<Bar>,
}

impl Series {
    /// Wrap bars that are already sorted by close time.
    ///
    /// Returns the index of the first out-of-order bar on failure.
    pub fn new(bars: Vec<Bar>) -> Result<Self, usize> {
        match bars
            .windows(2)
            .position(|w| w[1].close_time <= w[0].close_time)
        {
            Some(i) => Err(i + 1),
            None => Ok(Self { bars }),
        }
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Bar> {
        self.bars.get(index)
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn last(&self) -> Option<&Bar> {
        self.bars.last()
    }

    /// Index of the first bar whose close time is at or after `close_time`
    /// (`len()` when every bar closes earlier).
    pub fn first_at_or_after(&self, close_time: i64) -> usize {
        self.bars.partition_point(|b| b.close_time < close_time)
    }
}

impl std::ops::Index<usize> for Series {
    type Output = Bar;

    fn index(&self, index: usize) -> &Bar {
        &self.bars[index]
    }
}

/// Source of historical bars. Implementations must be shareable across the
/// optimizer's worker threads.
pub trait HistoryStore: Send + Sync {
    /// The full series for a pair and timeframe, or `None` if the store has none.
    fn series(&self, pair: &Pair, timeframe: Timeframe)
        -> Result<Option<Arc<Series>>, StoreError>;
}

/// In-memory store, used for tests and synthetic data.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    series: HashMap<(Pair, Timeframe), Arc<Series>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &mut self,
        pair: &Pair,
        timeframe: Timeframe,
        bars: Vec<Bar>,
    ) -> Result<(), StoreError> {
        let series = Series::new(bars).map_err(|index| StoreError::Unordered {
            pair: pair.to_string(),
            timeframe,
            index,
        })?;
        self.series
            .insert((pair.clone(), timeframe), Arc::new(series));
        Ok(())
    }

    pub fn with_series(
        mut self,
        pair: &Pair,
        timeframe: Timeframe,
        bars: Vec<Bar>,
    ) -> Result<Self, StoreError> {
        self.insert(pair, timeframe, bars)?;
        Ok(self)
    }
}

impl HistoryStore for MemoryStore {
    fn series(
        &self,
        pair: &Pair,
        timeframe: Timeframe,
    ) -> Result<Option<Arc<Series>>, StoreError> {
        Ok(self.series.get(&(pair.clone(), timeframe)).cloned())
    }
}

impl<S: HistoryStore + ?Sized> HistoryStore for Arc<S> {
    fn series(
        &self,
        pair: &Pair,
        timeframe: Timeframe,
    ) -> Result<Option<Arc<Series>>, StoreError> {
        (**self).series(pair, timeframe)
    }
}
