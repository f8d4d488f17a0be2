//! Bounded per-timeframe history kept by a trader.

use std::collections::{BTreeMap, VecDeque};

use crate::domain::{Bar, BarUpdate, Timeframe};

/// Default number of bars retained per timeframe.
pub const DEFAULT_WINDOW: usize = 1000;

/// Rolling window of the most recent bars for each timeframe.
#[derive(Debug, Clone)]
pub struct DataMaintainer {
    capacity: usize,
    windows: BTreeMap<Timeframe, VecDeque<Bar>>,
}

impl DataMaintainer {
    pub fn new(timeframes: impl IntoIterator<Item = Timeframe>, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            windows: timeframes
                .into_iter()
                .map(|tf| (tf, VecDeque::with_capacity(capacity)))
                .collect(),
        }
    }

    /// Append a bar; bars of untracked timeframes are ignored.
    pub fn push(&mut self, timeframe: Timeframe, bar: Bar) {
        if let Some(window) = self.windows.get_mut(&timeframe) {
            if window.len() == self.capacity {
                window.pop_front();
            }
            window.push_back(bar);
        }
    }

    pub fn apply(&mut self, update: &BarUpdate) {
        for (tf, bar) in update.iter() {
            self.push(tf, *bar);
        }
    }

    pub fn latest(&self, timeframe: Timeframe) -> Option<&Bar> {
        self.windows.get(&timeframe)?.back()
    }

    pub fn window(&self, timeframe: Timeframe) -> impl Iterator<Item = &Bar> {
        self.windows.get(&timeframe).into_iter().flatten()
    }

    pub fn len(&self, timeframe: Timeframe) -> usize {
        self.windows.get(&timeframe).map_or(0, VecDeque::len)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
