//! Domain types for tradetree

pub mod bar;
pub mod decision;
pub mod pair;
pub mod timeframe;

pub use bar::Bar;
pub use decision::{Decision, Verdict};
pub use pair::{Pair, ParsePairError};
pub use timeframe::{ParseTimeframeError, Timeframe};

use std::collections::BTreeMap;

/// The bars that closed during one replay step, keyed by timeframe.
///
/// Iteration order is shortest timeframe first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BarUpdate {
    bars: BTreeMap<Timeframe, Bar>,
}

impl BarUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, timeframe: Timeframe, bar: Bar) {
        self.bars.insert(timeframe, bar);
    }

    pub fn get(&self, timeframe: Timeframe) -> Option<&Bar> {
        self.bars.get(&timeframe)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Timeframe, &Bar)> {
        self.bars.iter().map(|(tf, bar)| (*tf, bar))
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }
}

impl FromIterator<(Timeframe, Bar)> for BarUpdate {
    fn from_iter<T: IntoIterator<Item = (Timeframe, Bar)>>(iter: T) -> Self {
        Self {
            bars: iter.into_iter().collect(),
        }
    }
}
