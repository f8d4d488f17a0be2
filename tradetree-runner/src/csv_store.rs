//! CSV-backed history store.
//!
//! Layout: `<root>/<BASEQUOTE>/<timeframe>.csv`, one file per pair and
//! timeframe, with exchange kline columns
//! `Open time,Open,High,Low,Close,Volume,Close time` (times in ms). Extra
//! columns are ignored. Each file is parsed once and cached for the lifetime
//! of the store.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use serde::Deserialize;
use tracing::debug;
use tradetree_core::domain::{Bar, Pair, Timeframe};

use crate::store::{HistoryStore, Series, StoreError};

#[derive(Debug, Deserialize)]
struct KlineRecord {
    #[serde(rename = "Open time")]
    open_time: i64,
    #[serde(rename = "Open")]
    open: f64,
    #[serde(rename = "High")]
    high: f64,
    #[serde(rename = "Low")]
    low: f64,
    #[serde(rename = "Close")]
    close: f64,
    #[serde(rename = "Volume")]
    volume: f64,
    #[serde(rename = "Close time")]
    close_time: i64,
}

impl From<KlineRecord> for Bar {
    fn from(r: KlineRecord) -> Self {
        Bar {
            open_time: r.open_time,
            open: r.open,
            high: r.high,
            low: r.low,
            close: r.close,
            volume: r.volume,
            close_time: r.close_time,
        }
    }
}

#[derive(Debug)]
pub struct CsvStore {
    root: PathBuf,
    cache: RwLock<HashMap<(Pair, Timeframe), Arc<Series>>>,
}

impl CsvStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, pair: &Pair, timeframe: Timeframe) -> PathBuf {
        self.root
            .join(pair.symbol())
            .join(format!("{}.csv", timeframe.as_str()))
    }

    fn load(&self, pair: &Pair, timeframe: Timeframe) -> Result<Option<Series>, StoreError> {
        let path = self.path_for(pair, timeframe);
        if !path.exists() {
            return Ok(None);
        }
        let bars = read_klines(&path)?;
        debug!(path = %path.display(), bars = bars.len(), "loaded history");
        Series::new(bars)
            .map(Some)
            .map_err(|index| StoreError::Unordered {
                pair: pair.to_string(),
                timeframe,
                index,
            })
    }
}

impl HistoryStore for CsvStore {
    fn series(
        &self,
        pair: &Pair,
        timeframe: Timeframe,
    ) -> Result<Option<Arc<Series>>, StoreError> {
        let key = (pair.clone(), timeframe);
        if let Some(series) = self
            .cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            return Ok(Some(Arc::clone(series)));
        }

        let Some(series) = self.load(pair, timeframe)? else {
            return Ok(None);
        };
        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        let series = cache.entry(key).or_insert_with(|| Arc::new(series));
        Ok(Some(Arc::clone(series)))
    }
}

/// Parse one kline CSV file.
pub fn read_klines(path: &Path) -> Result<Vec<Bar>, StoreError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|source| StoreError::Csv {
            path: path.to_path_buf(),
            source,
        })?;

    reader
        .deserialize::<KlineRecord>()
        .map(|record| {
            record.map(Bar::from).map_err(|source| StoreError::Csv {
                path: path.to_path_buf(),
                source,
            })
        })
        .collect()
}

/// Write bars in the layout [`CsvStore`] reads.
pub fn write_klines(path: &Path, bars: &[Bar]) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| StoreError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let csv_err = |source: csv::Error| StoreError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut writer = csv::Writer::from_path(path).map_err(csv_err)?;
    writer
        .write_record([
            "Open time",
            "Open",
            "High",
            "Low",
            "Close",
            "Volume",
            "Close time",
        ])
        .map_err(csv_err)?;
    for bar in bars {
        writer
            .write_record(&[
                bar.open_time.to_string(),
                bar.open.to_string(),
                bar.high.to_string(),
                bar.low.to_string(),
                bar.close.to_string(),
                bar.volume.to_string(),
                bar.close_time.to_string(),
            ])
            .map_err(csv_err)?;
    }
    writer.flush().map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })
}
