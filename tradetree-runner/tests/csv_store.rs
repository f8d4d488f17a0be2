//! Integration tests for the CSV history store on a temporary directory.

use std::fs;
use std::sync::Arc;

use tempfile::TempDir;
use tradetree_core::domain::{Pair, Timeframe};
use tradetree_runner::csv_store::{read_klines, write_klines};
use tradetree_runner::synthetic::{generate, SyntheticConfig};
use tradetree_runner::{CsvStore, HistoryStore, StoreError};

fn pair() -> Pair {
    Pair::new("ETH", "USDT")
}

#[test]
fn written_history_reads_back() {
    let dir = TempDir::new().unwrap();
    let store = CsvStore::new(dir.path());
    let config = SyntheticConfig {
        days: 5,
        ..SyntheticConfig::default()
    };
    let bars = generate(&pair(), &[Timeframe::H1], &config)
        .remove(&Timeframe::H1)
        .unwrap();

    let path = store.path_for(&pair(), Timeframe::H1);
    assert_eq!(path, dir.path().join("ETHUSDT").join("1h.csv"));
    write_klines(&path, &bars).unwrap();

    let series = store.series(&pair(), Timeframe::H1).unwrap().unwrap();
    assert_eq!(series.len(), 120);
    assert_eq!(series.bars(), bars.as_slice());
}

#[test]
fn reads_are_cached() {
    let dir = TempDir::new().unwrap();
    let store = CsvStore::new(dir.path());
    let bars = generate(&pair(), &[Timeframe::D1], &SyntheticConfig::default())
        .remove(&Timeframe::D1)
        .unwrap();
    let path = store.path_for(&pair(), Timeframe::D1);
    write_klines(&path, &bars).unwrap();

    let first = store.series(&pair(), Timeframe::D1).unwrap().unwrap();
    // later edits to the file are not seen by this store
    fs::remove_file(&path).unwrap();
    let second = store.series(&pair(), Timeframe::D1).unwrap().unwrap();
    assert!(Arc::ptr_eq(&first, &second));
}

#[test]
fn missing_file_is_no_history() {
    let dir = TempDir::new().unwrap();
    let store = CsvStore::new(dir.path());
    assert!(store.series(&pair(), Timeframe::M15).unwrap().is_none());
}

#[test]
fn exchange_export_extra_columns_are_ignored() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("klines.csv");
    fs::write(
        &path,
        "Open time,Open,High,Low,Close,Volume,Close time,Quote asset volume,Number of trades,Taker buy base asset volume,Taker buy quote asset volume,Ignore\n\
         1672531200000,16541.77,16628.00,16499.01,16616.75,96925.41,1672617599999,1604291093.5,2293849,48508.25,803066282.4,0\n\
         1672617600000,16617.17,16799.23,16548.70,16672.87,121888.57,1672703999999,2029121773.8,2711001,61123.60,1017607418.1,0\n",
    )
    .unwrap();

    let bars = read_klines(&path).unwrap();
    assert_eq!(bars.len(), 2);
    assert_eq!(bars[0].open_time, 1_672_531_200_000);
    assert_eq!(bars[0].close, 16616.75);
    assert_eq!(bars[1].close_time, 1_672_703_999_999);
    assert!(bars.iter().all(|b| b.is_sane()));
}

#[test]
fn malformed_row_is_a_csv_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("ETHUSDT").join("1d.csv");
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(
        &path,
        "Open time,Open,High,Low,Close,Volume,Close time\n\
         1672531200000,abc,2,0.5,1.5,10,1672617599999\n",
    )
    .unwrap();

    let store = CsvStore::new(dir.path());
    let err = store.series(&pair(), Timeframe::D1).unwrap_err();
    assert!(matches!(err, StoreError::Csv { .. }));
    assert!(err.to_string().contains("1d.csv"));
}

#[test]
fn unordered_rows_are_rejected() {
    let dir = TempDir::new().unwrap();
    let store = CsvStore::new(dir.path());
    let mut bars = generate(&pair(), &[Timeframe::D1], &SyntheticConfig::default())
        .remove(&Timeframe::D1)
        .unwrap();
    bars.swap(3, 4);
    write_klines(&store.path_for(&pair(), Timeframe::D1), &bars).unwrap();

    let err = store.series(&pair(), Timeframe::D1).unwrap_err();
    match err {
        StoreError::Unordered { index, .. } => assert_eq!(index, 4),
        other => panic!("unexpected error: {other}"),
    }
}
