//! End-to-end training on synthetic history: build, prune, fit, simulate,
//! then save and reload the tree.

use std::sync::Arc;

use tradetree_core::domain::{Pair, Timeframe};
use tradetree_core::expert::{Interior, PairExpert, TreeDocument};
use tradetree_core::rules::RuleKind;
use tradetree_runner::{
    synthetic_store, FitConfig, GridSearchSpace, ParamGrid, PruneOptions, SyntheticConfig,
    Trainer, TrainerConfig, TrainerSection,
};

fn config() -> TrainerConfig {
    let grid = ParamGrid {
        patience: vec![1],
        ma_fast: vec![3, 5],
        ma_slow: vec![15],
        macd_fast: vec![12],
        macd_slow: vec![26],
        macd_signal: vec![9],
        ..ParamGrid::default()
    };
    let mut config = TrainerConfig {
        trainer: TrainerSection {
            pair: "BTC/USDT".into(),
            timeframes: vec![Timeframe::D1, Timeframe::H4],
            rules: vec![RuleKind::MovingAverageCrossover, RuleKind::MacdSignalCrossover],
            seed: 5,
            ..TrainerSection::default()
        },
        prune: vec![PruneOptions {
            nbest: Some(99_999),
            ..PruneOptions::default()
        }],
        fit: FitConfig {
            epochs: 2,
            population: 2,
            nchildren: 1,
            min_trades: 0,
            fit_days: 30,
            threads: 2,
            ..FitConfig::default()
        },
        search: GridSearchSpace::new(grid),
        ..TrainerConfig::default()
    };
    config.estimate.0.insert(Timeframe::D1, 60);
    config.estimate.0.insert(Timeframe::H4, 30);
    config
}

fn trainer() -> Trainer {
    let store = synthetic_store(
        &Pair::new("BTC", "USDT"),
        &[Timeframe::D1, Timeframe::H4],
        &SyntheticConfig::default(),
    )
    .unwrap();
    Trainer::new(config(), Arc::new(store))
}

fn train(trainer: &Trainer) -> PairExpert {
    let mut tree = trainer.construct_system().unwrap();
    trainer.prune(&mut tree).unwrap();
    trainer.fit_weights(&mut tree).unwrap();
    tree
}

#[test]
fn build_prune_fit_simulate() {
    let trainer = trainer();

    let mut tree = trainer.construct_system().unwrap();
    // (2 MA + 1 MACD) per timeframe
    assert_eq!(tree.rule_count(), 6);
    assert_eq!(tree.committee().len(), 2);

    let report = trainer.prune(&mut tree).unwrap();
    assert_eq!(report.estimated + report.data_gaps, 6);
    assert_eq!(report.data_gaps, 0);
    assert_eq!(report.kept + report.removed, 6);
    assert_eq!(tree.rule_count(), report.kept);
    // every surviving rule carries its estimate
    for tf in tree.committee().members() {
        for class in tf.committee().members() {
            assert!(class.committee().members().iter().all(|r| r.estimate().is_known()));
        }
    }

    let fit = trainer.fit_weights(&mut tree).unwrap();
    for node in &fit.nodes {
        assert!(node.children >= 2);
        assert_eq!(node.epochs.len(), 2);
    }

    let (trader, outcome) = trainer.simulate(tree, 30).unwrap();
    assert_eq!(outcome.ntrades, trader.trades().len());
}

#[test]
fn saved_tree_replays_identically() {
    let trainer = trainer();
    let tree = train(&trainer);

    let json = TreeDocument::new(tree.clone()).to_json().unwrap();
    let loaded = TreeDocument::from_json(&json)
        .unwrap()
        .into_pair_expert()
        .unwrap();
    assert_eq!(loaded.rule_count(), tree.rule_count());

    let (original, a) = trainer.simulate(tree, 30).unwrap();
    let (reloaded, b) = trainer.simulate(loaded, 30).unwrap();
    assert_eq!(a, b);
    assert_eq!(original.trades(), reloaded.trades());
}

#[test]
fn training_is_reproducible() {
    let a = TreeDocument::new(train(&trainer())).to_json().unwrap();
    let b = TreeDocument::new(train(&trainer())).to_json().unwrap();
    assert_eq!(a, b);
}
