//! tradetree CLI: build, prune, fit and replay expert trees.
//!
//! Commands:
//! - `build`: construct the full candidate tree from the configured grids
//! - `prune`: estimate every rule and apply the configured pruning passes
//! - `fit`: search the weights of every interior node
//! - `simulate`: replay the last N days and print the trade log
//! - `show`: print the tree outline
//! - `synth`: write synthetic kline CSVs in the history layout
//!
//! Trees are read and written as JSON documents; history comes from the
//! configured CSV directory, or from the synthetic generator with
//! `--synthetic`.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use tradetree_core::engine::{PairTrader, Side};
use tradetree_core::expert::{Expert, PairExpert, TreeDocument};
use tradetree_runner::csv_store::write_klines;
use tradetree_runner::synthetic::generate;
use tradetree_runner::{
    synthetic_store, BacktestOutcome, CsvStore, SyntheticConfig, Trainer, TrainerConfig,
};

#[derive(Parser)]
#[command(
    name = "tradetree",
    about = "tradetree: hierarchical expert trees for crypto pair trading"
)]
struct Cli {
    /// Trainer config (TOML). Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true, default_value_t = false)]
    json: bool,

    /// Replay generated history instead of the CSV directory.
    #[arg(long, global = true, default_value_t = false)]
    synthetic: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Construct the full candidate tree.
    Build {
        /// Where to write the tree document.
        #[arg(long, short)]
        output: PathBuf,
    },
    /// Estimate rules and apply every configured pruning pass.
    Prune {
        /// Input tree document.
        #[arg(long)]
        tree: PathBuf,

        /// Output path. Defaults to overwriting the input.
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Fit the weights of every interior node.
    Fit {
        /// Input tree document.
        #[arg(long)]
        tree: PathBuf,

        /// Output path. Defaults to overwriting the input.
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Also write the per-node epoch report as JSON.
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Replay the last N days of history and print the trade log.
    Simulate {
        /// Input tree document.
        #[arg(long)]
        tree: PathBuf,

        /// Days to replay.
        #[arg(long, default_value_t = 30)]
        days: u64,

        /// Also write the trade log as JSON.
        #[arg(long)]
        trades: Option<PathBuf>,
    },
    /// Print the tree outline.
    Show {
        /// Input tree document.
        #[arg(long)]
        tree: PathBuf,
    },
    /// Write synthetic history for the configured pair and timeframes.
    Synth {
        /// Root of the history layout. Defaults to `trainer.history_dir`.
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Days of history.
        #[arg(long, default_value_t = 400)]
        days: u64,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.json)?;

    let config = match &cli.config {
        Some(path) => TrainerConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => TrainerConfig::default(),
    };

    match cli.command {
        Commands::Build { output } => {
            let trainer = trainer(config, cli.synthetic)?;
            let tree = trainer.construct_system()?;
            println!(
                "Built {} rules on {} timeframes",
                tree.rule_count(),
                tree.timeframes().len()
            );
            save_tree(&tree, &output)
        }
        Commands::Prune { tree, output } => {
            let trainer = trainer(config, cli.synthetic)?;
            let mut expert = load_tree(&tree)?;
            let before = expert.rule_count();
            let report = trainer.prune(&mut expert)?;
            println!(
                "Pruned {before} -> {} rules ({} estimated, {} without enough history)",
                expert.rule_count(),
                report.estimated,
                report.data_gaps
            );
            save_tree(&expert, output.as_deref().unwrap_or(tree.as_path()))
        }
        Commands::Fit {
            tree,
            output,
            report,
        } => {
            let trainer = trainer(config, cli.synthetic)?;
            let mut expert = load_tree(&tree)?;
            let fit = trainer.fit_weights(&mut expert)?;
            for node in &fit.nodes {
                let best = node
                    .best_profit
                    .map(|p| format!("{p:+.4}%/day"))
                    .unwrap_or_else(|| "none".into());
                println!("{:<60} children={:<3} best={best}", node.node, node.children);
            }
            if let Some(path) = report {
                let file = File::create(&path)
                    .with_context(|| format!("creating {}", path.display()))?;
                serde_json::to_writer_pretty(BufWriter::new(file), &fit)?;
            }
            save_tree(&expert, output.as_deref().unwrap_or(tree.as_path()))
        }
        Commands::Simulate { tree, days, trades } => {
            let trainer = trainer(config, cli.synthetic)?;
            let expert = load_tree(&tree)?;
            let (trader, outcome) = trainer.simulate(expert, days)?;
            print_trades(&trader, &outcome, days);
            if let Some(path) = trades {
                let file = File::create(&path)
                    .with_context(|| format!("creating {}", path.display()))?;
                serde_json::to_writer_pretty(BufWriter::new(file), trader.trades())?;
            }
            Ok(())
        }
        Commands::Show { tree } => {
            let expert = load_tree(&tree)?;
            print!("{}", Expert::Pair(expert).outline());
            Ok(())
        }
        Commands::Synth { output_dir, days } => {
            let root = output_dir.unwrap_or_else(|| config.trainer.history_dir.clone());
            write_synthetic(&config, &root, days)
        }
    }
}

/// Console logs by default, JSON lines with `--json`. `RUST_LOG` overrides
/// the `info` default. Logs go to stderr so stdout stays clean.
fn init_logging(json: bool) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_ansi(true)
                    .with_writer(std::io::stderr),
            )
            .try_init()?;
    }
    Ok(())
}

fn trainer(config: TrainerConfig, synthetic: bool) -> Result<Trainer> {
    if !synthetic {
        let store = CsvStore::new(config.trainer.history_dir.clone());
        info!(dir = %store.root().display(), "reading CSV history");
        return Ok(Trainer::new(config, Arc::new(store)));
    }
    let pair = config.pair()?;
    let store = synthetic_store(&pair, &config.trainer.timeframes, &SyntheticConfig::default())?;
    info!(%pair, "using synthetic history");
    Ok(Trainer::new(config, Arc::new(store)))
}

fn load_tree(path: &Path) -> Result<PairExpert> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let document = TreeDocument::from_reader(BufReader::new(file))
        .with_context(|| format!("reading tree document {}", path.display()))?;
    Ok(document.into_pair_expert()?)
}

fn save_tree(tree: &PairExpert, path: &Path) -> Result<()> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    TreeDocument::new(tree.clone()).to_writer(BufWriter::new(file))?;
    println!("Tree saved to: {}", path.display());
    Ok(())
}

fn write_synthetic(config: &TrainerConfig, root: &Path, days: u64) -> Result<()> {
    let pair = config.pair()?;
    let synthetic = SyntheticConfig {
        days,
        ..SyntheticConfig::default()
    };
    let store = CsvStore::new(root);
    for (timeframe, bars) in generate(&pair, &config.trainer.timeframes, &synthetic) {
        let path = store.path_for(&pair, timeframe);
        write_klines(&path, &bars)?;
        println!("{:>7} bars -> {}", bars.len(), path.display());
    }
    Ok(())
}

fn format_time(ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(ms)
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ms.to_string())
}

fn print_trades(trader: &PairTrader, outcome: &BacktestOutcome, days: u64) {
    println!();
    println!("=== Simulation: {} over {days} days ===", trader.expert().pair());
    println!("{:<18} {:<5} {:>14}", "Time", "Side", "Price");
    println!("{}", "-".repeat(39));
    for trade in trader.trades() {
        let side = match trade.side {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        };
        println!(
            "{:<18} {:<5} {:>14.4}",
            format_time(trade.timestamp),
            side,
            trade.price
        );
    }
    println!();
    println!("Trades:         {}", outcome.ntrades);
    match outcome.profit {
        Some(profit) => {
            println!("Profit:         {profit:+.2}%");
            println!("Per day:        {:+.4}%", profit / days as f64);
        }
        None => println!("Profit:         n/a (no closed round trip)"),
    }
    if trader.in_position() {
        println!("Position:       still open");
    }
    println!();
}
