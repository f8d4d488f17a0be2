//! tradetree core: the decision model and the pair trader.
//!
//! This crate contains everything that decides and trades, but nothing that
//! reads files or spawns threads:
//! - Domain types (bars, decisions, timeframes, pairs)
//! - Streaming indicators (SMA, EMA, RSI, TRIX, Ichimoku, Bollinger, MACD)
//! - Rule state machines turning indicator readings into BUY/SELL/WAIT
//! - The four-level expert tree with weighted voting and its JSON document
//! - `PairTrader`, which drives a tree through time and keeps the trade log
//! - Deterministic RNG hierarchy used by the optimizer

pub mod domain;
pub mod engine;
pub mod expert;
pub mod indicators;
pub mod rng;
pub mod rules;
