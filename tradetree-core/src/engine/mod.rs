//! Simulation side of the core: the pair trader and the bar history it keeps.
//!
//! Replaying stored history through a trader (splitting init/replay windows,
//! the virtual clock) lives in the runner; this module only knows how to react
//! to one step of bars at a time.

pub mod trader;
pub mod window;

pub use trader::{compound_profit, PairTrader, ProfitPoint, Side, Trade};
pub use window::{DataMaintainer, DEFAULT_WINDOW};
