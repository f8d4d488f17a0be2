//! Pair-level trading simulator.
//!
//! A [`PairTrader`] owns one [`PairExpert`], feeds it bars, and turns its
//! decisions into a long-only trade log: flat + BUY opens, long + SELL closes,
//! everything else is a no-op. Trades execute at the close of the latest bar
//! of the trader's shortest timeframe.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::window::{DataMaintainer, DEFAULT_WINDOW};
use crate::domain::{Bar, BarUpdate, Decision, Timeframe};
use crate::expert::{PairExpert, Voter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Side {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    /// Close time (ms) of the bar the trade executed on.
    pub timestamp: i64,
    pub side: Side,
    pub price: f64,
}

/// Cumulative compounded profit (percent) after a closed round trip.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProfitPoint {
    pub timestamp: i64,
    pub profit: f64,
}

#[derive(Debug, Clone)]
pub struct PairTrader {
    expert: PairExpert,
    timeframes: BTreeSet<Timeframe>,
    data: DataMaintainer,
    in_position: bool,
    trades: Vec<Trade>,
    profit_curve: Vec<ProfitPoint>,
}

impl PairTrader {
    /// Take ownership of a tree; all rule state is reset.
    pub fn new(mut expert: PairExpert) -> Self {
        expert.reset();
        let timeframes = expert.timeframes();
        let data = DataMaintainer::new(timeframes.iter().copied(), DEFAULT_WINDOW);
        Self {
            expert,
            timeframes,
            data,
            in_position: false,
            trades: Vec::new(),
            profit_curve: Vec::new(),
        }
    }

    pub fn expert(&self) -> &PairExpert {
        &self.expert
    }

    pub fn into_expert(self) -> PairExpert {
        self.expert
    }

    pub fn timeframes(&self) -> &BTreeSet<Timeframe> {
        &self.timeframes
    }

    /// Shortest timeframe any rule listens to; it sets the replay step and the
    /// execution price.
    pub fn min_timeframe(&self) -> Option<Timeframe> {
        self.timeframes.first().copied()
    }

    pub fn data(&self) -> &DataMaintainer {
        &self.data
    }

    pub fn in_position(&self) -> bool {
        self.in_position
    }

    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }

    pub fn profit_curve(&self) -> &[ProfitPoint] {
        &self.profit_curve
    }

    /// Feed a historical bar to indicators only.
    pub fn prime(&mut self, timeframe: Timeframe, bar: &Bar) {
        self.data.push(timeframe, *bar);
        self.expert.prime(timeframe, bar);
    }

    pub fn update(&mut self, update: &BarUpdate) {
        self.data.apply(update);
        self.expert.update(update);
    }

    /// Ask the tree for a decision and trade on it. Returns the executed trade.
    pub fn act(&mut self) -> Option<Trade> {
        let verdict = self.expert.decide();
        let side = match (self.in_position, verdict.decision) {
            (false, Decision::Buy) => Side::Buy,
            (true, Decision::Sell) => Side::Sell,
            _ => return None,
        };
        let bar = self.data.latest(self.min_timeframe()?)?;
        let trade = Trade {
            timestamp: bar.close_time,
            side,
            price: bar.close,
        };
        self.trades.push(trade);
        self.in_position = side == Side::Buy;
        if side == Side::Sell {
            if let Some(profit) = self.evaluate_profit() {
                self.profit_curve.push(ProfitPoint {
                    timestamp: trade.timestamp,
                    profit,
                });
            }
        }
        Some(trade)
    }

    /// Compounded percent profit over closed round trips; `None` when no
    /// round trip has closed. A trailing open position is ignored.
    pub fn evaluate_profit(&self) -> Option<f64> {
        compound_profit(&self.trades)
    }
}

/// `(Π sell/buy − 1) · 100` over consecutive BUY/SELL pairs.
pub fn compound_profit(trades: &[Trade]) -> Option<f64> {
    let mut growth = 1.0;
    let mut closed = 0usize;
    for pair in trades.chunks_exact(2) {
        if let [buy, sell] = pair {
            if buy.side == Side::Buy && sell.side == Side::Sell && buy.price > 0.0 {
                growth *= sell.price / buy.price;
                closed += 1;
            }
        }
    }
    (closed > 0).then(|| (growth - 1.0) * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Pair;
    use crate::expert::{cast_to_pair_expert, Lineage, RuleExpert};
    use crate::indicators::make_bars;
    use crate::rules::RuleSpec;

    fn trade(side: Side, price: f64) -> Trade {
        Trade {
            timestamp: 0,
            side,
            price,
        }
    }

    #[test]
    fn compound_profit_multiplies_round_trips() {
        let trades = [
            trade(Side::Buy, 100.0),
            trade(Side::Sell, 110.0),
            trade(Side::Buy, 50.0),
            trade(Side::Sell, 45.0),
        ];
        let profit = compound_profit(&trades).unwrap();
        assert!((profit - (1.1 * 0.9 - 1.0) * 100.0).abs() < 1e-9);
    }

    #[test]
    fn open_position_is_excluded() {
        let trades = [
            trade(Side::Buy, 100.0),
            trade(Side::Sell, 120.0),
            trade(Side::Buy, 10.0),
        ];
        assert!((compound_profit(&trades).unwrap() - 20.0).abs() < 1e-9);
        assert_eq!(compound_profit(&trades[..1]), None);
        assert_eq!(compound_profit(&[]), None);
    }

    fn sma_trader() -> PairTrader {
        let leaf = RuleExpert::new(
            Timeframe::D1,
            RuleSpec::MovingAverageCrossover {
                fast: 1,
                slow: 3,
                patience: 1,
            },
        )
        .unwrap();
        let lineage = Lineage::new(Pair::new("BTC", "USDT"));
        PairTrader::new(cast_to_pair_expert(leaf, &lineage).unwrap())
    }

    #[test]
    fn trader_opens_and_closes_on_crossovers() {
        let mut trader = sma_trader();
        assert_eq!(trader.min_timeframe(), Some(Timeframe::D1));

        // up-cross at idx 3, down-cross at idx 6
        let bars = make_bars(&[12.0, 11.0, 10.0, 13.0, 14.0, 15.0, 11.0, 10.0]);
        for bar in &bars {
            trader.update(&BarUpdate::from_iter([(Timeframe::D1, *bar)]));
            trader.act();
        }

        let sides: Vec<Side> = trader.trades().iter().map(|t| t.side).collect();
        assert_eq!(sides, vec![Side::Buy, Side::Sell]);
        assert_eq!(trader.trades()[0].price, 13.0);
        assert_eq!(trader.trades()[0].timestamp, bars[3].close_time);
        assert_eq!(trader.trades()[1].price, 11.0);
        let expected = (11.0 / 13.0 - 1.0) * 100.0;
        assert!((trader.evaluate_profit().unwrap() - expected).abs() < 1e-9);
        assert_eq!(trader.profit_curve().len(), 1);
        assert!(!trader.in_position());
    }

    #[test]
    fn sell_while_flat_is_ignored() {
        let mut trader = sma_trader();
        // down-cross only
        for bar in make_bars(&[10.0, 11.0, 12.0, 9.0, 8.0]) {
            trader.update(&BarUpdate::from_iter([(Timeframe::D1, bar)]));
            assert!(trader.act().is_none());
        }
        assert!(trader.trades().is_empty());
        assert_eq!(trader.evaluate_profit(), None);
    }
}
