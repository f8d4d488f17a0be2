//! Property tests for decision-model invariants.
//!
//! Uses proptest to verify:
//! 1. Crossover counters: never both nonzero, grow by one, reset on a flip
//! 2. Direction runs: reset at inflections, never reset on a constant sign
//! 3. Weight normalization: unit L1 norm, signs kept
//! 4. Aggregation: confidence is |sum| and never exceeds 1 for normalized weights
//! 5. Profit: compounding matches the product of round-trip ratios
//! 6. Documents: saving and loading a tree keeps weights and estimates exactly

use proptest::prelude::*;
use tradetree_core::domain::{Decision, Pair, Timeframe, Verdict};
use tradetree_core::engine::{compound_profit, Side, Trade};
use tradetree_core::expert::{
    aggregate, normalize_l1, Estimate, Interior, PairExpert, RuleClassExpert, RuleExpert,
    TimeFrameExpert, TreeDocument,
};
use tradetree_core::rules::{
    CrossoverState, Direction, DirectionState, RuleKind, RuleSpec, UNCROSSED,
};

// ── Strategies (proptest) ────────────────────────────────────────────

fn arb_pairs() -> impl Strategy<Value = Vec<(f64, f64)>> {
    prop::collection::vec((-100.0..100.0_f64, -100.0..100.0_f64), 1..200)
}

fn arb_weights() -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(-10.0..10.0_f64, 1..20)
}

fn arb_decision() -> impl Strategy<Value = Decision> {
    prop_oneof![
        Just(Decision::Buy),
        Just(Decision::Sell),
        Just(Decision::Wait)
    ]
}

// ── 1. Crossover counters ────────────────────────────────────────────

proptest! {
    #[test]
    fn crossover_exactly_one_counter_live(pairs in arb_pairs()) {
        let mut state = CrossoverState::new();
        for (a, b) in pairs {
            let before = state;
            state.update(a, b);

            prop_assert!(state.a_over_b() == 0 || state.b_over_a() == 0);
            if a > b {
                prop_assert_eq!(state.b_over_a(), 0);
                prop_assert_eq!(state.a_over_b(), before.a_over_b().saturating_add(1));
            } else {
                prop_assert_eq!(state.a_over_b(), 0);
                prop_assert_eq!(state.b_over_a(), before.b_over_a().saturating_add(1));
            }
        }
    }

    /// A series that never changes sides never produces a finite count.
    #[test]
    fn crossover_one_sided_stays_uncrossed(values in prop::collection::vec(1.0..100.0_f64, 1..100)) {
        let mut state = CrossoverState::new();
        for v in values {
            state.update(v, 0.0);
            prop_assert_eq!(state.a_over_b(), UNCROSSED);
        }
    }
}

// ── 2. Direction runs ────────────────────────────────────────────────

proptest! {
    #[test]
    fn direction_constant_sign_never_resets(deltas in prop::collection::vec(0.0..5.0_f64, 1..100)) {
        let mut state = DirectionState::new();
        state.update(1.0);
        for (i, d) in deltas.iter().enumerate() {
            state.update(*d);
            prop_assert_eq!(state.direction(), Direction::Rising);
            prop_assert_eq!(state.run(), i as u64 + 2);
        }
    }

    #[test]
    fn direction_resets_on_sign_change(deltas in prop::collection::vec(-5.0..5.0_f64, 2..100)) {
        let mut state = DirectionState::new();
        for d in deltas {
            let before = state;
            state.update(d);
            let flipped = (d > 0.0 && before.direction() != Direction::Rising)
                || (d < 0.0 && before.direction() != Direction::Falling);
            if flipped {
                prop_assert_eq!(state.run(), 1);
            } else if before.direction() != Direction::Unknown {
                prop_assert_eq!(state.run(), before.run() + 1);
            }
        }
    }
}

// ── 3. Weight normalization ──────────────────────────────────────────

proptest! {
    #[test]
    fn normalized_weights_have_unit_l1_norm(raw in arb_weights()) {
        let mut weights = raw.clone();
        normalize_l1(&mut weights);
        let norm: f64 = weights.iter().map(|w| w.abs()).sum();
        prop_assert!((norm - 1.0).abs() < 1e-9);

        if raw.iter().any(|w| *w != 0.0) {
            for (w, r) in weights.iter().zip(&raw) {
                prop_assert!(w.signum() == r.signum() || *r == 0.0);
            }
        }
    }
}

// ── 4. Aggregation ───────────────────────────────────────────────────

proptest! {
    #[test]
    fn aggregate_confidence_bounded(
        raw in arb_weights(),
        decisions in prop::collection::vec(arb_decision(), 20),
        threshold in 0.0..1.0_f64,
    ) {
        let mut weights = raw;
        normalize_l1(&mut weights);
        let verdicts = decisions.iter().take(weights.len()).map(|d| Verdict::certain(*d));
        let verdict = aggregate(verdicts, &weights, threshold);

        prop_assert!(verdict.confidence >= 0.0);
        prop_assert!(verdict.confidence <= 1.0 + 1e-9);
        match verdict.decision {
            Decision::Wait => prop_assert!(verdict.confidence <= threshold),
            _ => prop_assert!(verdict.confidence > threshold),
        }
    }
}

// ── 5. Profit ────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn compound_profit_matches_ratio_product(
        prices in prop::collection::vec((1.0..1000.0_f64, 1.0..1000.0_f64), 1..20),
    ) {
        let mut trades = Vec::new();
        let mut growth = 1.0;
        for (i, (buy, sell)) in prices.iter().enumerate() {
            trades.push(Trade { timestamp: 2 * i as i64, side: Side::Buy, price: *buy });
            trades.push(Trade { timestamp: 2 * i as i64 + 1, side: Side::Sell, price: *sell });
            growth *= sell / buy;
        }
        let profit = compound_profit(&trades).unwrap();
        prop_assert!((profit - (growth - 1.0) * 100.0).abs() < 1e-6 * (1.0 + profit.abs()));
    }
}

// ── 6. Documents ─────────────────────────────────────────────────────

fn weighted_tree(class_weights: Vec<f64>, tf_weights: Vec<f64>, profit: f64) -> PairExpert {
    let leaves = (0..class_weights.len())
        .map(|i| {
            RuleExpert::new(
                Timeframe::H1,
                RuleSpec::MovingAverageCrossover {
                    fast: 2 + i,
                    slow: 30,
                    patience: 1,
                },
            )
            .unwrap()
        })
        .collect();
    let mut class = RuleClassExpert::new(RuleKind::MovingAverageCrossover, leaves, 0.0);
    class.set_weights(Some(class_weights)).unwrap();
    class.set_estimate(Estimate::new(Some(profit), 9));

    let classes = vec![class; tf_weights.len()];
    let mut tf = TimeFrameExpert::new(Timeframe::H1, classes, 0.05);
    tf.set_weights(Some(tf_weights)).unwrap();
    PairExpert::new(Pair::new("BTC", "USDT"), vec![tf], 0.0)
}

proptest! {
    #[test]
    fn saved_tree_reloads_bit_for_bit(
        class_weights in arb_weights(),
        tf_weights in prop::collection::vec(-10.0..10.0_f64, 1..5),
        profit in -5.0..5.0_f64,
    ) {
        let tree = weighted_tree(class_weights, tf_weights, profit);
        let json = TreeDocument::new(tree.clone()).to_json().unwrap();
        let back = TreeDocument::from_json(&json).unwrap().into_pair_expert().unwrap();

        let before = &tree.committee().members()[0];
        let after = &back.committee().members()[0];
        prop_assert_eq!(before.weights(), after.weights());
        for (a, b) in before.committee().members().iter().zip(after.committee().members()) {
            prop_assert_eq!(a.weights(), b.weights());
            prop_assert_eq!(a.estimate(), b.estimate());
        }
        prop_assert_eq!(TreeDocument::new(back).to_json().unwrap(), json);
    }
}
