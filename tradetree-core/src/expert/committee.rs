//! Weighted voting shared by every interior level of the tree.
//!
//! A committee owns its members, one weight per member, a decision threshold
//! and the node's cached [`Estimate`]. Every mutation that can change the
//! committee's behaviour (weights, threshold, membership, mutable access to a
//! member) clears the estimate.

use super::{Estimate, ExpertError, Voter};
use crate::domain::{Bar, BarUpdate, Decision, Timeframe, Verdict};
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq)]
pub struct Committee<E> {
    members: Vec<E>,
    weights: Vec<f64>,
    threshold: f64,
    estimate: Estimate,
}

impl<E> Committee<E> {
    /// Committee with uniform weights.
    pub fn new(members: Vec<E>, threshold: f64) -> Self {
        let weights = uniform(members.len());
        Self {
            members,
            weights,
            threshold,
            estimate: Estimate::UNKNOWN,
        }
    }

    /// Single-member pass-through committee.
    pub fn solo(member: E) -> Self {
        Self::new(vec![member], 0.0)
    }

    /// Rebuild from stored parts. Weights are kept bit-for-bit; only their
    /// count and finiteness are checked.
    pub fn from_parts(
        members: Vec<E>,
        weights: Vec<f64>,
        threshold: f64,
        estimate: Estimate,
    ) -> Result<Self, ExpertError> {
        check_weights(&weights, members.len())?;
        Ok(Self {
            members,
            weights,
            threshold,
            estimate,
        })
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn members(&self) -> &[E] {
        &self.members
    }

    /// Mutable access to the members. Invalidates the estimate.
    pub fn members_mut(&mut self) -> &mut [E] {
        self.estimate = Estimate::UNKNOWN;
        &mut self.members
    }

    /// Replace every member; weights become uniform.
    pub fn set_members(&mut self, members: Vec<E>) {
        self.weights = uniform(members.len());
        self.members = members;
        self.estimate = Estimate::UNKNOWN;
    }

    /// Drop members failing `keep`; survivors' weights are renormalized.
    /// Returns how many members were removed.
    pub fn retain(&mut self, mut keep: impl FnMut(&E) -> bool) -> usize {
        let before = self.members.len();
        let (members, weights): (Vec<E>, Vec<f64>) = std::mem::take(&mut self.members)
            .into_iter()
            .zip(std::mem::take(&mut self.weights))
            .filter(|(member, _)| keep(member))
            .unzip();
        self.members = members;
        self.weights = weights;
        normalize_l1(&mut self.weights);
        self.estimate = Estimate::UNKNOWN;
        before - self.members.len()
    }

    pub fn into_members(self) -> Vec<E> {
        self.members
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// Set L1-normalized weights; `None` means uniform.
    pub fn set_weights(&mut self, weights: Option<Vec<f64>>) -> Result<(), ExpertError> {
        let weights = match weights {
            None => uniform(self.members.len()),
            Some(mut w) => {
                check_weights(&w, self.members.len())?;
                normalize_l1(&mut w);
                w
            }
        };
        self.weights = weights;
        self.estimate = Estimate::UNKNOWN;
        Ok(())
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn set_threshold(&mut self, threshold: f64) {
        self.threshold = threshold;
        self.estimate = Estimate::UNKNOWN;
    }

    pub fn estimate(&self) -> Estimate {
        self.estimate
    }

    pub fn set_estimate(&mut self, estimate: Estimate) {
        self.estimate = estimate;
    }
}

impl<E: Voter> Voter for Committee<E> {
    fn prime(&mut self, timeframe: Timeframe, bar: &Bar) {
        for member in &mut self.members {
            member.prime(timeframe, bar);
        }
    }

    fn update(&mut self, update: &BarUpdate) {
        for member in &mut self.members {
            member.update(update);
        }
    }

    fn decide(&self) -> Verdict {
        aggregate(
            self.members.iter().map(Voter::decide),
            &self.weights,
            self.threshold,
        )
    }

    fn reset(&mut self) {
        for member in &mut self.members {
            member.reset();
        }
    }

    fn collect_timeframes(&self, out: &mut BTreeSet<Timeframe>) {
        for member in &self.members {
            member.collect_timeframes(out);
        }
    }
}

fn check_weights(weights: &[f64], members: usize) -> Result<(), ExpertError> {
    if weights.len() != members {
        return Err(ExpertError::WeightLength {
            expected: members,
            found: weights.len(),
        });
    }
    if weights.iter().any(|w| !w.is_finite()) {
        return Err(ExpertError::NonFiniteWeight);
    }
    Ok(())
}

/// Weighted vote: sum of weight * confidence * sign against a symmetric threshold.
pub fn aggregate(verdicts: impl Iterator<Item = Verdict>, weights: &[f64], threshold: f64) -> Verdict {
    let sum: f64 = verdicts.zip(weights).map(|(v, w)| w * v.vote()).sum();
    let decision = if sum > threshold {
        Decision::Buy
    } else if sum < -threshold {
        Decision::Sell
    } else {
        Decision::Wait
    };
    Verdict {
        decision,
        confidence: sum.abs(),
    }
}

/// Scale to unit L1 norm keeping signs. All-zero input becomes uniform.
pub fn normalize_l1(weights: &mut [f64]) {
    let norm: f64 = weights.iter().map(|w| w.abs()).sum();
    if norm > 0.0 && norm.is_finite() {
        for w in weights.iter_mut() {
            *w /= norm;
        }
    } else {
        let n = weights.len() as f64;
        for w in weights.iter_mut() {
            *w = 1.0 / n;
        }
    }
}

fn uniform(n: usize) -> Vec<f64> {
    vec![1.0 / n as f64; n]
}
