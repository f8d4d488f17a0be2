//! Leaf expert: one rule on one timeframe.

use std::collections::BTreeSet;

use super::{Estimate, Voter};
use crate::domain::{Bar, BarUpdate, Decision, Timeframe, Verdict};
use crate::rules::{Rule, RuleError, RuleKind, RuleSpec};

#[derive(Debug, Clone)]
pub struct RuleExpert {
    timeframe: Timeframe,
    rule: Rule,
    // decision from the current step; WAIT when no bar of our timeframe arrived
    last: Decision,
    estimate: Estimate,
}

impl RuleExpert {
    pub fn new(timeframe: Timeframe, spec: RuleSpec) -> Result<Self, RuleError> {
        Ok(Self {
            timeframe,
            rule: Rule::new(spec)?,
            last: Decision::Wait,
            estimate: Estimate::UNKNOWN,
        })
    }

    pub fn timeframe(&self) -> Timeframe {
        self.timeframe
    }

    pub fn spec(&self) -> &RuleSpec {
        self.rule.parameters()
    }

    pub fn kind(&self) -> RuleKind {
        self.rule.kind()
    }

    pub fn estimate(&self) -> Estimate {
        self.estimate
    }

    pub fn set_estimate(&mut self, estimate: Estimate) {
        self.estimate = estimate;
    }

    pub fn label(&self) -> String {
        format!("{} @ {}", self.rule.parameters(), self.timeframe)
    }
}

impl Voter for RuleExpert {
    fn prime(&mut self, timeframe: Timeframe, bar: &Bar) {
        if timeframe == self.timeframe {
            self.rule.prime(bar);
        }
    }

    fn update(&mut self, update: &BarUpdate) {
        self.last = match update.get(self.timeframe) {
            Some(bar) => self.rule.update(bar),
            None => Decision::Wait,
        };
    }

    fn decide(&self) -> Verdict {
        Verdict::certain(self.last)
    }

    fn reset(&mut self) {
        self.rule.reset();
        self.last = Decision::Wait;
    }

    fn collect_timeframes(&self, out: &mut BTreeSet<Timeframe>) {
        out.insert(self.timeframe);
    }
}
