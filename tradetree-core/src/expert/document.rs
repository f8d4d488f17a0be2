//! JSON document for a whole expert tree.
//!
//! Every node is written as a tagged record (`"type": "Pair" | "TimeFrame" |
//! "RuleClass" | "Rule"`) carrying its identifying fields, weights and
//! estimate. Rule runtime state is never stored; it is rebuilt fresh from the
//! rule parameters on load. Documents from a newer schema are rejected.

use std::io::{Read, Write};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{
    Committee, Estimate, Expert, ExpertError, Interior, PairExpert, RuleClassExpert, RuleExpert,
    TimeFrameExpert,
};
use crate::domain::{Pair, Timeframe};
use crate::rules::{RuleKind, RuleSpec};

pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("unsupported schema version {found} (max supported: {supported})")]
    UnsupportedVersion { found: u64, supported: u32 },

    #[error("document has no schema_version")]
    MissingVersion,

    #[error("{parent} node cannot hold a {found} node")]
    UnexpectedChild {
        parent: &'static str,
        found: &'static str,
    },

    #[error("expected a Pair root, found {found}")]
    NotAPair { found: &'static str },

    #[error("{rule} rule stored under a {class} rule class")]
    KindMismatch { class: RuleKind, rule: RuleKind },

    #[error(transparent)]
    Expert(#[from] ExpertError),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}

/// Serialized tree plus its schema version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeDocument {
    pub schema_version: u32,
    pub expert: Expert,
}

impl TreeDocument {
    pub fn new(expert: impl Into<Expert>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            expert: expert.into(),
        }
    }

    /// The root as a pair tree. Lower-level roots are rejected; they lack the
    /// lineage needed to rebuild their parents.
    pub fn into_pair_expert(self) -> Result<PairExpert, DocumentError> {
        match self.expert {
            Expert::Pair(pair) => Ok(pair),
            other => Err(DocumentError::NotAPair {
                found: other.node_type(),
            }),
        }
    }

    pub fn to_json(&self) -> Result<String, DocumentError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn to_writer(&self, writer: impl Write) -> Result<(), DocumentError> {
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    pub fn from_json(json: &str) -> Result<Self, DocumentError> {
        Self::from_value(serde_json::from_str(json)?)
    }

    pub fn from_reader(reader: impl Read) -> Result<Self, DocumentError> {
        Self::from_value(serde_json::from_reader(reader)?)
    }

    // Version is checked before the body so newer layouts fail with a clear error.
    fn from_value(value: serde_json::Value) -> Result<Self, DocumentError> {
        let found = value
            .get("schema_version")
            .and_then(serde_json::Value::as_u64)
            .ok_or(DocumentError::MissingVersion)?;
        if found > u64::from(SCHEMA_VERSION) {
            return Err(DocumentError::UnsupportedVersion {
                found,
                supported: SCHEMA_VERSION,
            });
        }
        Ok(serde_json::from_value(value)?)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum NodeRecord {
    Pair {
        base: String,
        quote: String,
        weights: Vec<f64>,
        #[serde(default)]
        threshold: f64,
        estimated_profit: Option<f64>,
        #[serde(default)]
        estimated_ntrades: usize,
        experts: Vec<NodeRecord>,
    },
    TimeFrame {
        timeframe: Timeframe,
        weights: Vec<f64>,
        #[serde(default)]
        threshold: f64,
        estimated_profit: Option<f64>,
        #[serde(default)]
        estimated_ntrades: usize,
        experts: Vec<NodeRecord>,
    },
    RuleClass {
        rule: RuleKind,
        weights: Vec<f64>,
        #[serde(default)]
        threshold: f64,
        estimated_profit: Option<f64>,
        #[serde(default)]
        estimated_ntrades: usize,
        experts: Vec<NodeRecord>,
    },
    Rule {
        timeframe: Timeframe,
        parameters: RuleSpec,
        estimated_profit: Option<f64>,
        #[serde(default)]
        estimated_ntrades: usize,
    },
}

impl NodeRecord {
    fn node_type(&self) -> &'static str {
        match self {
            Self::Pair { .. } => "Pair",
            Self::TimeFrame { .. } => "TimeFrame",
            Self::RuleClass { .. } => "RuleClass",
            Self::Rule { .. } => "Rule",
        }
    }
}

trait ToRecord {
    fn to_record(&self) -> NodeRecord;
}

fn records<N: Interior>(node: &N) -> Vec<NodeRecord>
where
    N::Member: ToRecord,
{
    node.committee()
        .members()
        .iter()
        .map(ToRecord::to_record)
        .collect()
}

impl ToRecord for PairExpert {
    fn to_record(&self) -> NodeRecord {
        let e = self.estimate();
        NodeRecord::Pair {
            base: self.pair().base.clone(),
            quote: self.pair().quote.clone(),
            weights: self.weights().to_vec(),
            threshold: self.committee().threshold(),
            estimated_profit: e.profit,
            estimated_ntrades: e.ntrades,
            experts: records(self),
        }
    }
}

impl ToRecord for TimeFrameExpert {
    fn to_record(&self) -> NodeRecord {
        let e = self.estimate();
        NodeRecord::TimeFrame {
            timeframe: self.timeframe(),
            weights: self.weights().to_vec(),
            threshold: self.committee().threshold(),
            estimated_profit: e.profit,
            estimated_ntrades: e.ntrades,
            experts: records(self),
        }
    }
}

impl ToRecord for RuleClassExpert {
    fn to_record(&self) -> NodeRecord {
        let e = self.estimate();
        NodeRecord::RuleClass {
            rule: self.kind(),
            weights: self.weights().to_vec(),
            threshold: self.committee().threshold(),
            estimated_profit: e.profit,
            estimated_ntrades: e.ntrades,
            experts: records(self),
        }
    }
}

impl ToRecord for RuleExpert {
    fn to_record(&self) -> NodeRecord {
        let e = self.estimate();
        NodeRecord::Rule {
            timeframe: self.timeframe(),
            parameters: self.spec().clone(),
            estimated_profit: e.profit,
            estimated_ntrades: e.ntrades,
        }
    }
}

impl From<&Expert> for NodeRecord {
    fn from(expert: &Expert) -> Self {
        match expert {
            Expert::Pair(n) => n.to_record(),
            Expert::TimeFrame(n) => n.to_record(),
            Expert::RuleClass(n) => n.to_record(),
            Expert::Rule(n) => n.to_record(),
        }
    }
}

fn children<T>(
    parent: &'static str,
    records: Vec<NodeRecord>,
    pick: impl Fn(Expert) -> Option<T>,
) -> Result<Vec<T>, DocumentError> {
    records
        .into_iter()
        .map(|record| {
            let found = record.node_type();
            let expert = Expert::try_from(record)?;
            pick(expert).ok_or(DocumentError::UnexpectedChild { parent, found })
        })
        .collect()
}

impl TryFrom<NodeRecord> for Expert {
    type Error = DocumentError;

    fn try_from(record: NodeRecord) -> Result<Self, Self::Error> {
        let node = match record {
            NodeRecord::Pair {
                base,
                quote,
                weights,
                threshold,
                estimated_profit,
                estimated_ntrades,
                experts,
            } => {
                let members = children("Pair", experts, |e| match e {
                    Expert::TimeFrame(n) => Some(n),
                    _ => None,
                })?;
                let committee = Committee::from_parts(
                    members,
                    weights,
                    threshold,
                    Estimate::new(estimated_profit, estimated_ntrades),
                )?;
                PairExpert::from_committee(Pair::new(base, quote), committee).into()
            }
            NodeRecord::TimeFrame {
                timeframe,
                weights,
                threshold,
                estimated_profit,
                estimated_ntrades,
                experts,
            } => {
                let members = children("TimeFrame", experts, |e| match e {
                    Expert::RuleClass(n) => Some(n),
                    _ => None,
                })?;
                let committee = Committee::from_parts(
                    members,
                    weights,
                    threshold,
                    Estimate::new(estimated_profit, estimated_ntrades),
                )?;
                TimeFrameExpert::from_committee(timeframe, committee).into()
            }
            NodeRecord::RuleClass {
                rule,
                weights,
                threshold,
                estimated_profit,
                estimated_ntrades,
                experts,
            } => {
                let members = children("RuleClass", experts, |e| match e {
                    Expert::Rule(n) => Some(n),
                    _ => None,
                })?;
                if let Some(leaf) = members.iter().find(|leaf| leaf.kind() != rule) {
                    return Err(DocumentError::KindMismatch {
                        class: rule,
                        rule: leaf.kind(),
                    });
                }
                let committee = Committee::from_parts(
                    members,
                    weights,
                    threshold,
                    Estimate::new(estimated_profit, estimated_ntrades),
                )?;
                RuleClassExpert::from_committee(rule, committee).into()
            }
            NodeRecord::Rule {
                timeframe,
                parameters,
                estimated_profit,
                estimated_ntrades,
            } => {
                let mut leaf =
                    RuleExpert::new(timeframe, parameters).map_err(ExpertError::from)?;
                leaf.set_estimate(Estimate::new(estimated_profit, estimated_ntrades));
                leaf.into()
            }
        };
        Ok(node)
    }
}

impl Serialize for Expert {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        NodeRecord::from(self).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Expert {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let record = NodeRecord::deserialize(deserializer)?;
        Expert::try_from(record).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(tf: Timeframe, fast: usize, profit: Option<f64>) -> RuleExpert {
        let mut leaf = RuleExpert::new(
            tf,
            RuleSpec::MovingAverageCrossover {
                fast,
                slow: 20,
                patience: 2,
            },
        )
        .unwrap();
        leaf.set_estimate(Estimate::new(profit, 7));
        leaf
    }

    fn sample_tree() -> PairExpert {
        let mut class = RuleClassExpert::new(
            RuleKind::MovingAverageCrossover,
            vec![leaf(Timeframe::H4, 5, Some(0.12)), leaf(Timeframe::H4, 8, None)],
            0.0,
        );
        class.set_weights(Some(vec![0.75, -0.25])).unwrap();
        let rsi = RuleClassExpert::new(
            RuleKind::RelativeStrengthIndexThreshold,
            vec![RuleExpert::new(
                Timeframe::H4,
                RuleSpec::RelativeStrengthIndexThreshold {
                    period: 14,
                    lower: 30.0,
                    upper: 70.0,
                    patience: 1,
                },
            )
            .unwrap()],
            0.0,
        );
        let mut tf = TimeFrameExpert::new(Timeframe::H4, vec![class, rsi], 0.1);
        tf.set_estimate(Estimate::new(Some(-0.05), 31));
        PairExpert::new(Pair::new("BTC", "USDT"), vec![tf], 0.0)
    }

    #[test]
    fn round_trip_preserves_structure_weights_and_estimates() {
        let doc = TreeDocument::new(sample_tree());
        let json = doc.to_json().unwrap();
        let back = TreeDocument::from_json(&json).unwrap();

        assert_eq!(back.schema_version, SCHEMA_VERSION);
        let Expert::Pair(pair) = &back.expert else {
            panic!("root should be a pair");
        };
        assert_eq!(pair.pair(), &Pair::new("BTC", "USDT"));
        let tf = &pair.committee().members()[0];
        assert_eq!(tf.timeframe(), Timeframe::H4);
        assert_eq!(tf.committee().threshold(), 0.1);
        assert_eq!(tf.estimate(), Estimate::new(Some(-0.05), 31));

        let class = &tf.committee().members()[0];
        assert_eq!(class.weights(), &[0.75, -0.25]);
        assert_eq!(class.committee().members()[0].estimate().profit, Some(0.12));
        assert_eq!(class.committee().members()[1].estimate().profit, None);

        // re-serializing yields the same document
        assert_eq!(back.to_json().unwrap(), json);
    }

    #[test]
    fn node_records_are_tagged() {
        let json = TreeDocument::new(sample_tree()).to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["expert"]["type"], "Pair");
        assert_eq!(value["expert"]["experts"][0]["type"], "TimeFrame");
        assert_eq!(value["expert"]["experts"][0]["timeframe"], "4h");
        let rule = &value["expert"]["experts"][0]["experts"][0]["experts"][0];
        assert_eq!(rule["type"], "Rule");
        assert_eq!(rule["parameters"]["kind"], "MovingAverageCrossover");
        assert_eq!(rule["estimated_ntrades"], 7);
    }

    #[test]
    fn rejects_newer_schema() {
        let mut value = serde_json::to_value(TreeDocument::new(sample_tree())).unwrap();
        value["schema_version"] = serde_json::json!(99);
        let err = TreeDocument::from_json(&value.to_string()).unwrap_err();
        assert!(matches!(
            err,
            DocumentError::UnsupportedVersion { found: 99, .. }
        ));
    }

    #[test]
    fn rejects_misplaced_children() {
        let json = r#"{
            "schema_version": 1,
            "expert": {
                "type": "Pair", "base": "BTC", "quote": "USDT",
                "weights": [1.0], "estimated_profit": null,
                "experts": [{
                    "type": "Rule", "timeframe": "1d",
                    "parameters": {"kind": "TripleExponentialDirectionChange", "period": 9, "patience": 1},
                    "estimated_profit": null
                }]
            }
        }"#;
        assert!(TreeDocument::from_json(json).is_err());
    }

    #[test]
    fn only_pair_roots_become_pair_trees() {
        let tree = TreeDocument::new(sample_tree()).into_pair_expert().unwrap();
        assert_eq!(tree.rule_count(), 3);

        let rule = leaf(Timeframe::D1, 5, None);
        let err = TreeDocument::new(rule).into_pair_expert().unwrap_err();
        assert!(matches!(err, DocumentError::NotAPair { found: "Rule" }));
    }

    #[test]
    fn rejects_weight_count_mismatch() {
        let mut value = serde_json::to_value(TreeDocument::new(sample_tree())).unwrap();
        value["expert"]["weights"] = serde_json::json!([0.5, 0.5]);
        assert!(TreeDocument::from_json(&value.to_string()).is_err());
    }
}
