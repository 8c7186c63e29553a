use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One evaluation as returned by the rules service.
///
/// Deserialization never fails on shape problems: records that are not
/// objects are dropped and string fields of the wrong type read as absent,
/// so the graph builder can decide what to skip.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Value", rename_all = "camelCase")]
pub struct EvaluationResult {
    pub derived_facts: BTreeMap<String, Value>,
    pub rule_hits: Vec<RuleHit>,
    pub obligations: Vec<ObligationRecord>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<FactDependency>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleHit {
    pub rule_id: Option<String>,
    pub title: Option<String>,
    pub why: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ObligationRecord {
    pub rule_id: Option<String>,
    pub title: Option<String>,
    pub action: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Explicit derived-fact to rule link, when the service provides one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FactDependency {
    pub fact: String,
    pub rule_id: String,
}

impl EvaluationResult {
    pub fn from_json(value: &Value) -> Self {
        let derived_facts = first_field(value, &["derivedFacts", "derived"])
            .and_then(Value::as_object)
            .map(|facts| {
                facts
                    .iter()
                    .map(|(key, value)| (key.clone(), value.clone()))
                    .collect()
            })
            .unwrap_or_default();

        let rule_hits = records(value, &["ruleHits", "hits"])
            .map(|record| RuleHit {
                rule_id: string_field(record, &["ruleId"]),
                title: string_field(record, &["title"]),
                why: record.get("why").cloned().unwrap_or(Value::Null),
            })
            .collect();

        let obligations = records(value, &["obligations"])
            .map(|record| ObligationRecord {
                rule_id: string_field(record, &["ruleId"]),
                title: string_field(record, &["title", "ruleTitle"]),
                action: string_field(record, &["action"]),
                description: string_field(record, &["description"]),
            })
            .collect();

        let dependencies = records(value, &["dependencies"])
            .filter_map(|record| {
                Some(FactDependency {
                    fact: string_field(record, &["fact"])?,
                    rule_id: string_field(record, &["ruleId"])?,
                })
            })
            .collect();

        Self {
            derived_facts,
            rule_hits,
            obligations,
            dependencies,
        }
    }
}

impl From<Value> for EvaluationResult {
    fn from(value: Value) -> Self {
        Self::from_json(&value)
    }
}

fn first_field<'a>(value: &'a Value, names: &[&str]) -> Option<&'a Value> {
    names.iter().find_map(|name| value.get(*name))
}

fn records<'a>(value: &'a Value, names: &[&str]) -> impl Iterator<Item = &'a Value> {
    first_field(value, names)
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter(|record| record.is_object())
}

fn string_field(record: &Value, names: &[&str]) -> Option<String> {
    names
        .iter()
        .find_map(|name| record.get(*name).and_then(Value::as_str))
        .map(str::to_string)
}
