//! The hierarchical rule document: ratings, condition groups, conditions and
//! score adjustments.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::diagnostics::{Diagnostic, Decoded};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum Operation {
    #[default]
    #[serde(rename = "AND")]
    And,
    #[serde(rename = "OR")]
    Or,
}

impl Operation {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "AND" => Some(Operation::And),
            "OR" => Some(Operation::Or),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::And => "AND",
            Operation::Or => "OR",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum Operator {
    #[default]
    #[serde(rename = ">=")]
    Gte,
    #[serde(rename = "<=")]
    Lte,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "=")]
    Eq,
}

impl Operator {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            ">=" => Some(Operator::Gte),
            "<=" => Some(Operator::Lte),
            "<" => Some(Operator::Lt),
            ">" => Some(Operator::Gt),
            "=" => Some(Operator::Eq),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Gte => ">=",
            Operator::Lte => "<=",
            Operator::Lt => "<",
            Operator::Gt => ">",
            Operator::Eq => "=",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single named threshold test.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Condition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub value: f64,
    pub operator: Operator,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apply_score_adjustment: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ConditionGroup {
    #[serde(default)]
    pub operation: Operation,
    #[serde(default)]
    pub values: Vec<Condition>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct YearsRange {
    pub begin: i64,
    pub end: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoreAdjustment {
    pub years_range: YearsRange,
    pub score_to_subtract: f64,
    /// Human-readable explanation, stored under `string` in rule files.
    #[serde(rename = "string", alias = "note", default)]
    pub note: String,
}

/// One credit tier. Every key besides `common_conditions` and
/// `score_adjustment` is a bureau group.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Rating {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub common_conditions: Option<ConditionGroup>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub score_adjustment: Vec<ScoreAdjustment>,
    #[serde(flatten)]
    pub bureau_groups: IndexMap<String, ConditionGroup>,
}

/// Ratings keyed by label, in authoring order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct RuleDocument {
    #[serde(default)]
    pub ratings: IndexMap<String, Rating>,
}

impl RuleDocument {
    pub fn is_empty(&self) -> bool {
        self.ratings.is_empty()
    }

    /// Rating labels in document order.
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.ratings.keys().map(|k| k.as_str())
    }
}

const COMMON_KEY: &str = "common_conditions";
const ADJUSTMENT_KEY: &str = "score_adjustment";

/// Decode an already-parsed JSON value into a rule document, recovering from
/// malformed subtrees by treating them as empty.
pub fn decode_document(value: &Value) -> Decoded<RuleDocument> {
    let mut diagnostics = Vec::new();
    let mut doc = RuleDocument::default();

    let ratings = match value.as_object().and_then(|o| o.get("ratings")) {
        Some(Value::Object(r)) => r,
        Some(_) => {
            diagnostics.push(Diagnostic::malformed("ratings", "expected an object"));
            return Decoded::new(doc, diagnostics);
        }
        None => {
            diagnostics.push(Diagnostic::malformed("$", "missing `ratings` object"));
            return Decoded::new(doc, diagnostics);
        }
    };

    for (label, raw) in ratings {
        let path = format!("ratings.{label}");
        let rating = match raw {
            Value::Object(obj) => decode_rating(obj, &path, &mut diagnostics),
            _ => {
                diagnostics.push(Diagnostic::malformed(&path, "rating is not an object"));
                Rating::default()
            }
        };
        doc.ratings.insert(label.clone(), rating);
    }

    Decoded::new(doc, diagnostics)
}

fn decode_rating(obj: &Map<String, Value>, path: &str, diags: &mut Vec<Diagnostic>) -> Rating {
    let mut rating = Rating::default();
    for (key, raw) in obj {
        let sub = format!("{path}.{key}");
        match key.as_str() {
            COMMON_KEY => rating.common_conditions = Some(decode_group(raw, &sub, diags)),
            ADJUSTMENT_KEY => rating.score_adjustment = decode_adjustments(raw, &sub, diags),
            _ if raw.is_object() => {
                rating
                    .bureau_groups
                    .insert(key.clone(), decode_group(raw, &sub, diags));
            }
            _ => diags.push(Diagnostic::malformed(&sub, "bureau group is not an object")),
        }
    }
    rating
}

fn decode_group(raw: &Value, path: &str, diags: &mut Vec<Diagnostic>) -> ConditionGroup {
    let obj = match raw.as_object() {
        Some(o) => o,
        None => {
            diags.push(Diagnostic::malformed(path, "condition group is not an object"));
            return ConditionGroup::default();
        }
    };

    let operation = match obj.get("operation").and_then(Value::as_str) {
        Some(s) => Operation::parse(s).unwrap_or_else(|| {
            diags.push(Diagnostic::malformed(
                path,
                format!("unknown operation `{s}`, using AND"),
            ));
            Operation::And
        }),
        None => {
            diags.push(Diagnostic::malformed(path, "missing operation, using AND"));
            Operation::And
        }
    };

    let values = match obj.get("values") {
        Some(Value::Array(items)) => items
            .iter()
            .enumerate()
            .filter_map(|(i, item)| decode_condition(item, &format!("{path}.values[{i}]"), diags))
            .collect(),
        Some(_) => {
            diags.push(Diagnostic::malformed(path, "`values` is not an array"));
            Vec::new()
        }
        None => {
            diags.push(Diagnostic::malformed(path, "condition group lacks `values`"));
            Vec::new()
        }
    };

    ConditionGroup { operation, values }
}

fn decode_condition(raw: &Value, path: &str, diags: &mut Vec<Diagnostic>) -> Option<Condition> {
    let Some(obj) = raw.as_object() else {
        diags.push(Diagnostic::malformed(path, "condition is not an object"));
        return None;
    };
    let Some(name) = obj.get("name").and_then(Value::as_str) else {
        diags.push(Diagnostic::malformed(path, "condition lacks a `name`"));
        return None;
    };
    let Some(value) = obj.get("value").and_then(Value::as_f64) else {
        diags.push(Diagnostic::malformed(path, format!("condition `{name}` lacks a numeric `value`")));
        return None;
    };
    let operator = match obj.get("operator").and_then(Value::as_str).map(|s| (s, Operator::parse(s))) {
        Some((_, Some(op))) => op,
        Some((s, None)) => {
            diags.push(Diagnostic::malformed(path, format!("unknown operator `{s}`")));
            return None;
        }
        None => {
            diags.push(Diagnostic::malformed(path, format!("condition `{name}` lacks an `operator`")));
            return None;
        }
    };

    Some(Condition {
        name: name.to_string(),
        description: obj.get("description").and_then(Value::as_str).map(str::to_string),
        value,
        operator,
        apply_score_adjustment: obj.get("apply_score_adjustment").and_then(Value::as_bool),
    })
}

fn decode_adjustments(raw: &Value, path: &str, diags: &mut Vec<Diagnostic>) -> Vec<ScoreAdjustment> {
    let Some(items) = raw.as_array() else {
        diags.push(Diagnostic::malformed(path, "score adjustments are not an array"));
        return Vec::new();
    };
    items
        .iter()
        .enumerate()
        .filter_map(|(i, item)| {
            let sub = format!("{path}[{i}]");
            match serde_json::from_value::<ScoreAdjustment>(item.clone()) {
                Ok(adj) => Some(adj),
                Err(e) => {
                    diags.push(Diagnostic::malformed(&sub, e.to_string()));
                    None
                }
            }
        })
        .collect()
}
