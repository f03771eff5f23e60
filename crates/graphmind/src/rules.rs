//! Rule inference and validation (SHACL-like).
//!
//! Infers lightweight constraints from extracted graph data and validates
//! graphs against a rule profile. Profiles are storage-agnostic: the same
//! profile serializes to an internal form, a SHACL-inspired shape document
//! (see [`crate::rule_export`]), and graph DDL.

use crate::graph::GraphPayload;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

/// Schema version tag carried by every profile.
pub const RULE_SCHEMA_VERSION: &str = "rules.v1";

/// Constraint kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleKind {
    Required,
    Datatype,
    Enum,
    Range,
}

impl RuleKind {
    /// Parse the wire form, rejecting unknown kinds.
    #[must_use]
    pub fn from_str_opt(raw: &str) -> Option<Self> {
        match raw.trim() {
            "required" => Some(Self::Required),
            "datatype" => Some(Self::Datatype),
            "enum" => Some(Self::Enum),
            "range" => Some(Self::Range),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Required => "required",
            Self::Datatype => "datatype",
            Self::Enum => "enum",
            Self::Range => "range",
        }
    }
}

/// A single constraint over `(label, property)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub label: String,
    pub property: String,
    pub kind: RuleKind,
    #[serde(default)]
    pub params: Map<String, Value>,
}

impl Rule {
    pub fn new(label: impl Into<String>, property: impl Into<String>, kind: RuleKind) -> Self {
        Self {
            label: label.into(),
            property: property.into(),
            kind,
            params: Map::new(),
        }
    }

    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    /// Dedup key: label, property, kind, and canonicalized params.
    #[must_use]
    pub fn dedup_key(&self) -> String {
        format!(
            "{}|{}|{}|{}",
            self.label,
            self.property,
            self.kind.as_str(),
            Value::Object(self.params.clone())
        )
    }
}

/// Ordered, schema-versioned list of rules
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleProfile {
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
    #[serde(default)]
    pub rules: Vec<Rule>,
}

fn default_schema_version() -> String {
    RULE_SCHEMA_VERSION.to_string()
}

impl RuleProfile {
    #[must_use]
    pub fn new(rules: Vec<Rule>) -> Self {
        Self {
            schema_version: RULE_SCHEMA_VERSION.to_string(),
            rules,
        }
    }

    /// Parse a loosely-typed profile payload, dropping rules with unknown
    /// kinds or missing fields.
    #[must_use]
    pub fn from_value(value: &Value) -> Self {
        let schema_version = value
            .get("schema_version")
            .and_then(Value::as_str)
            .unwrap_or(RULE_SCHEMA_VERSION)
            .to_string();
        let rules = value
            .get("rules")
            .and_then(Value::as_array)
            .map(|raw_rules| {
                raw_rules
                    .iter()
                    .filter_map(|raw| {
                        let label = raw.get("label")?.as_str()?.trim();
                        let property = raw.get("property")?.as_str()?.trim();
                        let kind = RuleKind::from_str_opt(raw.get("kind")?.as_str()?)?;
                        if label.is_empty() || property.is_empty() {
                            return None;
                        }
                        let params = raw
                            .get("params")
                            .and_then(Value::as_object)
                            .cloned()
                            .unwrap_or_default();
                        Some(Rule {
                            label: label.to_string(),
                            property: property.to_string(),
                            kind,
                            params,
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();
        Self {
            schema_version,
            rules,
        }
    }

    /// Merge another profile, deduplicating on `(label, property, kind, params)`.
    #[must_use]
    pub fn merged_with(&self, other: &RuleProfile) -> Self {
        let mut seen = std::collections::HashSet::new();
        let mut rules = Vec::new();
        for rule in self.rules.iter().chain(other.rules.iter()) {
            if seen.insert(rule.dedup_key()) {
                rules.push(rule.clone());
            }
        }
        Self::new(rules)
    }

    /// SHACL-inspired shape document: rules grouped per target class.
    #[must_use]
    pub fn to_shacl_like(&self) -> Value {
        let mut shapes: BTreeMap<String, Vec<Value>> = BTreeMap::new();
        for rule in &self.rules {
            shapes.entry(rule.label.clone()).or_default().push(json!({
                "path": rule.property,
                "constraint": rule.kind.as_str(),
                "params": rule.params,
            }));
        }
        json!({
            "schema_version": self.schema_version,
            "shapes": shapes
                .into_iter()
                .map(|(target_class, properties)| json!({
                    "targetClass": target_class,
                    "properties": properties,
                }))
                .collect::<Vec<_>>(),
        })
    }
}

/// Thresholds for rule inference
#[derive(Debug, Clone)]
pub struct InferenceOptions {
    /// Non-missing share required to infer a `required` rule
    pub required_threshold: f64,
    /// Maximum distinct values for an `enum` rule
    pub enum_max_size: usize,
}

impl Default for InferenceOptions {
    fn default() -> Self {
        Self {
            required_threshold: 0.98,
            enum_max_size: 20,
        }
    }
}

/// Infer constraints from node properties.
///
/// Per `(label, property)`: near-complete properties become `required`, the
/// dominant JSON type becomes `datatype`, small distinct value sets become
/// `enum`, and numeric properties get an inclusive `range`. Empty strings
/// count as missing so an inferred profile always validates cleanly against
/// its source graph.
#[must_use]
pub fn infer_rules_from_graph(graph: &GraphPayload, options: &InferenceOptions) -> RuleProfile {
    #[derive(Default)]
    struct Bucket {
        total: usize,
        present: Vec<Value>,
    }

    let mut buckets: BTreeMap<(String, String), Bucket> = BTreeMap::new();
    for node in &graph.nodes {
        for (key, value) in &node.properties {
            let bucket = buckets
                .entry((node.label.clone(), key.clone()))
                .or_default();
            bucket.total += 1;
            if !is_missing(value) {
                bucket.present.push(value.clone());
            }
        }
    }

    let mut rules = Vec::new();
    for ((label, property), bucket) in buckets {
        if bucket.total == 0 {
            continue;
        }

        let completeness = bucket.present.len() as f64 / bucket.total as f64;
        if completeness >= options.required_threshold {
            rules.push(
                Rule::new(&label, &property, RuleKind::Required).with_param("minCount", json!(1)),
            );
        }

        if let Some(dominant) = dominant_type(&bucket.present) {
            rules.push(
                Rule::new(&label, &property, RuleKind::Datatype)
                    .with_param("datatype", json!(dominant)),
            );
        }

        let unique = unique_values(&bucket.present);
        let enum_cap = options.enum_max_size.min((bucket.total / 5).max(2));
        if !unique.is_empty() && unique.len() <= enum_cap {
            rules.push(
                Rule::new(&label, &property, RuleKind::Enum)
                    .with_param("allowedValues", Value::Array(unique)),
            );
        }

        if let Some((min, max)) = numeric_range(&bucket.present) {
            rules.push(
                Rule::new(&label, &property, RuleKind::Range)
                    .with_param("minInclusive", json!(min))
                    .with_param("maxInclusive", json!(max)),
            );
        }
    }

    RuleProfile::new(rules)
}

/// A single constraint failure on a node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub rule: RuleKind,
    pub property: String,
    pub message: String,
}

/// Validation totals for a graph
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationSummary {
    pub total_nodes: usize,
    pub passed_nodes: usize,
    pub failed_nodes: usize,
}

/// A validated (and annotated) graph
#[derive(Debug, Clone)]
pub struct ValidatedGraph {
    /// The input graph with a `rule_validation` property on every node
    pub graph: GraphPayload,
    pub summary: ValidationSummary,
}

/// Apply rules and annotate each node with its validation result.
#[must_use]
pub fn apply_rules_to_graph(graph: &GraphPayload, profile: &RuleProfile) -> ValidatedGraph {
    let mut rules_by_label: BTreeMap<&str, Vec<&Rule>> = BTreeMap::new();
    for rule in &profile.rules {
        rules_by_label.entry(&rule.label).or_default().push(rule);
    }

    let mut annotated = graph.clone();
    let mut failed_nodes = 0;
    for node in &mut annotated.nodes {
        let mut violations = Vec::new();
        for rule in rules_by_label
            .get(node.label.as_str())
            .into_iter()
            .flatten()
            .copied()
        {
            let value = node.properties.get(&rule.property);
            if let Some(violation) = validate_value(rule, value) {
                violations.push(violation);
            }
        }

        let status = if violations.is_empty() { "pass" } else { "fail" };
        if status == "fail" {
            failed_nodes += 1;
        }
        node.properties.insert(
            "rule_validation".to_string(),
            json!({ "status": status, "violations": violations }),
        );
    }

    let total_nodes = annotated.nodes.len();
    ValidatedGraph {
        graph: annotated,
        summary: ValidationSummary {
            total_nodes,
            passed_nodes: total_nodes - failed_nodes,
            failed_nodes,
        },
    }
}

fn validate_value(rule: &Rule, value: Option<&Value>) -> Option<Violation> {
    let violation = |message: String| {
        Some(Violation {
            rule: rule.kind,
            property: rule.property.clone(),
            message,
        })
    };

    match rule.kind {
        RuleKind::Required => {
            if value.is_none() || value.is_some_and(is_missing) {
                return violation("missing required value".to_string());
            }
            None
        }
        RuleKind::Datatype => {
            let value = non_null(value)?;
            let expected = rule.params.get("datatype").and_then(Value::as_str)?;
            let actual = type_name(value);
            if actual != expected {
                return violation(format!("type mismatch: expected {expected}, got {actual}"));
            }
            None
        }
        RuleKind::Enum => {
            let value = non_null(value)?;
            let allowed = rule
                .params
                .get("allowedValues")
                .and_then(Value::as_array)?;
            if !allowed.contains(value) {
                return violation("value not in allowed enum set".to_string());
            }
            None
        }
        RuleKind::Range => {
            let value = non_null(value)?;
            let Some(numeric) = as_number(value) else {
                return violation("non-numeric value for numeric range constraint".to_string());
            };
            let min = rule
                .params
                .get("minInclusive")
                .and_then(Value::as_f64)
                .unwrap_or(f64::NEG_INFINITY);
            let max = rule
                .params
                .get("maxInclusive")
                .and_then(Value::as_f64)
                .unwrap_or(f64::INFINITY);
            if numeric < min || numeric > max {
                return violation(format!("value out of range [{min}, {max}]"));
            }
            None
        }
    }
}

fn non_null(value: Option<&Value>) -> Option<&Value> {
    value.filter(|v| !v.is_null())
}

fn is_missing(value: &Value) -> bool {
    value.is_null() || value.as_str().is_some_and(str::is_empty)
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        _ => "string",
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Bool(_) => None,
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

fn dominant_type(values: &[Value]) -> Option<&'static str> {
    if values.is_empty() {
        return None;
    }
    let mut counts: BTreeMap<&'static str, usize> = BTreeMap::new();
    for value in values {
        *counts.entry(type_name(value)).or_default() += 1;
    }
    counts
        .into_iter()
        .max_by_key(|(_, count)| *count)
        .map(|(name, _)| name)
}

fn unique_values(values: &[Value]) -> Vec<Value> {
    let mut seen = std::collections::HashSet::new();
    let mut ordered = Vec::new();
    for value in values {
        if seen.insert(value.to_string()) {
            ordered.push(value.clone());
        }
    }
    ordered
}

fn numeric_range(values: &[Value]) -> Option<(f64, f64)> {
    let numeric: Vec<f64> = values.iter().filter_map(as_number).collect();
    if numeric.is_empty() {
        return None;
    }
    let min = numeric.iter().copied().fold(f64::INFINITY, f64::min);
    let max = numeric.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    Some((min, max))
}
