//! Graph payload model.
//!
//! `(nodes, relationships)` is the canonical inter-component graph format:
//! extraction produces it, the rule engine annotates it, the loader persists
//! it. Labels and relationship types are regex-validated before they can reach
//! a query string, which is what prevents label injection.

use crate::error::{Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

static LABEL_RE: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("label regex is valid")
});

/// Whether `value` is a safe graph label or relationship type.
#[must_use]
pub fn is_valid_label(value: &str) -> bool {
    LABEL_RE.is_match(value)
}

/// Validate a label, returning it unchanged.
///
/// # Errors
///
/// Returns a validation error when the label does not match
/// `^[A-Za-z_][A-Za-z0-9_]*$`.
pub fn validate_label(label: &str) -> Result<&str> {
    if is_valid_label(label) {
        Ok(label)
    } else {
        Err(Error::validation(format!("Invalid graph label: '{label}'")))
    }
}

/// Normalize a relationship type (uppercase, spaces to underscores) and validate it.
///
/// # Errors
///
/// Returns a validation error when the normalized type still fails the label regex.
pub fn sanitize_relationship_type(raw: &str) -> Result<String> {
    let normalized = raw.trim().to_uppercase().replace(' ', "_");
    let candidate = if normalized.is_empty() {
        "RELATED_TO".to_string()
    } else {
        normalized
    };
    validate_label(&candidate)?;
    Ok(candidate)
}

/// A node in an extracted graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Stable id within the source document
    pub id: String,
    /// Node label; must pass [`is_valid_label`] before loading
    pub label: String,
    /// Arbitrary properties
    #[serde(default)]
    pub properties: Map<String, Value>,
}

impl Node {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            properties: Map::new(),
        }
    }

    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: Value) -> Self {
        self.properties.insert(key.into(), value);
        self
    }

    /// The node's display name: the `name` property, falling back to the id.
    #[must_use]
    pub fn display_name(&self) -> String {
        self.properties
            .get("name")
            .and_then(Value::as_str)
            .map_or_else(|| self.id.clone(), ToString::to_string)
    }
}

/// A relationship in an extracted graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    /// Source node id
    pub source: String,
    /// Target node id
    pub target: String,
    /// Relationship type; sanitized like labels
    #[serde(rename = "type")]
    pub rel_type: String,
    #[serde(default)]
    pub properties: Map<String, Value>,
}

impl Relationship {
    pub fn new(
        source: impl Into<String>,
        target: impl Into<String>,
        rel_type: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            rel_type: rel_type.into(),
            properties: Map::new(),
        }
    }
}

/// The canonical `(nodes, relationships)` payload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphPayload {
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub relationships: Vec<Relationship>,
}

impl GraphPayload {
    #[must_use]
    pub fn new(nodes: Vec<Node>, relationships: Vec<Relationship>) -> Self {
        Self {
            nodes,
            relationships,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.relationships.is_empty()
    }

    /// Append another payload's contents.
    pub fn merge(&mut self, other: GraphPayload) {
        self.nodes.extend(other.nodes);
        self.relationships.extend(other.relationships);
    }

    /// Lowercased, trimmed `name` properties of all nodes.
    #[must_use]
    pub fn entity_names(&self) -> BTreeSet<String> {
        self.nodes
            .iter()
            .filter_map(|node| node.properties.get("name"))
            .filter_map(Value::as_str)
            .map(|name| name.trim().to_lowercase())
            .filter(|name| !name.is_empty())
            .collect()
    }

    /// Build a payload from loosely-typed extraction output.
    ///
    /// Malformed entries (missing id/label, non-object shapes, invalid labels
    /// or relationship types) are dropped and reported as warnings; they are
    /// never turned into errors unless the whole record is empty.
    #[must_use]
    pub fn from_value(value: &Value) -> (Self, Vec<String>) {
        let mut payload = GraphPayload::default();
        let mut warnings = Vec::new();

        let raw_nodes = value
            .get("nodes")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        for (idx, raw) in raw_nodes.iter().enumerate() {
            match parse_node(raw) {
                Ok(node) => payload.nodes.push(node),
                Err(err) => warnings.push(format!("dropped node {idx}: {err}")),
            }
        }

        let raw_rels = value
            .get("relationships")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        for (idx, raw) in raw_rels.iter().enumerate() {
            match parse_relationship(raw) {
                Ok(rel) => payload.relationships.push(rel),
                Err(err) => warnings.push(format!("dropped relationship {idx}: {err}")),
            }
        }

        (payload, warnings)
    }
}

fn parse_node(raw: &Value) -> Result<Node> {
    let obj = raw
        .as_object()
        .ok_or_else(|| Error::validation("node is not an object"))?;
    let id = string_field(obj, "id")?;
    let label = obj
        .get("label")
        .and_then(Value::as_str)
        .unwrap_or("Entity")
        .to_string();
    validate_label(&label)?;
    let properties = obj
        .get("properties")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    Ok(Node {
        id,
        label,
        properties,
    })
}

fn parse_relationship(raw: &Value) -> Result<Relationship> {
    let obj = raw
        .as_object()
        .ok_or_else(|| Error::validation("relationship is not an object"))?;
    let source = string_field(obj, "source")?;
    let target = string_field(obj, "target")?;
    let rel_type = sanitize_relationship_type(
        obj.get("type").and_then(Value::as_str).unwrap_or_default(),
    )?;
    let properties = obj
        .get("properties")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    Ok(Relationship {
        source,
        target,
        rel_type,
        properties,
    })
}

fn string_field(obj: &Map<String, Value>, key: &str) -> Result<String> {
    let value = obj
        .get(key)
        .ok_or_else(|| Error::validation(format!("missing '{key}'")))?;
    match value {
        Value::String(s) if !s.trim().is_empty() => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        _ => Err(Error::validation(format!("'{key}' is not a usable id"))),
    }
}
