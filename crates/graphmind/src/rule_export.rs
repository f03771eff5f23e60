//! Rule-profile exports: graph DDL and SHACL.
//!
//! Only `required` has a direct graph schema constraint (`IS NOT NULL`); the
//! remaining kinds are listed as unsupported in the DDL export. The SHACL
//! export emits both a structured shape document and a Turtle serialization,
//! and the two agree on shape identity and per-property term sets.

use crate::rules::{Rule, RuleKind, RuleProfile};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

static UNSAFE_IDENT_RE: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"[^A-Za-z0-9_]").expect("identifier regex is valid")
});

/// Make a string safe to embed as an identifier.
#[must_use]
pub fn safe_ident(name: &str) -> String {
    let cleaned = UNSAFE_IDENT_RE.replace_all(name, "_").to_string();
    if cleaned.is_empty() {
        return "x".to_string();
    }
    if cleaned.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        format!("x_{cleaned}")
    } else {
        cleaned
    }
}

/// A rule the target format cannot express
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnsupportedRule {
    pub label: String,
    pub property: String,
    pub kind: RuleKind,
    pub reason: String,
}

/// Graph DDL export
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CypherExport {
    pub schema_version: String,
    pub statements: Vec<String>,
    pub unsupported_rules: Vec<UnsupportedRule>,
}

/// Export a profile to `NOT NULL` constraint statements.
#[must_use]
pub fn export_profile_to_cypher(profile: &RuleProfile) -> CypherExport {
    let mut statements = Vec::new();
    let mut seen = std::collections::HashSet::new();
    let mut unsupported = Vec::new();

    for rule in &profile.rules {
        if rule.kind == RuleKind::Required {
            let label = safe_ident(&rule.label);
            let property = safe_ident(&rule.property);
            let constraint_name = safe_ident(&format!("rq_{label}_{property}_not_null"));
            let statement = format!(
                "CREATE CONSTRAINT {constraint_name} IF NOT EXISTS \
                 FOR (n:{label}) REQUIRE n.{property} IS NOT NULL"
            );
            if seen.insert(statement.clone()) {
                statements.push(statement);
            }
        } else {
            unsupported.push(UnsupportedRule {
                label: rule.label.clone(),
                property: rule.property.clone(),
                kind: rule.kind,
                reason: "no direct graph schema constraint mapping for this rule kind".to_string(),
            });
        }
    }

    CypherExport {
        schema_version: profile.schema_version.clone(),
        statements,
        unsupported_rules: unsupported,
    }
}

/// One property in a SHACL shape
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShaclProperty {
    pub path: String,
    pub constraint: RuleKind,
    pub params: Map<String, Value>,
    pub shacl_terms: Value,
}

/// One SHACL node shape
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShaclShape {
    pub shape_id: String,
    pub target_class: String,
    pub properties: Vec<ShaclProperty>,
}

/// SHACL export: structured shapes plus Turtle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShaclExport {
    pub schema_version: String,
    pub shapes: Vec<ShaclShape>,
    pub turtle: String,
    pub unsupported_rules: Vec<UnsupportedRule>,
}

/// Export a profile to SHACL shapes and Turtle.
#[must_use]
pub fn export_profile_to_shacl(profile: &RuleProfile) -> ShaclExport {
    let mut grouped: BTreeMap<String, Vec<&Rule>> = BTreeMap::new();
    for rule in &profile.rules {
        grouped.entry(rule.label.clone()).or_default().push(rule);
    }

    let mut shapes = Vec::new();
    let mut ttl_lines = vec![
        "@prefix sh: <http://www.w3.org/ns/shacl#> .".to_string(),
        "@prefix xsd: <http://www.w3.org/2001/XMLSchema#> .".to_string(),
        "@prefix ex: <https://graphmind.local/shapes#> .".to_string(),
        String::new(),
    ];

    for (label, rules) in grouped {
        let shape_id = format!("{}Shape", safe_ident(&label));
        let mut properties = Vec::new();
        let mut ttl_blocks = Vec::new();

        for rule in rules {
            let (terms, ttl_terms) = rule_to_shacl_terms(rule);
            ttl_blocks.push(ttl_terms);
            properties.push(ShaclProperty {
                path: rule.property.clone(),
                constraint: rule.kind,
                params: rule.params.clone(),
                shacl_terms: terms,
            });
        }

        ttl_lines.extend(render_shape_turtle(&shape_id, &label, &ttl_blocks));
        ttl_lines.push(String::new());
        shapes.push(ShaclShape {
            shape_id,
            target_class: label,
            properties,
        });
    }

    ShaclExport {
        schema_version: profile.schema_version.clone(),
        shapes,
        turtle: format!("{}\n", ttl_lines.join("\n").trim_end()),
        unsupported_rules: Vec::new(),
    }
}

fn rule_to_shacl_terms(rule: &Rule) -> (Value, Vec<String>) {
    let path = safe_ident(&rule.property);
    let mut terms = Map::new();
    terms.insert("sh:path".to_string(), json!(format!("ex:{path}")));
    let mut ttl = vec![format!("sh:path ex:{path}")];

    match rule.kind {
        RuleKind::Required => {
            let min_count = rule
                .params
                .get("minCount")
                .and_then(Value::as_i64)
                .unwrap_or(1);
            terms.insert("sh:minCount".to_string(), json!(min_count));
            ttl.push(format!("sh:minCount {min_count}"));
        }
        RuleKind::Datatype => {
            let datatype = rule
                .params
                .get("datatype")
                .and_then(Value::as_str)
                .unwrap_or("string");
            let xsd = datatype_to_xsd(datatype);
            terms.insert("sh:datatype".to_string(), json!(xsd));
            ttl.push(format!("sh:datatype {xsd}"));
        }
        RuleKind::Enum => {
            let allowed: Vec<String> = rule
                .params
                .get("allowedValues")
                .and_then(Value::as_array)
                .map(|values| values.iter().map(format_shacl_literal).collect())
                .unwrap_or_default();
            terms.insert("sh:in".to_string(), json!(allowed));
            ttl.push(format!("sh:in ({})", allowed.join(" ")));
        }
        RuleKind::Range => {
            if let Some(min) = rule.params.get("minInclusive") {
                let literal = format_shacl_literal(min);
                terms.insert("sh:minInclusive".to_string(), json!(literal));
                ttl.push(format!("sh:minInclusive {literal}"));
            }
            if let Some(max) = rule.params.get("maxInclusive") {
                let literal = format_shacl_literal(max);
                terms.insert("sh:maxInclusive".to_string(), json!(literal));
                ttl.push(format!("sh:maxInclusive {literal}"));
            }
        }
    }

    (Value::Object(terms), ttl)
}

fn render_shape_turtle(shape_id: &str, label: &str, blocks: &[Vec<String>]) -> Vec<String> {
    let mut lines = vec![
        format!("ex:{shape_id} a sh:NodeShape ;"),
        format!("  sh:targetClass ex:{}", safe_ident(label)),
    ];
    if blocks.is_empty() {
        let last = lines.len() - 1;
        lines[last] = format!("{} .", lines[last]);
        return lines;
    }

    let last = lines.len() - 1;
    lines[last] = format!("{} ;", lines[last]);
    for (idx, block) in blocks.iter().enumerate() {
        lines.push("  sh:property [".to_string());
        for (term_idx, term) in block.iter().enumerate() {
            let suffix = if term_idx < block.len() - 1 { " ;" } else { "" };
            lines.push(format!("    {term}{suffix}"));
        }
        let block_suffix = if idx < blocks.len() - 1 { " ;" } else { " ." };
        lines.push(format!("  ]{block_suffix}"));
    }
    lines
}

fn datatype_to_xsd(datatype: &str) -> &'static str {
    match datatype.trim().to_lowercase().as_str() {
        "integer" | "int" => "xsd:integer",
        "number" | "float" | "double" | "decimal" => "xsd:decimal",
        "boolean" | "bool" => "xsd:boolean",
        _ => "xsd:string",
    }
}

fn format_shacl_literal(value: &Value) -> String {
    match value {
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => {
            let raw = other.as_str().map_or_else(|| other.to_string(), ToString::to_string);
            let escaped = raw.replace('\\', "\\\\").replace('"', "\\\"");
            format!("\"{escaped}\"")
        }
    }
}
