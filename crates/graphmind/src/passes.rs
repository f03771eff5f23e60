//! Three-pass semantic extraction.
//!
//! Pass 1 drafts an ontology candidate, pass 2 drafts SHACL-like constraints
//! seeded with the ontology, pass 3 extracts the entity graph with both folded
//! into its prompt context. Passes 1 and 2 degrade to empty payloads on
//! failure (recorded in metadata); pass 3 is required.

use crate::error::{Error, Result};
use crate::graph::GraphPayload;
use crate::language_models::JsonChatModel;
use crate::rules::{Rule, RuleKind, RuleProfile};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

const TEXT_WINDOW: usize = 12_000;

const ONTOLOGY_SYSTEM: &str =
    "You extract ontology candidates from domain text. Return strict JSON only.";

const SHACL_SYSTEM: &str =
    "You extract SHACL-like constraints from text and ontology hints. Return strict JSON only.";

const ENTITY_SYSTEM: &str = "\
You extract a knowledge graph from text. Return strict JSON only with keys
'nodes' and 'relationships'. Each node: {id, label, properties:{name, ...}}.
Each relationship: {source, target, type, properties}.";

/// A property on an ontology class
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OntologyProperty {
    pub name: String,
    #[serde(default = "default_datatype")]
    pub datatype: String,
}

fn default_datatype() -> String {
    "string".to_string()
}

/// One drafted ontology class
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OntologyClass {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub properties: Vec<OntologyProperty>,
}

/// One drafted ontology relationship
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OntologyRelationship {
    #[serde(rename = "type")]
    pub rel_type: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub target: String,
    #[serde(default)]
    pub description: String,
}

/// Pass-1 output
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OntologyCandidate {
    #[serde(default)]
    pub ontology_name: String,
    #[serde(default)]
    pub classes: Vec<OntologyClass>,
    #[serde(default)]
    pub relationships: Vec<OntologyRelationship>,
}

impl OntologyCandidate {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty() && self.relationships.is_empty()
    }

    /// Normalize a loosely-typed payload, dropping nameless entries.
    #[must_use]
    pub fn from_value(value: &Value) -> Self {
        let ontology_name = value
            .get("ontology_name")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or("runtime_candidate")
            .to_string();

        let classes = value
            .get("classes")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| {
                        let name = item.get("name")?.as_str()?.trim();
                        if name.is_empty() {
                            return None;
                        }
                        let properties = item
                            .get("properties")
                            .and_then(Value::as_array)
                            .map(|props| {
                                props
                                    .iter()
                                    .filter_map(|prop| {
                                        let prop_name = prop.get("name")?.as_str()?.trim();
                                        if prop_name.is_empty() {
                                            return None;
                                        }
                                        Some(OntologyProperty {
                                            name: prop_name.to_string(),
                                            datatype: prop
                                                .get("datatype")
                                                .and_then(Value::as_str)
                                                .map(str::trim)
                                                .filter(|d| !d.is_empty())
                                                .unwrap_or("string")
                                                .to_string(),
                                        })
                                    })
                                    .collect()
                            })
                            .unwrap_or_default();
                        Some(OntologyClass {
                            name: name.to_string(),
                            description: trimmed_str(item.get("description")),
                            properties,
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        let relationships = value
            .get("relationships")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| {
                        let rel_type = item.get("type")?.as_str()?.trim();
                        if rel_type.is_empty() {
                            return None;
                        }
                        Some(OntologyRelationship {
                            rel_type: rel_type.to_string(),
                            source: trimmed_str(item.get("source")),
                            target: trimmed_str(item.get("target")),
                            description: trimmed_str(item.get("description")),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self {
            ontology_name,
            classes,
            relationships,
        }
    }
}

/// A property constraint inside a drafted shape
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShapeProperty {
    pub path: String,
    pub constraint: String,
    #[serde(default)]
    pub params: Map<String, Value>,
}

/// One drafted shape
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Shape {
    pub target_class: String,
    #[serde(default)]
    pub properties: Vec<ShapeProperty>,
}

/// Pass-2 output
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShaclCandidate {
    #[serde(default)]
    pub shapes: Vec<Shape>,
}

impl ShaclCandidate {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }

    /// Normalize a loosely-typed payload, dropping incomplete entries.
    #[must_use]
    pub fn from_value(value: &Value) -> Self {
        let shapes = value
            .get("shapes")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| {
                        let target_class = item.get("target_class")?.as_str()?.trim();
                        if target_class.is_empty() {
                            return None;
                        }
                        let properties = item
                            .get("properties")
                            .and_then(Value::as_array)
                            .map(|props| {
                                props
                                    .iter()
                                    .filter_map(|prop| {
                                        let path = prop.get("path")?.as_str()?.trim();
                                        let constraint =
                                            prop.get("constraint")?.as_str()?.trim();
                                        if path.is_empty() || constraint.is_empty() {
                                            return None;
                                        }
                                        Some(ShapeProperty {
                                            path: path.to_string(),
                                            constraint: constraint.to_string(),
                                            params: prop
                                                .get("params")
                                                .and_then(Value::as_object)
                                                .cloned()
                                                .unwrap_or_default(),
                                        })
                                    })
                                    .collect()
                            })
                            .unwrap_or_default();
                        Some(Shape {
                            target_class: target_class.to_string(),
                            properties,
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();
        Self { shapes }
    }

    /// Convert drafted constraints into a rule profile, keeping only the four
    /// supported kinds.
    #[must_use]
    pub fn to_rule_profile(&self) -> RuleProfile {
        let mut rules = Vec::new();
        for shape in &self.shapes {
            for property in &shape.properties {
                if let Some(kind) = RuleKind::from_str_opt(&property.constraint) {
                    rules.push(Rule {
                        label: shape.target_class.clone(),
                        property: property.path.clone(),
                        kind,
                        params: property.params.clone(),
                    });
                }
            }
        }
        RuleProfile::new(rules)
    }
}

/// Result of the three passes
#[derive(Debug, Clone)]
pub struct ThreePassResult {
    pub ontology_candidate: OntologyCandidate,
    pub shacl_candidate: ShaclCandidate,
    pub entity_graph: GraphPayload,
    pub warnings: Vec<String>,
    pub metadata: Value,
}

/// Ontology → SHACL → entity-graph orchestration
pub struct SemanticPassOrchestrator {
    chat_model: Arc<dyn JsonChatModel>,
}

impl SemanticPassOrchestrator {
    #[must_use]
    pub fn new(chat_model: Arc<dyn JsonChatModel>) -> Self {
        Self { chat_model }
    }

    /// Run all three passes over `text`.
    ///
    /// # Errors
    ///
    /// Fails only when the required entity-graph pass fails or yields no nodes.
    pub async fn run_three_pass(&self, text: &str, category: &str) -> Result<ThreePassResult> {
        let window: String = text.chars().take(TEXT_WINDOW).collect();
        let mut metadata = Map::new();

        let ontology_candidate = match self.ontology_pass(&window, category).await {
            Ok(candidate) => {
                metadata.insert("ontology_pass".to_string(), json!("ok"));
                candidate
            }
            Err(err) => {
                tracing::warn!(error = %err, "ontology candidate pass failed");
                metadata.insert(
                    "ontology_pass".to_string(),
                    json!(format!("error:{}", err.error_code())),
                );
                OntologyCandidate::default()
            }
        };

        let shacl_candidate = match self.shacl_pass(&window, category, &ontology_candidate).await {
            Ok(candidate) => {
                metadata.insert("shacl_pass".to_string(), json!("ok"));
                candidate
            }
            Err(err) => {
                tracing::warn!(error = %err, "SHACL candidate pass failed");
                metadata.insert(
                    "shacl_pass".to_string(),
                    json!(format!("error:{}", err.error_code())),
                );
                ShaclCandidate::default()
            }
        };

        let (entity_graph, warnings) = self
            .entity_pass(&window, category, &ontology_candidate, &shacl_candidate)
            .await?;

        Ok(ThreePassResult {
            ontology_candidate,
            shacl_candidate,
            entity_graph,
            warnings,
            metadata: Value::Object(metadata),
        })
    }

    async fn ontology_pass(&self, text: &str, category: &str) -> Result<OntologyCandidate> {
        let user = format!(
            "Analyze the input text and return ontology candidate JSON with keys: \
             ontology_name, classes, relationships. \
             Each class item: {{name, description, properties:[{{name, datatype}}]}}. \
             Each relationship item: {{type, source, target, description}}. \
             Category: {category}\n\nText:\n{text}"
        );
        let payload = self.chat_model.complete_json(ONTOLOGY_SYSTEM, &user).await?;
        Ok(OntologyCandidate::from_value(&payload))
    }

    async fn shacl_pass(
        &self,
        text: &str,
        category: &str,
        ontology: &OntologyCandidate,
    ) -> Result<ShaclCandidate> {
        let user = format!(
            "Return JSON with key 'shapes'. \
             Each shape: {{target_class, properties:[{{path, constraint, params}}]}}. \
             constraint must be one of required, datatype, enum, range. \
             Category: {category}\n\
             Ontology hints:\n{}\n\nText:\n{text}",
            serde_json::to_string(ontology)?
        );
        let payload = self.chat_model.complete_json(SHACL_SYSTEM, &user).await?;
        Ok(ShaclCandidate::from_value(&payload))
    }

    async fn entity_pass(
        &self,
        text: &str,
        category: &str,
        ontology: &OntologyCandidate,
        shacl: &ShaclCandidate,
    ) -> Result<(GraphPayload, Vec<String>)> {
        let context = build_entity_context(ontology, shacl);
        let user = format!(
            "Extract the entity graph.\n\
             Category: {category}\n\
             Known entity types:\n{}\n\
             Known relationship types:\n{}\n\
             Constraints:\n{}\n\nText:\n{text}",
            context["entity_types"].as_str().unwrap_or_default(),
            context["relationship_types"].as_str().unwrap_or_default(),
            context["shacl_constraints"].as_str().unwrap_or_default(),
        );
        let payload = self.chat_model.complete_json(ENTITY_SYSTEM, &user).await?;
        let (graph, warnings) = GraphPayload::from_value(&payload);
        if graph.nodes.is_empty() {
            return Err(Error::pipeline("entity extraction returned no nodes"));
        }
        Ok((graph, warnings))
    }
}

/// Render ontology and constraint context lines for the entity pass.
#[must_use]
pub fn build_entity_context(ontology: &OntologyCandidate, shacl: &ShaclCandidate) -> Value {
    let entity_lines: Vec<String> = ontology
        .classes
        .iter()
        .map(|class| {
            let mut line = format!("- {}", class.name);
            if !class.description.is_empty() {
                line.push_str(&format!(": {}", class.description));
            }
            let property_names: Vec<&str> = class
                .properties
                .iter()
                .map(|prop| prop.name.as_str())
                .collect();
            if !property_names.is_empty() {
                line.push_str(&format!(" (properties: {})", property_names.join(", ")));
            }
            line
        })
        .collect();

    let relation_lines: Vec<String> = ontology
        .relationships
        .iter()
        .map(|rel| {
            let source = if rel.source.is_empty() { "Entity" } else { &rel.source };
            let target = if rel.target.is_empty() { "Entity" } else { &rel.target };
            let mut line = format!("- {}: {source} -> {target}", rel.rel_type);
            if !rel.description.is_empty() {
                line.push_str(&format!(" ({})", rel.description));
            }
            line
        })
        .collect();

    let shacl_lines: Vec<String> = shacl
        .shapes
        .iter()
        .flat_map(|shape| {
            shape.properties.iter().map(move |prop| {
                format!("- {}.{}: {}", shape.target_class, prop.path, prop.constraint)
            })
        })
        .collect();

    json!({
        "ontology_name": if ontology.ontology_name.is_empty() {
            "runtime_candidate"
        } else {
            ontology.ontology_name.as_str()
        },
        "entity_types": entity_lines.join("\n"),
        "relationship_types": relation_lines.join("\n"),
        "shacl_constraints": shacl_lines.join("\n"),
    })
}

/// Merge ontology candidates across a batch: classes by name (union of
/// properties), relationships by `(type, source, target)`.
#[must_use]
pub fn merge_ontology_candidates(candidates: &[OntologyCandidate]) -> OntologyCandidate {
    let mut classes: BTreeMap<String, OntologyClass> = BTreeMap::new();
    let mut relationships: BTreeMap<(String, String, String), OntologyRelationship> =
        BTreeMap::new();
    let mut names = Vec::new();

    for candidate in candidates {
        if !candidate.ontology_name.is_empty() {
            names.push(candidate.ontology_name.clone());
        }
        for class in &candidate.classes {
            let merged = classes.entry(class.name.clone()).or_insert_with(|| {
                OntologyClass {
                    name: class.name.clone(),
                    description: class.description.clone(),
                    properties: Vec::new(),
                }
            });
            for property in &class.properties {
                if !merged.properties.iter().any(|p| p.name == property.name) {
                    merged.properties.push(property.clone());
                }
            }
        }
        for relationship in &candidate.relationships {
            relationships.insert(
                (
                    relationship.rel_type.clone(),
                    relationship.source.clone(),
                    relationship.target.clone(),
                ),
                relationship.clone(),
            );
        }
    }

    OntologyCandidate {
        ontology_name: names
            .first()
            .cloned()
            .unwrap_or_else(|| "runtime_candidate_merged".to_string()),
        classes: classes.into_values().collect(),
        relationships: relationships.into_values().collect(),
    }
}

/// Merge SHACL candidates across a batch, deduplicating properties on
/// `(path, constraint, params)` per target class.
#[must_use]
pub fn merge_shacl_candidates(candidates: &[ShaclCandidate]) -> ShaclCandidate {
    let mut shapes: BTreeMap<String, Vec<ShapeProperty>> = BTreeMap::new();
    for candidate in candidates {
        for shape in &candidate.shapes {
            let merged = shapes.entry(shape.target_class.clone()).or_default();
            for property in &shape.properties {
                let duplicate = merged.iter().any(|existing| {
                    existing.path == property.path
                        && existing.constraint == property.constraint
                        && existing.params == property.params
                });
                if !duplicate {
                    merged.push(property.clone());
                }
            }
        }
    }
    ShaclCandidate {
        shapes: shapes
            .into_iter()
            .map(|(target_class, properties)| Shape {
                target_class,
                properties,
            })
            .collect(),
    }
}

fn trimmed_str(value: Option<&Value>) -> String {
    value
        .and_then(Value::as_str)
        .unwrap_or_default()
        .trim()
        .to_string()
}
