//! Runtime raw-data ingestion.
//!
//! Per record: parse the raw material, extract a graph (three LM passes, or a
//! deterministic fallback when the LM stack is unavailable), gate cross-record
//! linking on name-overlap relatedness, then annotate the whole batch with one
//! inferred rule profile and load each graph under a fresh source id. Errors
//! are collected per record; partial success is reported, not failure.

use crate::connector::{GraphConnector, GraphStoreAdmin};
use crate::dedup::EntityDeduplicator;
use crate::error::{Error, Result};
use crate::graph::{GraphPayload, Node, Relationship};
use crate::language_models::JsonChatModel;
use crate::parser::{parse_raw_material_record, RawRecord};
use crate::passes::{
    merge_ontology_candidates, merge_shacl_candidates, OntologyCandidate,
    SemanticPassOrchestrator, ShaclCandidate,
};
use crate::registry::is_valid_database_name;
use crate::rules::{apply_rules_to_graph, infer_rules_from_graph, InferenceOptions, RuleProfile};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::sync::Arc;

static FALLBACK_TOKEN_RE: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"\b[A-Z][A-Za-z0-9_-]{2,}\b").expect("fallback token regex is valid")
});

const FALLBACK_TOKEN_CAP: usize = 12;
const KNOWN_ENTITY_LIMIT: usize = 500;

/// Batch-level ingest options
#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub enable_rule_constraints: bool,
    pub create_database_if_missing: bool,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            enable_rule_constraints: true,
            create_database_if_missing: true,
        }
    }
}

/// Overall batch outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestStatus {
    Success,
    SuccessWithFallback,
    PartialSuccess,
    Failed,
}

/// A per-record error or warning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordIssue {
    pub record_id: String,
    pub issue_type: String,
    pub message: String,
}

impl RecordIssue {
    fn new(record_id: &str, issue_type: &str, message: impl Into<String>) -> Self {
        Self {
            record_id: record_id.to_string(),
            issue_type: issue_type.to_string(),
            message: message.into(),
        }
    }
}

/// Name-overlap relatedness between a record and the target database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relatedness {
    pub is_related: bool,
    pub score: f64,
    pub overlap_count: usize,
    pub reason: String,
}

/// Batch summary returned to the caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestSummary {
    pub target_database: String,
    pub records_received: usize,
    pub records_processed: usize,
    pub records_failed: usize,
    pub total_nodes: usize,
    pub total_relationships: usize,
    pub fallback_records: usize,
    pub rule_profile: Option<RuleProfile>,
    pub semantic_artifacts: Value,
    pub errors: Vec<RecordIssue>,
    pub warnings: Vec<RecordIssue>,
    pub status: IngestStatus,
}

/// Parse → extract → link → annotate → load pipeline for ad-hoc records
pub struct RuntimeIngestor {
    connector: Arc<dyn GraphConnector>,
    admin: Arc<dyn GraphStoreAdmin>,
    passes: Option<SemanticPassOrchestrator>,
    linker: Option<Arc<dyn JsonChatModel>>,
    deduplicator: Option<Arc<EntityDeduplicator>>,
    relatedness_threshold: f64,
}

impl RuntimeIngestor {
    /// Ingestor without an LM stack: deterministic fallback extraction only.
    #[must_use]
    pub fn without_language_models(
        connector: Arc<dyn GraphConnector>,
        admin: Arc<dyn GraphStoreAdmin>,
    ) -> Self {
        Self {
            connector,
            admin,
            passes: None,
            linker: None,
            deduplicator: None,
            relatedness_threshold: 0.2,
        }
    }

    /// Ingestor with the full LM stack.
    #[must_use]
    pub fn new(
        connector: Arc<dyn GraphConnector>,
        admin: Arc<dyn GraphStoreAdmin>,
        chat_model: Arc<dyn JsonChatModel>,
    ) -> Self {
        Self {
            connector,
            admin,
            passes: Some(SemanticPassOrchestrator::new(Arc::clone(&chat_model))),
            linker: Some(chat_model),
            deduplicator: None,
            relatedness_threshold: 0.2,
        }
    }

    /// Deduplicate extracted entities by embedding similarity before linking.
    #[must_use]
    pub fn with_deduplicator(mut self, deduplicator: Arc<EntityDeduplicator>) -> Self {
        self.deduplicator = Some(deduplicator);
        self
    }

    #[must_use]
    pub fn with_relatedness_threshold(mut self, threshold: f64) -> Self {
        self.relatedness_threshold = threshold;
        self
    }

    /// Ingest a batch of raw records into `target_database`.
    ///
    /// # Errors
    ///
    /// Fails up front on an invalid database name or a provisioning failure;
    /// everything after that is collected per record.
    pub async fn ingest_records(
        &self,
        records: &[RawRecord],
        target_database: &str,
        options: &IngestOptions,
    ) -> Result<IngestSummary> {
        if !is_valid_database_name(target_database) {
            return Err(Error::validation(format!(
                "Invalid database name '{target_database}': must be alphanumeric and start with a letter"
            )));
        }
        if options.create_database_if_missing {
            self.admin.provision_database(target_database).await?;
        }

        let mut errors = Vec::new();
        let mut warnings = Vec::new();
        let mut prepared: Vec<(String, GraphPayload)> = Vec::new();
        let mut ontology_candidates: Vec<OntologyCandidate> = Vec::new();
        let mut shacl_candidates: Vec<ShaclCandidate> = Vec::new();
        let mut relatedness_records: Vec<Relatedness> = Vec::new();
        let mut fallback_records = 0;
        let mut known_entities = self.load_existing_entity_names(target_database).await;

        for (idx, record) in records.iter().enumerate() {
            let source_id = record
                .id
                .clone()
                .filter(|id| !id.trim().is_empty())
                .unwrap_or_else(|| format!("raw_{idx}"));
            let category = record.category_or_default();

            let parsed = match parse_raw_material_record(record) {
                Ok(parsed) => parsed,
                Err(err) => {
                    errors.push(RecordIssue::new(&source_id, "MaterialParseError", err.to_string()));
                    continue;
                }
            };
            for warning in &parsed.warnings {
                warnings.push(RecordIssue::new(&source_id, "MaterialParseWarning", warning));
            }

            let text = parsed.text.trim().to_string();
            if text.is_empty() {
                errors.push(RecordIssue::new(&source_id, "ValidationError", "content is empty"));
                continue;
            }

            let extraction = self.extract_graph(&source_id, &text, &category).await;
            let mut graph = match extraction {
                Ok(extraction) => {
                    if extraction.used_fallback {
                        fallback_records += 1;
                        warnings.push(RecordIssue::new(
                            &source_id,
                            "FallbackExtraction",
                            extraction.fallback_reason.clone(),
                        ));
                    }
                    for warning in &extraction.warnings {
                        warnings.push(RecordIssue::new(&source_id, "ExtractionWarning", warning));
                    }
                    if let Some(candidate) = extraction.ontology_candidate {
                        ontology_candidates.push(candidate);
                    }
                    if let Some(candidate) = extraction.shacl_candidate {
                        shacl_candidates.push(candidate);
                    }
                    extraction.graph
                }
                Err(err) => {
                    tracing::error!(record = %source_id, error = %err, "raw ingest extraction failed");
                    errors.push(RecordIssue::new(&source_id, err.error_code(), err.to_string()));
                    continue;
                }
            };

            if let Some(deduplicator) = &self.deduplicator {
                match deduplicator.deduplicate(graph.clone()).await {
                    Ok(deduped) => graph = deduped,
                    Err(err) => {
                        warnings.push(RecordIssue::new(
                            &source_id,
                            "DeduplicationWarning",
                            format!("deduplication skipped: {err}"),
                        ));
                    }
                }
            }

            let candidate_names = graph.entity_names();
            let relatedness = self.compute_relatedness(&candidate_names, &known_entities);

            if self.should_run_linker(&known_entities, &relatedness) {
                match self.link_graph(&graph, &category).await {
                    Ok(linked) => graph = linked,
                    Err(err) => {
                        warnings.push(RecordIssue::new(
                            &source_id,
                            "LinkingWarning",
                            format!("entity linking failed: {err}"),
                        ));
                    }
                }
            } else if self.linker.is_some() && !candidate_names.is_empty() {
                warnings.push(RecordIssue::new(
                    &source_id,
                    "LinkingSkipped",
                    "relatedness below threshold; skipped cross-record linking",
                ));
            }

            relatedness_records.push(relatedness);
            known_entities.extend(candidate_names);
            prepared.push((source_id, graph));
        }

        // One rule profile for the whole batch: inferred rules merged with
        // LM-drafted SHACL constraints.
        let merged_ontology = merge_ontology_candidates(&ontology_candidates);
        let merged_shacl = merge_shacl_candidates(&shacl_candidates);
        let rule_profile = if options.enable_rule_constraints && !prepared.is_empty() {
            let mut union = GraphPayload::default();
            for (_, graph) in &prepared {
                union.merge(graph.clone());
            }
            let inferred = infer_rules_from_graph(&union, &InferenceOptions::default());
            Some(inferred.merged_with(&merged_shacl.to_rule_profile()))
        } else {
            None
        };

        let mut processed = 0;
        let mut total_nodes = 0;
        let mut total_relationships = 0;
        for (source_id, graph) in &prepared {
            let graph_for_load = rule_profile
                .as_ref()
                .map_or_else(|| graph.clone(), |profile| apply_rules_to_graph(graph, profile).graph);

            match self
                .admin
                .load_graph(target_database, &graph_for_load, source_id)
                .await
            {
                Ok(()) => {
                    processed += 1;
                    total_nodes += graph_for_load.nodes.len();
                    total_relationships += graph_for_load.relationships.len();
                }
                Err(err) => {
                    tracing::error!(record = %source_id, error = %err, "raw ingest load failed");
                    errors.push(RecordIssue::new(source_id, err.error_code(), err.to_string()));
                }
            }
        }

        let records_failed = records.len().saturating_sub(processed);
        let status = if records_failed == 0 && fallback_records > 0 {
            IngestStatus::SuccessWithFallback
        } else if records_failed == 0 {
            IngestStatus::Success
        } else if processed > 0 {
            IngestStatus::PartialSuccess
        } else {
            IngestStatus::Failed
        };

        Ok(IngestSummary {
            target_database: target_database.to_string(),
            records_received: records.len(),
            records_processed: processed,
            records_failed,
            total_nodes,
            total_relationships,
            fallback_records,
            rule_profile,
            semantic_artifacts: json!({
                "ontology_candidate": merged_ontology,
                "shacl_candidate": merged_shacl,
                "relatedness_summary": summarize_relatedness(&relatedness_records),
            }),
            errors,
            warnings,
            status,
        })
    }

    async fn extract_graph(
        &self,
        source_id: &str,
        text: &str,
        category: &str,
    ) -> Result<Extraction> {
        let Some(passes) = &self.passes else {
            return Ok(Extraction::fallback(
                fallback_extract(source_id, text),
                "LM extraction stack unavailable",
            ));
        };

        match passes.run_three_pass(text, category).await {
            Ok(result) => Ok(Extraction {
                graph: result.entity_graph,
                warnings: result.warnings,
                ontology_candidate: (!result.ontology_candidate.is_empty())
                    .then_some(result.ontology_candidate),
                shacl_candidate: (!result.shacl_candidate.is_empty())
                    .then_some(result.shacl_candidate),
                used_fallback: false,
                fallback_reason: String::new(),
            }),
            Err(err) => {
                tracing::warn!(
                    record = %source_id,
                    error = %err,
                    "LM extraction failed; falling back to token extraction"
                );
                Ok(Extraction::fallback(
                    fallback_extract(source_id, text),
                    format!("LM semantic extraction failed: {}", err.error_code()),
                ))
            }
        }
    }

    async fn link_graph(&self, graph: &GraphPayload, category: &str) -> Result<GraphPayload> {
        let Some(linker) = &self.linker else {
            return Ok(graph.clone());
        };
        let user = format!(
            "Link duplicate or related entities and return the full graph back as \
             strict JSON with keys 'nodes' and 'relationships'.\n\
             Category: {category}\nEntities:\n{}",
            serde_json::to_string(&graph.nodes)?
        );
        let payload = linker
            .complete_json("You are an entity linking assistant.", &user)
            .await?;
        let (mut linked, _) = GraphPayload::from_value(&payload);
        if linked.nodes.is_empty() {
            linked.nodes = graph.nodes.clone();
        }
        if linked.relationships.is_empty() {
            linked.relationships = graph.relationships.clone();
        }
        Ok(linked)
    }

    async fn load_existing_entity_names(&self, target_database: &str) -> BTreeSet<String> {
        let query = "MATCH (n) WHERE n.name IS NOT NULL \
                     RETURN toLower(trim(toString(n.name))) AS name LIMIT $limit";
        let params = json!({ "limit": KNOWN_ENTITY_LIMIT });
        match self.connector.run(query, target_database, Some(params)).await {
            Ok(rows) => rows
                .iter()
                .filter_map(|row| row.get("name"))
                .filter_map(Value::as_str)
                .map(|name| name.trim().to_lowercase())
                .filter(|name| !name.is_empty())
                .collect(),
            Err(_) => BTreeSet::new(),
        }
    }

    fn compute_relatedness(
        &self,
        candidate_names: &BTreeSet<String>,
        known_entities: &BTreeSet<String>,
    ) -> Relatedness {
        if candidate_names.is_empty() {
            return Relatedness {
                is_related: false,
                score: 0.0,
                overlap_count: 0,
                reason: "no_candidate_entities".to_string(),
            };
        }
        if known_entities.is_empty() {
            return Relatedness {
                is_related: true,
                score: 1.0,
                overlap_count: 0,
                reason: "bootstrap_record".to_string(),
            };
        }

        let overlap = candidate_names.intersection(known_entities).count();
        let score = overlap as f64 / candidate_names.len() as f64;
        Relatedness {
            is_related: score >= self.relatedness_threshold || overlap > 0,
            score: (score * 1000.0).round() / 1000.0,
            overlap_count: overlap,
            reason: if overlap > 0 {
                "overlap_detected".to_string()
            } else {
                "below_threshold".to_string()
            },
        }
    }

    fn should_run_linker(
        &self,
        known_entities: &BTreeSet<String>,
        relatedness: &Relatedness,
    ) -> bool {
        if self.linker.is_none() {
            return false;
        }
        if known_entities.is_empty() {
            return true;
        }
        relatedness.is_related
    }
}

struct Extraction {
    graph: GraphPayload,
    warnings: Vec<String>,
    ontology_candidate: Option<OntologyCandidate>,
    shacl_candidate: Option<ShaclCandidate>,
    used_fallback: bool,
    fallback_reason: String,
}

impl Extraction {
    fn fallback(graph: GraphPayload, reason: impl Into<String>) -> Self {
        Self {
            graph,
            warnings: Vec::new(),
            ontology_candidate: None,
            shacl_candidate: None,
            used_fallback: true,
            fallback_reason: reason.into(),
        }
    }
}

/// Deterministic extraction: a document node plus capitalized-token entities
/// linked via `MENTIONS`.
#[must_use]
pub fn fallback_extract(source_id: &str, text: &str) -> GraphPayload {
    let mut seen = BTreeSet::new();
    let mut tokens = Vec::new();
    for token in FALLBACK_TOKEN_RE.find_iter(text) {
        let key = token.as_str().to_lowercase();
        if seen.insert(key) {
            tokens.push(token.as_str().to_string());
            if tokens.len() >= FALLBACK_TOKEN_CAP {
                break;
            }
        }
    }

    let doc_id = format!("{source_id}_doc");
    let doc_name: String = text.chars().take(80).collect();
    let mut nodes = vec![Node::new(&doc_id, "Document")
        .with_property("name", json!(doc_name))
        .with_property("source_id", json!(source_id))];
    let mut relationships = Vec::new();

    for (idx, name) in tokens.iter().enumerate() {
        let entity_id = format!("{source_id}_ent_{idx}");
        nodes.push(Node::new(&entity_id, "Entity").with_property("name", json!(name)));
        relationships.push(Relationship::new(&doc_id, &entity_id, "MENTIONS"));
    }

    GraphPayload::new(nodes, relationships)
}

fn summarize_relatedness(records: &[Relatedness]) -> Value {
    let total = records.len();
    let related = records.iter().filter(|r| r.is_related).count();
    let average = if total == 0 {
        0.0
    } else {
        records.iter().map(|r| r.score).sum::<f64>() / total as f64
    };
    json!({
        "total_records": total,
        "related_records": related,
        "unrelated_records": total.saturating_sub(related),
        "average_score": (average * 1000.0).round() / 1000.0,
    })
}
