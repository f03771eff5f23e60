//! Semantic entity resolution.
//!
//! Extracts candidate entity spans from the question (quoted spans, then
//! capitalized n-grams, then long tokens), rewrites them through the ontology
//! alias store, and resolves each against every selected database: online
//! fulltext indexes first, a `CONTAINS` property scan as fallback. Candidates
//! are ranked by fulltext score plus lexical similarity and label/name/alias
//! boosts; the winner's margin over the runner-up drives a confidence flag.

use crate::connector::GraphConnector;
use crate::hints::{normalize_text, OntologyHintStore};
use crate::trace::preview;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use similar::TextDiff;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

/// Properties probed by the contains fallback.
pub const ENTITY_PROPERTIES: [&str; 7] = ["name", "title", "id", "uri", "code", "symbol", "alias"];

/// Margin between rank 1 and rank 2 above which the top match is confident.
pub const CONFIDENCE_GAP: f64 = 0.15;

const STOPWORDS: [&str; 30] = [
    "a", "an", "the", "is", "are", "was", "were", "be", "of", "to", "in", "on", "for", "and",
    "or", "do", "does", "did", "what", "which", "who", "whom", "where", "when", "why", "how",
    "tell", "show", "about", "please",
];

const QUESTION_LABEL_HINTS: [(&str, &[&str]); 6] = [
    ("company", &["company", "organization", "org", "enterprise", "firm"]),
    ("person", &["person", "human", "individual", "employee", "ceo", "founder"]),
    ("product", &["product", "service", "offering"]),
    ("event", &["event", "incident", "meeting"]),
    ("document", &["document", "section", "chunk"]),
    ("ontology", &["ontology", "class", "property", "concept"]),
];

static QUOTED_RE: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r#""([^"]+)""#).expect("quoted regex is valid")
});

static SINGLE_QUOTED_RE: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"'([^']+)'").expect("single-quoted regex is valid")
});

static CAPITALIZED_RE: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"\b(?:[A-Z][a-zA-Z0-9&.-]+|[A-Z]{2,})(?:\s+[A-Z][a-zA-Z0-9&.-]+)*\b")
        .expect("capitalized regex is valid")
});

static TOKEN_RE: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"[A-Za-z0-9][A-Za-z0-9&._-]{2,}").expect("token regex is valid")
});

/// How a candidate was found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CandidateSource {
    Fulltext,
    Contains,
    Override,
}

/// One entity-resolution candidate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateMatch {
    pub database: String,
    pub entity_text: String,
    pub node_id: Value,
    pub labels: Vec<String>,
    pub display_name: String,
    pub base_score: f64,
    pub lexical_score: f64,
    pub label_boost: f64,
    pub alias_boost: f64,
    pub final_score: f64,
    pub source: CandidateSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_confident: Option<bool>,
}

/// A caller-pinned resolution for one question entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityOverride {
    pub question_entity: String,
    pub database: String,
    pub node_id: Value,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub labels: Vec<String>,
}

/// Resolution output consumed by the router and specialists
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SemanticContext {
    pub entities: Vec<String>,
    pub label_hints: Vec<String>,
    pub alias_resolved: BTreeMap<String, String>,
    pub matches: BTreeMap<String, Vec<CandidateMatch>>,
    pub unresolved_entities: Vec<String>,
    #[serde(default)]
    pub overrides_applied: BTreeMap<String, Value>,
    #[serde(default)]
    pub ontology_hints: Value,
}

impl SemanticContext {
    /// Best candidate per question entity, sorted by final score descending.
    #[must_use]
    pub fn top_matches(&self) -> Vec<(String, CandidateMatch)> {
        let mut pairs: Vec<(String, CandidateMatch)> = self
            .matches
            .iter()
            .filter_map(|(entity, candidates)| {
                candidates
                    .first()
                    .map(|best| (entity.clone(), best.clone()))
            })
            .collect();
        pairs.sort_by(|a, b| {
            b.1.final_score
                .partial_cmp(&a.1.final_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        pairs
    }
}

/// Resolve question entities against graph entities
pub struct SemanticEntityResolver {
    connector: Arc<dyn GraphConnector>,
    hint_store: Arc<OntologyHintStore>,
    fulltext_index_hint: String,
    candidate_limit: usize,
}

impl SemanticEntityResolver {
    #[must_use]
    pub fn new(connector: Arc<dyn GraphConnector>, hint_store: Arc<OntologyHintStore>) -> Self {
        Self {
            connector,
            hint_store,
            fulltext_index_hint: "entity_fulltext".to_string(),
            candidate_limit: 5,
        }
    }

    #[must_use]
    pub fn with_fulltext_index_hint(mut self, hint: impl Into<String>) -> Self {
        self.fulltext_index_hint = hint.into();
        self
    }

    #[must_use]
    pub fn with_candidate_limit(mut self, limit: usize) -> Self {
        self.candidate_limit = limit.max(1);
        self
    }

    /// Extract candidate entity spans from the question.
    #[must_use]
    pub fn extract_question_entities(&self, question: &str) -> Vec<String> {
        let mut entities = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        let spans = QUOTED_RE
            .captures_iter(question)
            .chain(SINGLE_QUOTED_RE.captures_iter(question))
            .filter_map(|caps| caps.get(1).map(|m| m.as_str().to_string()))
            .chain(
                CAPITALIZED_RE
                    .find_iter(question)
                    .map(|m| m.as_str().to_string()),
            );

        for span in spans {
            let cleaned = clean_span(&span);
            if cleaned.is_empty() {
                continue;
            }
            let key = cleaned.to_lowercase();
            if seen.contains(&key) || STOPWORDS.contains(&key.as_str()) {
                continue;
            }
            seen.insert(key);
            entities.push(cleaned);
        }

        // Fallback: long tokens when no span was detected.
        if entities.is_empty() {
            for token in TOKEN_RE.find_iter(question) {
                let key = token.as_str().to_lowercase();
                if STOPWORDS.contains(&key.as_str())
                    || key.chars().all(|c| c.is_ascii_digit())
                    || seen.contains(&key)
                {
                    continue;
                }
                seen.insert(key);
                entities.push(token.as_str().to_string());
                if entities.len() >= 3 {
                    break;
                }
            }
        }
        entities
    }

    /// Resolve entities for a question across one or more databases.
    pub async fn resolve(&self, question: &str, databases: &[String]) -> SemanticContext {
        let entities = self.extract_question_entities(question);
        let mut label_hints = infer_label_hints(question);
        label_hints.extend(self.hint_store.infer_label_hints(question));
        let fulltext_indexes = self.discover_fulltext_indexes(databases).await;

        let mut matches = BTreeMap::new();
        let mut unresolved = Vec::new();
        let mut alias_resolved = BTreeMap::new();

        for entity in &entities {
            let resolved_text = self.hint_store.resolve_alias(entity);
            alias_resolved.insert(entity.clone(), resolved_text.clone());

            let mut candidates = Vec::new();
            for db_name in databases {
                let empty = Vec::new();
                let indexes = fulltext_indexes.get(db_name).unwrap_or(&empty);
                let mut db_candidates = self
                    .query_fulltext_candidates(db_name, &resolved_text, indexes)
                    .await;
                if db_candidates.is_empty() {
                    db_candidates = self.query_contains_candidates(db_name, &resolved_text).await;
                }
                candidates.extend(db_candidates);
            }

            let ranked = self.rank_and_dedup(entity, &resolved_text, candidates, &label_hints);
            if ranked.is_empty() {
                unresolved.push(entity.clone());
            } else {
                matches.insert(entity.clone(), ranked);
            }
        }

        SemanticContext {
            entities,
            label_hints: label_hints.into_iter().collect(),
            alias_resolved,
            matches,
            unresolved_entities: unresolved,
            overrides_applied: BTreeMap::new(),
            ontology_hints: self.hint_store.to_summary(),
        }
    }

    /// Online fulltext indexes per database, the configured hint first.
    async fn discover_fulltext_indexes(
        &self,
        databases: &[String],
    ) -> BTreeMap<String, Vec<String>> {
        let probes = [
            "SHOW FULLTEXT INDEXES YIELD name, state WHERE state = 'ONLINE' RETURN name",
            "SHOW INDEXES YIELD name, type, state WHERE type = 'FULLTEXT' AND state = 'ONLINE' RETURN name",
        ];

        let mut by_db = BTreeMap::new();
        for db_name in databases {
            let mut indexes: Vec<String> = Vec::new();
            for probe in probes {
                let rows = self.run_query(db_name, probe, None).await;
                if !rows.is_empty() {
                    indexes = rows
                        .iter()
                        .filter_map(|row| row.get("name"))
                        .filter_map(Value::as_str)
                        .map(|name| name.trim().to_string())
                        .filter(|name| !name.is_empty())
                        .collect();
                    if !indexes.is_empty() {
                        break;
                    }
                }
            }
            if !indexes.contains(&self.fulltext_index_hint) {
                indexes.insert(0, self.fulltext_index_hint.clone());
            }
            by_db.insert(db_name.clone(), indexes);
        }
        by_db
    }

    /// Fulltext lookup; stops at the first index that returns rows.
    async fn query_fulltext_candidates(
        &self,
        db_name: &str,
        entity_text: &str,
        indexes: &[String],
    ) -> Vec<CandidateMatch> {
        let query = "\
CALL db.index.fulltext.queryNodes($index_name, $query)
YIELD node, score
RETURN elementId(node) AS node_id,
       labels(node) AS labels,
       coalesce(node.name, node.title, node.id, node.uri, elementId(node)) AS display_name,
       score
ORDER BY score DESC
LIMIT $limit";

        for index_name in indexes {
            let params = json!({
                "index_name": index_name,
                "query": entity_text,
                "limit": self.candidate_limit,
            });
            let rows = self.run_query(db_name, query, Some(params)).await;
            if rows.is_empty() {
                continue;
            }

            return rows
                .iter()
                .map(|row| CandidateMatch {
                    database: db_name.to_string(),
                    entity_text: entity_text.to_string(),
                    node_id: row.get("node_id").cloned().unwrap_or(Value::Null),
                    labels: string_list(row.get("labels")),
                    display_name: string_or_empty(row.get("display_name")),
                    base_score: row
                        .get("score")
                        .and_then(Value::as_f64)
                        .unwrap_or_default(),
                    lexical_score: 0.0,
                    label_boost: 0.0,
                    alias_boost: 0.0,
                    final_score: 0.0,
                    source: CandidateSource::Fulltext,
                    index_name: Some(index_name.clone()),
                    is_confident: None,
                })
                .collect();
        }
        Vec::new()
    }

    /// `CONTAINS` scan over the fixed entity property set.
    async fn query_contains_candidates(
        &self,
        db_name: &str,
        entity_text: &str,
    ) -> Vec<CandidateMatch> {
        let query = "\
MATCH (n)
WHERE any(key IN $properties
      WHERE n[key] IS NOT NULL
        AND toLower(toString(n[key])) CONTAINS toLower($query))
RETURN elementId(n) AS node_id,
       labels(n) AS labels,
       coalesce(n.name, n.title, n.id, n.uri, elementId(n)) AS display_name
LIMIT $limit";

        let params = json!({
            "properties": ENTITY_PROPERTIES,
            "query": entity_text,
            "limit": self.candidate_limit,
        });
        self.run_query(db_name, query, Some(params))
            .await
            .iter()
            .map(|row| {
                let display_name = string_or_empty(row.get("display_name"));
                let lexical = lexical_similarity(entity_text, &display_name);
                CandidateMatch {
                    database: db_name.to_string(),
                    entity_text: entity_text.to_string(),
                    node_id: row.get("node_id").cloned().unwrap_or(Value::Null),
                    labels: string_list(row.get("labels")),
                    display_name,
                    base_score: lexical,
                    lexical_score: 0.0,
                    label_boost: 0.0,
                    alias_boost: 0.0,
                    final_score: 0.0,
                    source: CandidateSource::Contains,
                    index_name: None,
                    is_confident: None,
                }
            })
            .collect()
    }

    fn rank_and_dedup(
        &self,
        entity_text: &str,
        resolved_text: &str,
        candidates: Vec<CandidateMatch>,
        label_hints: &BTreeSet<String>,
    ) -> Vec<CandidateMatch> {
        let normalized_entity = normalize_text(entity_text);
        let normalized_resolved = normalize_text(resolved_text);

        let mut seen: HashSet<(String, String)> = HashSet::new();
        let mut ranked: Vec<CandidateMatch> = Vec::new();
        for mut candidate in candidates {
            let dedup_key = (candidate.database.clone(), candidate.node_id.to_string());
            if !seen.insert(dedup_key) {
                continue;
            }

            let normalized_display = normalize_text(&candidate.display_name);
            let lexical = lexical_similarity(&normalized_entity, &normalized_display);
            let label_boost = label_boost(&candidate.labels, label_hints);
            let exact_boost = if normalized_entity == normalized_display {
                0.2
            } else {
                0.0
            };
            let alias_boost = if normalized_resolved == normalized_display {
                0.12
            } else {
                0.0
            };

            candidate.lexical_score = round4(lexical);
            candidate.label_boost = round4(label_boost);
            candidate.alias_boost = round4(alias_boost);
            candidate.final_score =
                round4(candidate.base_score + lexical + label_boost + exact_boost + alias_boost);
            ranked.push(candidate);
        }

        ranked.sort_by(|a, b| {
            b.final_score
                .partial_cmp(&a.final_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        ranked.truncate(self.candidate_limit);

        // Confidence gap between rank 1 and rank 2 marks safe-to-pin matches.
        if let Some(runner_up_score) = ranked.get(1).map(|c| c.final_score) {
            let best_score = ranked[0].final_score;
            ranked[0].is_confident = Some(best_score - runner_up_score > CONFIDENCE_GAP);
        } else if let Some(best) = ranked.first_mut() {
            best.is_confident = Some(true);
        }
        ranked
    }

    /// Query helper tolerating failures: errors and non-row output become an
    /// empty row set so resolution can continue with other sources.
    async fn run_query(
        &self,
        db_name: &str,
        query: &str,
        params: Option<Value>,
    ) -> Vec<crate::connector::JsonRow> {
        match self.connector.run(query, db_name, params).await {
            Ok(rows) => rows,
            Err(err) => {
                tracing::debug!(db = db_name, error = %err, query = %preview(query, 80), "resolver query failed");
                Vec::new()
            }
        }
    }
}

/// Pin override candidates into a context, displacing duplicate rows.
pub fn apply_entity_overrides(context: &mut SemanticContext, overrides: &[EntityOverride]) {
    if overrides.is_empty() {
        return;
    }

    let mut unresolved: BTreeSet<String> =
        context.unresolved_entities.iter().cloned().collect();

    for override_row in overrides {
        if override_row.question_entity.is_empty() || override_row.node_id.is_null() {
            continue;
        }

        let candidate = CandidateMatch {
            database: override_row.database.clone(),
            entity_text: override_row.question_entity.clone(),
            node_id: override_row.node_id.clone(),
            labels: override_row.labels.clone(),
            display_name: override_row
                .display_name
                .clone()
                .unwrap_or_else(|| override_row.question_entity.clone()),
            base_score: 1.0,
            lexical_score: 1.0,
            label_boost: 0.0,
            alias_boost: 0.0,
            final_score: 10.0,
            source: CandidateSource::Override,
            index_name: None,
            is_confident: Some(true),
        };

        let existing = context
            .matches
            .remove(&override_row.question_entity)
            .unwrap_or_default();
        let mut rows = vec![candidate.clone()];
        rows.extend(existing.into_iter().filter(|row| {
            !(row.database == candidate.database
                && row.node_id.to_string() == candidate.node_id.to_string())
        }));
        context
            .matches
            .insert(override_row.question_entity.clone(), rows);

        unresolved.remove(&override_row.question_entity);
        context.overrides_applied.insert(
            override_row.question_entity.clone(),
            json!({
                "database": candidate.database,
                "node_id": candidate.node_id,
                "display_name": candidate.display_name,
            }),
        );
    }

    context.unresolved_entities = unresolved.into_iter().collect();
}

/// Ratio of matching characters between normalized strings (difflib-style).
#[must_use]
pub fn lexical_similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    f64::from(TextDiff::from_chars(a, b).ratio())
}

fn clean_span(value: &str) -> String {
    let collapsed = value.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed
        .trim_matches(|c: char| ".,:;!?()[]{}".contains(c))
        .to_string()
}

fn infer_label_hints(question: &str) -> BTreeSet<String> {
    let lowered = question.to_lowercase();
    let mut hints = BTreeSet::new();
    for (_, tokens) in QUESTION_LABEL_HINTS {
        if tokens.iter().any(|token| lowered.contains(token)) {
            hints.extend(tokens.iter().map(ToString::to_string));
        }
    }
    hints
}

fn label_boost(labels: &[String], label_hints: &BTreeSet<String>) -> f64 {
    if labels.is_empty() || label_hints.is_empty() {
        return 0.0;
    }
    let normalized_labels: BTreeSet<String> = labels
        .iter()
        .map(|label| normalize_text(label).replace(' ', ""))
        .collect();
    let normalized_hints: BTreeSet<String> = label_hints
        .iter()
        .map(|hint| normalize_text(hint).replace(' ', ""))
        .collect();
    if normalized_labels.intersection(&normalized_hints).count() > 0 {
        0.15
    } else {
        0.0
    }
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(ToString::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn string_or_empty(value: Option<&Value>) -> String {
    value
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, clippy::float_cmp)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::JsonRow;
    use crate::error::Result;
    use async_trait::async_trait;

    struct EmptyConnector;

    #[async_trait]
    impl GraphConnector for EmptyConnector {
        async fn run(&self, _: &str, _: &str, _: Option<Value>) -> Result<Vec<JsonRow>> {
            Ok(Vec::new())
        }
    }

    fn resolver() -> SemanticEntityResolver {
        SemanticEntityResolver::new(
            Arc::new(EmptyConnector),
            Arc::new(OntologyHintStore::default()),
        )
    }

    // ============================================================
    // Entity Extraction Tests
    // ============================================================

    #[test]
    fn test_quoted_spans_win() {
        let entities = resolver().extract_question_entities(r#"What links "Neo4j" to Cypher?"#);
        assert_eq!(entities[0], "Neo4j");
        assert!(entities.contains(&"Cypher".to_string()));
    }

    #[test]
    fn test_capitalized_ngrams() {
        let entities =
            resolver().extract_question_entities("Does Jane Street Group trade with Acme?");
        assert!(entities.contains(&"Jane Street Group".to_string()));
        assert!(entities.contains(&"Acme".to_string()));
    }

    #[test]
    fn test_stopwords_rejected() {
        let entities = resolver().extract_question_entities("What is the Answer");
        assert!(!entities.iter().any(|e| e.eq_ignore_ascii_case("what")));
        assert!(!entities.iter().any(|e| e.eq_ignore_ascii_case("the")));
    }

    #[test]
    fn test_fallback_tokens_capped_at_three() {
        let entities =
            resolver().extract_question_entities("find nodes about kubernetes clusters and operators today");
        assert!(!entities.is_empty());
        assert!(entities.len() <= 3);
    }

    #[test]
    fn test_clean_span_strips_punctuation() {
        assert_eq!(clean_span("  (Neo4j)!  "), "Neo4j");
        assert_eq!(clean_span("A   B"), "A B");
        assert_eq!(clean_span("..."), "");
    }

    #[test]
    fn test_entities_deduplicated_case_insensitively() {
        let entities = resolver().extract_question_entities(r#""Acme" and Acme and ACME"#);
        let acme_count = entities
            .iter()
            .filter(|e| e.eq_ignore_ascii_case("acme"))
            .count();
        assert_eq!(acme_count, 1);
    }

    // ============================================================
    // Ranking Tests
    // ============================================================

    fn raw_candidate(db: &str, node_id: i64, display: &str, base: f64) -> CandidateMatch {
        CandidateMatch {
            database: db.to_string(),
            entity_text: "Neo4j".to_string(),
            node_id: json!(node_id),
            labels: vec!["Database".to_string()],
            display_name: display.to_string(),
            base_score: base,
            lexical_score: 0.0,
            label_boost: 0.0,
            alias_boost: 0.0,
            final_score: 0.0,
            source: CandidateSource::Fulltext,
            index_name: Some("entity_fulltext".to_string()),
            is_confident: None,
        }
    }

    #[test]
    fn test_exact_name_gets_boost() {
        let ranked = resolver().rank_and_dedup(
            "Neo4j",
            "Neo4j",
            vec![
                raw_candidate("kg", 1, "Neo4j", 1.0),
                raw_candidate("kg", 2, "Neo4j Aura", 1.0),
            ],
            &BTreeSet::new(),
        );
        assert_eq!(ranked[0].display_name, "Neo4j");
        assert!(ranked[0].final_score > ranked[1].final_score);
        // exact + alias boosts on top of base + lexical
        assert!(ranked[0].final_score >= 1.0 + 1.0 + 0.2 + 0.12 - 1e-9);
    }

    #[test]
    fn test_dedup_on_database_and_node_id() {
        let ranked = resolver().rank_and_dedup(
            "Neo4j",
            "Neo4j",
            vec![
                raw_candidate("kg", 1, "Neo4j", 1.0),
                raw_candidate("kg", 1, "Neo4j", 2.0),
                raw_candidate("other", 1, "Neo4j", 1.0),
            ],
            &BTreeSet::new(),
        );
        assert_eq!(ranked.len(), 2);
    }

    #[test]
    fn test_confidence_gap_flag() {
        let ranked = resolver().rank_and_dedup(
            "Neo4j",
            "Neo4j",
            vec![
                raw_candidate("kg", 1, "Neo4j", 2.0),
                raw_candidate("kg", 2, "Unrelated", 0.1),
            ],
            &BTreeSet::new(),
        );
        assert_eq!(ranked[0].is_confident, Some(true));
        assert_eq!(ranked[1].is_confident, None);
    }

    #[test]
    fn test_close_scores_not_confident() {
        let ranked = resolver().rank_and_dedup(
            "Acme",
            "Acme",
            vec![
                raw_candidate("kg", 1, "Acme Corp", 1.0),
                raw_candidate("kg", 2, "Acme Inc", 1.0),
            ],
            &BTreeSet::new(),
        );
        assert_eq!(ranked[0].is_confident, Some(false));
    }

    #[test]
    fn test_single_candidate_is_confident() {
        let ranked = resolver().rank_and_dedup(
            "Neo4j",
            "Neo4j",
            vec![raw_candidate("kg", 1, "Neo4j", 1.0)],
            &BTreeSet::new(),
        );
        assert_eq!(ranked[0].is_confident, Some(true));
    }

    #[test]
    fn test_label_boost_applies() {
        let hints: BTreeSet<String> = ["database".to_string()].into_iter().collect();
        let ranked = resolver().rank_and_dedup(
            "Neo4j",
            "Neo4j",
            vec![raw_candidate("kg", 1, "Neo4j", 1.0)],
            &hints,
        );
        assert_eq!(ranked[0].label_boost, 0.15);
    }

    #[test]
    fn test_candidate_limit_truncates() {
        let resolver = resolver().with_candidate_limit(2);
        let candidates = (0..5)
            .map(|i| raw_candidate("kg", i, &format!("Entity {i}"), f64::from(i as i32)))
            .collect();
        let ranked = resolver.rank_and_dedup("Entity", "Entity", candidates, &BTreeSet::new());
        assert_eq!(ranked.len(), 2);
    }

    // ============================================================
    // Similarity & Overrides Tests
    // ============================================================

    #[test]
    fn test_lexical_similarity_bounds() {
        assert_eq!(lexical_similarity("", "neo4j"), 0.0);
        assert_eq!(lexical_similarity("neo4j", "neo4j"), 1.0);
        let partial = lexical_similarity("neo4j", "neo4j aura");
        assert!(partial > 0.0 && partial < 1.0);
    }

    #[test]
    fn test_apply_entity_overrides() {
        let mut context = SemanticContext {
            entities: vec!["Neo4j".to_string()],
            unresolved_entities: vec!["Neo4j".to_string()],
            ..SemanticContext::default()
        };

        apply_entity_overrides(
            &mut context,
            &[EntityOverride {
                question_entity: "Neo4j".to_string(),
                database: "kgnormal".to_string(),
                node_id: json!(777),
                display_name: Some("Neo4j Override".to_string()),
                labels: vec!["Database".to_string()],
            }],
        );

        let rows = &context.matches["Neo4j"];
        assert_eq!(rows[0].source, CandidateSource::Override);
        assert_eq!(rows[0].final_score, 10.0);
        assert_eq!(rows[0].display_name, "Neo4j Override");
        assert!(context.unresolved_entities.is_empty());
        assert!(context.overrides_applied.contains_key("Neo4j"));
    }

    #[test]
    fn test_override_displaces_duplicate_candidate() {
        let mut context = SemanticContext::default();
        context.matches.insert(
            "Neo4j".to_string(),
            vec![raw_candidate("kgnormal", 777, "Neo4j", 1.0)],
        );

        apply_entity_overrides(
            &mut context,
            &[EntityOverride {
                question_entity: "Neo4j".to_string(),
                database: "kgnormal".to_string(),
                node_id: json!(777),
                display_name: None,
                labels: vec![],
            }],
        );

        let rows = &context.matches["Neo4j"];
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].source, CandidateSource::Override);
    }

    #[test]
    fn test_top_matches_sorted_by_score() {
        let mut context = SemanticContext::default();
        context
            .matches
            .insert("A".to_string(), vec![raw_candidate("kg", 1, "A", 0.5)]);
        context
            .matches
            .insert("B".to_string(), vec![raw_candidate("kg", 2, "B", 3.0)]);
        context.matches.get_mut("A").unwrap()[0].final_score = 0.5;
        context.matches.get_mut("B").unwrap()[0].final_score = 3.0;
        let top = context.top_matches();
        assert_eq!(top[0].0, "B");
    }
}
