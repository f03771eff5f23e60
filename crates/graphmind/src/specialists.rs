//! LPG and RDF specialists.
//!
//! The LPG specialist expands the top resolved entities through their
//! neighborhoods; the RDF specialist looks up resource signatures (RDF-ish
//! labels or a `uri` property). Both degrade to a label-count overview when
//! no entity resolved, so the semantic path always produces records or an
//! explicit empty result.

use crate::connector::{GraphConnector, JsonRow};
use crate::resolver::SemanticContext;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;

/// Result of one specialist run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpecialistResult {
    pub mode: String,
    pub summary: String,
    pub records: Vec<Value>,
}

impl SpecialistResult {
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.records.len()
    }
}

/// Neighborhood expansion over resolved entities
pub struct LpgSpecialist {
    connector: Arc<dyn GraphConnector>,
    result_limit: usize,
}

impl LpgSpecialist {
    #[must_use]
    pub fn new(connector: Arc<dyn GraphConnector>) -> Self {
        Self {
            connector,
            result_limit: 20,
        }
    }

    #[must_use]
    pub fn with_result_limit(mut self, limit: usize) -> Self {
        self.result_limit = limit.max(1);
        self
    }

    pub async fn run(
        &self,
        databases: &[String],
        semantic_context: &SemanticContext,
    ) -> SpecialistResult {
        let top_matches: Vec<_> = semantic_context.top_matches().into_iter().take(3).collect();
        if top_matches.is_empty() {
            return SpecialistResult {
                mode: "lpg".to_string(),
                summary: "No resolved entity. Returned graph label distribution.".to_string(),
                records: self.label_distribution(databases).await,
            };
        }

        let mut records = Vec::new();
        for (_, candidate) in top_matches {
            if candidate.node_id.is_null() {
                continue;
            }
            for row in self
                .neighbors_for_node(&candidate.database, &candidate.node_id)
                .await
            {
                records.push(json!({
                    "database": candidate.database,
                    "entity": row.get("entity").cloned().unwrap_or(Value::Null),
                    "labels": row.get("labels").cloned().unwrap_or_else(|| json!([])),
                    "neighbors": row.get("neighbors").cloned().unwrap_or_else(|| json!([])),
                }));
            }
        }

        SpecialistResult {
            mode: "lpg".to_string(),
            summary: "Resolved entities were expanded through LPG neighborhoods.".to_string(),
            records,
        }
    }

    async fn neighbors_for_node(&self, db_name: &str, node_id: &Value) -> Vec<JsonRow> {
        let query = "\
MATCH (n)
WHERE elementId(n) = toString($node_id)
OPTIONAL MATCH (n)-[r]-(m)
RETURN coalesce(n.name, n.title, n.id, n.uri, elementId(n)) AS entity,
       labels(n) AS labels,
       collect(
         DISTINCT {
           type: type(r),
           target: coalesce(m.name, m.title, m.id, m.uri, elementId(m)),
           target_labels: labels(m)
         }
       )[0..$limit] AS neighbors
LIMIT 1";
        let params = json!({ "node_id": node_id, "limit": self.result_limit });
        self.connector
            .run(query, db_name, Some(params))
            .await
            .unwrap_or_default()
    }

    async fn label_distribution(&self, databases: &[String]) -> Vec<Value> {
        let query = "\
MATCH (n)
RETURN labels(n)[0] AS label, count(*) AS count
ORDER BY count DESC
LIMIT 10";
        let mut rows = Vec::new();
        for db_name in databases {
            if let Ok(db_rows) = self.connector.run(query, db_name, None).await {
                rows.extend(db_rows.into_iter().map(|row| tag_row(db_name, row)));
            }
        }
        rows
    }
}

/// Resource-signature lookup for RDF-style nodes
pub struct RdfSpecialist {
    connector: Arc<dyn GraphConnector>,
    result_limit: usize,
}

impl RdfSpecialist {
    #[must_use]
    pub fn new(connector: Arc<dyn GraphConnector>) -> Self {
        Self {
            connector,
            result_limit: 20,
        }
    }

    #[must_use]
    pub fn with_result_limit(mut self, limit: usize) -> Self {
        self.result_limit = limit.max(1);
        self
    }

    pub async fn run(
        &self,
        databases: &[String],
        semantic_context: &SemanticContext,
    ) -> SpecialistResult {
        if let Some(entity) = semantic_context.entities.first() {
            let rows = self.resource_matches(databases, entity).await;
            if !rows.is_empty() {
                return SpecialistResult {
                    mode: "rdf".to_string(),
                    summary: "Matched RDF-like resources using URI/name signals.".to_string(),
                    records: rows,
                };
            }
        }

        SpecialistResult {
            mode: "rdf".to_string(),
            summary: "No RDF resource match found. Returned RDF label overview.".to_string(),
            records: self.rdf_label_overview(databases).await,
        }
    }

    async fn resource_matches(&self, databases: &[String], entity_text: &str) -> Vec<Value> {
        let query = "\
MATCH (n)
WHERE (
    any(lbl IN labels(n) WHERE toLower(lbl) IN ['resource', 'class', 'ontology', 'individual'])
    OR n.uri IS NOT NULL
)
  AND any(key IN ['uri', 'name', 'title', 'id']
      WHERE n[key] IS NOT NULL
        AND toLower(toString(n[key])) CONTAINS toLower($query))
RETURN labels(n) AS labels,
       coalesce(n.uri, n.name, n.title, n.id, elementId(n)) AS resource,
       n.name AS name
LIMIT $limit";
        let mut rows = Vec::new();
        for db_name in databases {
            let params = json!({ "query": entity_text, "limit": self.result_limit });
            if let Ok(db_rows) = self.connector.run(query, db_name, Some(params)).await {
                rows.extend(db_rows.into_iter().map(|row| tag_row(db_name, row)));
            }
        }
        rows
    }

    async fn rdf_label_overview(&self, databases: &[String]) -> Vec<Value> {
        let query = "\
MATCH (n)
WHERE any(lbl IN labels(n) WHERE toLower(lbl) IN ['resource', 'class', 'ontology', 'individual'])
   OR n.uri IS NOT NULL
RETURN labels(n)[0] AS label, count(*) AS count
ORDER BY count DESC
LIMIT 10";
        let mut rows = Vec::new();
        for db_name in databases {
            if let Ok(db_rows) = self.connector.run(query, db_name, None).await {
                rows.extend(db_rows.into_iter().map(|row| tag_row(db_name, row)));
            }
        }
        rows
    }
}

fn tag_row(db_name: &str, row: JsonRow) -> Value {
    let mut object = Map::new();
    object.insert("database".to_string(), json!(db_name));
    for (key, value) in row {
        object.insert(key, value);
    }
    Value::Object(object)
}
