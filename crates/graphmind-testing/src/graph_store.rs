//! In-memory graph store.
//!
//! Implements both connector and admin traits over per-database
//! [`GraphPayload`] tables and answers the concrete query shapes the runtime
//! issues: catalog probes, fulltext lookup, contains scan, neighborhood
//! expansion, label distributions, and known-entity listings. Unrecognized
//! queries return an empty row set.

use async_trait::async_trait;
use graphmind::connector::{GraphConnector, GraphStoreAdmin, JsonRow};
use graphmind::error::{Error, Result};
use graphmind::graph::{validate_label, GraphPayload, Node};
use graphmind::registry::DatabaseRegistry;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

const RDF_LABELS: [&str; 4] = ["resource", "class", "ontology", "individual"];

/// A registry-validating fake graph engine
pub struct InMemoryGraphStore {
    registry: Arc<DatabaseRegistry>,
    graphs: Mutex<HashMap<String, GraphPayload>>,
    fulltext_indexes: Mutex<HashMap<String, Vec<String>>>,
}

impl InMemoryGraphStore {
    #[must_use]
    pub fn new(registry: Arc<DatabaseRegistry>) -> Self {
        Self {
            registry,
            graphs: Mutex::new(HashMap::new()),
            fulltext_indexes: Mutex::new(HashMap::new()),
        }
    }

    /// Seed a database with a payload (provisions it first).
    ///
    /// # Errors
    ///
    /// Propagates registration and label-validation failures.
    pub fn seed(&self, database: &str, payload: GraphPayload) -> Result<()> {
        self.provision(database)?;
        for node in &payload.nodes {
            validate_label(&node.label)?;
        }
        for relationship in &payload.relationships {
            validate_label(&relationship.rel_type)?;
        }
        self.graphs
            .lock()
            .entry(database.to_string())
            .or_default()
            .merge(payload);
        Ok(())
    }

    /// Node count per label in a database.
    #[must_use]
    pub fn label_counts(&self, database: &str) -> BTreeMap<String, usize> {
        let graphs = self.graphs.lock();
        let mut counts = BTreeMap::new();
        if let Some(graph) = graphs.get(database) {
            for node in &graph.nodes {
                *counts.entry(node.label.clone()).or_default() += 1;
            }
        }
        counts
    }

    fn provision(&self, database: &str) -> Result<()> {
        self.registry.register(database)?;
        self.graphs
            .lock()
            .entry(database.to_string())
            .or_default();
        self.fulltext_indexes
            .lock()
            .entry(database.to_string())
            .or_insert_with(|| vec!["entity_fulltext".to_string()]);
        Ok(())
    }

    fn with_graph<T>(&self, database: &str, f: impl FnOnce(&GraphPayload) -> T) -> T {
        let graphs = self.graphs.lock();
        let empty = GraphPayload::default();
        f(graphs.get(database).unwrap_or(&empty))
    }

    fn display_name(node: &Node) -> String {
        for key in ["name", "title", "id", "uri"] {
            if let Some(value) = node.properties.get(key).and_then(Value::as_str) {
                if !value.is_empty() {
                    return value.to_string();
                }
            }
        }
        node.id.clone()
    }

    fn is_rdf_node(node: &Node) -> bool {
        RDF_LABELS.contains(&node.label.to_lowercase().as_str())
            || node.properties.contains_key("uri")
    }

    fn param_str(params: Option<&Value>, key: &str) -> String {
        params
            .and_then(|p| p.get(key))
            .map(|value| match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .unwrap_or_default()
    }

    fn param_usize(params: Option<&Value>, key: &str, default: usize) -> usize {
        params
            .and_then(|p| p.get(key))
            .and_then(Value::as_u64)
            .map_or(default, |value| value as usize)
    }

    fn show_indexes(&self, database: &str) -> Vec<JsonRow> {
        self.fulltext_indexes
            .lock()
            .get(database)
            .into_iter()
            .flatten()
            .map(|name| {
                row(&[
                    ("name", json!(name)),
                    ("state", json!("ONLINE")),
                    ("entityType", json!("NODE")),
                    ("labelsOrTypes", json!([])),
                    ("properties", json!([])),
                ])
            })
            .collect()
    }

    fn fulltext_query(&self, database: &str, params: Option<&Value>) -> Result<Vec<JsonRow>> {
        let index_name = Self::param_str(params, "index_name");
        let known = self
            .fulltext_indexes
            .lock()
            .get(database)
            .is_some_and(|indexes| indexes.contains(&index_name));
        if !known {
            return Err(Error::pipeline(format!(
                "There is no such fulltext schema index: {index_name}"
            )));
        }

        let needle = Self::param_str(params, "query").to_lowercase();
        let limit = Self::param_usize(params, "limit", 5);
        Ok(self.with_graph(database, |graph| {
            graph
                .nodes
                .iter()
                .filter(|node| Self::display_name(node).to_lowercase().contains(&needle))
                .take(limit)
                .map(|node| {
                    row(&[
                        ("node_id", json!(node.id)),
                        ("labels", json!([node.label])),
                        ("display_name", json!(Self::display_name(node))),
                        ("score", json!(2.0)),
                    ])
                })
                .collect()
        }))
    }

    fn contains_query(&self, database: &str, params: Option<&Value>) -> Vec<JsonRow> {
        let needle = Self::param_str(params, "query").to_lowercase();
        let limit = Self::param_usize(params, "limit", 5);
        let properties: Vec<String> = params
            .and_then(|p| p.get("properties"))
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(ToString::to_string)
                    .collect()
            })
            .unwrap_or_default();

        self.with_graph(database, |graph| {
            graph
                .nodes
                .iter()
                .filter(|node| {
                    properties.iter().any(|key| {
                        node.properties
                            .get(key)
                            .and_then(Value::as_str)
                            .is_some_and(|value| value.to_lowercase().contains(&needle))
                    })
                })
                .take(limit)
                .map(|node| {
                    row(&[
                        ("node_id", json!(node.id)),
                        ("labels", json!([node.label])),
                        ("display_name", json!(Self::display_name(node))),
                    ])
                })
                .collect()
        })
    }

    fn neighbors_query(&self, database: &str, params: Option<&Value>) -> Vec<JsonRow> {
        let node_id = Self::param_str(params, "node_id");
        let limit = Self::param_usize(params, "limit", 20);

        self.with_graph(database, |graph| {
            let Some(node) = graph.nodes.iter().find(|node| node.id == node_id) else {
                return Vec::new();
            };
            let by_id: HashMap<&str, &Node> = graph
                .nodes
                .iter()
                .map(|node| (node.id.as_str(), node))
                .collect();

            let mut neighbors = Vec::new();
            for relationship in &graph.relationships {
                let other_id = if relationship.source == node_id {
                    relationship.target.as_str()
                } else if relationship.target == node_id {
                    relationship.source.as_str()
                } else {
                    continue;
                };
                if let Some(other) = by_id.get(other_id) {
                    neighbors.push(json!({
                        "type": relationship.rel_type,
                        "target": Self::display_name(other),
                        "target_labels": [other.label],
                    }));
                }
                if neighbors.len() >= limit {
                    break;
                }
            }

            vec![row(&[
                ("entity", json!(Self::display_name(node))),
                ("labels", json!([node.label])),
                ("neighbors", json!(neighbors)),
            ])]
        })
    }

    fn label_distribution(&self, database: &str, rdf_only: bool) -> Vec<JsonRow> {
        self.with_graph(database, |graph| {
            let mut counts: BTreeMap<String, usize> = BTreeMap::new();
            for node in &graph.nodes {
                if rdf_only && !Self::is_rdf_node(node) {
                    continue;
                }
                *counts.entry(node.label.clone()).or_default() += 1;
            }
            let mut rows: Vec<(String, usize)> = counts.into_iter().collect();
            rows.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
            rows.into_iter()
                .take(10)
                .map(|(label, count)| {
                    row(&[("label", json!(label)), ("count", json!(count))])
                })
                .collect()
        })
    }

    fn rdf_resource_query(&self, database: &str, params: Option<&Value>) -> Vec<JsonRow> {
        let needle = Self::param_str(params, "query").to_lowercase();
        let limit = Self::param_usize(params, "limit", 20);
        self.with_graph(database, |graph| {
            graph
                .nodes
                .iter()
                .filter(|node| Self::is_rdf_node(node))
                .filter(|node| {
                    ["uri", "name", "title", "id"].iter().any(|key| {
                        node.properties
                            .get(*key)
                            .and_then(Value::as_str)
                            .is_some_and(|value| value.to_lowercase().contains(&needle))
                    })
                })
                .take(limit)
                .map(|node| {
                    let resource = node
                        .properties
                        .get("uri")
                        .and_then(Value::as_str)
                        .map_or_else(|| Self::display_name(node), ToString::to_string);
                    row(&[
                        ("labels", json!([node.label])),
                        ("resource", json!(resource)),
                        (
                            "name",
                            node.properties.get("name").cloned().unwrap_or(Value::Null),
                        ),
                    ])
                })
                .collect()
        })
    }

    fn known_entity_names(&self, database: &str) -> Vec<JsonRow> {
        self.with_graph(database, |graph| {
            let names: BTreeSet<String> = graph
                .nodes
                .iter()
                .filter_map(|node| node.properties.get("name"))
                .filter_map(Value::as_str)
                .map(|name| name.trim().to_lowercase())
                .filter(|name| !name.is_empty())
                .collect();
            names
                .into_iter()
                .map(|name| row(&[("name", json!(name))]))
                .collect()
        })
    }
}

#[async_trait]
impl GraphConnector for InMemoryGraphStore {
    async fn run(
        &self,
        query: &str,
        database: &str,
        params: Option<Value>,
    ) -> Result<Vec<JsonRow>> {
        if !self.registry.is_valid(database) {
            return Err(Error::validation(format!(
                "Invalid database '{database}': not in registry"
            )));
        }
        let params = params.as_ref();

        if query.trim_start().starts_with("SHOW") {
            return Ok(self.show_indexes(database));
        }
        if query.contains("db.index.fulltext.queryNodes") {
            return self.fulltext_query(database, params);
        }
        if query.contains("CREATE FULLTEXT INDEX") {
            if let Some(name) = query.split_whitespace().nth(3) {
                self.fulltext_indexes
                    .lock()
                    .entry(database.to_string())
                    .or_default()
                    .push(name.to_string());
            }
            return Ok(Vec::new());
        }
        if query.contains("db.index.fulltext.createNodeIndex") {
            let name = Self::param_str(params, "name");
            if !name.is_empty() {
                self.fulltext_indexes
                    .lock()
                    .entry(database.to_string())
                    .or_default()
                    .push(name);
            }
            return Ok(Vec::new());
        }
        if query.contains("toLower(trim(toString(n.name)))") {
            return Ok(self.known_entity_names(database));
        }
        if query.contains("OPTIONAL MATCH (n)-[r]-(m)") {
            return Ok(self.neighbors_query(database, params));
        }
        if query.contains("CONTAINS toLower($query)") && query.contains("AS resource") {
            return Ok(self.rdf_resource_query(database, params));
        }
        if query.contains("CONTAINS toLower($query)") {
            return Ok(self.contains_query(database, params));
        }
        if query.contains("labels(n)[0] AS label") {
            let rdf_only = query.contains("IN ['resource'");
            return Ok(self.label_distribution(database, rdf_only));
        }
        Ok(Vec::new())
    }
}

#[async_trait]
impl GraphStoreAdmin for InMemoryGraphStore {
    async fn provision_database(&self, database: &str) -> Result<()> {
        self.provision(database)
    }

    async fn load_graph(
        &self,
        database: &str,
        payload: &GraphPayload,
        source_id: &str,
    ) -> Result<()> {
        if !self.registry.is_valid(database) {
            return Err(Error::validation(format!(
                "Database '{database}' is not registered"
            )));
        }
        let mut tagged = payload.clone();
        for node in &mut tagged.nodes {
            validate_label(&node.label)?;
            node.properties
                .insert("source_id".to_string(), json!(source_id));
        }
        for relationship in &tagged.relationships {
            validate_label(&relationship.rel_type)?;
        }
        self.graphs
            .lock()
            .entry(database.to_string())
            .or_default()
            .merge(tagged);
        Ok(())
    }

    async fn schema_text(&self, database: &str) -> Result<String> {
        if !self.registry.is_valid(database) {
            return Err(Error::validation(format!(
                "Database '{database}' is not registered"
            )));
        }
        Ok(self.with_graph(database, |graph| {
            let labels: BTreeSet<&str> =
                graph.nodes.iter().map(|node| node.label.as_str()).collect();
            let rel_types: BTreeSet<&str> = graph
                .relationships
                .iter()
                .map(|relationship| relationship.rel_type.as_str())
                .collect();
            let property_keys: BTreeSet<&str> = graph
                .nodes
                .iter()
                .flat_map(|node| node.properties.keys())
                .map(String::as_str)
                .collect();

            let join = |set: BTreeSet<&str>| {
                if set.is_empty() {
                    "none".to_string()
                } else {
                    set.into_iter().collect::<Vec<_>>().join(", ")
                }
            };
            format!(
                "Database: {database}\nNode Labels: {}\nRelationship Types: {}\nProperty Keys: {}",
                join(labels),
                join(rel_types),
                join(property_keys)
            )
        }))
    }
}

fn row(pairs: &[(&str, Value)]) -> JsonRow {
    pairs
        .iter()
        .map(|(key, value)| ((*key).to_string(), value.clone()))
        .collect()
}

#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#[cfg(test)]
mod tests {
    use super::*;
    use graphmind::graph::Relationship;

    fn seeded_store() -> InMemoryGraphStore {
        let store = InMemoryGraphStore::new(Arc::new(DatabaseRegistry::new()));
        store
            .seed(
                "kgnormal",
                GraphPayload::new(
                    vec![
                        Node::new("101", "Database").with_property("name", json!("Neo4j")),
                        Node::new("102", "Language").with_property("name", json!("Cypher")),
                    ],
                    vec![Relationship::new("101", "102", "USES")],
                ),
            )
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_rejects_unregistered_database() {
        let store = seeded_store();
        let err = store.run("MATCH (n) RETURN n", "missing", None).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn test_fulltext_lookup() {
        let store = seeded_store();
        let rows = store
            .run(
                "CALL db.index.fulltext.queryNodes($index_name, $query) ...",
                "kgnormal",
                Some(json!({"index_name": "entity_fulltext", "query": "Neo4j", "limit": 5})),
            )
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["node_id"], "101");
        assert_eq!(rows[0]["display_name"], "Neo4j");
    }

    #[tokio::test]
    async fn test_unknown_index_errors() {
        let store = seeded_store();
        let result = store
            .run(
                "CALL db.index.fulltext.queryNodes($index_name, $query)",
                "kgnormal",
                Some(json!({"index_name": "nope", "query": "x"})),
            )
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_neighbors_query() {
        let store = seeded_store();
        let rows = store
            .run(
                "MATCH (n) WHERE elementId(n) = toString($node_id) OPTIONAL MATCH (n)-[r]-(m) ...",
                "kgnormal",
                Some(json!({"node_id": "101", "limit": 20})),
            )
            .await
            .unwrap();
        assert_eq!(rows[0]["entity"], "Neo4j");
        assert_eq!(rows[0]["neighbors"][0]["type"], "USES");
        assert_eq!(rows[0]["neighbors"][0]["target"], "Cypher");
    }

    #[tokio::test]
    async fn test_label_distribution() {
        let store = seeded_store();
        let rows = store
            .run(
                "MATCH (n) RETURN labels(n)[0] AS label, count(*) AS count ORDER BY count DESC LIMIT 10",
                "kgnormal",
                None,
            )
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn test_load_graph_validates_labels() {
        let store = seeded_store();
        let bad = GraphPayload::new(vec![Node::new("x", "bad label")], vec![]);
        assert!(store.load_graph("kgnormal", &bad, "src").await.is_err());
    }

    #[tokio::test]
    async fn test_schema_text_lists_labels() {
        let store = seeded_store();
        let schema = store.schema_text("kgnormal").await.unwrap();
        assert!(schema.contains("Database: kgnormal"));
        assert!(schema.contains("Database, Language"));
        assert!(schema.contains("USES"));
    }

    #[tokio::test]
    async fn test_load_tags_source_id() {
        let store = seeded_store();
        store
            .load_graph(
                "kgnormal",
                &GraphPayload::new(vec![Node::new("200", "Entity")], vec![]),
                "batch42",
            )
            .await
            .unwrap();
        let counts = store.label_counts("kgnormal");
        assert_eq!(counts["Entity"], 1);
    }
}
