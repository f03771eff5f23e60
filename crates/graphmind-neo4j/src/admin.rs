//! Database provisioning, graph loading, and schema introspection.

use async_trait::async_trait;
use graphmind::connector::{GraphConnector, GraphStoreAdmin, JsonRow};
use graphmind::error::{Error, Result};
use graphmind::graph::{validate_label, GraphPayload};
use graphmind::registry::{is_valid_database_name, DatabaseRegistry};
use serde_json::{json, Value};
use std::sync::Arc;

/// Administrative operations over the bolt connector
pub struct Neo4jAdmin {
    connector: Arc<dyn GraphConnector>,
    registry: Arc<DatabaseRegistry>,
}

impl Neo4jAdmin {
    #[must_use]
    pub fn new(connector: Arc<dyn GraphConnector>, registry: Arc<DatabaseRegistry>) -> Self {
        Self {
            connector,
            registry,
        }
    }

    fn collect_column(rows: &[JsonRow], column: &str) -> Vec<String> {
        rows.iter()
            .filter_map(|row| row.get(column))
            .filter_map(Value::as_str)
            .map(ToString::to_string)
            .collect()
    }

    fn join_or_none(values: &[String]) -> String {
        if values.is_empty() {
            "none".to_string()
        } else {
            values.join(", ")
        }
    }
}

#[async_trait]
impl GraphStoreAdmin for Neo4jAdmin {
    /// Create the database through the `system` database, then register it.
    async fn provision_database(&self, database: &str) -> Result<()> {
        if !is_valid_database_name(database) {
            return Err(Error::validation(format!(
                "Invalid database name '{database}': must be alphanumeric and start with a letter"
            )));
        }
        if self.registry.is_valid(database) {
            return Ok(());
        }

        tracing::info!(db = %database, "provisioning database");
        // Name is regex-validated above; CREATE DATABASE takes no parameters.
        let statement = format!("CREATE DATABASE {database} IF NOT EXISTS");
        self.connector
            .run(&statement, "system", None)
            .await
            .map_err(|err| {
                Error::infrastructure(format!("database creation failed for '{database}': {err}"))
            })?;
        self.registry.register(database)?;
        tracing::info!(db = %database, "database registered");
        Ok(())
    }

    /// Merge nodes first, then relationships, all under validated labels.
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

        for node in &payload.nodes {
            let label = validate_label(&node.label)?;
            let mut properties = node.properties.clone();
            properties.insert("id".to_string(), json!(node.id));
            properties.insert("source_id".to_string(), json!(source_id));

            let statement = format!("MERGE (n:`{label}` {{id: $id}}) SET n += $props RETURN n");
            self.connector
                .run(
                    &statement,
                    database,
                    Some(json!({ "id": node.id, "props": properties })),
                )
                .await
                .map_err(|err| {
                    Error::pipeline(format!(
                        "graph loading failed for source '{source_id}': {err}"
                    ))
                })?;
        }

        for relationship in &payload.relationships {
            let rel_type = validate_label(&relationship.rel_type)?;
            let statement = format!(
                "MATCH (a {{id: $source_id}}), (b {{id: $target_id}}) \
                 MERGE (a)-[r:`{rel_type}`]->(b) SET r += $props RETURN r"
            );
            self.connector
                .run(
                    &statement,
                    database,
                    Some(json!({
                        "source_id": relationship.source,
                        "target_id": relationship.target,
                        "props": relationship.properties,
                    })),
                )
                .await
                .map_err(|err| {
                    Error::pipeline(format!(
                        "graph loading failed for source '{source_id}': {err}"
                    ))
                })?;
        }

        tracing::info!(db = %database, source = %source_id, nodes = payload.nodes.len(), "loaded graph");
        Ok(())
    }

    /// Human-readable schema summary from the catalog procedures.
    async fn schema_text(&self, database: &str) -> Result<String> {
        let labels = Self::collect_column(
            &self.connector.run("CALL db.labels()", database, None).await?,
            "label",
        );
        let rel_types = Self::collect_column(
            &self
                .connector
                .run("CALL db.relationshipTypes()", database, None)
                .await?,
            "relationshipType",
        );
        let property_keys = Self::collect_column(
            &self
                .connector
                .run("CALL db.propertyKeys()", database, None)
                .await?,
            "propertyKey",
        );

        Ok(format!(
            "Database: {database}\nNode Labels: {}\nRelationship Types: {}\nProperty Keys: {}",
            Self::join_or_none(&labels),
            Self::join_or_none(&rel_types),
            Self::join_or_none(&property_keys)
        ))
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#[cfg(test)]
mod tests {
    use super::*;
    use graphmind::graph::{Node, Relationship};
    use parking_lot::Mutex;

    /// Records every (query, database, params) triple.
    #[derive(Default)]
    struct RecordingConnector {
        calls: Mutex<Vec<(String, String, Option<Value>)>>,
    }

    #[async_trait]
    impl GraphConnector for RecordingConnector {
        async fn run(
            &self,
            query: &str,
            database: &str,
            params: Option<Value>,
        ) -> Result<Vec<JsonRow>> {
            self.calls
                .lock()
                .push((query.to_string(), database.to_string(), params));
            Ok(Vec::new())
        }
    }

    fn admin() -> (Neo4jAdmin, Arc<RecordingConnector>, Arc<DatabaseRegistry>) {
        let connector = Arc::new(RecordingConnector::default());
        let registry = Arc::new(DatabaseRegistry::new());
        (
            Neo4jAdmin::new(
                Arc::clone(&connector) as Arc<dyn GraphConnector>,
                Arc::clone(&registry),
            ),
            connector,
            registry,
        )
    }

    #[tokio::test]
    async fn test_provision_creates_via_system_and_registers() {
        let (admin, connector, registry) = admin();
        admin.provision_database("kgruntimec").await.unwrap();

        let calls = connector.calls.lock();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "CREATE DATABASE kgruntimec IF NOT EXISTS");
        assert_eq!(calls[0].1, "system");
        assert!(registry.is_valid("kgruntimec"));
    }

    #[tokio::test]
    async fn test_provision_skips_registered_database() {
        let (admin, connector, _) = admin();
        admin.provision_database("kgnormal").await.unwrap();
        assert!(connector.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_provision_rejects_invalid_name() {
        let (admin, connector, _) = admin();
        let err = admin.provision_database("bad name").await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(connector.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_load_graph_merges_nodes_then_relationships() {
        let (admin, connector, _) = admin();
        let payload = GraphPayload::new(
            vec![Node::new("a", "Company").with_property("name", json!("Acme"))],
            vec![Relationship::new("a", "a", "SELF")],
        );
        admin.load_graph("kgnormal", &payload, "src1").await.unwrap();

        let calls = connector.calls.lock();
        assert_eq!(calls.len(), 2);
        assert!(calls[0].0.contains("MERGE (n:`Company` {id: $id})"));
        let props = calls[0].2.as_ref().unwrap();
        assert_eq!(props["props"]["source_id"], "src1");
        assert_eq!(props["props"]["id"], "a");
        assert!(calls[1].0.contains("MERGE (a)-[r:`SELF`]->(b)"));
    }

    #[tokio::test]
    async fn test_load_graph_rejects_invalid_label() {
        let (admin, connector, _) = admin();
        let payload = GraphPayload::new(vec![Node::new("a", "evil`label")], vec![]);
        let err = admin.load_graph("kgnormal", &payload, "src").await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(connector.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_load_graph_rejects_unregistered_database() {
        let (admin, _, _) = admin();
        let payload = GraphPayload::default();
        assert!(admin.load_graph("nowhere", &payload, "src").await.is_err());
    }

    #[tokio::test]
    async fn test_schema_text_shape() {
        let (admin, _, _) = admin();
        let schema = admin.schema_text("kgnormal").await.unwrap();
        assert!(schema.starts_with("Database: kgnormal"));
        assert!(schema.contains("Node Labels: none"));
        assert!(schema.contains("Relationship Types: none"));
        assert!(schema.contains("Property Keys: none"));
    }
}
