//! Bolt-protocol connector.

use async_trait::async_trait;
use graphmind::connector::{GraphConnector, JsonRow};
use graphmind::error::{Error, Result};
use graphmind::registry::DatabaseRegistry;
use graphmind::retry::{with_retry, RetryPolicy};
use neo4rs::{BoltNull, BoltType, Graph, Query};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Pooled bolt connection executing queries against named databases
pub struct Neo4jConnector {
    graph: Graph,
    registry: Arc<DatabaseRegistry>,
    retry_policy: RetryPolicy,
}

impl Neo4jConnector {
    /// Connect to the graph engine.
    ///
    /// # Errors
    ///
    /// Returns an infrastructure error when the driver cannot reach the
    /// endpoint.
    pub async fn connect(
        uri: &str,
        user: &str,
        password: &str,
        registry: Arc<DatabaseRegistry>,
    ) -> Result<Self> {
        let graph = Graph::new(uri, user, password)
            .await
            .map_err(|err| Error::infrastructure(format!("failed to connect to graph store: {err}")))?;
        Ok(Self {
            graph,
            registry,
            retry_policy: RetryPolicy::for_graph_store(),
        })
    }

    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    fn build_query(query: &str, params: Option<&Value>) -> Query {
        let mut built = Query::new(query.to_string());
        if let Some(Value::Object(map)) = params {
            for (key, value) in map {
                built = built.param(key, json_to_bolt(value.clone()));
            }
        }
        built
    }
}

#[async_trait]
impl GraphConnector for Neo4jConnector {
    async fn run(
        &self,
        query: &str,
        database: &str,
        params: Option<Value>,
    ) -> Result<Vec<JsonRow>> {
        // Unregistered databases are rejected without contacting the backend.
        if !self.registry.is_valid(database) {
            return Err(Error::validation(format!(
                "Invalid database '{database}'. Valid options: {:?}",
                self.registry.list_user_databases()
            )));
        }

        with_retry(&self.retry_policy, || async {
            let mut stream = self
                .graph
                .execute_on(database, Self::build_query(query, params.as_ref()))
                .await
                .map_err(|err| map_driver_error("query failed", &err))?;

            let mut rows = Vec::new();
            while let Some(row) = stream
                .next()
                .await
                .map_err(|err| map_driver_error("failed to read result row", &err))?
            {
                let decoded: JsonRow = row
                    .to()
                    .map_err(|err| Error::pipeline(format!("failed to decode row: {err}")))?;
                rows.push(decoded);
            }
            Ok(rows)
        })
        .await
    }
}

/// Transient driver failures (connectivity, timeouts) become infrastructure
/// errors; data and syntax errors pass through as non-retryable.
fn map_driver_error(context: &str, err: &neo4rs::Error) -> Error {
    let text = err.to_string();
    if is_transient_message(&text) {
        Error::infrastructure(format!("{context}: {text}"))
    } else {
        Error::pipeline(format!("{context}: {text}"))
    }
}

fn is_transient_message(text: &str) -> bool {
    let lowered = text.to_lowercase();
    lowered.contains("connection")
        || lowered.contains("timed out")
        || lowered.contains("timeout")
        || lowered.contains("io error")
        || lowered.contains("session expired")
        || lowered.contains("unavailable")
}

fn json_to_bolt(value: Value) -> BoltType {
    match value {
        Value::Null => BoltType::Null(BoltNull),
        Value::Bool(flag) => BoltType::from(flag),
        Value::Number(number) => number.as_i64().map_or_else(
            || BoltType::from(number.as_f64().unwrap_or(0.0)),
            BoltType::from,
        ),
        Value::String(text) => BoltType::from(text),
        Value::Array(items) => {
            BoltType::from(items.into_iter().map(json_to_bolt).collect::<Vec<_>>())
        }
        Value::Object(map) => BoltType::from(
            map.into_iter()
                .map(|(key, value)| (key, json_to_bolt(value)))
                .collect::<HashMap<String, BoltType>>(),
        ),
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // ============================================================
    // Error Mapping Tests
    // ============================================================

    #[test]
    fn test_connection_messages_are_transient() {
        assert!(is_transient_message("Connection reset by peer"));
        assert!(is_transient_message("session expired"));
        assert!(is_transient_message("request timed out"));
        assert!(is_transient_message("server unavailable"));
    }

    #[test]
    fn test_syntax_messages_are_not_transient() {
        assert!(!is_transient_message("Invalid input 'MTCH'"));
        assert!(!is_transient_message("unknown function"));
    }

    #[test]
    fn test_map_driver_error_keeps_context() {
        let err = map_driver_error("query failed", &neo4rs::Error::ConnectionError);
        assert!(err.is_transient());
        assert!(err.to_string().contains("query failed"));
    }

    // ============================================================
    // Parameter Conversion Tests
    // ============================================================

    #[test]
    fn test_json_to_bolt_scalars() {
        assert!(matches!(json_to_bolt(json!(null)), BoltType::Null(_)));
        assert!(matches!(json_to_bolt(json!(true)), BoltType::Boolean(_)));
        assert!(matches!(json_to_bolt(json!(7)), BoltType::Integer(_)));
        assert!(matches!(json_to_bolt(json!(1.5)), BoltType::Float(_)));
        assert!(matches!(json_to_bolt(json!("x")), BoltType::String(_)));
    }

    #[test]
    fn test_json_to_bolt_collections() {
        assert!(matches!(json_to_bolt(json!([1, 2])), BoltType::List(_)));
        assert!(matches!(json_to_bolt(json!({"a": 1})), BoltType::Map(_)));
    }

    // ============================================================
    // Query Construction Tests
    // ============================================================

    #[test]
    fn test_build_query_without_params() {
        let _query = Neo4jConnector::build_query("MATCH (n) RETURN n", None);
    }

    #[test]
    fn test_build_query_with_params() {
        let params = json!({"limit": 5, "query": "Neo4j"});
        let _query = Neo4jConnector::build_query(
            "CALL db.index.fulltext.queryNodes($index_name, $query)",
            Some(&params),
        );
    }

    // Integration tests against a live instance live in tests/ and are
    // gated behind #[ignore].
}
