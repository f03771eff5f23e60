//! Graph connector and admin traits.
//!
//! Generic interfaces over the graph database: query execution scoped to a
//! named database, and the administrative operations (provisioning, loading,
//! schema introspection) the ingest path needs. Implementations must be safe
//! for concurrent use by many workers.
//!
//! # Security Note
//!
//! Connectors execute arbitrary query strings. Database credentials should be
//! narrowly scoped, and every database name must be validated against the
//! registry before a session is opened.

use crate::error::Result;
use crate::graph::GraphPayload;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;

/// A single result row as a JSON object
pub type JsonRow = HashMap<String, Value>;

/// Execute queries against a named database.
#[async_trait]
pub trait GraphConnector: Send + Sync {
    /// Run a query against `database`, returning JSON-encoded rows.
    ///
    /// Implementations must reject databases that are not in the registry
    /// without contacting the backend, and must surface transient backend
    /// failures as infrastructure errors so the retry layer can distinguish
    /// them from data/syntax errors.
    async fn run(
        &self,
        query: &str,
        database: &str,
        params: Option<Value>,
    ) -> Result<Vec<JsonRow>>;
}

/// Administrative operations used by provisioning and ingest.
#[async_trait]
pub trait GraphStoreAdmin: Send + Sync {
    /// Create `database` if missing, then register it.
    async fn provision_database(&self, database: &str) -> Result<()>;

    /// Load a graph payload into `database` tagged with `source_id`.
    async fn load_graph(
        &self,
        database: &str,
        payload: &GraphPayload,
        source_id: &str,
    ) -> Result<()>;

    /// Human-readable schema summary for prompt context.
    async fn schema_text(&self, database: &str) -> Result<String>;
}

/// Serialize rows for caching and prompt context.
#[must_use]
pub fn rows_to_json(rows: &[JsonRow]) -> String {
    serde_json::to_string(rows).unwrap_or_else(|_| "[]".to_string())
}

/// Parse a cached row payload back into rows. Non-array payloads yield an
/// empty row set rather than an error.
#[must_use]
pub fn rows_from_json(raw: &str) -> Vec<JsonRow> {
    serde_json::from_str(raw).unwrap_or_default()
}

#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_rows_roundtrip() {
        let mut row = JsonRow::new();
        row.insert("name".to_string(), json!("Acme"));
        row.insert("count".to_string(), json!(3));
        let encoded = rows_to_json(&[row.clone()]);
        let decoded = rows_from_json(&encoded);
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0], row);
    }

    #[test]
    fn test_rows_from_json_tolerates_garbage() {
        assert!(rows_from_json("not json").is_empty());
        assert!(rows_from_json("{\"a\":1}").is_empty());
        assert!(rows_from_json("[]").is_empty());
    }
}
