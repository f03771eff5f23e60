//! Fulltext index discovery and bootstrap.
//!
//! Works against Neo4j-protocol-compatible engines whose catalog surface
//! varies: listing probes two catalog query shapes, creation tries the DDL
//! statement first and falls back to the legacy procedure, and either path is
//! verified by re-reading the catalog.

use crate::connector::{GraphConnector, JsonRow};
use crate::error::{Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

static IDENT_RE: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier regex is valid")
});

/// Whether `value` is a safe index/label/property identifier.
#[must_use]
pub fn is_valid_identifier(value: &str) -> bool {
    IDENT_RE.is_match(value)
}

/// Validate a list of identifiers, dropping blanks.
///
/// # Errors
///
/// Returns a validation error on any malformed identifier, or when nothing
/// valid remains.
pub fn validate_identifiers(values: &[String], field_name: &str) -> Result<Vec<String>> {
    let mut cleaned = Vec::new();
    for value in values {
        let ident = value.trim();
        if ident.is_empty() {
            continue;
        }
        if !is_valid_identifier(ident) {
            return Err(Error::validation(format!(
                "Invalid identifier '{ident}' in '{field_name}'. \
                 Use letters, digits, underscore; must not start with digit."
            )));
        }
        cleaned.push(ident.to_string());
    }
    if cleaned.is_empty() {
        return Err(Error::validation(format!(
            "'{field_name}' must contain at least one valid identifier"
        )));
    }
    Ok(cleaned)
}

/// Outcome of an ensure-index call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnsureIndexReport {
    pub database: String,
    pub index_name: String,
    pub exists: bool,
    pub created: bool,
    pub state: Option<String>,
    pub labels: Vec<String>,
    pub properties: Vec<String>,
    pub message: String,
}

/// Inspect and ensure fulltext indexes
pub struct FulltextIndexManager {
    connector: Arc<dyn GraphConnector>,
}

impl FulltextIndexManager {
    #[must_use]
    pub fn new(connector: Arc<dyn GraphConnector>) -> Self {
        Self { connector }
    }

    /// List fulltext indexes via two alternative catalog probes.
    pub async fn list(&self, database: &str) -> Vec<JsonRow> {
        let probes = [
            "SHOW FULLTEXT INDEXES \
             YIELD name, state, entityType, labelsOrTypes, properties \
             RETURN name, state, entityType, labelsOrTypes, properties",
            "SHOW INDEXES \
             YIELD name, type, state, entityType, labelsOrTypes, properties \
             WHERE type = 'FULLTEXT' \
             RETURN name, state, entityType, labelsOrTypes, properties",
        ];
        for probe in probes {
            if let Ok(rows) = self.connector.run(probe, database, None).await {
                if !rows.is_empty() {
                    return rows;
                }
            }
        }
        Vec::new()
    }

    /// Ensure `index_name` exists over `labels`/`properties`.
    ///
    /// # Errors
    ///
    /// Returns a validation error for malformed identifiers; creation
    /// failures are reported in the result, not raised.
    pub async fn ensure(
        &self,
        database: &str,
        index_name: &str,
        labels: &[String],
        properties: &[String],
        create_if_missing: bool,
    ) -> Result<EnsureIndexReport> {
        let index_name =
            validate_identifiers(&[index_name.to_string()], "index_name")?.remove(0);
        let safe_labels = validate_identifiers(labels, "labels")?;
        let safe_properties = validate_identifiers(properties, "properties")?;

        if let Some(row) = self.find_index(database, &index_name).await {
            return Ok(EnsureIndexReport {
                database: database.to_string(),
                index_name,
                exists: true,
                created: false,
                state: index_state(&row),
                labels: safe_labels,
                properties: safe_properties,
                message: "Index already exists.".to_string(),
            });
        }

        if !create_if_missing {
            return Ok(EnsureIndexReport {
                database: database.to_string(),
                index_name,
                exists: false,
                created: false,
                state: None,
                labels: safe_labels,
                properties: safe_properties,
                message: "Index not found.".to_string(),
            });
        }

        let (create_mode, create_error) = self
            .create_index(database, &index_name, &safe_labels, &safe_properties)
            .await;

        // Verify through the catalog regardless of which path ran.
        let matched = self.find_index(database, &index_name).await;
        if let Some(row) = matched {
            return Ok(EnsureIndexReport {
                database: database.to_string(),
                index_name,
                exists: true,
                created: true,
                state: index_state(&row),
                labels: safe_labels,
                properties: safe_properties,
                message: format!("Index created via {create_mode}."),
            });
        }

        let mut message = format!("Index creation attempted via {create_mode} but not visible.");
        if let Some(err) = create_error {
            message = format!("{message} Last error: {err}");
        }
        Ok(EnsureIndexReport {
            database: database.to_string(),
            index_name,
            exists: false,
            created: false,
            state: None,
            labels: safe_labels,
            properties: safe_properties,
            message,
        })
    }

    async fn find_index(&self, database: &str, index_name: &str) -> Option<JsonRow> {
        self.list(database)
            .await
            .into_iter()
            .find(|row| row.get("name").and_then(Value::as_str) == Some(index_name))
    }

    /// Try the DDL statement, then the legacy procedural create.
    async fn create_index(
        &self,
        database: &str,
        index_name: &str,
        labels: &[String],
        properties: &[String],
    ) -> (&'static str, Option<String>) {
        let label_expr = labels.join("|");
        let property_expr = properties
            .iter()
            .map(|property| format!("n.{property}"))
            .collect::<Vec<_>>()
            .join(", ");
        let ddl = format!(
            "CREATE FULLTEXT INDEX {index_name} IF NOT EXISTS \
             FOR (n:{label_expr}) ON EACH [{property_expr}]"
        );

        if self.connector.run(&ddl, database, None).await.is_ok() {
            return ("cypher_ddl", None);
        }

        let fallback = self
            .connector
            .run(
                "CALL db.index.fulltext.createNodeIndex($name, $labels, $properties)",
                database,
                Some(json!({
                    "name": index_name,
                    "labels": labels,
                    "properties": properties,
                })),
            )
            .await;
        match fallback {
            Ok(_) => ("procedure_fallback", None),
            Err(err) => ("procedure_fallback", Some(err.to_string())),
        }
    }
}

fn index_state(row: &JsonRow) -> Option<String> {
    row.get("state")
        .and_then(Value::as_str)
        .map(ToString::to_string)
}

#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    /// Catalog-simulating connector: tracks created indexes per database.
    struct CatalogConnector {
        indexes: Mutex<Vec<String>>,
        ddl_fails: bool,
        procedure_fails: bool,
    }

    impl CatalogConnector {
        fn empty() -> Self {
            Self {
                indexes: Mutex::new(Vec::new()),
                ddl_fails: false,
                procedure_fails: false,
            }
        }
    }

    #[async_trait]
    impl GraphConnector for CatalogConnector {
        async fn run(
            &self,
            query: &str,
            _database: &str,
            params: Option<Value>,
        ) -> Result<Vec<JsonRow>> {
            if query.starts_with("SHOW") {
                return Ok(self
                    .indexes
                    .lock()
                    .iter()
                    .map(|name| {
                        let mut row = JsonRow::new();
                        row.insert("name".to_string(), json!(name));
                        row.insert("state".to_string(), json!("ONLINE"));
                        row
                    })
                    .collect());
            }
            if query.starts_with("CREATE FULLTEXT INDEX") {
                if self.ddl_fails {
                    return Err(Error::pipeline("DDL unsupported"));
                }
                let name = query
                    .split_whitespace()
                    .nth(3)
                    .unwrap_or_default()
                    .to_string();
                self.indexes.lock().push(name);
                return Ok(Vec::new());
            }
            if query.starts_with("CALL db.index.fulltext.createNodeIndex") {
                if self.procedure_fails {
                    return Err(Error::pipeline("procedure missing"));
                }
                let name = params
                    .and_then(|p| p.get("name").and_then(Value::as_str).map(ToString::to_string))
                    .unwrap_or_default();
                self.indexes.lock().push(name);
                return Ok(Vec::new());
            }
            Ok(Vec::new())
        }
    }

    fn args() -> (Vec<String>, Vec<String>) {
        (
            vec!["Entity".to_string()],
            vec!["name".to_string(), "title".to_string()],
        )
    }

    #[tokio::test]
    async fn test_ensure_creates_then_reports_exists() {
        let manager = FulltextIndexManager::new(Arc::new(CatalogConnector::empty()));
        let (labels, properties) = args();

        let first = manager
            .ensure("kgnormal", "entity_fulltext", &labels, &properties, true)
            .await
            .unwrap();
        assert!(first.created);
        assert!(first.exists);
        assert_eq!(first.message, "Index created via cypher_ddl.");

        // Idempotence: the second call sees the existing index.
        let second = manager
            .ensure("kgnormal", "entity_fulltext", &labels, &properties, true)
            .await
            .unwrap();
        assert!(!second.created);
        assert!(second.exists);
        assert_eq!(second.state.as_deref(), Some("ONLINE"));
    }

    #[tokio::test]
    async fn test_ddl_failure_falls_back_to_procedure() {
        let connector = Arc::new(CatalogConnector {
            ddl_fails: true,
            ..CatalogConnector::empty()
        });
        let manager = FulltextIndexManager::new(connector);
        let (labels, properties) = args();
        let report = manager
            .ensure("kgnormal", "entity_fulltext", &labels, &properties, true)
            .await
            .unwrap();
        assert!(report.created);
        assert_eq!(report.message, "Index created via procedure_fallback.");
    }

    #[tokio::test]
    async fn test_both_paths_fail_reports_error() {
        let connector = Arc::new(CatalogConnector {
            ddl_fails: true,
            procedure_fails: true,
            ..CatalogConnector::empty()
        });
        let manager = FulltextIndexManager::new(connector);
        let (labels, properties) = args();
        let report = manager
            .ensure("kgnormal", "entity_fulltext", &labels, &properties, true)
            .await
            .unwrap();
        assert!(!report.created);
        assert!(!report.exists);
        assert!(report.message.contains("not visible"));
        assert!(report.message.contains("Last error"));
    }

    #[tokio::test]
    async fn test_no_create_when_disabled() {
        let manager = FulltextIndexManager::new(Arc::new(CatalogConnector::empty()));
        let (labels, properties) = args();
        let report = manager
            .ensure("kgnormal", "entity_fulltext", &labels, &properties, false)
            .await
            .unwrap();
        assert!(!report.exists);
        assert_eq!(report.message, "Index not found.");
    }

    #[tokio::test]
    async fn test_identifier_validation() {
        let manager = FulltextIndexManager::new(Arc::new(CatalogConnector::empty()));
        let (labels, properties) = args();
        let err = manager
            .ensure("kgnormal", "bad index", &labels, &properties, true)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_validate_identifiers_filters_blanks() {
        let cleaned = validate_identifiers(
            &["name".to_string(), "  ".to_string(), "title".to_string()],
            "properties",
        )
        .unwrap();
        assert_eq!(cleaned, vec!["name", "title"]);

        assert!(validate_identifiers(&["  ".to_string()], "properties").is_err());
        assert!(validate_identifiers(&["9bad".to_string()], "labels").is_err());
    }
}
