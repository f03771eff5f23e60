//! Lazy provisioning of per-database workers.
//!
//! Workers are created on demand for every user database in the registry. A
//! database whose schema fetch fails is marked degraded and excluded from the
//! debate; when nothing is ready the debate state is blocked and the caller
//! may fall back to the semantic flow.

use crate::connector::{GraphConnector, GraphStoreAdmin};
use crate::language_models::JsonChatModel;
use crate::registry::DatabaseRegistry;
use crate::worker::SpecialistWorker;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Debate readiness
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DebateState {
    Ready,
    Degraded,
    Blocked,
}

/// Per-database provisioning status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerStatus {
    pub database: String,
    pub status: String,
    pub reason: String,
}

/// Aggregated readiness over all provisioning statuses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessSummary {
    pub debate_state: DebateState,
    pub degraded: bool,
    pub ready_count: usize,
    pub degraded_count: usize,
    pub total_count: usize,
}

/// Summarize provisioning statuses into a debate state.
#[must_use]
pub fn summarize_readiness(statuses: &[WorkerStatus]) -> ReadinessSummary {
    let total_count = statuses.len();
    let ready_count = statuses.iter().filter(|s| s.status == "ready").count();
    let degraded_count = total_count.saturating_sub(ready_count);

    let debate_state = if ready_count == 0 {
        DebateState::Blocked
    } else if degraded_count > 0 {
        DebateState::Degraded
    } else {
        DebateState::Ready
    };

    ReadinessSummary {
        debate_state,
        degraded: debate_state != DebateState::Ready,
        ready_count,
        degraded_count,
        total_count,
    }
}

/// Creates and caches per-database specialist workers
pub struct WorkerFactory {
    connector: Arc<dyn GraphConnector>,
    admin: Arc<dyn GraphStoreAdmin>,
    chat_model: Arc<dyn JsonChatModel>,
    workers: Mutex<HashMap<String, Arc<SpecialistWorker>>>,
}

impl WorkerFactory {
    #[must_use]
    pub fn new(
        connector: Arc<dyn GraphConnector>,
        admin: Arc<dyn GraphStoreAdmin>,
        chat_model: Arc<dyn JsonChatModel>,
    ) -> Self {
        Self {
            connector,
            admin,
            chat_model,
            workers: Mutex::new(HashMap::new()),
        }
    }

    /// Provision workers for every user database in the registry.
    ///
    /// Databases whose schema fetch fails are skipped with a degraded status;
    /// already-provisioned workers report ready/cached.
    pub async fn provision_for_registry(&self, registry: &DatabaseRegistry) -> Vec<WorkerStatus> {
        let mut statuses = Vec::new();
        for db_name in registry.list_user_databases() {
            if self.workers.lock().contains_key(&db_name) {
                statuses.push(WorkerStatus {
                    database: db_name,
                    status: "ready".to_string(),
                    reason: "cached".to_string(),
                });
                continue;
            }

            match self.admin.schema_text(&db_name).await {
                Ok(schema) => {
                    let worker = Arc::new(SpecialistWorker::new(
                        &db_name,
                        schema,
                        Arc::clone(&self.connector),
                        Arc::clone(&self.chat_model),
                    ));
                    self.workers.lock().insert(db_name.clone(), worker);
                    tracing::info!(db = %db_name, "provisioned worker");
                    statuses.push(WorkerStatus {
                        database: db_name,
                        status: "ready".to_string(),
                        reason: "created".to_string(),
                    });
                }
                Err(err) => {
                    tracing::warn!(db = %db_name, error = %err, "schema fetch failed, worker degraded");
                    statuses.push(WorkerStatus {
                        database: db_name,
                        status: "degraded".to_string(),
                        reason: err.to_string(),
                    });
                }
            }
        }
        statuses
    }

    /// All provisioned workers, ordered by database name.
    #[must_use]
    pub fn all_workers(&self) -> Vec<(String, Arc<SpecialistWorker>)> {
        let mut workers: Vec<(String, Arc<SpecialistWorker>)> = self
            .workers
            .lock()
            .iter()
            .map(|(db, worker)| (db.clone(), Arc::clone(worker)))
            .collect();
        workers.sort_by(|a, b| a.0.cmp(&b.0));
        workers
    }

    /// Database names with a provisioned worker, sorted.
    #[must_use]
    pub fn list_worker_databases(&self) -> Vec<String> {
        self.all_workers().into_iter().map(|(db, _)| db).collect()
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::JsonRow;
    use crate::error::{Error, Result};
    use crate::graph::GraphPayload;
    use async_trait::async_trait;
    use serde_json::Value;

    struct NullConnector;

    #[async_trait]
    impl GraphConnector for NullConnector {
        async fn run(&self, _: &str, _: &str, _: Option<Value>) -> Result<Vec<JsonRow>> {
            Ok(Vec::new())
        }
    }

    struct NullChat;

    #[async_trait]
    impl JsonChatModel for NullChat {
        async fn complete_json(&self, _: &str, _: &str) -> Result<Value> {
            Ok(Value::Null)
        }
    }

    /// Admin whose schema fetch fails for one named database.
    struct FlakySchemaAdmin {
        failing_db: &'static str,
    }

    #[async_trait]
    impl GraphStoreAdmin for FlakySchemaAdmin {
        async fn provision_database(&self, _: &str) -> Result<()> {
            Ok(())
        }

        async fn load_graph(&self, _: &str, _: &GraphPayload, _: &str) -> Result<()> {
            Ok(())
        }

        async fn schema_text(&self, database: &str) -> Result<String> {
            if database == self.failing_db {
                Err(Error::infrastructure("schema probe timed out"))
            } else {
                Ok(format!("Database: {database}"))
            }
        }
    }

    fn factory(failing_db: &'static str) -> WorkerFactory {
        WorkerFactory::new(
            Arc::new(NullConnector),
            Arc::new(FlakySchemaAdmin { failing_db }),
            Arc::new(NullChat),
        )
    }

    #[tokio::test]
    async fn test_provision_marks_degraded_and_excludes() {
        let registry = DatabaseRegistry::new();
        let factory = factory("kgfibo");
        let statuses = factory.provision_for_registry(&registry).await;

        let fibo = statuses.iter().find(|s| s.database == "kgfibo").unwrap();
        assert_eq!(fibo.status, "degraded");
        assert!(!factory.list_worker_databases().contains(&"kgfibo".to_string()));
        assert!(factory.list_worker_databases().contains(&"kgnormal".to_string()));
    }

    #[tokio::test]
    async fn test_second_provision_reports_cached() {
        let registry = DatabaseRegistry::new();
        let factory = factory("nonexistent");
        factory.provision_for_registry(&registry).await;
        let statuses = factory.provision_for_registry(&registry).await;
        assert!(statuses.iter().all(|s| s.reason == "cached"));
    }

    #[tokio::test]
    async fn test_workers_ordered_by_database() {
        let registry = DatabaseRegistry::new();
        registry.register("aaafirst").unwrap();
        let factory = factory("nonexistent");
        factory.provision_for_registry(&registry).await;
        let databases = factory.list_worker_databases();
        let mut sorted = databases.clone();
        sorted.sort();
        assert_eq!(databases, sorted);
    }

    #[test]
    fn test_summarize_readiness_states() {
        let status = |database: &str, status: &str| WorkerStatus {
            database: database.to_string(),
            status: status.to_string(),
            reason: String::new(),
        };

        let all_ready = summarize_readiness(&[status("a", "ready"), status("b", "ready")]);
        assert_eq!(all_ready.debate_state, DebateState::Ready);
        assert!(!all_ready.degraded);

        let partial = summarize_readiness(&[status("a", "ready"), status("b", "degraded")]);
        assert_eq!(partial.debate_state, DebateState::Degraded);
        assert_eq!(partial.ready_count, 1);

        let blocked = summarize_readiness(&[status("a", "degraded")]);
        assert_eq!(blocked.debate_state, DebateState::Blocked);

        let empty = summarize_readiness(&[]);
        assert_eq!(empty.debate_state, DebateState::Blocked);
    }
}
