//! Shared application state.

use graphmind::config::ServiceConfig;
use graphmind::connector::{GraphConnector, GraphStoreAdmin};
use graphmind::debate::{DebateOutcome, DebateOrchestrator};
use graphmind::dedup::EntityDeduplicator;
use graphmind::error::Result;
use graphmind::factory::WorkerFactory;
use graphmind::fulltext::FulltextIndexManager;
use graphmind::hints::OntologyHintStore;
use graphmind::ingest::RuntimeIngestor;
use graphmind::language_models::{Embeddings, JsonChatModel};
use graphmind::memory::SharedMemory;
use graphmind::policy::RuntimePolicyEngine;
use graphmind::registry::DatabaseRegistry;
use graphmind::semantic_flow::SemanticQueryFlow;
use graphmind::session::SessionStore;
use graphmind::stores::{RuleProfileStore, SemanticArtifactStore};
use std::path::Path;
use std::sync::Arc;

/// Everything the handlers need, shared behind an `Arc`
pub struct AppState {
    pub config: ServiceConfig,
    pub registry: Arc<DatabaseRegistry>,
    pub connector: Arc<dyn GraphConnector>,
    pub admin: Arc<dyn GraphStoreAdmin>,
    pub chat_model: Arc<dyn JsonChatModel>,
    pub factory: Arc<WorkerFactory>,
    pub semantic_flow: Arc<SemanticQueryFlow>,
    pub ingestor: Arc<RuntimeIngestor>,
    pub sessions: Arc<SessionStore>,
    pub policy: Arc<RuntimePolicyEngine>,
    pub rule_profiles: Arc<RuleProfileStore>,
    pub artifacts: Arc<SemanticArtifactStore>,
    pub fulltext: Arc<FulltextIndexManager>,
}

impl AppState {
    /// Wire up the service from its integration seams.
    #[must_use]
    pub fn new(
        config: ServiceConfig,
        registry: Arc<DatabaseRegistry>,
        connector: Arc<dyn GraphConnector>,
        admin: Arc<dyn GraphStoreAdmin>,
        chat_model: Arc<dyn JsonChatModel>,
        embeddings: Arc<dyn Embeddings>,
    ) -> Self {
        let hint_store = Arc::new(OntologyHintStore::load(Path::new(
            &config.ontology_hints_path,
        )));
        let factory = Arc::new(WorkerFactory::new(
            Arc::clone(&connector),
            Arc::clone(&admin),
            Arc::clone(&chat_model),
        ));
        let semantic_flow = Arc::new(SemanticQueryFlow::new(
            Arc::clone(&connector),
            hint_store,
        ));
        let ingestor = Arc::new(
            RuntimeIngestor::new(
                Arc::clone(&connector),
                Arc::clone(&admin),
                Arc::clone(&chat_model),
            )
            .with_deduplicator(Arc::new(EntityDeduplicator::new(embeddings)))
            .with_relatedness_threshold(config.relatedness_threshold),
        );
        let rule_profiles = Arc::new(RuleProfileStore::new(&config.rule_profile_dir));
        let artifacts = Arc::new(SemanticArtifactStore::new(&config.semantic_artifact_dir));
        let fulltext = Arc::new(FulltextIndexManager::new(Arc::clone(&connector)));

        Self {
            config,
            registry,
            connector,
            admin,
            chat_model,
            factory,
            semantic_flow,
            ingestor,
            sessions: Arc::new(SessionStore::new()),
            policy: Arc::new(RuntimePolicyEngine::new()),
            rule_profiles,
            artifacts,
            fulltext,
        }
    }

    /// Provision workers for every registered database and run a debate.
    ///
    /// # Errors
    ///
    /// Propagates supervisor-synthesis failures; worker failures are folded
    /// into the outcome as error-typed results.
    pub async fn run_debate(&self, query: &str) -> Result<DebateOutcome> {
        let statuses = self.factory.provision_for_registry(&self.registry).await;
        let workers = self.factory.all_workers();
        let shared_memory = Arc::new(SharedMemory::new());
        let orchestrator =
            DebateOrchestrator::new(workers, Arc::clone(&self.chat_model), shared_memory)
                .with_agent_statuses(statuses);
        orchestrator.run(query).await
    }

    /// Databases the semantic flow should consult when none were requested.
    #[must_use]
    pub fn default_databases(&self) -> Vec<String> {
        self.registry.list_user_databases()
    }
}
