//! Service entry point.

use graphmind::config::ServiceConfig;
use graphmind::connector::{GraphConnector, GraphStoreAdmin};
use graphmind::error::Result;
use graphmind::language_models::{Embeddings, JsonChatModel};
use graphmind::registry::DatabaseRegistry;
use graphmind_neo4j::{Neo4jAdmin, Neo4jConnector};
use graphmind_openai::{OpenAIEmbeddings, OpenAIJsonChat};
use graphmind_server::state::AppState;
use graphmind_testing::{MockEmbeddings, MockJsonChatModel};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ServiceConfig::from_env();
    config.validate()?;

    let registry = Arc::new(DatabaseRegistry::new());
    let connector: Arc<dyn GraphConnector> = Arc::new(
        Neo4jConnector::connect(
            &config.graph_uri,
            &config.graph_user,
            &config.graph_password,
            Arc::clone(&registry),
        )
        .await?,
    );
    let admin: Arc<dyn GraphStoreAdmin> = Arc::new(Neo4jAdmin::new(
        Arc::clone(&connector),
        Arc::clone(&registry),
    ));

    let (chat_model, embeddings): (Arc<dyn JsonChatModel>, Arc<dyn Embeddings>) =
        if config.mock_language_model {
            tracing::warn!("LM mock mode enabled; completions are canned");
            (
                Arc::new(MockJsonChatModel::new()),
                Arc::new(MockEmbeddings::new()),
            )
        } else {
            (
                Arc::new(OpenAIJsonChat::new(
                    config.openai_api_key.clone(),
                    config.openai_model.clone(),
                )),
                Arc::new(OpenAIEmbeddings::new(config.openai_api_key.clone())),
            )
        };

    let state = Arc::new(AppState::new(
        config,
        registry,
        connector,
        admin,
        chat_model,
        embeddings,
    ));
    let app = graphmind_server::build_router(state);

    let listener = tokio::net::TcpListener::bind("0.0.0.0:8000")
        .await
        .map_err(|err| graphmind::Error::infrastructure(format!("bind failed: {err}")))?;
    tracing::info!("listening on 0.0.0.0:8000");
    axum::serve(listener, app)
        .await
        .map_err(|err| graphmind::Error::infrastructure(format!("server failed: {err}")))?;
    Ok(())
}
