//! `OpenAI` embeddings.

use crate::map_openai_error;
use async_openai::{
    config::OpenAIConfig,
    types::{CreateEmbeddingRequestArgs, EmbeddingInput},
    Client,
};
use async_trait::async_trait;
use graphmind::error::{Error, Result};
use graphmind::language_models::Embeddings;
use graphmind::retry::{with_retry, RetryPolicy};

/// `OpenAI` embedding model integration
pub struct OpenAIEmbeddings {
    client: Client<OpenAIConfig>,
    model: String,
    retry_policy: RetryPolicy,
}

impl OpenAIEmbeddings {
    /// Client for `text-embedding-3-small` authenticated with `api_key`.
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        let config = OpenAIConfig::new().with_api_key(api_key.into());
        Self {
            client: Client::with_config(config),
            model: "text-embedding-3-small".to_string(),
            retry_policy: RetryPolicy::for_language_models(),
        }
    }

    /// Override the embedding model.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Override the retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl Embeddings for OpenAIEmbeddings {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        // Newlines degrade embedding quality on these models.
        let cleaned = text.replace('\n', " ");
        let request = CreateEmbeddingRequestArgs::default()
            .model(&self.model)
            .input(EmbeddingInput::String(cleaned))
            .build()
            .map_err(|err| Error::internal(format!("failed to build embedding request: {err}")))?;

        let response = with_retry(&self.retry_policy, || async {
            self.client
                .embeddings()
                .create(request.clone())
                .await
                .map_err(|err| map_openai_error("embedding", &err))
        })
        .await?;

        response
            .data
            .into_iter()
            .next()
            .map(|data| data.embedding)
            .ok_or_else(|| Error::parse("no embedding returned"))
    }
}
