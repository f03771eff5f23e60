//! # GraphMind OpenAI Integration
//!
//! [`JsonChatModel`](graphmind::language_models::JsonChatModel) and
//! [`Embeddings`](graphmind::language_models::Embeddings) implementations over
//! the `OpenAI` API.
//!
//! Both clients request strict JSON output where applicable and wrap calls in
//! the language-model retry policy: three attempts with exponential backoff
//! and jitter, retrying transient provider failures only. Parse and policy
//! errors are never retried.
//!
//! ## Example
//!
//! ```rust,no_run
//! use graphmind_openai::OpenAIJsonChat;
//! use graphmind::language_models::JsonChatModel;
//!
//! # async fn example() -> graphmind::Result<()> {
//! let chat = OpenAIJsonChat::new("sk-...", "gpt-4o-mini");
//! let payload = chat
//!     .complete_json("Return strict JSON.", "{\"ping\": true}?")
//!     .await?;
//! # Ok(())
//! # }
//! ```

mod chat;
mod embeddings;

pub use chat::OpenAIJsonChat;
pub use embeddings::OpenAIEmbeddings;

use graphmind::error::Error;

/// Map provider errors onto GraphMind error kinds.
///
/// Network failures and server-side errors are transient (retried); malformed
/// requests and quota/policy rejections are not.
pub(crate) fn map_openai_error(context: &str, err: &async_openai::error::OpenAIError) -> Error {
    use async_openai::error::OpenAIError;
    match err {
        OpenAIError::Reqwest(inner) => {
            Error::infrastructure(format!("{context}: transport error: {inner}"))
        }
        OpenAIError::ApiError(api) => {
            let kind = api.r#type.as_deref().unwrap_or_default();
            if kind == "invalid_request_error" || kind == "insufficient_quota" {
                Error::pipeline(format!("{context}: {}", api.message))
            } else {
                Error::infrastructure(format!("{context}: {}", api.message))
            }
        }
        OpenAIError::JSONDeserialize(inner) => {
            Error::parse(format!("{context}: response decode failed: {inner}"))
        }
        other => Error::pipeline(format!("{context}: {other}")),
    }
}
