//! Mock JSON chat model.

use async_trait::async_trait;
use graphmind::error::{Error, Result};
use graphmind::language_models::JsonChatModel;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::time::Duration;

type Handler = Box<dyn Fn(&str, &str) -> Result<Value> + Send + Sync>;

/// Scripted chat model for tests and the server's LM mock mode.
///
/// Responses come either from a FIFO queue or from a handler inspecting the
/// prompts. An optional latency is applied before every response, which makes
/// deadline behavior testable.
pub struct MockJsonChatModel {
    queue: Mutex<Vec<Value>>,
    handler: Option<Handler>,
    latency: Option<Duration>,
    calls: Mutex<Vec<(String, String)>>,
}

impl MockJsonChatModel {
    /// Model answering `{}` to everything.
    #[must_use]
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(Vec::new()),
            handler: None,
            latency: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Model returning the given responses in order, then `{}`.
    #[must_use]
    pub fn with_responses(responses: Vec<Value>) -> Self {
        Self {
            queue: Mutex::new(responses),
            ..Self::new()
        }
    }

    /// Model delegating every completion to `handler`.
    #[must_use]
    pub fn with_handler<F>(handler: F) -> Self
    where
        F: Fn(&str, &str) -> Result<Value> + Send + Sync + 'static,
    {
        Self {
            handler: Some(Box::new(handler)),
            ..Self::new()
        }
    }

    /// Model failing every completion with an infrastructure error.
    #[must_use]
    pub fn failing(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::with_handler(move |_, _| Err(Error::infrastructure(message.clone())))
    }

    /// Sleep this long before answering each completion.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// All `(system, user)` prompt pairs seen so far.
    #[must_use]
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().clone()
    }

    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

impl Default for MockJsonChatModel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JsonChatModel for MockJsonChatModel {
    async fn complete_json(&self, system: &str, user: &str) -> Result<Value> {
        self.calls
            .lock()
            .push((system.to_string(), user.to_string()));
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if let Some(handler) = &self.handler {
            return handler(system, user);
        }
        let mut queue = self.queue.lock();
        if queue.is_empty() {
            Ok(json!({}))
        } else {
            Ok(queue.remove(0))
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_queue_then_empty_object() {
        let model = MockJsonChatModel::with_responses(vec![json!({"a": 1})]);
        assert_eq!(model.complete_json("s", "u").await.unwrap(), json!({"a": 1}));
        assert_eq!(model.complete_json("s", "u").await.unwrap(), json!({}));
        assert_eq!(model.call_count(), 2);
    }

    #[tokio::test]
    async fn test_handler_sees_prompts() {
        let model = MockJsonChatModel::with_handler(|system, _| {
            Ok(json!({"echo": system.to_string()}))
        });
        let value = model.complete_json("sys", "usr").await.unwrap();
        assert_eq!(value["echo"], "sys");
    }

    #[tokio::test]
    async fn test_failing_model() {
        let model = MockJsonChatModel::failing("down");
        let err = model.complete_json("s", "u").await.unwrap_err();
        assert!(err.is_transient());
    }
}
