//! Language-model traits.
//!
//! Two capabilities, each behind its own trait so integrations can provide
//! either or both: structured JSON completion and text embedding. Retry is the
//! implementation's responsibility (see [`crate::retry`]); callers treat the
//! client as idempotent.

use crate::error::Result;
use async_trait::async_trait;
use serde_json::Value;

/// Structured JSON completion.
#[async_trait]
pub trait JsonChatModel: Send + Sync {
    /// Complete with a system and user message, returning a JSON object.
    ///
    /// Implementations must request a JSON response format from the provider
    /// and surface unparseable output as a non-retryable parse error.
    async fn complete_json(&self, system: &str, user: &str) -> Result<Value>;
}

/// Text embedding.
#[async_trait]
pub trait Embeddings: Send + Sync {
    /// Embed a single text into a dense vector.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>>;
}

/// Cosine similarity between two vectors; 0.0 when either norm is zero.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, clippy::float_cmp)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_identical_vectors() {
        let v = vec![0.5, 0.5, 0.7];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal_vectors() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
    }

    #[test]
    fn test_cosine_zero_norm_is_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn test_cosine_mismatched_lengths() {
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_cosine_opposite_vectors() {
        let sim = cosine_similarity(&[1.0, 2.0], &[-1.0, -2.0]);
        assert!((sim + 1.0).abs() < 1e-6);
    }
}
