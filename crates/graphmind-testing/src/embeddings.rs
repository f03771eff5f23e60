//! Mock embeddings.

use async_trait::async_trait;
use graphmind::error::Result;
use graphmind::language_models::Embeddings;
use parking_lot::Mutex;
use std::collections::HashMap;

const DIMENSIONS: usize = 16;

/// Deterministic embeddings: the same text always maps to the same unit
/// vector, distinct texts land far apart with high probability. Specific
/// texts can be pinned to explicit vectors to script similarity outcomes.
pub struct MockEmbeddings {
    pinned: Mutex<HashMap<String, Vec<f32>>>,
}

impl MockEmbeddings {
    #[must_use]
    pub fn new() -> Self {
        Self {
            pinned: Mutex::new(HashMap::new()),
        }
    }

    /// Pin `text` to an explicit vector.
    #[must_use]
    pub fn with_pinned(self, text: impl Into<String>, vector: Vec<f32>) -> Self {
        self.pinned.lock().insert(text.into(), vector);
        self
    }

    fn hash_vector(text: &str) -> Vec<f32> {
        let mut vector = vec![0.0_f32; DIMENSIONS];
        let mut state: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in text.bytes() {
            state ^= u64::from(byte);
            state = state.wrapping_mul(0x0100_0000_01b3);
            let slot = (state % DIMENSIONS as u64) as usize;
            vector[slot] += 1.0;
        }
        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut vector {
                *value /= norm;
            }
        }
        vector
    }
}

impl Default for MockEmbeddings {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Embeddings for MockEmbeddings {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        if let Some(vector) = self.pinned.lock().get(text) {
            return Ok(vector.clone());
        }
        Ok(Self::hash_vector(text))
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#[cfg(test)]
mod tests {
    use super::*;
    use graphmind::language_models::cosine_similarity;

    #[tokio::test]
    async fn test_same_text_same_vector() {
        let embeddings = MockEmbeddings::new();
        let first = embeddings.embed_query("Acme Corp").await.unwrap();
        let second = embeddings.embed_query("Acme Corp").await.unwrap();
        assert_eq!(first, second);
        assert!((cosine_similarity(&first, &second) - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_pinned_vector_wins() {
        let embeddings = MockEmbeddings::new().with_pinned("special", vec![1.0, 0.0]);
        assert_eq!(embeddings.embed_query("special").await.unwrap(), vec![1.0, 0.0]);
    }

    #[tokio::test]
    async fn test_vectors_are_normalized() {
        let embeddings = MockEmbeddings::new();
        let vector = embeddings.embed_query("anything at all").await.unwrap();
        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }
}
