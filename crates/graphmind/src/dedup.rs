//! Embedding-similarity entity deduplication.
//!
//! Detects semantic duplicates ("SpaceX" vs "Space Exploration Technologies
//! Corp") and merges them under a canonical id. The canonical-embedding table
//! is bounded; the oldest canonical entry is evicted on overflow.

use crate::error::Result;
use crate::graph::{GraphPayload, Node, Relationship};
use crate::language_models::{cosine_similarity, Embeddings};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

/// Default cosine-similarity threshold for a merge.
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.92;

/// Default bound on the canonical-embedding table.
pub const DEFAULT_CANONICAL_CAPACITY: usize = 2048;

#[derive(Default)]
struct DedupState {
    /// entity name -> canonical id
    canonical_map: HashMap<String, String>,
    /// merged-away node id -> canonical id (for relationship remapping)
    id_aliases: HashMap<String, String>,
    /// canonical id -> embedding, oldest first
    canonical_embeddings: VecDeque<(String, Vec<f32>)>,
}

/// Embedding-similarity based entity deduplicator
pub struct EntityDeduplicator {
    embeddings: Arc<dyn Embeddings>,
    similarity_threshold: f32,
    canonical_capacity: usize,
    state: Mutex<DedupState>,
}

impl EntityDeduplicator {
    #[must_use]
    pub fn new(embeddings: Arc<dyn Embeddings>) -> Self {
        Self {
            embeddings,
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            canonical_capacity: DEFAULT_CANONICAL_CAPACITY,
            state: Mutex::new(DedupState::default()),
        }
    }

    #[must_use]
    pub fn with_similarity_threshold(mut self, threshold: f32) -> Self {
        self.similarity_threshold = threshold;
        self
    }

    #[must_use]
    pub fn with_canonical_capacity(mut self, capacity: usize) -> Self {
        self.canonical_capacity = capacity.max(1);
        self
    }

    /// Deduplicate both nodes and relationships of a payload.
    ///
    /// # Errors
    ///
    /// Propagates embedding failures.
    pub async fn deduplicate(&self, graph: GraphPayload) -> Result<GraphPayload> {
        let nodes = self.deduplicate_nodes(graph.nodes).await?;
        let relationships = self.deduplicate_relationships(graph.relationships);
        Ok(GraphPayload::new(nodes, relationships))
    }

    /// Assign canonical ids to nodes.
    ///
    /// Per node: exact-name hit reuses the canonical id; otherwise the name is
    /// embedded and compared against all canonical embeddings, merging above
    /// the threshold and registering a new canonical entry below it.
    pub async fn deduplicate_nodes(&self, nodes: Vec<Node>) -> Result<Vec<Node>> {
        let mut deduped: Vec<Node> = Vec::new();
        let mut seen_canonical: HashSet<String> = HashSet::new();

        for mut node in nodes {
            let name = node
                .properties
                .get("name")
                .and_then(serde_json::Value::as_str)
                .map_or_else(|| node.id.clone(), ToString::to_string);

            let existing_canonical = self.state.lock().canonical_map.get(&name).cloned();
            if let Some(canonical_id) = existing_canonical {
                self.record_alias(&node.id, &canonical_id);
                if seen_canonical.insert(canonical_id.clone()) {
                    node.id = canonical_id;
                    deduped.push(node);
                }
                continue;
            }

            let embedding = self.embeddings.embed_query(&name).await?;
            let best = self.find_best_match(&embedding);

            match best {
                Some((canonical_id, similarity)) if similarity >= self.similarity_threshold => {
                    tracing::info!(
                        name = %name,
                        canonical = %canonical_id,
                        similarity,
                        "dedup merge"
                    );
                    {
                        let mut state = self.state.lock();
                        state.canonical_map.insert(name, canonical_id.clone());
                    }
                    self.record_alias(&node.id, &canonical_id);
                    if seen_canonical.insert(canonical_id.clone()) {
                        node.id = canonical_id;
                        deduped.push(node);
                    }
                }
                _ => {
                    let node_id = node.id.clone();
                    self.register_canonical(name, node_id.clone(), embedding);
                    if seen_canonical.insert(node_id) {
                        deduped.push(node);
                    }
                }
            }
        }

        Ok(deduped)
    }

    /// Remap relationship endpoints through the alias and canonical maps
    /// (extractors may use entity names as ids), then drop duplicates on
    /// `(source, target, type)`.
    #[must_use]
    pub fn deduplicate_relationships(
        &self,
        relationships: Vec<Relationship>,
    ) -> Vec<Relationship> {
        let state = self.state.lock();
        let remap = |endpoint: &str| {
            state
                .id_aliases
                .get(endpoint)
                .or_else(|| state.canonical_map.get(endpoint))
                .cloned()
        };

        let mut seen: HashSet<(String, String, String)> = HashSet::new();
        let mut deduped = Vec::new();
        for mut rel in relationships {
            if let Some(canonical) = remap(&rel.source) {
                rel.source = canonical;
            }
            if let Some(canonical) = remap(&rel.target) {
                rel.target = canonical;
            }
            let key = (rel.source.clone(), rel.target.clone(), rel.rel_type.clone());
            if seen.insert(key) {
                deduped.push(rel);
            }
        }

        deduped
    }

    /// Live canonical-embedding count.
    #[must_use]
    pub fn canonical_count(&self) -> usize {
        self.state.lock().canonical_embeddings.len()
    }

    fn find_best_match(&self, embedding: &[f32]) -> Option<(String, f32)> {
        let state = self.state.lock();
        let mut best: Option<(String, f32)> = None;
        for (canonical_id, canonical_embedding) in &state.canonical_embeddings {
            let similarity = cosine_similarity(embedding, canonical_embedding);
            if best.as_ref().map_or(true, |(_, s)| similarity > *s) {
                best = Some((canonical_id.clone(), similarity));
            }
        }
        best
    }

    fn record_alias(&self, original_id: &str, canonical_id: &str) {
        if original_id != canonical_id {
            self.state
                .lock()
                .id_aliases
                .insert(original_id.to_string(), canonical_id.to_string());
        }
    }

    fn register_canonical(&self, name: String, canonical_id: String, embedding: Vec<f32>) {
        let mut state = self.state.lock();
        state.canonical_map.insert(name, canonical_id.clone());
        state
            .canonical_embeddings
            .push_back((canonical_id, embedding));
        while state.canonical_embeddings.len() > self.canonical_capacity {
            if let Some((evicted_id, _)) = state.canonical_embeddings.pop_front() {
                state
                    .canonical_map
                    .retain(|_, canonical| canonical != &evicted_id);
                state
                    .id_aliases
                    .retain(|_, canonical| canonical != &evicted_id);
                tracing::debug!(canonical = %evicted_id, "evicted oldest canonical entry");
            }
        }
    }
}
