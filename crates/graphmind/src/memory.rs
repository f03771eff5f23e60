//! Per-request shared memory.
//!
//! Created fresh for each request and owned by the orchestrator for the
//! request's lifetime; workers receive a reference and mutate under the
//! internal lock. Holds two maps: an arbitrary results store (published
//! worker answers land under `agent_result:<db>`) and a bounded LRU cache of
//! graph query results keyed on `(db, normalized query)`.

use lru::LruCache;
use md5::{Digest, Md5};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::num::NonZeroUsize;

/// Query-cache capacity; the least-recently-used entry is evicted on overflow.
pub const MAX_QUERY_CACHE_SIZE: usize = 256;

static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"\s+").expect("whitespace regex is valid")
});

struct Inner {
    store: HashMap<String, Value>,
    query_cache: LruCache<String, String>,
}

/// Agent-shared memory store with request-scoped lifecycle
pub struct SharedMemory {
    inner: Mutex<Inner>,
}

impl SharedMemory {
    #[must_use]
    pub fn new() -> Self {
        Self::with_cache_capacity(MAX_QUERY_CACHE_SIZE)
    }

    /// Shared memory with a custom query-cache bound.
    #[must_use]
    pub fn with_cache_capacity(capacity: usize) -> Self {
        #[allow(clippy::expect_used)]
        let capacity = NonZeroUsize::new(capacity.max(1)).expect("capacity is non-zero");
        Self {
            inner: Mutex::new(Inner {
                store: HashMap::new(),
                query_cache: LruCache::new(capacity),
            }),
        }
    }

    /// Store an intermediate result.
    pub fn put(&self, key: impl Into<String>, value: Value) {
        let key = key.into();
        tracing::debug!(%key, "shared memory put");
        self.inner.lock().store.insert(key, value);
    }

    /// Retrieve an intermediate result.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner.lock().store.get(key).cloned()
    }

    /// All stored results (used by the supervisor for synthesis context).
    #[must_use]
    pub fn all_results(&self) -> HashMap<String, Value> {
        self.inner.lock().store.clone()
    }

    /// Cache a graph query result to avoid re-execution within the request.
    pub fn cache_query_result(&self, db_name: &str, query: &str, result: &str) {
        let key = cache_key(db_name, query);
        tracing::debug!(db = db_name, key = %&key[..key.len().min(24)], "shared memory cache");
        self.inner.lock().query_cache.put(key, result.to_string());
    }

    /// Look up a previously cached query result. A hit marks the entry as
    /// most recently used.
    #[must_use]
    pub fn get_cached_query(&self, db_name: &str, query: &str) -> Option<String> {
        let key = cache_key(db_name, query);
        self.inner.lock().query_cache.get(&key).cloned()
    }

    /// Number of live query-cache entries.
    #[must_use]
    pub fn cached_query_count(&self) -> usize {
        self.inner.lock().query_cache.len()
    }
}

impl Default for SharedMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SharedMemory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("SharedMemory")
            .field("store_entries", &inner.store.len())
            .field("cached_queries", &inner.query_cache.len())
            .finish()
    }
}

/// `"{db}:{md5(normalized query)}"`; normalization lowercases and collapses
/// whitespace so formatting differences share a cache entry.
fn cache_key(db_name: &str, query: &str) -> String {
    let normalized = WHITESPACE_RE
        .replace_all(query.trim(), " ")
        .to_lowercase();
    let digest = Md5::digest(normalized.as_bytes());
    format!("{db_name}:{digest:x}")
}

#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // ============================================================
    // Store Tests
    // ============================================================

    #[test]
    fn test_put_and_get() {
        let memory = SharedMemory::new();
        memory.put("agent_result:kgnormal", json!("answer"));
        assert_eq!(memory.get("agent_result:kgnormal"), Some(json!("answer")));
    }

    #[test]
    fn test_get_missing_key() {
        let memory = SharedMemory::new();
        assert_eq!(memory.get("missing"), None);
    }

    #[test]
    fn test_all_results() {
        let memory = SharedMemory::new();
        memory.put("a", json!(1));
        memory.put("b", json!(2));
        let all = memory.all_results();
        assert_eq!(all.len(), 2);
        assert_eq!(all.get("a"), Some(&json!(1)));
    }

    // ============================================================
    // Query Cache Tests
    // ============================================================

    #[test]
    fn test_cache_hit() {
        let memory = SharedMemory::new();
        memory.cache_query_result("kgnormal", "MATCH (n) RETURN n", "[{\"n\": 1}]");
        assert_eq!(
            memory.get_cached_query("kgnormal", "MATCH (n) RETURN n"),
            Some("[{\"n\": 1}]".to_string())
        );
    }

    #[test]
    fn test_cache_miss() {
        let memory = SharedMemory::new();
        assert_eq!(memory.get_cached_query("kgnormal", "MATCH (n) RETURN n"), None);
    }

    #[test]
    fn test_cache_key_normalization() {
        // Queries differing only in whitespace and case share a cache entry.
        let memory = SharedMemory::new();
        memory.cache_query_result("db", "  MATCH (n)\n  RETURN n  ", "rows");
        assert_eq!(
            memory.get_cached_query("db", "match (n) return n"),
            Some("rows".to_string())
        );
    }

    #[test]
    fn test_cache_is_scoped_per_database() {
        let memory = SharedMemory::new();
        memory.cache_query_result("dba", "MATCH (n) RETURN n", "a");
        assert_eq!(memory.get_cached_query("dbb", "MATCH (n) RETURN n"), None);
    }

    #[test]
    fn test_second_lookup_is_byte_equal() {
        let memory = SharedMemory::new();
        let rows = r#"[{"name":"Acme","employees":120}]"#;
        memory.cache_query_result("kgnormal", "MATCH (c:Company) RETURN c", rows);
        let first = memory
            .get_cached_query("kgnormal", "MATCH (c:Company) RETURN c")
            .unwrap();
        let second = memory
            .get_cached_query("kgnormal", "MATCH (c:Company) RETURN c")
            .unwrap();
        assert_eq!(first.as_bytes(), rows.as_bytes());
        assert_eq!(first, second);
    }

    // ============================================================
    // LRU Eviction Tests
    // ============================================================

    #[test]
    fn test_eviction_at_capacity() {
        let memory = SharedMemory::with_cache_capacity(8);
        for i in 0..8 {
            memory.cache_query_result("db", &format!("query_{i}"), &format!("result_{i}"));
        }
        assert_eq!(memory.cached_query_count(), 8);

        memory.cache_query_result("db", "query_overflow", "overflow");
        assert_eq!(memory.cached_query_count(), 8);
        assert_eq!(memory.get_cached_query("db", "query_0"), None);
        assert_eq!(
            memory.get_cached_query("db", "query_overflow"),
            Some("overflow".to_string())
        );
    }

    #[test]
    fn test_lru_access_prevents_eviction() {
        let memory = SharedMemory::with_cache_capacity(8);
        for i in 0..8 {
            memory.cache_query_result("db", &format!("query_{i}"), &format!("result_{i}"));
        }

        // Touch query_0 so query_1 becomes the eviction candidate.
        assert!(memory.get_cached_query("db", "query_0").is_some());
        memory.cache_query_result("db", "query_new", "new");

        assert_eq!(
            memory.get_cached_query("db", "query_0"),
            Some("result_0".to_string())
        );
        assert_eq!(memory.get_cached_query("db", "query_1"), None);
    }

    #[test]
    fn test_inserting_capacity_plus_k_evicts_exactly_k_oldest() {
        let capacity = 16;
        let k = 5;
        let memory = SharedMemory::with_cache_capacity(capacity);
        for i in 0..capacity + k {
            memory.cache_query_result("db", &format!("query_{i}"), "r");
        }
        for i in 0..k {
            assert_eq!(memory.get_cached_query("db", &format!("query_{i}")), None);
        }
        for i in k..capacity + k {
            assert!(
                memory.get_cached_query("db", &format!("query_{i}")).is_some(),
                "query_{i} should survive"
            );
        }
    }
}
