//! Platform chat sessions and UI payload shaping.
//!
//! An in-memory session store (capped turn history, FIFO pruning) plus the
//! frontend formatter that turns a runtime payload into cards, a trace
//! summary, and grouped entity candidates.

use crate::resolver::SemanticContext;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};

/// Default cap on turns kept per session.
pub const MAX_SESSION_TURNS: usize = 100;

/// Execution mode requested through the platform façade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatMode {
    Router,
    Debate,
    Semantic,
}

impl ChatMode {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Router => "router",
            Self::Debate => "debate",
            Self::Semantic => "semantic",
        }
    }
}

/// One stored chat turn
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionTurn {
    pub role: String,
    pub content: String,
    #[serde(default)]
    pub metadata: Value,
}

/// In-memory session store, capped per session
pub struct SessionStore {
    max_turns: usize,
    sessions: Mutex<HashMap<String, Vec<SessionTurn>>>,
}

impl SessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_turns(MAX_SESSION_TURNS)
    }

    #[must_use]
    pub fn with_max_turns(max_turns: usize) -> Self {
        Self {
            max_turns: max_turns.max(1),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Append a turn, pruning the oldest entries past the cap.
    pub fn append(&self, session_id: &str, role: &str, content: &str, metadata: Value) {
        let mut sessions = self.sessions.lock();
        let history = sessions.entry(session_id.to_string()).or_default();
        history.push(SessionTurn {
            role: role.to_string(),
            content: content.to_string(),
            metadata,
        });
        if history.len() > self.max_turns {
            let overflow = history.len() - self.max_turns;
            history.drain(..overflow);
        }
    }

    /// Snapshot of a session's history, oldest first.
    #[must_use]
    pub fn get(&self, session_id: &str) -> Vec<SessionTurn> {
        self.sessions
            .lock()
            .get(session_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Drop a session entirely.
    pub fn clear(&self, session_id: &str) {
        self.sessions.lock().remove(session_id);
    }

    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions.lock().len()
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Shape a runtime payload into the UI contract: summary/trace cards, a
/// per-type trace count, and entity candidate groups.
#[must_use]
pub fn build_ui_payload(mode: ChatMode, runtime_payload: &Value) -> Value {
    let trace_steps = runtime_payload
        .get("trace_steps")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let mut trace_counts: BTreeMap<String, usize> = BTreeMap::new();
    for step in &trace_steps {
        let step_type = step
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or("UNKNOWN")
            .to_string();
        *trace_counts.entry(step_type).or_default() += 1;
    }

    let cards = json!([
        {
            "kind": "summary",
            "title": format!("Mode: {}", mode.as_str()),
            "body": runtime_payload.get("response").and_then(Value::as_str).unwrap_or(""),
        },
        {
            "kind": "trace",
            "title": "Trace Steps",
            "body": format!("{} steps", trace_steps.len()),
        },
    ]);

    json!({
        "cards": cards,
        "trace_summary": trace_counts,
        "entity_candidates": extract_entity_candidates(runtime_payload),
    })
}

/// Group candidate matches per question entity for the UI picker.
fn extract_entity_candidates(runtime_payload: &Value) -> Value {
    let Some(semantic_context) = runtime_payload
        .get("semantic_context")
        .and_then(|raw| serde_json::from_value::<SemanticContext>(raw.clone()).ok())
    else {
        return json!([]);
    };

    let groups: Vec<Value> = semantic_context
        .matches
        .iter()
        .map(|(question_entity, candidates)| {
            let rows: Vec<Value> = candidates
                .iter()
                .map(|candidate| {
                    json!({
                        "database": candidate.database,
                        "node_id": candidate.node_id,
                        "display_name": candidate.display_name,
                        "labels": candidate.labels,
                        "score": candidate.final_score,
                        "source": candidate.source,
                    })
                })
                .collect();
            json!({ "question_entity": question_entity, "candidates": rows })
        })
        .collect();
    json!(groups)
}

#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_and_get() {
        let store = SessionStore::new();
        store.append("s1", "user", "hello", json!({}));
        store.append("s1", "assistant", "hi there", json!({"mode": "debate"}));
        let history = store.get("s1");
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, "user");
        assert_eq!(history[1].metadata["mode"], "debate");
    }

    #[test]
    fn test_missing_session_is_empty() {
        let store = SessionStore::new();
        assert!(store.get("nope").is_empty());
    }

    #[test]
    fn test_cap_keeps_most_recent() {
        let store = SessionStore::with_max_turns(5);
        for i in 0..9 {
            store.append("s1", "user", &format!("turn {i}"), json!({}));
        }
        let history = store.get("s1");
        assert_eq!(history.len(), 5);
        assert_eq!(history[0].content, "turn 4");
        assert_eq!(history[4].content, "turn 8");
    }

    #[test]
    fn test_clear_removes_session() {
        let store = SessionStore::new();
        store.append("s1", "user", "x", json!({}));
        store.clear("s1");
        assert!(store.get("s1").is_empty());
        assert_eq!(store.session_count(), 0);
    }

    #[test]
    fn test_sessions_are_isolated() {
        let store = SessionStore::new();
        store.append("a", "user", "for a", json!({}));
        store.append("b", "user", "for b", json!({}));
        assert_eq!(store.get("a").len(), 1);
        assert_eq!(store.get("b")[0].content, "for b");
    }

    #[test]
    fn test_ui_payload_cards_and_trace_summary() {
        let runtime_payload = json!({
            "response": "the answer",
            "trace_steps": [
                {"id": "0", "type": "FANOUT", "agent": "o", "content": ""},
                {"id": "1", "type": "DEBATE", "agent": "a", "content": ""},
                {"id": "2", "type": "DEBATE", "agent": "b", "content": ""},
            ],
        });
        let ui = build_ui_payload(ChatMode::Debate, &runtime_payload);
        assert_eq!(ui["cards"][0]["title"], "Mode: debate");
        assert_eq!(ui["cards"][0]["body"], "the answer");
        assert_eq!(ui["cards"][1]["body"], "3 steps");
        assert_eq!(ui["trace_summary"]["DEBATE"], 2);
        assert_eq!(ui["trace_summary"]["FANOUT"], 1);
        assert_eq!(ui["entity_candidates"], json!([]));
    }

    #[test]
    fn test_ui_payload_entity_candidates() {
        let runtime_payload = json!({
            "response": "",
            "trace_steps": [],
            "semantic_context": {
                "entities": ["Neo4j"],
                "label_hints": [],
                "alias_resolved": {},
                "matches": {
                    "Neo4j": [{
                        "database": "kgnormal",
                        "entity_text": "Neo4j",
                        "node_id": 101,
                        "labels": ["Database"],
                        "display_name": "Neo4j",
                        "base_score": 1.0,
                        "lexical_score": 1.0,
                        "label_boost": 0.0,
                        "alias_boost": 0.0,
                        "final_score": 2.2,
                        "source": "fulltext"
                    }]
                },
                "unresolved_entities": []
            }
        });
        let ui = build_ui_payload(ChatMode::Semantic, &runtime_payload);
        let groups = ui["entity_candidates"].as_array().unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0]["question_entity"], "Neo4j");
        assert_eq!(groups[0]["candidates"][0]["score"], 2.2);
        assert_eq!(groups[0]["candidates"][0]["source"], "fulltext");
    }
}
