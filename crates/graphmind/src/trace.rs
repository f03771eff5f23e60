//! Trace steps emitted to the UI.
//!
//! Both execution paths (debate and semantic) record their progress as a flat
//! list of steps; `metadata.node_id` / `metadata.parent_id` links turn the
//! list into the orchestration tree the UI renders.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Step kinds rendered by the UI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepType {
    UserInput,
    Thought,
    Generation,
    ToolCall,
    ToolOutput,
    Fanout,
    Debate,
    Collect,
    Synthesis,
    Semantic,
    Router,
    Specialist,
}

/// One step in an orchestration trace
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceStep {
    pub id: String,
    #[serde(rename = "type")]
    pub step_type: StepType,
    pub agent: String,
    pub content: String,
    #[serde(default)]
    pub metadata: Value,
}

impl TraceStep {
    pub fn new(
        id: impl Into<String>,
        step_type: StepType,
        agent: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            step_type,
            agent: agent.into(),
            content: content.into(),
            metadata: json!({}),
        }
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// Merge a key into the metadata object.
    pub fn set_metadata_field(&mut self, key: &str, value: Value) {
        if let Some(map) = self.metadata.as_object_mut() {
            map.insert(key.to_string(), value);
        } else {
            self.metadata = json!({ key: value });
        }
    }
}

/// Truncate `content` for display, keeping the full text out of the step body.
#[must_use]
pub fn preview(content: &str, limit: usize) -> String {
    if content.chars().count() <= limit {
        content.to_string()
    } else {
        content.chars().take(limit).collect()
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_type_serializes_screaming_snake() {
        assert_eq!(
            serde_json::to_string(&StepType::UserInput).unwrap(),
            r#""USER_INPUT""#
        );
        assert_eq!(
            serde_json::to_string(&StepType::ToolCall).unwrap(),
            r#""TOOL_CALL""#
        );
        assert_eq!(
            serde_json::to_string(&StepType::Synthesis).unwrap(),
            r#""SYNTHESIS""#
        );
    }

    #[test]
    fn test_step_type_deserializes() {
        let parsed: StepType = serde_json::from_str(r#""FANOUT""#).unwrap();
        assert_eq!(parsed, StepType::Fanout);
    }

    #[test]
    fn test_trace_step_roundtrip() {
        let step = TraceStep::new("0", StepType::Debate, "Agent_kgnormal", "answer")
            .with_metadata(json!({"node_id": "node_debate_1", "db": "kgnormal"}));
        let json = serde_json::to_string(&step).unwrap();
        assert!(json.contains(r#""type":"DEBATE""#));
        let back: TraceStep = serde_json::from_str(&json).unwrap();
        assert_eq!(back.step_type, StepType::Debate);
        assert_eq!(back.metadata["db"], "kgnormal");
    }

    #[test]
    fn test_set_metadata_field() {
        let mut step = TraceStep::new("1", StepType::Collect, "Orchestrator", "collecting");
        step.set_metadata_field("parent_ids", json!(["a", "b"]));
        assert_eq!(step.metadata["parent_ids"], json!(["a", "b"]));
    }

    #[test]
    fn test_preview_truncates_on_char_boundary() {
        assert_eq!(preview("short", 80), "short");
        let long = "x".repeat(200);
        assert_eq!(preview(&long, 80).len(), 80);
        assert_eq!(preview("héllo wörld", 5), "héllo");
    }
}
