//! Per-database specialist worker.
//!
//! Each worker is bound to a single database with a cached schema summary and
//! two tools it applies to itself: `get_schema` and `query_db`. A run is
//! serial: generate a graph query from the question and schema, execute it
//! through the shared-memory cache, then form the answer from the rows. Tool
//! arguments stay out of the trace; only tool names are recorded.

use crate::connector::{rows_to_json, GraphConnector};
use crate::error::Result;
use crate::language_models::JsonChatModel;
use crate::memory::SharedMemory;
use crate::trace::{preview, StepType, TraceStep};
use serde_json::{json, Value};
use std::sync::Arc;

/// Query-generation instruction, bound per worker with the schema.
const QUERY_GENERATION_GUIDE: &str = "\
Generate a Cypher statement answering the user's question.
Use only the node labels, relationship types and properties present in the schema.
Return strict JSON: {\"cypher\": \"<statement>\"}.
If the question cannot be answered from this database, return
{\"cypher\": \"\", \"answer\": \"<why the question is out of scope here>\"}.";

/// Answer-formation instruction over query results.
const ANSWER_GUIDE: &str = "\
Form a concise, factual answer to the question from the query results below.
The results are authoritative; do not contradict them.
If the results are empty, say that this database holds no matching records.
Return strict JSON: {\"answer\": \"<text>\"}.";

/// Result of one worker run
#[derive(Debug, Clone)]
pub struct WorkerRun {
    pub response: String,
    pub trace_steps: Vec<TraceStep>,
}

/// A specialist bound to one database
pub struct SpecialistWorker {
    db_name: String,
    agent_name: String,
    schema: String,
    connector: Arc<dyn GraphConnector>,
    chat_model: Arc<dyn JsonChatModel>,
}

impl SpecialistWorker {
    #[must_use]
    pub fn new(
        db_name: impl Into<String>,
        schema: impl Into<String>,
        connector: Arc<dyn GraphConnector>,
        chat_model: Arc<dyn JsonChatModel>,
    ) -> Self {
        let db_name = db_name.into();
        Self {
            agent_name: format!("Agent_{db_name}"),
            db_name,
            schema: schema.into(),
            connector,
            chat_model,
        }
    }

    #[must_use]
    pub fn db_name(&self) -> &str {
        &self.db_name
    }

    #[must_use]
    pub fn agent_name(&self) -> &str {
        &self.agent_name
    }

    /// The cached schema summary for this worker's database.
    #[must_use]
    pub fn get_schema(&self) -> &str {
        &self.schema
    }

    /// Instruction template binding the database and schema summary.
    #[must_use]
    pub fn instructions(&self) -> String {
        format!(
            "You are a knowledge graph specialist for the '{db}' database.\n\n\
             Schema:\n{schema}\n\n\
             When answering questions:\n\
             1. Verify available node labels and relationships against the schema.\n\
             2. Query only your own database.\n\
             3. Provide factual answers based on query results.\n\
             4. If the question is outside your database's scope, state that explicitly.",
            db = self.db_name,
            schema = self.schema
        )
    }

    /// Execute a query through the shared-memory cache, writing through on miss.
    ///
    /// Backend errors are returned as an `Error: ...` observation string so a
    /// worker run can continue to the answer stage.
    pub async fn query_db(&self, cypher: &str, memory: &SharedMemory) -> String {
        if let Some(cached) = memory.get_cached_query(&self.db_name, cypher) {
            tracing::debug!(db = %self.db_name, "query cache hit");
            return cached;
        }
        match self.connector.run(cypher, &self.db_name, None).await {
            Ok(rows) => {
                let encoded = rows_to_json(&rows);
                memory.cache_query_result(&self.db_name, cypher, &encoded);
                encoded
            }
            Err(err) => format!("Error executing query in '{}': {err}", self.db_name),
        }
    }

    /// Answer `query` against this worker's database.
    ///
    /// # Errors
    ///
    /// Propagates chat-model failures; the debate orchestrator converts them
    /// into error-typed results.
    pub async fn run(&self, query: &str, memory: &SharedMemory) -> Result<WorkerRun> {
        let mut trace_steps = Vec::new();
        let mut step_id = 0_usize;
        let mut push_step = |steps: &mut Vec<TraceStep>,
                             step_type: StepType,
                             content: String,
                             tool_names: Vec<&str>| {
            let mut step = TraceStep::new(step_id.to_string(), step_type, &self.agent_name, content);
            if !tool_names.is_empty() {
                step.set_metadata_field("tool_names", json!(tool_names));
            }
            steps.push(step);
            step_id += 1;
        };

        push_step(
            &mut trace_steps,
            StepType::ToolCall,
            "Calling: get_schema".to_string(),
            vec!["get_schema"],
        );
        push_step(
            &mut trace_steps,
            StepType::ToolOutput,
            preview(&self.schema, 120),
            vec![],
        );

        let generation = self
            .chat_model
            .complete_json(
                &self.instructions(),
                &format!("{QUERY_GENERATION_GUIDE}\n\nQuestion: {query}"),
            )
            .await?;
        let cypher = generation
            .get("cypher")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .trim()
            .to_string();

        if cypher.is_empty() {
            // Out of scope: the worker answers as such without touching the DB.
            let answer = generation
                .get("answer")
                .and_then(Value::as_str)
                .unwrap_or("This question is outside the scope of this database.")
                .to_string();
            push_step(
                &mut trace_steps,
                StepType::Generation,
                answer.clone(),
                vec![],
            );
            return Ok(WorkerRun {
                response: answer,
                trace_steps,
            });
        }

        push_step(
            &mut trace_steps,
            StepType::Thought,
            "Formulated a graph query from the schema.".to_string(),
            vec![],
        );
        push_step(
            &mut trace_steps,
            StepType::ToolCall,
            "Calling: query_db".to_string(),
            vec!["query_db"],
        );
        let observation = self.query_db(&cypher, memory).await;
        push_step(
            &mut trace_steps,
            StepType::ToolOutput,
            preview(&observation, 120),
            vec![],
        );

        let answer_payload = self
            .chat_model
            .complete_json(
                &self.instructions(),
                &format!("{ANSWER_GUIDE}\n\nQuestion: {query}\n\nResults:\n{observation}"),
            )
            .await?;
        let answer = answer_payload
            .get("answer")
            .and_then(Value::as_str)
            .map_or_else(|| answer_payload.to_string(), ToString::to_string);

        push_step(
            &mut trace_steps,
            StepType::Generation,
            preview(&answer, 120),
            vec![],
        );

        Ok(WorkerRun {
            response: answer,
            trace_steps,
        })
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::JsonRow;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    struct CountingConnector {
        calls: Mutex<usize>,
    }

    #[async_trait]
    impl GraphConnector for CountingConnector {
        async fn run(&self, _: &str, _: &str, _: Option<Value>) -> Result<Vec<JsonRow>> {
            *self.calls.lock() += 1;
            let mut row = JsonRow::new();
            row.insert("name".to_string(), json!("Acme"));
            Ok(vec![row])
        }
    }

    /// Scripted chat model: first call returns a cypher, second an answer.
    struct ScriptedChat {
        responses: Mutex<Vec<Value>>,
    }

    #[async_trait]
    impl JsonChatModel for ScriptedChat {
        async fn complete_json(&self, _: &str, _: &str) -> Result<Value> {
            let mut responses = self.responses.lock();
            Ok(responses.remove(0))
        }
    }

    fn worker(responses: Vec<Value>, connector: Arc<CountingConnector>) -> SpecialistWorker {
        SpecialistWorker::new(
            "kgnormal",
            "Node Labels: Company\nRelationship Types: USES",
            connector,
            Arc::new(ScriptedChat {
                responses: Mutex::new(responses),
            }),
        )
    }

    #[tokio::test]
    async fn test_run_produces_answer_and_trace() {
        let connector = Arc::new(CountingConnector {
            calls: Mutex::new(0),
        });
        let worker = worker(
            vec![
                json!({"cypher": "MATCH (c:Company) RETURN c.name"}),
                json!({"answer": "Acme is in the graph."}),
            ],
            connector,
        );
        let memory = SharedMemory::new();
        let run = worker.run("What companies are in the graph?", &memory).await.unwrap();
        assert_eq!(run.response, "Acme is in the graph.");

        let types: Vec<StepType> = run.trace_steps.iter().map(|s| s.step_type).collect();
        assert_eq!(
            types,
            vec![
                StepType::ToolCall,
                StepType::ToolOutput,
                StepType::Thought,
                StepType::ToolCall,
                StepType::ToolOutput,
                StepType::Generation,
            ]
        );
        // Tool names only, never the query text.
        let tool_call = &run.trace_steps[3];
        assert_eq!(tool_call.metadata["tool_names"], json!(["query_db"]));
        assert!(!tool_call.content.contains("MATCH"));
    }

    #[tokio::test]
    async fn test_query_db_uses_cache_on_second_call() {
        let connector = Arc::new(CountingConnector {
            calls: Mutex::new(0),
        });
        let worker = worker(vec![], Arc::clone(&connector));
        let memory = SharedMemory::new();

        let first = worker.query_db("MATCH (n) RETURN n", &memory).await;
        let second = worker.query_db("match (n)  return n", &memory).await;
        assert_eq!(first, second);
        assert_eq!(*connector.calls.lock(), 1);
    }

    #[tokio::test]
    async fn test_out_of_scope_answer() {
        let connector = Arc::new(CountingConnector {
            calls: Mutex::new(0),
        });
        let worker = worker(
            vec![json!({"cypher": "", "answer": "Maritime law is out of scope for kgnormal."})],
            Arc::clone(&connector),
        );
        let memory = SharedMemory::new();
        let run = worker.run("Explain maritime law", &memory).await.unwrap();
        assert!(run.response.contains("out of scope"));
        assert_eq!(*connector.calls.lock(), 0);
        assert_eq!(
            run.trace_steps.last().unwrap().step_type,
            StepType::Generation
        );
    }

    #[test]
    fn test_instructions_bind_db_and_schema() {
        let connector = Arc::new(CountingConnector {
            calls: Mutex::new(0),
        });
        let worker = worker(vec![], connector);
        let instructions = worker.instructions();
        assert!(instructions.contains("'kgnormal'"));
        assert!(instructions.contains("Node Labels: Company"));
        assert!(instructions.contains("outside your database's scope"));
    }
}
