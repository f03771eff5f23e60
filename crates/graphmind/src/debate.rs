//! Parallel debate orchestration.
//!
//! All workers answer the question independently and in parallel, results are
//! collected into shared memory, and a supervisor synthesizes the final
//! response. A worker failure or deadline expiry becomes an error-typed
//! result; it never aborts the debate and never cancels sibling workers. The
//! trace lists `FANOUT` first, worker `DEBATE` sub-trees in registry order,
//! then `COLLECT` and `SYNTHESIS`.

use crate::error::{Error, Result};
use crate::factory::{DebateState, WorkerStatus};
use crate::language_models::JsonChatModel;
use crate::memory::SharedMemory;
use crate::trace::{preview, StepType, TraceStep};
use crate::worker::{SpecialistWorker, WorkerRun};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

/// Supervisor instruction: synthesis only, no tools.
const SUPERVISOR_INSTRUCTIONS: &str = "\
You are the Supervisor. Collect the responses from the specialist agents,
synthesize them into a single coherent answer, and highlight agreements and
disagreements. Do not call any tools. Return strict JSON: {\"answer\": \"<text>\"}.";

/// Result from a single worker in the debate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebateResult {
    pub agent_name: String,
    pub db_name: String,
    pub response: String,
    #[serde(default)]
    pub trace_steps: Vec<TraceStep>,
}

/// Full debate output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebateOutcome {
    pub response: String,
    pub trace_steps: Vec<TraceStep>,
    pub debate_results: Vec<DebateResult>,
    pub debate_state: DebateState,
    #[serde(default)]
    pub agent_statuses: Vec<WorkerStatus>,
}

/// Fan-out → collect → synthesize orchestrator
pub struct DebateOrchestrator {
    workers: Vec<(String, Arc<SpecialistWorker>)>,
    supervisor: Arc<dyn JsonChatModel>,
    shared_memory: Arc<SharedMemory>,
    agent_statuses: Vec<WorkerStatus>,
    worker_timeout: Duration,
    synthesis_timeout: Duration,
}

impl DebateOrchestrator {
    #[must_use]
    pub fn new(
        workers: Vec<(String, Arc<SpecialistWorker>)>,
        supervisor: Arc<dyn JsonChatModel>,
        shared_memory: Arc<SharedMemory>,
    ) -> Self {
        Self {
            workers,
            supervisor,
            shared_memory,
            agent_statuses: Vec::new(),
            worker_timeout: Duration::from_secs(60),
            synthesis_timeout: Duration::from_secs(60),
        }
    }

    #[must_use]
    pub fn with_agent_statuses(mut self, statuses: Vec<WorkerStatus>) -> Self {
        self.agent_statuses = statuses;
        self
    }

    #[must_use]
    pub fn with_worker_timeout(mut self, timeout: Duration) -> Self {
        self.worker_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_synthesis_timeout(mut self, timeout: Duration) -> Self {
        self.synthesis_timeout = timeout;
        self
    }

    /// Execute the full debate cycle.
    ///
    /// With zero ready workers the outcome carries `debate_state = blocked`
    /// so the caller's façade can fall back to the semantic flow.
    ///
    /// # Errors
    ///
    /// Only supervisor-synthesis failures propagate; worker failures become
    /// error-typed results.
    pub async fn run(&self, query: &str) -> Result<DebateOutcome> {
        if self.workers.is_empty() {
            tracing::warn!("debate blocked: no ready workers");
            return Ok(DebateOutcome {
                response: String::new(),
                trace_steps: Vec::new(),
                debate_results: Vec::new(),
                debate_state: DebateState::Blocked,
                agent_statuses: self.agent_statuses.clone(),
            });
        }

        tracing::info!(
            agent_count = self.workers.len(),
            query = %preview(query, 200),
            "debate fan-out"
        );

        // 1. Fan-out: every worker runs concurrently with its own deadline.
        // Dropping this future (client cancel) cancels every in-flight worker.
        let worker_runs = self.workers.iter().map(|(db_name, worker)| {
            let db_name = db_name.clone();
            let worker = Arc::clone(worker);
            let memory = Arc::clone(&self.shared_memory);
            let query = query.to_string();
            let timeout = self.worker_timeout;
            async move {
                let outcome = tokio::time::timeout(timeout, worker.run(&query, &memory)).await;
                (db_name, worker, outcome)
            }
        });
        let collected = futures::future::join_all(worker_runs).await;

        // 2. Collect in registry order; failures never propagate.
        let mut debate_results = Vec::new();
        for (db_name, worker, outcome) in collected {
            let result = match outcome {
                Ok(Ok(run)) => worker_result(&db_name, worker.agent_name(), run),
                Ok(Err(err)) => {
                    tracing::error!(db = %db_name, error = %err, "worker failed");
                    error_result(&db_name, worker.agent_name(), &err.to_string())
                }
                Err(_elapsed) => {
                    tracing::error!(db = %db_name, "worker deadline expired");
                    error_result(
                        &db_name,
                        worker.agent_name(),
                        &format!("worker timed out after {:?}", self.worker_timeout),
                    )
                }
            };
            self.shared_memory.put(
                format!("agent_result:{db_name}"),
                Value::String(result.response.clone()),
            );
            debate_results.push(result);
        }

        // 3. Supervisor synthesis with its own deadline.
        let synthesis_input = format_for_supervisor(query, &debate_results);
        let synthesis = tokio::time::timeout(
            self.synthesis_timeout,
            self.supervisor
                .complete_json(SUPERVISOR_INSTRUCTIONS, &synthesis_input),
        )
        .await
        .map_err(|_| Error::infrastructure("supervisor synthesis timed out"))??;
        let response = synthesis
            .get("answer")
            .and_then(Value::as_str)
            .map_or_else(|| synthesis.to_string(), ToString::to_string);

        // 4. Unified trace tree.
        let trace_steps = build_debate_trace(&debate_results, &response);

        // Degradation is reported, not fatal: the debate ran with whatever
        // workers were ready.
        let debate_state = if self
            .agent_statuses
            .iter()
            .any(|status| status.status != "ready")
        {
            DebateState::Degraded
        } else {
            DebateState::Ready
        };

        Ok(DebateOutcome {
            response,
            trace_steps,
            debate_results,
            debate_state,
            agent_statuses: self.agent_statuses.clone(),
        })
    }
}

fn worker_result(db_name: &str, agent_name: &str, run: WorkerRun) -> DebateResult {
    DebateResult {
        agent_name: agent_name.to_string(),
        db_name: db_name.to_string(),
        response: run.response,
        trace_steps: run.trace_steps,
    }
}

fn error_result(db_name: &str, agent_name: &str, message: &str) -> DebateResult {
    DebateResult {
        agent_name: agent_name.to_string(),
        db_name: db_name.to_string(),
        response: format!("Error: {message}"),
        trace_steps: Vec::new(),
    }
}

/// Structured synthesis prompt: the question plus labelled worker responses.
fn format_for_supervisor(query: &str, results: &[DebateResult]) -> String {
    let mut parts = vec![format!("Original Question: {query}\n\nAgent Responses:\n")];
    for result in results {
        parts.push(format!(
            "--- {} ({}) ---\n{}\n",
            result.agent_name, result.db_name, result.response
        ));
    }
    parts.push(
        "\nSynthesize these responses into a single, coherent answer. \
         Highlight agreements and note disagreements."
            .to_string(),
    );
    parts.join("\n")
}

/// Build the trace tree:
///
/// ```text
/// FANOUT
///   ├── DEBATE: Agent_kgnormal
///   │     ├── TOOL_CALL: get_schema
///   │     └── ...
///   └── DEBATE: Agent_kgfibo
/// COLLECT
/// SYNTHESIS: Supervisor
/// ```
fn build_debate_trace(debate_results: &[DebateResult], supervisor_output: &str) -> Vec<TraceStep> {
    let mut steps = Vec::new();
    let mut step_id = 0_usize;

    let fanout_node_id = format!("node_fanout_{step_id}");
    let agent_names: Vec<&str> = debate_results
        .iter()
        .map(|r| r.agent_name.as_str())
        .collect();
    steps.push(
        TraceStep::new(
            step_id.to_string(),
            StepType::Fanout,
            "DebateOrchestrator",
            "Parallel debate started",
        )
        .with_metadata(json!({
            "node_id": fanout_node_id,
            "phase": "orchestration",
            "agents": agent_names,
            "full_content": format!(
                "Dispatching query to {} agents: {}",
                debate_results.len(),
                agent_names.join(", ")
            ),
        })),
    );
    step_id += 1;

    // Each worker: DEBATE header, then its internal steps chained underneath.
    let mut last_step_per_agent = Vec::new();
    for result in debate_results {
        let debate_node_id = format!("node_debate_{step_id}");
        steps.push(
            TraceStep::new(
                step_id.to_string(),
                StepType::Debate,
                &result.agent_name,
                preview(&result.response, 80),
            )
            .with_metadata(json!({
                "node_id": debate_node_id,
                "parent_id": fanout_node_id,
                "phase": "fan-out",
                "db": result.db_name,
                "full_content": result.response,
            })),
        );
        step_id += 1;

        let mut prev_sub_id = debate_node_id;
        for sub_step in &result.trace_steps {
            let sub_id = format!("node_step_{step_id}");
            let mut reparented = TraceStep::new(
                step_id.to_string(),
                sub_step.step_type,
                &result.agent_name,
                preview(&sub_step.content, 120),
            );
            reparented.metadata = json!({
                "node_id": sub_id,
                "parent_id": prev_sub_id,
                "phase": "fan-out",
                "db": result.db_name,
                "full_content": sub_step.content,
                "tool_names": sub_step
                    .metadata
                    .get("tool_names")
                    .cloned()
                    .unwrap_or_else(|| json!([])),
            });
            steps.push(reparented);
            prev_sub_id = sub_id;
            step_id += 1;
        }
        last_step_per_agent.push(prev_sub_id);
    }

    let collect_node_id = format!("node_collect_{step_id}");
    steps.push(
        TraceStep::new(
            step_id.to_string(),
            StepType::Collect,
            "DebateOrchestrator",
            format!("Collecting {} results", debate_results.len()),
        )
        .with_metadata(json!({
            "node_id": collect_node_id,
            "parent_ids": last_step_per_agent,
            "phase": "orchestration",
            "full_content": "All agent responses collected for supervisor synthesis.",
        })),
    );
    step_id += 1;

    steps.push(
        TraceStep::new(
            step_id.to_string(),
            StepType::Synthesis,
            "Supervisor",
            preview(supervisor_output, 120),
        )
        .with_metadata(json!({
            "node_id": format!("node_synthesis_{step_id}"),
            "parent_id": collect_node_id,
            "phase": "synthesis",
            "full_content": supervisor_output,
        })),
    );

    steps
}
