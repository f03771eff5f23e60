//! Query-plane and administration handlers.

use crate::error::ApiError;
use crate::request_id::RequestId;
use crate::state::AppState;
use axum::extract::{Extension, Path, Query, State};
use axum::Json;
use graphmind::error::{Error, Result};
use graphmind::factory::DebateState;
use graphmind::fulltext::EnsureIndexReport;
use graphmind::graph::GraphPayload;
use graphmind::memory::SharedMemory;
use graphmind::policy::require_runtime_permission;
use graphmind::resolver::EntityOverride;
use graphmind::rule_export::{export_profile_to_cypher, export_profile_to_shacl};
use graphmind::rules::{
    apply_rules_to_graph, infer_rules_from_graph, InferenceOptions, RuleProfile,
};
use graphmind::trace::{StepType, TraceStep};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

const MAX_QUERY_LENGTH: usize = 2000;

const ROUTER_INSTRUCTIONS: &str = "\
You are the Router. Choose the single database best suited to answer the
user's question and return strict JSON:
{\"target_database\": \"<name>\", \"reasoning\": \"<why>\"}.";

pub type SharedState = Arc<AppState>;
type ApiResult<T> = std::result::Result<Json<T>, ApiError>;

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    #[serde(default = "default_user_id")]
    pub user_id: String,
    #[serde(default = "default_workspace")]
    pub workspace_id: String,
}

fn default_user_id() -> String {
    "user_default".to_string()
}

fn default_workspace() -> String {
    "default".to_string()
}

fn validate_query(query: &str) -> Result<()> {
    if query.trim().is_empty() {
        return Err(Error::validation("query must not be empty"));
    }
    if query.chars().count() > MAX_QUERY_LENGTH {
        return Err(Error::validation(format!(
            "query exceeds {MAX_QUERY_LENGTH} characters"
        )));
    }
    Ok(())
}

/// `POST /run_agent` — legacy single-entry router mode.
pub async fn run_agent(
    State(state): State<SharedState>,
    Extension(request_id): Extension<RequestId>,
    Json(request): Json<QueryRequest>,
) -> ApiResult<Value> {
    let with_request = |error: Error| ApiError::new(error, &request_id.0);
    require_runtime_permission(&state.policy, "user", "run_agent", &request.workspace_id)
        .map_err(with_request)?;
    validate_query(&request.query).map_err(with_request)?;

    let payload = run_router_mode(&state, &request.query)
        .await
        .map_err(with_request)?;
    Ok(Json(payload))
}

/// `POST /run_debate` — parallel debate over all registered workers.
pub async fn run_debate(
    State(state): State<SharedState>,
    Extension(request_id): Extension<RequestId>,
    Json(request): Json<QueryRequest>,
) -> ApiResult<Value> {
    let with_request = |error: Error| ApiError::new(error, &request_id.0);
    require_runtime_permission(&state.policy, "user", "run_debate", &request.workspace_id)
        .map_err(with_request)?;
    validate_query(&request.query).map_err(with_request)?;

    let outcome = state.run_debate(&request.query).await.map_err(with_request)?;
    if outcome.debate_state == DebateState::Blocked {
        return Err(with_request(Error::configuration(
            "No database agents available. Provision databases first.",
        )));
    }

    Ok(Json(json!({
        "response": outcome.response,
        "trace_steps": outcome.trace_steps,
        "debate_results": outcome.debate_results,
        "debate_state": outcome.debate_state,
    })))
}

#[derive(Debug, Deserialize)]
pub struct SemanticQueryRequest {
    pub query: String,
    #[serde(default = "default_workspace")]
    pub workspace_id: String,
    #[serde(default)]
    pub databases: Option<Vec<String>>,
    #[serde(default)]
    pub entity_overrides: Option<Vec<EntityOverride>>,
}

/// `POST /run_agent_semantic` — the deterministic four-stage pipeline.
pub async fn run_agent_semantic(
    State(state): State<SharedState>,
    Extension(request_id): Extension<RequestId>,
    Json(request): Json<SemanticQueryRequest>,
) -> ApiResult<Value> {
    let with_request = |error: Error| ApiError::new(error, &request_id.0);
    require_runtime_permission(&state.policy, "user", "run_semantic", &request.workspace_id)
        .map_err(with_request)?;
    validate_query(&request.query).map_err(with_request)?;

    let databases = resolve_databases(&state, request.databases.as_deref())
        .map_err(with_request)?;
    let overrides = request.entity_overrides.unwrap_or_default();
    let outcome = state
        .semantic_flow
        .run(&request.query, &databases, &overrides)
        .await;
    let payload = serde_json::to_value(&outcome).map_err(|err| with_request(err.into()))?;
    Ok(Json(payload))
}

/// `GET /databases` — the registry's user-facing databases.
pub async fn list_databases(State(state): State<SharedState>) -> Json<Value> {
    Json(json!({ "databases": state.registry.list_user_databases() }))
}

/// `GET /agents` — databases with a provisioned worker.
pub async fn list_agents(State(state): State<SharedState>) -> Json<Value> {
    Json(json!({ "agents": state.factory.list_worker_databases() }))
}

#[derive(Debug, Deserialize)]
pub struct EnsureIndexRequest {
    #[serde(default = "default_workspace")]
    pub workspace_id: String,
    pub databases: Vec<String>,
    #[serde(default)]
    pub index_name: Option<String>,
    #[serde(default)]
    pub labels: Option<Vec<String>>,
    #[serde(default)]
    pub properties: Option<Vec<String>>,
}

/// `POST /indexes/fulltext/ensure` — ensure a fulltext index per database.
pub async fn ensure_fulltext_indexes(
    State(state): State<SharedState>,
    Extension(request_id): Extension<RequestId>,
    Json(request): Json<EnsureIndexRequest>,
) -> ApiResult<Value> {
    let with_request = |error: Error| ApiError::new(error, &request_id.0);
    require_runtime_permission(&state.policy, "user", "manage_indexes", &request.workspace_id)
        .map_err(with_request)?;

    let index_name = request
        .index_name
        .unwrap_or_else(|| "entity_fulltext".to_string());
    let labels = request
        .labels
        .unwrap_or_else(|| vec!["Entity".to_string()]);
    let properties = request
        .properties
        .unwrap_or_else(|| vec!["name".to_string(), "title".to_string()]);

    let mut results: Vec<EnsureIndexReport> = Vec::new();
    for database in &request.databases {
        if !state.registry.is_valid(database) {
            return Err(with_request(Error::validation(format!(
                "Database '{database}' is not registered"
            ))));
        }
        let report = state
            .fulltext
            .ensure(database, &index_name, &labels, &properties, true)
            .await
            .map_err(with_request)?;
        results.push(report);
    }
    Ok(Json(json!({ "results": results })))
}

#[derive(Debug, Deserialize)]
pub struct RuleGraphRequest {
    #[serde(default = "default_workspace")]
    pub workspace_id: String,
    pub graph: Value,
}

/// `POST /rules/infer` — infer a rule profile from a submitted graph.
pub async fn rules_infer(
    State(state): State<SharedState>,
    Extension(request_id): Extension<RequestId>,
    Json(request): Json<RuleGraphRequest>,
) -> ApiResult<Value> {
    let with_request = |error: Error| ApiError::new(error, &request_id.0);
    require_runtime_permission(&state.policy, "user", "infer_rules", &request.workspace_id)
        .map_err(with_request)?;

    let (graph, warnings) = GraphPayload::from_value(&request.graph);
    if graph.nodes.is_empty() {
        return Err(with_request(Error::validation("graph has no usable nodes")));
    }
    let profile = infer_rules_from_graph(&graph, &InferenceOptions::default());
    Ok(Json(json!({ "rule_profile": profile, "warnings": warnings })))
}

#[derive(Debug, Deserialize)]
pub struct RuleValidateRequest {
    #[serde(default = "default_workspace")]
    pub workspace_id: String,
    pub graph: Value,
    pub rule_profile: Value,
}

/// `POST /rules/validate` — validate a graph against a profile.
pub async fn rules_validate(
    State(state): State<SharedState>,
    Extension(request_id): Extension<RequestId>,
    Json(request): Json<RuleValidateRequest>,
) -> ApiResult<Value> {
    let with_request = |error: Error| ApiError::new(error, &request_id.0);
    require_runtime_permission(&state.policy, "user", "validate_rules", &request.workspace_id)
        .map_err(with_request)?;

    let (graph, warnings) = GraphPayload::from_value(&request.graph);
    let profile = RuleProfile::from_value(&request.rule_profile);
    let validated = apply_rules_to_graph(&graph, &profile);
    Ok(Json(json!({
        "rule_validation_summary": validated.summary,
        "graph": validated.graph,
        "warnings": warnings,
    })))
}

#[derive(Debug, Deserialize)]
pub struct SaveRuleProfileRequest {
    #[serde(default = "default_workspace")]
    pub workspace_id: String,
    pub rule_profile: Value,
    #[serde(default)]
    pub name: Option<String>,
}

/// `POST /rules/profiles` — persist a rule profile.
pub async fn rules_profiles_save(
    State(state): State<SharedState>,
    Extension(request_id): Extension<RequestId>,
    Json(request): Json<SaveRuleProfileRequest>,
) -> ApiResult<Value> {
    let with_request = |error: Error| ApiError::new(error, &request_id.0);
    require_runtime_permission(
        &state.policy,
        "user",
        "manage_rule_profiles",
        &request.workspace_id,
    )
    .map_err(with_request)?;

    let profile = RuleProfile::from_value(&request.rule_profile);
    let stored = state
        .rule_profiles
        .save(&request.workspace_id, &profile, request.name.as_deref())
        .map_err(with_request)?;
    let payload = serde_json::to_value(&stored).map_err(|err| with_request(err.into()))?;
    Ok(Json(payload))
}

#[derive(Debug, Deserialize)]
pub struct WorkspaceQuery {
    #[serde(default = "default_workspace")]
    pub workspace_id: String,
}

/// `GET /rules/profiles` — list persisted profiles for a workspace.
pub async fn rules_profiles_list(
    State(state): State<SharedState>,
    Extension(request_id): Extension<RequestId>,
    Query(query): Query<WorkspaceQuery>,
) -> ApiResult<Value> {
    let with_request = |error: Error| ApiError::new(error, &request_id.0);
    require_runtime_permission(
        &state.policy,
        "user",
        "manage_rule_profiles",
        &query.workspace_id,
    )
    .map_err(with_request)?;

    Ok(Json(json!({
        "profiles": state.rule_profiles.list(&query.workspace_id),
    })))
}

#[derive(Debug, Deserialize)]
pub struct ExportRequest {
    #[serde(default = "default_workspace")]
    pub workspace_id: String,
    pub rule_profile: Value,
}

/// `POST /rules/export/cypher` — graph DDL export.
pub async fn rules_export_cypher(
    State(state): State<SharedState>,
    Extension(request_id): Extension<RequestId>,
    Json(request): Json<ExportRequest>,
) -> ApiResult<Value> {
    let with_request = |error: Error| ApiError::new(error, &request_id.0);
    require_runtime_permission(&state.policy, "user", "export_rules", &request.workspace_id)
        .map_err(with_request)?;
    let profile = RuleProfile::from_value(&request.rule_profile);
    let export = export_profile_to_cypher(&profile);
    let payload = serde_json::to_value(&export).map_err(|err| with_request(err.into()))?;
    Ok(Json(payload))
}

/// `POST /rules/export/shacl` — SHACL shapes plus Turtle export.
pub async fn rules_export_shacl(
    State(state): State<SharedState>,
    Extension(request_id): Extension<RequestId>,
    Json(request): Json<ExportRequest>,
) -> ApiResult<Value> {
    let with_request = |error: Error| ApiError::new(error, &request_id.0);
    require_runtime_permission(&state.policy, "user", "export_rules", &request.workspace_id)
        .map_err(with_request)?;
    let profile = RuleProfile::from_value(&request.rule_profile);
    let export = export_profile_to_shacl(&profile);
    let payload = serde_json::to_value(&export).map_err(|err| with_request(err.into()))?;
    Ok(Json(payload))
}

/// `GET /rules/profiles/{id}` — load one persisted profile.
pub async fn rules_profiles_get(
    State(state): State<SharedState>,
    Extension(request_id): Extension<RequestId>,
    Path(profile_id): Path<String>,
    Query(query): Query<WorkspaceQuery>,
) -> ApiResult<Value> {
    let with_request = |error: Error| ApiError::new(error, &request_id.0);
    require_runtime_permission(
        &state.policy,
        "user",
        "manage_rule_profiles",
        &query.workspace_id,
    )
    .map_err(with_request)?;

    let stored = state
        .rule_profiles
        .get(&query.workspace_id, &profile_id)
        .map_err(with_request)?;
    let payload = serde_json::to_value(&stored).map_err(|err| with_request(err.into()))?;
    Ok(Json(payload))
}

#[derive(Debug, Deserialize)]
pub struct SaveArtifactRequest {
    #[serde(default = "default_workspace")]
    pub workspace_id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub ontology_candidate: Value,
    pub shacl_candidate: Value,
    #[serde(default)]
    pub source_summary: Value,
}

/// `POST /semantic/artifacts` — persist an ontology/SHACL candidate pair as a draft.
pub async fn artifacts_save(
    State(state): State<SharedState>,
    Extension(request_id): Extension<RequestId>,
    Json(request): Json<SaveArtifactRequest>,
) -> ApiResult<Value> {
    let with_request = |error: Error| ApiError::new(error, &request_id.0);
    require_runtime_permission(
        &state.policy,
        "user",
        "manage_semantic_artifacts",
        &request.workspace_id,
    )
    .map_err(with_request)?;

    let artifact = state
        .artifacts
        .save(
            &request.workspace_id,
            graphmind::passes::OntologyCandidate::from_value(&request.ontology_candidate),
            graphmind::passes::ShaclCandidate::from_value(&request.shacl_candidate),
            request.name.as_deref(),
            request.source_summary,
        )
        .map_err(with_request)?;
    let payload = serde_json::to_value(&artifact).map_err(|err| with_request(err.into()))?;
    Ok(Json(payload))
}

#[derive(Debug, Deserialize)]
pub struct ArtifactListQuery {
    #[serde(default = "default_workspace")]
    pub workspace_id: String,
    #[serde(default)]
    pub status: Option<graphmind::stores::ArtifactStatus>,
}

/// `GET /semantic/artifacts` — list artifacts for a workspace.
pub async fn artifacts_list(
    State(state): State<SharedState>,
    Extension(request_id): Extension<RequestId>,
    Query(query): Query<ArtifactListQuery>,
) -> ApiResult<Value> {
    let with_request = |error: Error| ApiError::new(error, &request_id.0);
    require_runtime_permission(
        &state.policy,
        "user",
        "manage_semantic_artifacts",
        &query.workspace_id,
    )
    .map_err(with_request)?;

    Ok(Json(json!({
        "artifacts": state.artifacts.list(&query.workspace_id, query.status),
    })))
}

#[derive(Debug, Deserialize)]
pub struct ApproveArtifactRequest {
    #[serde(default = "default_workspace")]
    pub workspace_id: String,
    pub approved_by: String,
    #[serde(default)]
    pub approval_note: Option<String>,
}

/// `POST /semantic/artifacts/{id}/approve` — move a draft to approved.
pub async fn artifacts_approve(
    State(state): State<SharedState>,
    Extension(request_id): Extension<RequestId>,
    Path(artifact_id): Path<String>,
    Json(request): Json<ApproveArtifactRequest>,
) -> ApiResult<Value> {
    let with_request = |error: Error| ApiError::new(error, &request_id.0);
    require_runtime_permission(
        &state.policy,
        "user",
        "manage_semantic_artifacts",
        &request.workspace_id,
    )
    .map_err(with_request)?;

    let artifact = state
        .artifacts
        .approve(
            &request.workspace_id,
            &artifact_id,
            &request.approved_by,
            request.approval_note.as_deref(),
        )
        .map_err(with_request)?;
    let payload = serde_json::to_value(&artifact).map_err(|err| with_request(err.into()))?;
    Ok(Json(payload))
}

/// Pick the databases a request targets, validating against the registry.
pub(crate) fn resolve_databases(
    state: &AppState,
    requested: Option<&[String]>,
) -> Result<Vec<String>> {
    match requested {
        Some(databases) if !databases.is_empty() => {
            for database in databases {
                if !state.registry.is_valid(database) {
                    return Err(Error::validation(format!(
                        "Database '{database}' is not registered"
                    )));
                }
            }
            Ok(databases.to_vec())
        }
        _ => Ok(state.default_databases()),
    }
}

/// Router mode: an LM handoff picks one specialist, which answers alone.
pub(crate) async fn run_router_mode(state: &AppState, query: &str) -> Result<Value> {
    state.factory.provision_for_registry(&state.registry).await;
    let workers = state.factory.all_workers();
    let Some(first) = workers.first() else {
        return Err(Error::configuration(
            "No database agents available. Provision databases first.",
        ));
    };

    let catalog: Vec<&str> = workers.iter().map(|(db, _)| db.as_str()).collect();
    let decision = state
        .chat_model
        .complete_json(
            ROUTER_INSTRUCTIONS,
            &format!(
                "Question: {query}\nAvailable databases: {}",
                catalog.join(", ")
            ),
        )
        .await?;
    let target = decision
        .get("target_database")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let (db_name, worker) = workers
        .iter()
        .find(|(db, _)| db == target)
        .unwrap_or(first);

    let shared_memory = SharedMemory::new();
    let run = worker.run(query, &shared_memory).await?;

    let mut trace_steps = vec![
        TraceStep::new("0", StepType::UserInput, "User", query),
        TraceStep::new(
            "1",
            StepType::Thought,
            "Router",
            format!("Delegating to {}", worker.agent_name()),
        )
        .with_metadata(json!({
            "target_database": db_name,
            "reasoning": decision.get("reasoning").cloned().unwrap_or(Value::Null),
        })),
    ];
    for (offset, mut step) in run.trace_steps.into_iter().enumerate() {
        step.id = (offset + 2).to_string();
        trace_steps.push(step);
    }

    Ok(json!({ "response": run.response, "trace_steps": trace_steps }))
}
