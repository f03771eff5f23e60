//! Platform chat façade and raw ingestion handlers.

use crate::error::ApiError;
use crate::handlers::{resolve_databases, run_router_mode, SharedState};
use crate::request_id::RequestId;
use crate::state::AppState;
use axum::extract::{Extension, Path, State};
use axum::Json;
use graphmind::error::{Error, Result};
use graphmind::factory::DebateState;
use graphmind::ingest::IngestOptions;
use graphmind::parser::RawRecord;
use graphmind::policy::require_runtime_permission;
use graphmind::session::{build_ui_payload, ChatMode};
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Debug, Deserialize)]
pub struct ChatSendRequest {
    pub session_id: String,
    pub message: String,
    pub mode: ChatMode,
    #[serde(default = "default_workspace")]
    pub workspace_id: String,
    #[serde(default)]
    pub databases: Option<Vec<String>>,
}

fn default_workspace() -> String {
    "default".to_string()
}

type ApiResult<T> = std::result::Result<Json<T>, ApiError>;

/// `POST /platform/chat/send` — append the user turn, dispatch the selected
/// mode, record the assistant turn, and shape the UI payload.
pub async fn chat_send(
    State(state): State<SharedState>,
    Extension(request_id): Extension<RequestId>,
    Json(request): Json<ChatSendRequest>,
) -> ApiResult<Value> {
    let with_request = |error: Error| ApiError::new(error, &request_id.0);
    require_runtime_permission(&state.policy, "user", "run_platform", &request.workspace_id)
        .map_err(with_request)?;
    if request.session_id.trim().is_empty() {
        return Err(with_request(Error::validation("session_id is required")));
    }

    state.sessions.append(
        &request.session_id,
        "user",
        &request.message,
        json!({ "mode": request.mode }),
    );

    let (executed_mode, runtime_payload) = dispatch_mode(
        &state,
        request.mode,
        &request.message,
        request.databases.as_deref(),
    )
    .await
    .map_err(with_request)?;

    let assistant_message = runtime_payload
        .get("response")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    state.sessions.append(
        &request.session_id,
        "assistant",
        &assistant_message,
        json!({ "mode": executed_mode }),
    );

    let ui_payload = build_ui_payload(executed_mode, &runtime_payload);
    Ok(Json(json!({
        "session_id": request.session_id,
        "assistant_message": assistant_message,
        "history": state.sessions.get(&request.session_id),
        "runtime_payload": runtime_payload,
        "ui_payload": ui_payload,
    })))
}

/// `GET /platform/chat/session/{id}` — session history.
pub async fn chat_get_session(
    State(state): State<SharedState>,
    Path(session_id): Path<String>,
) -> Json<Value> {
    Json(json!({
        "session_id": session_id,
        "history": state.sessions.get(&session_id),
    }))
}

/// `DELETE /platform/chat/session/{id}` — reset the session.
pub async fn chat_delete_session(
    State(state): State<SharedState>,
    Path(session_id): Path<String>,
) -> Json<Value> {
    state.sessions.clear(&session_id);
    Json(json!({ "session_id": session_id, "cleared": true }))
}

#[derive(Debug, Deserialize)]
pub struct IngestRawRequest {
    #[serde(default = "default_workspace")]
    pub workspace_id: String,
    pub target_database: String,
    pub records: Vec<RawRecord>,
}

/// `POST /platform/ingest/raw` — parse, extract, and load raw records.
pub async fn ingest_raw(
    State(state): State<SharedState>,
    Extension(request_id): Extension<RequestId>,
    Json(request): Json<IngestRawRequest>,
) -> ApiResult<Value> {
    let with_request = |error: Error| ApiError::new(error, &request_id.0);
    require_runtime_permission(&state.policy, "user", "ingest_raw", &request.workspace_id)
        .map_err(with_request)?;
    if request.records.is_empty() {
        return Err(with_request(Error::validation("records must not be empty")));
    }

    let options = IngestOptions {
        enable_rule_constraints: state.config.enable_rule_constraints,
        ..IngestOptions::default()
    };
    let summary = state
        .ingestor
        .ingest_records(&request.records, &request.target_database, &options)
        .await
        .map_err(with_request)?;
    let payload = serde_json::to_value(&summary).map_err(|err| with_request(err.into()))?;
    Ok(Json(payload))
}

/// Dispatch one chat turn. Debate auto-falls-back to the semantic flow when
/// the orchestrator reports `blocked`.
async fn dispatch_mode(
    state: &AppState,
    mode: ChatMode,
    message: &str,
    databases: Option<&[String]>,
) -> Result<(ChatMode, Value)> {
    match mode {
        ChatMode::Debate => {
            let outcome = state.run_debate(message).await?;
            if outcome.debate_state == DebateState::Blocked {
                tracing::warn!("debate blocked; falling back to semantic flow");
                let (_, mut payload) =
                    run_semantic_mode(state, message, databases).await?;
                merge_object(
                    &mut payload,
                    json!({
                        "runtime_control": {
                            "requested_mode": "debate",
                            "executed_mode": "semantic",
                            "reason": "debate_blocked",
                        },
                        "fallback_from": {
                            "mode": "debate",
                            "debate_state": outcome.debate_state,
                            "agent_statuses": outcome.agent_statuses,
                        },
                    }),
                );
                return Ok((ChatMode::Semantic, payload));
            }
            Ok((
                ChatMode::Debate,
                json!({
                    "response": outcome.response,
                    "trace_steps": outcome.trace_steps,
                    "debate_results": outcome.debate_results,
                    "debate_state": outcome.debate_state,
                }),
            ))
        }
        ChatMode::Router => {
            let payload = run_router_mode(state, message).await?;
            Ok((ChatMode::Router, payload))
        }
        ChatMode::Semantic => run_semantic_mode(state, message, databases).await,
    }
}

async fn run_semantic_mode(
    state: &AppState,
    message: &str,
    databases: Option<&[String]>,
) -> Result<(ChatMode, Value)> {
    let databases = resolve_databases(state, databases)?;
    let outcome = state.semantic_flow.run(message, &databases, &[]).await;
    Ok((ChatMode::Semantic, serde_json::to_value(&outcome)?))
}

fn merge_object(target: &mut Value, extra: Value) {
    if let (Some(target_map), Value::Object(extra_map)) = (target.as_object_mut(), extra) {
        for (key, value) in extra_map {
            target_map.insert(key, value);
        }
    }
}
