//! # GraphMind Server
//!
//! Axum HTTP surface over the GraphMind query and ingest planes.
//!
//! Every route is JSON; `X-Request-ID` is read (or generated) by middleware,
//! echoed on the response, and carried in every error body for log
//! correlation. Authorization is role-based; the HTTP surface runs as the
//! `user` role.
//!
//! ## Routes
//!
//! - `POST /run_agent` — legacy router mode
//! - `POST /run_debate` — parallel debate across all registered workers
//! - `POST /run_agent_semantic` — deterministic semantic pipeline
//! - `POST /platform/chat/send`, `GET|DELETE /platform/chat/session/{id}`
//! - `POST /platform/ingest/raw` — raw-record ingestion
//! - `GET /databases`, `GET /agents`
//! - `POST /indexes/fulltext/ensure`
//! - `POST /rules/infer|validate`, `POST|GET /rules/profiles`,
//!   `GET /rules/profiles/{id}`, `POST /rules/export/cypher|shacl`
//! - `POST|GET /semantic/artifacts`, `POST /semantic/artifacts/{id}/approve`

pub mod error;
pub mod handlers;
pub mod platform;
pub mod request_id;
pub mod state;

use axum::http::{HeaderValue, Method};
use axum::routing::{get, post};
use axum::{middleware, Router};
use state::AppState;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

/// Build the full application router.
#[must_use]
pub fn build_router(state: Arc<AppState>) -> Router {
    // Local development frontends only; tighten for production deployments.
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list([
            HeaderValue::from_static("http://localhost:8501"),
            HeaderValue::from_static("http://localhost:3000"),
        ]))
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers(tower_http::cors::Any);

    Router::new()
        .route("/run_agent", post(handlers::run_agent))
        .route("/run_debate", post(handlers::run_debate))
        .route("/run_agent_semantic", post(handlers::run_agent_semantic))
        .route("/databases", get(handlers::list_databases))
        .route("/agents", get(handlers::list_agents))
        .route(
            "/indexes/fulltext/ensure",
            post(handlers::ensure_fulltext_indexes),
        )
        .route("/rules/infer", post(handlers::rules_infer))
        .route("/rules/validate", post(handlers::rules_validate))
        .route(
            "/rules/profiles",
            post(handlers::rules_profiles_save).get(handlers::rules_profiles_list),
        )
        .route("/rules/profiles/:profile_id", get(handlers::rules_profiles_get))
        .route("/rules/export/cypher", post(handlers::rules_export_cypher))
        .route("/rules/export/shacl", post(handlers::rules_export_shacl))
        .route(
            "/semantic/artifacts",
            post(handlers::artifacts_save).get(handlers::artifacts_list),
        )
        .route(
            "/semantic/artifacts/:artifact_id/approve",
            post(handlers::artifacts_approve),
        )
        .route("/platform/chat/send", post(platform::chat_send))
        .route(
            "/platform/chat/session/:session_id",
            get(platform::chat_get_session).delete(platform::chat_delete_session),
        )
        .route("/platform/ingest/raw", post(platform::ingest_raw))
        .layer(middleware::from_fn(request_id::request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
