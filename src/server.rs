//! JSON HTTP API.
//!
//! Exposes the [`Engine`] operations over HTTP for assistants, schedulers,
//! and web frontends. Every knowledge request carries the caller's
//! `user_id`; the tenant is resolved from it on each call.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `POST` | `/v1/retrieve` | Authority-weighted retrieval |
//! | `POST` | `/v1/conflicts` | Numeric conflict check |
//! | `POST` | `/v1/context` | Six-source context bundle |
//! | `POST` | `/v1/ask` | Answer or clarification |
//! | `POST` | `/v1/ingest` | Index a document (inline or queued) |
//! | `POST` | `/v1/remove` | Drop a document from the index |
//! | `POST` | `/v1/digests` | Generate a daily digest |
//! | `POST` | `/v1/digests/dismiss` | Dismiss a daily digest |
//! | `POST` | `/v1/briefs` | Generate a meeting brief |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "not_found", "message": "tenant not found for user: u-9" } }
//! ```
//!
//! Error codes: `bad_request` (400), `provider_disabled` (400),
//! `not_found` (404), `timeout` (408), `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::error;

use synapse_core::brief::MeetingBrief;
use synapse_core::context::{ContextBundle, ContextOptions};
use synapse_core::digest::DailyDigest;
use synapse_core::models::{ConflictReport, RetrievalResponse};
use synapse_core::EngineError;

use crate::config::Config;
use crate::engine::{Answer, Engine};
use crate::jobs::{spawn_worker, Job, JobQueue, RetryPolicy};

#[derive(Clone)]
pub struct AppState {
    engine: Engine,
    /// Present when a background worker is running.
    jobs: Option<JobQueue>,
}

impl AppState {
    pub fn new(engine: Engine, jobs: Option<JobQueue>) -> Self {
        Self { engine, jobs }
    }
}

/// Start the HTTP server on `[server].bind`.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let engine = Engine::open(config).await?;
    let (jobs, _worker) = spawn_worker(
        Arc::new(engine.clone()),
        config.jobs.queue_capacity,
        RetryPolicy {
            max_attempts: config.jobs.max_attempts,
            ..Default::default()
        },
    );

    let app = router(AppState::new(engine, Some(jobs)));
    let bind_addr = config.server.bind.clone();
    println!("Synapse server listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/v1/retrieve", post(handle_retrieve))
        .route("/v1/conflicts", post(handle_conflicts))
        .route("/v1/context", post(handle_context))
        .route("/v1/ask", post(handle_ask))
        .route("/v1/ingest", post(handle_ingest))
        .route("/v1/remove", post(handle_remove))
        .route("/v1/digests", post(handle_digest))
        .route("/v1/digests/dismiss", post(handle_dismiss_digest))
        .route("/v1/briefs", post(handle_brief))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

#[derive(Debug)]
struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

/// Maps typed engine errors to status codes; anything else is a 500 with
/// the `fallback` message so internals are not leaked.
fn classify(err: anyhow::Error, fallback: &str) -> AppError {
    let (status, code, message) = match err.downcast_ref::<EngineError>() {
        Some(
            e @ (EngineError::TenantNotFound(_)
            | EngineError::DocumentNotFound(_)
            | EngineError::EventNotFound(_)
            | EngineError::DigestNotFound { .. }),
        ) => (StatusCode::NOT_FOUND, "not_found", e.to_string()),
        Some(e @ EngineError::Timeout { .. }) => {
            (StatusCode::REQUEST_TIMEOUT, "timeout", e.to_string())
        }
        Some(e @ EngineError::ProviderDisabled(_)) => {
            (StatusCode::BAD_REQUEST, "provider_disabled", e.to_string())
        }
        None => {
            error!(error = %format!("{:#}", err), "request failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal",
                fallback.to_string(),
            )
        }
    };
    AppError {
        status,
        code,
        message,
    }
}

fn require(field: &str, value: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(bad_request(format!("{} must not be empty", field)));
    }
    Ok(())
}

fn parse_date(value: Option<&str>) -> Result<NaiveDate, AppError> {
    match value {
        Some(s) => crate::jobs::parse_date(s).map_err(|e| bad_request(e.to_string())),
        None => Ok(Utc::now().date_naive()),
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ Knowledge ============

#[derive(Deserialize)]
struct RetrieveRequest {
    user_id: String,
    query: String,
    #[serde(default)]
    top_k: Option<usize>,
}

async fn handle_retrieve(
    State(state): State<AppState>,
    Json(req): Json<RetrieveRequest>,
) -> Result<Json<RetrievalResponse>, AppError> {
    require("query", &req.query)?;
    let response = state
        .engine
        .retrieve(&req.user_id, &req.query, req.top_k)
        .await
        .map_err(|e| classify(e, "couldn't retrieve knowledge"))?;
    Ok(Json(response))
}

#[derive(Deserialize)]
struct QueryRequest {
    user_id: String,
    query: String,
}

async fn handle_conflicts(
    State(state): State<AppState>,
    Json(req): Json<QueryRequest>,
) -> Result<Json<ConflictReport>, AppError> {
    require("query", &req.query)?;
    let report = state
        .engine
        .detect_conflicts(&req.user_id, &req.query)
        .await
        .map_err(|e| classify(e, "couldn't retrieve knowledge"))?;
    Ok(Json(report))
}

#[derive(Deserialize)]
struct ContextRequest {
    user_id: String,
    query: String,
    #[serde(default)]
    options: Option<ContextOptions>,
}

async fn handle_context(
    State(state): State<AppState>,
    Json(req): Json<ContextRequest>,
) -> Result<Json<ContextBundle>, AppError> {
    let bundle = state
        .engine
        .build_context(&req.user_id, &req.query, req.options.as_ref())
        .await
        .map_err(|e| classify(e, "couldn't assemble context"))?;
    Ok(Json(bundle))
}

#[derive(Deserialize)]
struct AskRequest {
    user_id: String,
    question: String,
}

async fn handle_ask(
    State(state): State<AppState>,
    Json(req): Json<AskRequest>,
) -> Result<Json<Answer>, AppError> {
    require("question", &req.question)?;
    let answer = state
        .engine
        .ask(&req.user_id, &req.question)
        .await
        .map_err(|e| classify(e, "couldn't answer the question"))?;
    Ok(Json(answer))
}

#[derive(Deserialize)]
struct IngestRequest {
    document_id: String,
    /// Hand the document to the background worker instead of indexing inline.
    #[serde(default)]
    queue: bool,
}

async fn handle_ingest(
    State(state): State<AppState>,
    Json(req): Json<IngestRequest>,
) -> Result<Response, AppError> {
    require("document_id", &req.document_id)?;
    if req.queue {
        let jobs = state
            .jobs
            .as_ref()
            .ok_or_else(|| bad_request("background jobs are not running"))?;
        jobs.enqueue(Job::IngestDocument {
            document_id: req.document_id,
        })
        .await
        .map_err(|e| classify(e, "couldn't queue ingestion"))?;
        return Ok((StatusCode::ACCEPTED, Json(serde_json::json!({ "status": "queued" })))
            .into_response());
    }

    let outcome = state
        .engine
        .ingest(&req.document_id)
        .await
        .map_err(|e| classify(e, "couldn't ingest document"))?;
    Ok(Json(outcome).into_response())
}

#[derive(Deserialize)]
struct RemoveRequest {
    document_id: String,
    company_id: String,
}

async fn handle_remove(
    State(state): State<AppState>,
    Json(req): Json<RemoveRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let removed = state
        .engine
        .remove_document(&req.document_id, &req.company_id)
        .await
        .map_err(|e| classify(e, "couldn't remove document"))?;
    Ok(Json(serde_json::json!({ "removed_vectors": removed })))
}

// ============ Synthesis ============

#[derive(Deserialize)]
struct DigestRequest {
    user_id: String,
    #[serde(default)]
    date: Option<String>,
}

#[derive(Serialize)]
struct DigestResponse {
    /// `generated` or `skipped` (already existed).
    outcome: &'static str,
    digest: DailyDigest,
}

async fn handle_digest(
    State(state): State<AppState>,
    Json(req): Json<DigestRequest>,
) -> Result<Json<DigestResponse>, AppError> {
    let date = parse_date(req.date.as_deref())?;
    let outcome = state
        .engine
        .generate_digest(&req.user_id, date, Utc::now().timestamp())
        .await
        .map_err(|e| classify(e, "couldn't generate digest"))?;
    let label = match &outcome {
        synapse_core::digest::DigestOutcome::Generated(_) => "generated",
        synapse_core::digest::DigestOutcome::Skipped(_) => "skipped",
    };
    Ok(Json(DigestResponse {
        outcome: label,
        digest: outcome.into_digest(),
    }))
}

async fn handle_dismiss_digest(
    State(state): State<AppState>,
    Json(req): Json<DigestRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let date = parse_date(req.date.as_deref())?;
    state
        .engine
        .dismiss_digest(&req.user_id, date)
        .await
        .map_err(|e| classify(e, "couldn't dismiss digest"))?;
    Ok(Json(serde_json::json!({ "status": "dismissed" })))
}

#[derive(Deserialize)]
struct BriefRequest {
    user_id: String,
    event_id: String,
}

async fn handle_brief(
    State(state): State<AppState>,
    Json(req): Json<BriefRequest>,
) -> Result<Json<MeetingBrief>, AppError> {
    require("event_id", &req.event_id)?;
    let brief = state
        .engine
        .generate_brief(&req.user_id, &req.event_id, Utc::now().timestamp())
        .await
        .map_err(|e| classify(e, "couldn't generate meeting brief"))?;
    Ok(Json(brief))
}
