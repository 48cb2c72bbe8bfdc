//! JSON HTTP API over the answer orchestrator.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `GET`  | `/twin` | The decision twin persona and action set |
//! | `POST` | `/retrieve` | Top-k chunks for a query |
//! | `POST` | `/answer` | Full recommendation with prompt and compliance |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `retrieval_unavailable` (503),
//! `provider_error` (502), `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use decision_twin_core::answer::{Answer, AnswerRequest, Orchestrator};
use decision_twin_core::models::RetrievedItem;
use decision_twin_core::prompt::PromptVersion;
use decision_twin_core::spec::DecisionTwinSpec;
use decision_twin_core::TwinError;
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::app;
use crate::config::Config;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    orchestrator: Arc<Orchestrator>,
    default_k: usize,
}

impl AppState {
    pub fn new(orchestrator: Arc<Orchestrator>, default_k: usize) -> Self {
        Self {
            orchestrator,
            default_k,
        }
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/twin", get(handle_twin))
        .route("/retrieve", post(handle_retrieve))
        .route("/answer", post(handle_answer))
        .layer(cors)
        .with_state(state)
}

/// Starts the HTTP server on `[server].bind` and runs until the process exits.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let store = app::open_store(config).await?;
    let embedder = app::build_embedder(config)?;
    let orchestrator = app::build_orchestrator(config, store, embedder)?;
    let state = AppState::new(Arc::new(orchestrator), config.retrieval.top_k);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    info!(bind = %config.server.bind, "decision twin server listening");
    eprintln!("Decision twin server listening on http://{}", config.server.bind);

    axum::serve(listener, router(state)).await?;
    Ok(())
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

impl From<TwinError> for AppError {
    fn from(err: TwinError) -> Self {
        let (status, code) = match &err {
            TwinError::Configuration(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            TwinError::Retrieval(_) => (StatusCode::SERVICE_UNAVAILABLE, "retrieval_unavailable"),
            TwinError::Embedding { .. } | TwinError::Generation { .. } => {
                (StatusCode::BAD_GATEWAY, "provider_error")
            }
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };
        warn!(code, error = %err, "request failed");
        AppError {
            status,
            code,
            message: err.to_string(),
        }
    }
}

fn require_query(query: &str) -> Result<(), AppError> {
    if query.trim().is_empty() {
        return Err(bad_request("query must not be empty"));
    }
    Ok(())
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

// ============ GET /twin ============

async fn handle_twin(State(state): State<AppState>) -> Json<DecisionTwinSpec> {
    Json(state.orchestrator.spec().clone())
}

// ============ POST /retrieve ============

#[derive(Deserialize)]
struct RetrieveBody {
    query: String,
    #[serde(default)]
    k: Option<usize>,
}

#[derive(Serialize)]
struct RetrieveResponse {
    query: String,
    k: usize,
    results: Vec<RetrievedItem>,
}

async fn handle_retrieve(
    State(state): State<AppState>,
    Json(body): Json<RetrieveBody>,
) -> Result<Json<RetrieveResponse>, AppError> {
    require_query(&body.query)?;
    let k = body.k.unwrap_or(state.default_k);
    let results = state
        .orchestrator
        .retriever()
        .retrieve(&body.query, k)
        .await?;
    Ok(Json(RetrieveResponse {
        query: body.query,
        k,
        results,
    }))
}

// ============ POST /answer ============

#[derive(Deserialize)]
struct AnswerBody {
    query: String,
    #[serde(default)]
    use_rag: Option<bool>,
    #[serde(default)]
    prompt_version: Option<PromptVersion>,
    #[serde(default)]
    k: Option<usize>,
}

async fn handle_answer(
    State(state): State<AppState>,
    Json(body): Json<AnswerBody>,
) -> Result<Json<Answer>, AppError> {
    require_query(&body.query)?;
    let request = AnswerRequest::new(
        body.query,
        body.use_rag.unwrap_or(true),
        body.prompt_version.unwrap_or_default(),
        body.k.unwrap_or(state.default_k),
    );
    let answer = state.orchestrator.answer(&request).await?;
    Ok(Json(answer))
}
