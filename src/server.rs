//! HTTP gateway for the question queue.
//!
//! The gateway never runs retrieval itself: `POST /ask` validates and
//! enqueues, workers do the heavy lifting, and clients poll
//! `GET /tasks/{id}` for the result.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/ask` | Enqueue a question, returns a task id |
//! | `GET`  | `/tasks/{id}` | Poll a task's status and result |
//! | `GET`  | `/health` | Health check |
//!
//! # Error Contract
//!
//! All error responses share one schema:
//!
//! ```json
//! { "error": { "code": "not_found", "message": "no task with id ..." } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so browser clients can
//! poll the queue directly.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;
use uuid::Uuid;

use crate::broker::TaskBroker;
use crate::context::AppContext;
use crate::models::{Task, TaskView};

#[derive(Clone)]
struct AppState {
    ctx: Arc<AppContext>,
    broker: TaskBroker,
}

/// Build the gateway router over a shared context.
pub fn router(ctx: Arc<AppContext>) -> Router {
    let broker = TaskBroker::new(ctx.pool.clone(), ctx.config.queue.result_ttl_secs);
    let state = AppState { ctx, broker };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/ask", post(handle_ask))
        .route("/tasks/{id}", get(handle_get_task))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

/// Bind the configured address and serve until the process exits.
pub async fn run_server(ctx: Arc<AppContext>) -> anyhow::Result<()> {
    let bind_addr = ctx.config.server.bind.clone();
    let app = router(ctx);

    info!(addr = %bind_addr, "gateway listening");
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;
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
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: message.into(),
    }
}

// ============ POST /ask ============

#[derive(Deserialize)]
struct AskRequest {
    question: String,
    session_id: Option<String>,
    top_k: Option<usize>,
    use_web_search: Option<bool>,
}

#[derive(Serialize)]
struct AskResponse {
    task_id: String,
    session_id: String,
    status: &'static str,
}

/// Handler for `POST /ask`.
///
/// Accepts any question (including an empty one, which completes with an
/// empty answer), fills in defaults, and enqueues it. `session_id` is
/// minted when the client does not supply one.
async fn handle_ask(
    State(state): State<AppState>,
    Json(req): Json<AskRequest>,
) -> Result<Json<AskResponse>, AppError> {
    let config = &state.ctx.config;

    let top_k = req.top_k.unwrap_or(config.retrieval.top_k);
    if top_k == 0 || top_k > 100 {
        return Err(bad_request("top_k must be between 1 and 100"));
    }

    let task = Task {
        task_id: Uuid::new_v4().to_string(),
        question: req.question,
        session_id: req
            .session_id
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string()),
        top_k,
        use_web_search: req.use_web_search.unwrap_or(config.web_search.enabled),
    };

    state
        .broker
        .submit(&task)
        .await
        .map_err(|e| internal(format!("enqueue failed: {e:#}")))?;

    Ok(Json(AskResponse {
        task_id: task.task_id,
        session_id: task.session_id,
        status: "queued",
    }))
}

// ============ GET /tasks/{id} ============

/// Handler for `GET /tasks/{id}`.
///
/// Expired tasks are pruned before the lookup, so an expired id and an
/// unknown id both return 404.
async fn handle_get_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<TaskView>, AppError> {
    let view = state
        .broker
        .poll(&id)
        .await
        .map_err(|e| internal(format!("poll failed: {e:#}")))?
        .ok_or_else(|| not_found(format!("no task with id {id}")))?;
    Ok(Json(view))
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    collection: String,
    db_path: String,
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        collection: state.ctx.store.collection().to_string(),
        db_path: state.ctx.config.db.path.display().to_string(),
    })
}
