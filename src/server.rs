//! JSON HTTP API for the web dashboard.
//!
//! Every route goes through the same mediator pipeline the CLI uses; the
//! server adds no query capability of its own, it only changes the transport.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `POST` | `/ask` | Answer a natural-language question |
//! | `POST` | `/sql` | Run caller SQL through the validation gate |
//! | `GET`  | `/schema` | The queryable schema catalog |
//! | `POST` | `/schema/refresh` | Re-read the catalog from the database |
//! | `GET`  | `/history` | Recent question/answer log entries |
//! | `POST` | `/history/clear` | Truncate the history log |
//! | `GET`  | `/stats` | Dashboard summary statistics |
//!
//! # Error Contract
//!
//! All error responses share one schema:
//!
//! ```json
//! { "error": { "code": "policy_violation", "message": "The generated query was rejected: ..." } }
//! ```
//!
//! Error codes: `bad_request` (400), `policy_violation` (400),
//! `model_unavailable` (503), `execution_error` (500), `internal` (500).
//! The message is always the
//! user-safe text; raw provider/database errors only reach the server log.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so the dashboard can be
//! served from a different origin during development.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;

use crate::catalog::Catalog;
use crate::config::Config;
use crate::history;
use crate::mediator::{self, MediatorError};
use crate::model::{self, SqlGenerator};
use crate::models::{Answer, HistoryEntry, QueryRequest, TableSchema};
use crate::stats::{self, DashboardStats};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    pool: sqlx::SqlitePool,
    /// Catalog snapshot taken at startup; `POST /schema/refresh` replaces it.
    catalog: Arc<RwLock<Catalog>>,
    generator: Arc<dyn SqlGenerator>,
}

/// Starts the dashboard API server.
///
/// Binds to the address configured in `[server].bind` and runs until the
/// process is terminated. Fails fast if the database has no survey tables
/// or the configured model provider cannot be constructed.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let pool = crate::db::connect(config).await?;

    let catalog = Catalog::load(&pool).await?;
    if catalog.is_empty() {
        pool.close().await;
        anyhow::bail!("No tables found. Run `gpr init --seed` first.");
    }

    let generator: Arc<dyn SqlGenerator> = model::create_generator(&config.model)?.into();

    let state = AppState {
        config: Arc::new(config.clone()),
        pool,
        catalog: Arc::new(RwLock::new(catalog)),
        generator,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/health", get(handle_health))
        .route("/ask", post(handle_ask))
        .route("/sql", post(handle_sql))
        .route("/schema", get(handle_schema))
        .route("/schema/refresh", post(handle_schema_refresh))
        .route("/history", get(handle_history))
        .route("/history/clear", post(handle_history_clear))
        .route("/stats", get(handle_stats))
        .layer(cors)
        .with_state(state);

    println!("Dashboard API listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

/// JSON error response body.
#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
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

/// Constructs a 500 error with the generic `internal` code.
fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: message.into(),
    }
}

impl From<MediatorError> for AppError {
    fn from(err: MediatorError) -> AppError {
        // The detail may carry raw provider or database text; keep it on the
        // server side only.
        eprintln!("[{}] {} (detail: {})", err.code(), err, err.detail());
        let status = match err {
            MediatorError::PolicyViolation { .. } => StatusCode::BAD_REQUEST,
            MediatorError::ModelUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            MediatorError::ExecutionError { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        AppError {
            status,
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

// ============ GET /health ============

/// JSON response body for `GET /health`.
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

// ============ POST /ask ============

/// JSON request body for `POST /ask`.
#[derive(Deserialize)]
struct AskRequest {
    question: String,
    /// Groups related questions in the history log. A fresh id is minted
    /// when omitted.
    session_id: Option<String>,
}

/// Handler for `POST /ask`.
///
/// Runs the full pipeline: model call, validation gate, bounded execution,
/// formatting, history append. Returns the [`Answer`] on success.
async fn handle_ask(
    State(state): State<AppState>,
    Json(body): Json<AskRequest>,
) -> Result<Json<Answer>, AppError> {
    let question = body.question.trim().to_string();
    if question.is_empty() {
        return Err(AppError {
            status: StatusCode::BAD_REQUEST,
            code: "bad_request".to_string(),
            message: "question must not be empty".to_string(),
        });
    }

    let session_id = body
        .session_id
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let request = QueryRequest::new(&question, session_id);

    let catalog = state.catalog.read().await;
    let answer = mediator::answer_question(
        &state.pool,
        &catalog,
        state.generator.as_ref(),
        &state.config,
        &request,
    )
    .await?;

    Ok(Json(answer))
}

// ============ POST /sql ============

/// JSON request body for `POST /sql`.
#[derive(Deserialize)]
struct SqlRequest {
    sql: String,
    session_id: Option<String>,
}

/// Handler for `POST /sql`.
///
/// Caller-provided SQL enters the same gate as model output: read-only,
/// catalog-checked, row-limited.
async fn handle_sql(
    State(state): State<AppState>,
    Json(body): Json<SqlRequest>,
) -> Result<Json<Answer>, AppError> {
    let session_id = body
        .session_id
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let request = QueryRequest::new(&body.sql, session_id);

    let catalog = state.catalog.read().await;
    let answer =
        mediator::answer_with_sql(&state.pool, &catalog, &state.config, &request, &body.sql)
            .await?;

    Ok(Json(answer))
}

// ============ GET /schema ============

/// JSON response body for `GET /schema`.
#[derive(Serialize)]
struct SchemaResponse {
    tables: Vec<TableSchema>,
}

async fn handle_schema(State(state): State<AppState>) -> Json<SchemaResponse> {
    let catalog = state.catalog.read().await;
    Json(SchemaResponse {
        tables: catalog.tables().to_vec(),
    })
}

/// Handler for `POST /schema/refresh`.
///
/// Re-reads the catalog from the live database so out-of-band schema changes
/// become visible without restarting the server.
async fn handle_schema_refresh(
    State(state): State<AppState>,
) -> Result<Json<SchemaResponse>, AppError> {
    let fresh = Catalog::load(&state.pool)
        .await
        .map_err(|e| internal(e.to_string()))?;
    let tables = fresh.tables().to_vec();
    *state.catalog.write().await = fresh;
    Ok(Json(SchemaResponse { tables }))
}

// ============ GET /history ============

/// Query parameters for `GET /history`.
#[derive(Deserialize)]
struct HistoryParams {
    limit: Option<i64>,
}

/// JSON response body for `GET /history`.
#[derive(Serialize)]
struct HistoryResponse {
    entries: Vec<HistoryEntry>,
    total: i64,
}

/// Handler for `GET /history`.
///
/// Returns the most recent entries, newest first. `limit` defaults to 50
/// and is capped at 500.
async fn handle_history(
    State(state): State<AppState>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<HistoryResponse>, AppError> {
    let limit = params.limit.unwrap_or(50).clamp(1, 500);
    let entries = history::list_entries(&state.pool, limit)
        .await
        .map_err(|e| internal(e.to_string()))?;
    let total = history::count_entries(&state.pool)
        .await
        .map_err(|e| internal(e.to_string()))?;
    Ok(Json(HistoryResponse { entries, total }))
}

/// JSON response body for `POST /history/clear`.
#[derive(Serialize)]
struct ClearResponse {
    removed: u64,
}

/// Handler for `POST /history/clear`.
///
/// Whole-log truncation; individual entries can never be edited or removed.
async fn handle_history_clear(
    State(state): State<AppState>,
) -> Result<Json<ClearResponse>, AppError> {
    let removed = history::clear_history(&state.pool)
        .await
        .map_err(|e| internal(e.to_string()))?;
    Ok(Json(ClearResponse { removed }))
}

// ============ GET /stats ============

async fn handle_stats(State(state): State<AppState>) -> Result<Json<DashboardStats>, AppError> {
    let stats = stats::load_stats(&state.pool)
        .await
        .map_err(|e| internal(e.to_string()))?;
    Ok(Json(stats))
}
