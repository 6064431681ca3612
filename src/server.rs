//! HTTP API and MCP endpoint.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Status, version, and index summary |
//! | `POST` | `/api/v1/search` | RAG answer for `{query, user?}` |
//! | `POST` | `/api/v1/reload` | Delete and rebuild the index |
//! | `GET`  | `/api/v1/documents` | Stored documents, newest first |
//! | `POST` | `/api/v1/documents` | Store `{title, content, uploaded_by?}` and re-index |
//! | `DELETE` | `/api/v1/documents/{id}` | Delete a document and re-index |
//! | `GET`  | `/api/v1/history` | Recent searches (`?user=&limit=`) |
//! | `GET`  | `/tools/list` | Registered tools with schemas |
//! | `POST` | `/tools/{name}` | Call a tool |
//! | `*`    | `/mcp` | MCP Streamable HTTP |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query must not be empty" } }
//! ```
//!
//! Codes: `bad_request` (400), `unauthorized` (401), `not_found` (404),
//! `tool_error` (500), `internal` (500).
//!
//! # Authentication
//!
//! When `server.auth_token_env` names a variable that is set, every
//! mutating route plus `/api/v1/history`, `/tools/*` and `/mcp` require
//! `Authorization: Bearer <token>`. Other reads stay open.

use axum::{
    extract::{rejection::JsonRejection, Path, Query, Request, State},
    http::{header, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use rmcp::transport::streamable_http_server::{
    session::local::LocalSessionManager, StreamableHttpServerConfig, StreamableHttpService,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::context::{AppContext, Outcome};
use crate::mcp::McpBridge;
use crate::models::{SearchHistoryEntry, SearchResponse, StoredDocument};
use crate::traits::{validate_params, ToolContext, ToolInfo, ToolRegistry};
use crate::vector_store::IndexStatus;

const DEFAULT_HISTORY_LIMIT: i64 = 20;
const MAX_HISTORY_LIMIT: i64 = 200;

#[derive(Clone)]
struct AppState {
    app: Arc<AppContext>,
    tools: Arc<ToolRegistry>,
    auth_token: Option<Arc<String>>,
}

/// Builds the router. Exposed separately from [`run_server`] so tests can
/// serve it on an ephemeral port.
pub fn router(app: Arc<AppContext>, auth_token: Option<String>) -> Router {
    let tools = Arc::new(ToolRegistry::with_builtins());
    let state = AppState {
        app: app.clone(),
        tools: tools.clone(),
        auth_token: auth_token.map(Arc::new),
    };

    let bridge = McpBridge::new(app, tools);
    let mcp_service = StreamableHttpService::new(
        move || Ok(bridge.clone()),
        LocalSessionManager::default().into(),
        StreamableHttpServerConfig::default(),
    );

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/api/v1/search", post(handle_search))
        .route("/api/v1/reload", post(handle_reload))
        .route(
            "/api/v1/documents",
            get(handle_list_documents).post(handle_add_document),
        )
        .route("/api/v1/documents/{id}", delete(handle_delete_document))
        .route("/api/v1/history", get(handle_history))
        .route("/tools/list", get(handle_list_tools))
        .route("/tools/{name}", post(handle_tool_call))
        .nest_service("/mcp", mcp_service)
        .layer(middleware::from_fn_with_state(state.clone(), require_token))
        .layer(cors)
        .with_state(state)
}

/// Serves on `server.bind` until Ctrl-C.
pub async fn run_server(app: Arc<AppContext>) -> anyhow::Result<()> {
    let bind_addr = app.config().server.bind.clone();
    let auth_token = app.config().server.resolve_auth_token();
    if auth_token.is_none() {
        warn!("no API token configured; mutating endpoints are unauthenticated");
    }

    let router = router(app, auth_token);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(bind = %bind_addr, "server listening");
    println!("Job finder RAG listening on http://{}", bind_addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

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

fn unauthorized() -> AppError {
    AppError {
        status: StatusCode::UNAUTHORIZED,
        code: "unauthorized".to_string(),
        message: "missing or invalid bearer token".to_string(),
    }
}

fn internal(err: anyhow::Error) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: err.to_string(),
    }
}

/// Tool errors that read like input validation become 400s.
fn classify_tool_error(tool_name: &str, err: anyhow::Error) -> AppError {
    let msg = err.to_string();
    if msg.contains("must not be empty")
        || msg.contains("must be at most")
        || msg.contains("missing required")
    {
        bad_request(format!("{}: {}", tool_name, msg))
    } else {
        AppError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "tool_error".to_string(),
            message: format!("{}: {}", tool_name, msg),
        }
    }
}

fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    body.map(|Json(v)| v)
        .map_err(|rejection| bad_request(rejection.body_text()))
}

fn outcome_response(outcome: Outcome) -> Response {
    let status = if outcome.is_success() {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (status, Json(outcome)).into_response()
}

// ============ Auth ============

fn requires_auth(method: &Method, path: &str) -> bool {
    if path.starts_with("/tools/") || path == "/mcp" || path.starts_with("/mcp/") {
        return true;
    }
    if path == "/api/v1/reload" || path == "/api/v1/history" {
        return true;
    }
    path.starts_with("/api/v1/documents") && method != Method::GET
}

fn bearer_matches(req: &Request, expected: &str) -> bool {
    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|token| token.trim() == expected)
        .unwrap_or(false)
}

async fn require_token(State(state): State<AppState>, req: Request, next: Next) -> Response {
    if let Some(expected) = &state.auth_token {
        if requires_auth(req.method(), req.uri().path()) && !bearer_matches(&req, expected) {
            return unauthorized().into_response();
        }
    }
    next.run(req).await
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    index: IndexStatus,
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        index: state.app.rag().index_status(),
    })
}

// ============ POST /api/v1/search ============

#[derive(Deserialize)]
struct SearchRequest {
    query: String,
    #[serde(default)]
    user: Option<String>,
}

async fn handle_search(
    State(state): State<AppState>,
    body: Result<Json<SearchRequest>, JsonRejection>,
) -> Result<Json<SearchResponse>, AppError> {
    let req = json_body(body)?;
    let query = state
        .app
        .check_query(&req.query)
        .map_err(|e| bad_request(e.to_string()))?;

    let response = state
        .app
        .search_and_record(req.user.as_deref(), query)
        .await;
    Ok(Json(response))
}

// ============ POST /api/v1/reload ============

async fn handle_reload(State(state): State<AppState>) -> Response {
    outcome_response(state.app.reindex().await)
}

// ============ /api/v1/documents ============

#[derive(Serialize)]
struct DocumentList {
    documents: Vec<StoredDocument>,
}

async fn handle_list_documents(
    State(state): State<AppState>,
) -> Result<Json<DocumentList>, AppError> {
    let documents = state.app.documents().list().await.map_err(internal)?;
    Ok(Json(DocumentList { documents }))
}

#[derive(Deserialize)]
struct AddDocumentRequest {
    title: String,
    content: String,
    #[serde(default)]
    uploaded_by: Option<String>,
}

async fn handle_add_document(
    State(state): State<AppState>,
    body: Result<Json<AddDocumentRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let req = json_body(body)?;
    if req.title.trim().is_empty() {
        return Err(bad_request("title must not be empty"));
    }
    if req.content.trim().is_empty() {
        return Err(bad_request("content must not be empty"));
    }

    let owner = req.uploaded_by.as_deref().unwrap_or("api");
    let outcome = state.app.add_document(&req.title, &req.content, owner).await;
    Ok(outcome_response(outcome))
}

async fn handle_delete_document(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Response, AppError> {
    match state.app.delete_document(id).await.map_err(internal)? {
        Some(outcome) => Ok(outcome_response(outcome)),
        None => Err(not_found(format!("no document with id {}", id))),
    }
}

// ============ GET /api/v1/history ============

#[derive(Deserialize)]
struct HistoryParams {
    user: Option<String>,
    limit: Option<i64>,
}

#[derive(Serialize)]
struct HistoryResponse {
    history: Vec<SearchHistoryEntry>,
}

async fn handle_history(
    State(state): State<AppState>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<HistoryResponse>, AppError> {
    let limit = params
        .limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .clamp(1, MAX_HISTORY_LIMIT);
    let history = state
        .app
        .documents()
        .recent_searches(params.user.as_deref(), limit)
        .await
        .map_err(internal)?;
    Ok(Json(HistoryResponse { history }))
}

// ============ /tools ============

#[derive(Serialize)]
struct ToolListResponse {
    tools: Vec<ToolInfo>,
}

async fn handle_list_tools(State(state): State<AppState>) -> Json<ToolListResponse> {
    let tools = state
        .tools
        .tools()
        .iter()
        .map(|t| ToolInfo::from_tool(t.as_ref()))
        .collect();
    Json(ToolListResponse { tools })
}

async fn handle_tool_call(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Result<Json<serde_json::Value>, JsonRejection>,
) -> Result<Json<serde_json::Value>, AppError> {
    let params = json_body(body)?;
    let tool = state
        .tools
        .find(&name)
        .ok_or_else(|| not_found(format!("no tool registered with name: {}", name)))?;

    let validated = validate_params(&tool.parameters_schema(), &params)
        .map_err(|e| bad_request(e.to_string()))?;

    let ctx = ToolContext::new(state.app.clone());
    let result = tool
        .execute(validated, &ctx)
        .await
        .map_err(|e| classify_tool_error(&name, e))?;

    Ok(Json(serde_json::json!({ "result": result })))
}
