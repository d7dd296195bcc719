//! HTTP/SSE front end over the indexing and query engines.
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/index/library/{id}` | Start indexing (409 when already running) |
//! | `GET`  | `/index/library/{id}/progress` | SSE stream of progress events |
//! | `POST` | `/index/library/{id}/cancel` | Request cancellation |
//! | `GET`  | `/libraries` | Libraries reported by Zotero |
//! | `GET`  | `/libraries/{id}/status` | Index metadata (404 when not indexed) |
//! | `POST` | `/libraries/{id}/reset` | Schedule a hard reset |
//! | `POST` | `/query` | Answer a question with citations |
//! | `GET`  | `/health` | Health check |
//!
//! Errors use `{ "error": { "code": "...", "message": "..." } }`.

use crate::commands::{cmd_libraries, cmd_library_status, cmd_reset, LibraryEntry, LibraryStatus};
use crate::context::AppContext;
use crate::error::{Error, Result};
use crate::index::IndexRequest;
use crate::jobs::{ProgressEvent, ProgressSnapshot};
use crate::models::{LibraryType, QueryResult, RequestedMode};
use crate::rag::{QueryEngine, QueryRequest};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

#[derive(Clone)]
struct AppState {
    ctx: AppContext,
    query: Arc<QueryEngine>,
}

/// Build the router; exposed so tests can serve it on an ephemeral port
pub fn router(ctx: AppContext, query: Arc<QueryEngine>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/index/library/{id}", post(handle_start_indexing))
        .route("/index/library/{id}/progress", get(handle_progress))
        .route("/index/library/{id}/cancel", post(handle_cancel))
        .route("/libraries", get(handle_libraries))
        .route("/libraries/{id}/status", get(handle_status))
        .route("/libraries/{id}/reset", post(handle_reset))
        .route("/query", post(handle_query))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(AppState { ctx, query })
}

/// Serve on `server.bind` until Ctrl-C
pub async fn run_server(ctx: AppContext) -> Result<()> {
    let bind_addr = ctx.config.server.bind.clone();
    let query = Arc::new(ctx.query_engine()?);
    let app = router(ctx, query);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("Listening on http://{}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await?;

    Ok(())
}

// ============ Errors ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        let (status, code) = match &err {
            Error::ConcurrentIndexingConflict(_) => (StatusCode::CONFLICT, "conflict"),
            Error::LibraryNotIndexed(_) => (StatusCode::NOT_FOUND, "not_indexed"),
            Error::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            Error::ContentStoreUnavailable(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "content_store_unavailable")
            }
            Error::VectorStore(_) => (StatusCode::SERVICE_UNAVAILABLE, "vector_store_error"),
            Error::Generation(_) => (StatusCode::BAD_GATEWAY, "generation_error"),
            Error::Embedding(_) => (StatusCode::BAD_GATEWAY, "embedding_error"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };
        if status.is_server_error() {
            error!("Request failed: {}", err);
        }
        AppError {
            status,
            code,
            message: err.to_string(),
        }
    }
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

fn not_found(message: String) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found",
        message,
    }
}

// ============ Indexing ============

/// Body of `POST /index/library/{id}`; every field is optional
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct StartIndexBody {
    pub library_type: Option<LibraryType>,
    pub library_name: Option<String>,
    pub mode: RequestedMode,
    pub max_items: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StartIndexResponse {
    pub library_id: String,
    pub status: String,
}

async fn handle_start_indexing(
    State(state): State<AppState>,
    Path(library_id): Path<String>,
    body: Option<Json<StartIndexBody>>,
) -> std::result::Result<(StatusCode, Json<StartIndexResponse>), AppError> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let ctx = &state.ctx;

    let (library_type, library_name) = match (body.library_type, body.library_name) {
        (Some(t), Some(name)) => (t, name),
        (t, name) => {
            let lib = ctx.resolve_library(&library_id).await?;
            (t.unwrap_or(lib.library_type), name.unwrap_or(lib.name))
        }
    };

    let request = IndexRequest::new(&library_id, library_type, &library_name)
        .with_mode(body.mode)
        .with_max_items(body.max_items.or(ctx.config.indexing.max_items));

    // The job runs on its own task; progress is followed over SSE
    ctx.jobs.start(request).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(StartIndexResponse {
            library_id,
            status: "started".to_string(),
        }),
    ))
}

fn progress_stream(
    rx: watch::Receiver<ProgressSnapshot>,
) -> impl Stream<Item = std::result::Result<Event, axum::Error>> {
    stream::unfold(Some((rx, true)), |state| async move {
        let (mut rx, first) = state?;
        if !first && rx.changed().await.is_err() {
            return None;
        }
        let event = ProgressEvent::from(&*rx.borrow_and_update());
        let next = if event.is_terminal() {
            None
        } else {
            Some((rx, false))
        };
        Some((Event::default().event(event.name()).json_data(&event), next))
    })
}

async fn handle_progress(
    State(state): State<AppState>,
    Path(library_id): Path<String>,
) -> std::result::Result<Sse<impl Stream<Item = std::result::Result<Event, axum::Error>>>, AppError>
{
    let rx = state
        .ctx
        .jobs
        .subscribe(&library_id)
        .await
        .ok_or_else(|| not_found(format!("No indexing job for library {}", library_id)))?;

    Ok(Sse::new(progress_stream(rx)).keep_alive(KeepAlive::default()))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CancelResponse {
    pub library_id: String,
    pub cancelled: bool,
}

async fn handle_cancel(
    State(state): State<AppState>,
    Path(library_id): Path<String>,
) -> Json<CancelResponse> {
    let cancelled = state.ctx.jobs.cancel(&library_id).await;
    Json(CancelResponse {
        library_id,
        cancelled,
    })
}

// ============ Libraries ============

async fn handle_libraries(
    State(state): State<AppState>,
) -> std::result::Result<Json<Vec<LibraryEntry>>, AppError> {
    Ok(Json(cmd_libraries(&state.ctx).await?))
}

async fn handle_status(
    State(state): State<AppState>,
    Path(library_id): Path<String>,
) -> std::result::Result<Json<LibraryStatus>, AppError> {
    Ok(Json(cmd_library_status(&state.ctx, &library_id).await?))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ResetResponse {
    pub library_id: String,
    pub reset: bool,
}

async fn handle_reset(
    State(state): State<AppState>,
    Path(library_id): Path<String>,
) -> std::result::Result<Json<ResetResponse>, AppError> {
    let reset = cmd_reset(&state.ctx, &library_id).await?;
    Ok(Json(ResetResponse { library_id, reset }))
}

// ============ Query ============

async fn handle_query(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> std::result::Result<Json<QueryResult>, AppError> {
    Ok(Json(state.query.query(&request).await?))
}

// ============ Health ============

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}
