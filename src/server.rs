//! JSON HTTP API over the matching pipelines.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/ingest/csv` | Create/extend a collection from a CSV upload |
//! | `POST` | `/ingest/pdf` | Create/extend a collection from a PDF upload |
//! | `POST` | `/compare` | Rank a query against a collection, inline |
//! | `POST` | `/compare/async` | Enqueue a comparison job for the worker |
//! | `GET`  | `/status/{request_id}` | Status and results of a submitted job |
//! | `GET`  | `/projects` | List collection names |
//! | `GET`  | `/health` | Liveness of the worker and queue |
//! | `GET`  | `/metrics` | Host, process and application counters |
//!
//! # Error Contract
//!
//! Error responses carry a machine-readable code and a message:
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `queue_full` (429),
//! `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted to support browser-based
//! clients.

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;

use crate::compare::CompareError;
use crate::config::Config;
use crate::embedding::{create_embedder, Embedder};
use crate::jobs::{JobQueue, ResultsStore};
use crate::models::{ComparisonJob, JobStatus, Match, ScoringStrategy};
use crate::monitoring::{self, Monitoring};
use crate::rescore::Rescorer;
use crate::store::{MemoryVectorStore, VectorStore};
use crate::worker::{self, WorkerContext};
use crate::{compare, ingest};

/// Shared application state passed to all route handlers via Axum's `State`
/// extractor.
#[derive(Clone)]
struct AppState {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    rescorer: Option<Arc<Rescorer>>,
    queue: JobQueue,
    results: ResultsStore,
    monitoring: Arc<Monitoring>,
}

/// Starts the HTTP server and the background worker.
///
/// Binds to `[server].bind` and runs until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();

    let store = MemoryVectorStore::shared();
    let embedder = create_embedder(&config.embedding)?;
    let rescorer = if config.rescoring.is_enabled() {
        Some(Arc::new(Rescorer::from_config(&config.rescoring)?))
    } else {
        None
    };

    let (queue, rx) = JobQueue::new(config.queue.capacity);
    let results = ResultsStore::new();

    let (_handle, worker_alive) = worker::spawn(
        WorkerContext {
            store: store.clone(),
            embedder: embedder.clone(),
            rescorer: rescorer.clone(),
            results: results.clone(),
            data_dir: config.store.data_dir.clone(),
        },
        rx,
    );

    let monitor = Arc::new(Monitoring::new(
        queue.clone(),
        results.clone(),
        worker_alive,
    ));
    monitoring::spawn_metrics_task(monitor.clone(), config.monitoring.metrics_interval_secs);

    let state = AppState {
        store,
        embedder,
        rescorer,
        queue,
        results,
        monitoring: monitor,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/ingest/csv", post(handle_ingest_csv))
        .route("/ingest/pdf", post(handle_ingest_pdf))
        .route("/compare", post(handle_compare))
        .route("/compare/async", post(handle_compare_async))
        .route("/status/{request_id}", get(handle_status))
        .route("/projects", get(handle_projects))
        .route("/health", get(handle_health))
        .route("/metrics", get(handle_metrics))
        .layer(cors)
        .with_state(state);

    tracing::info!(%bind_addr, "Server listening");

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

fn queue_full(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::TOO_MANY_REQUESTS,
        code: "queue_full".to_string(),
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

// ============ POST /ingest/csv ============

#[derive(Serialize)]
struct CsvIngestResponse {
    message: String,
    added_documents: usize,
}

/// Multipart upload: `project_name` text field plus a `csv_file` part.
async fn handle_ingest_csv(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<CsvIngestResponse>, AppError> {
    let (project_name, bytes) = read_upload(&mut multipart, "csv_file").await?;

    let outcome = ingest::ingest_csv(&state.store, &state.embedder, &project_name, &bytes)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, project = %project_name, "CSV ingest failed");
            internal(format!("CSV ingest failed: {}", e))
        })?;

    Ok(Json(CsvIngestResponse {
        message: format!("Project '{}' created.", project_name),
        added_documents: outcome.added,
    }))
}

// ============ POST /ingest/pdf ============

#[derive(Serialize)]
struct PdfIngestResponse {
    success: bool,
    problems_count: usize,
    total_problems: usize,
    message: String,
}

/// Multipart upload: `project_name` text field plus a `pdf_file` part. A PDF
/// yielding no extractable fragments is still a success with a zero count.
async fn handle_ingest_pdf(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<PdfIngestResponse>, AppError> {
    let (project_name, bytes) = read_upload(&mut multipart, "pdf_file").await?;

    let outcome = ingest::ingest_document(&state.store, &state.embedder, &project_name, bytes)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, project = %project_name, "PDF ingest failed");
            internal(format!("PDF ingest failed: {}", e))
        })?;

    Ok(Json(PdfIngestResponse {
        success: true,
        problems_count: outcome.added,
        total_problems: outcome.total,
        message: format!(
            "Project '{}' now holds {} problems ({} new).",
            project_name, outcome.total, outcome.added
        ),
    }))
}

/// Pull `project_name` and the named file part out of a multipart body.
async fn read_upload(
    multipart: &mut Multipart,
    file_field: &str,
) -> Result<(String, Vec<u8>), AppError> {
    let mut project_name: Option<String> = None;
    let mut bytes: Option<Vec<u8>> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("Invalid multipart body: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if name == "project_name" {
            let text = field
                .text()
                .await
                .map_err(|e| bad_request(format!("Invalid project_name: {}", e)))?;
            project_name = Some(text.trim().to_string());
        } else if name == file_field {
            let data = field
                .bytes()
                .await
                .map_err(|e| bad_request(format!("Invalid {}: {}", file_field, e)))?;
            bytes = Some(data.to_vec());
        }
    }

    let project_name = project_name
        .filter(|n| !n.is_empty())
        .ok_or_else(|| bad_request("Missing 'project_name'"))?;
    let bytes = bytes
        .filter(|b| !b.is_empty())
        .ok_or_else(|| bad_request(format!("Missing '{}'", file_field)))?;
    Ok((project_name, bytes))
}

// ============ POST /compare ============

fn default_user() -> String {
    "anonymous".to_string()
}

#[derive(Deserialize)]
struct CompareRequest {
    project_name: String,
    query: String,
    #[serde(default = "default_user")]
    user_id: String,
}

#[derive(Serialize)]
struct CompareResponse {
    request_id: Uuid,
    status: JobStatus,
    top_matches: Vec<Match>,
    project_name: String,
}

/// Rank the query inline and record the result so `/status/{id}` can replay
/// it.
async fn handle_compare(
    State(state): State<AppState>,
    Json(req): Json<CompareRequest>,
) -> Result<Json<CompareResponse>, AppError> {
    let project_name = req.project_name.trim().to_string();
    if project_name.is_empty() {
        return Err(bad_request("Project name is required."));
    }
    if req.query.trim().is_empty() {
        return Err(bad_request("Query is required."));
    }

    tracing::info!(user = %req.user_id, project = %project_name, "Compare request");

    let matches = compare::compare(
        &state.store,
        &state.embedder,
        state.rescorer.as_deref(),
        &project_name,
        &req.query,
    )
    .await
    .map_err(|e| match e {
        CompareError::CollectionNotFound(_) => not_found(e.to_string()),
        CompareError::Scoring(_) => internal(e.to_string()),
    })?;

    let request_id = Uuid::new_v4();
    state.results.insert_queued(request_id);
    state.results.complete(request_id, matches.clone());

    Ok(Json(CompareResponse {
        request_id,
        status: JobStatus::Completed,
        top_matches: matches,
        project_name,
    }))
}

// ============ POST /compare/async ============

#[derive(Deserialize)]
struct AsyncCompareRequest {
    project_name: String,
    query: String,
    #[serde(default)]
    targets: Vec<String>,
    #[serde(default)]
    strategy: Option<ScoringStrategy>,
    #[serde(default = "default_user")]
    user_id: String,
}

#[derive(Serialize)]
struct AsyncCompareResponse {
    request_id: Uuid,
    status: JobStatus,
}

/// Enqueue a comparison for the background worker. A full queue rejects with
/// 429 without leaving a phantom job behind.
async fn handle_compare_async(
    State(state): State<AppState>,
    Json(req): Json<AsyncCompareRequest>,
) -> Result<(StatusCode, Json<AsyncCompareResponse>), AppError> {
    let project_name = req.project_name.trim().to_string();
    if project_name.is_empty() {
        return Err(bad_request("Project name is required."));
    }
    if req.query.trim().is_empty() {
        return Err(bad_request("Query is required."));
    }

    let strategy = req.strategy.unwrap_or(if req.targets.is_empty() {
        ScoringStrategy::Similarity
    } else {
        ScoringStrategy::PairwiseLlm
    });

    let job = ComparisonJob {
        job_id: Uuid::new_v4(),
        submitted_by: req.user_id,
        collection: project_name,
        query: req.query,
        targets: req.targets,
        strategy,
    };
    let request_id = job.job_id;

    state.results.insert_queued(request_id);
    if state.queue.submit(job).is_err() {
        state.results.remove(request_id);
        return Err(queue_full("Job queue is full, try again later."));
    }

    Ok((
        StatusCode::ACCEPTED,
        Json(AsyncCompareResponse {
            request_id,
            status: JobStatus::Queued,
        }),
    ))
}

// ============ GET /status/{request_id} ============

async fn handle_status(
    State(state): State<AppState>,
    Path(request_id): Path<String>,
) -> Result<Json<crate::models::JobResult>, AppError> {
    // an unparseable id is indistinguishable from an unknown one
    let id = Uuid::parse_str(&request_id).map_err(|_| not_found("Invalid request_id"))?;
    state
        .results
        .get(id)
        .map(Json)
        .ok_or_else(|| not_found("Invalid request_id"))
}

// ============ GET /projects ============

#[derive(Serialize)]
struct ProjectsResponse {
    projects: Vec<String>,
}

async fn handle_projects(
    State(state): State<AppState>,
) -> Result<Json<ProjectsResponse>, AppError> {
    let infos = state
        .store
        .list_collections()
        .await
        .map_err(|e| internal(e.to_string()))?;
    Ok(Json(ProjectsResponse {
        projects: infos.into_iter().map(|i| i.name).collect(),
    }))
}

// ============ GET /health ============

async fn handle_health(State(state): State<AppState>) -> Response {
    let report = state.monitoring.health();
    let status = if report.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report)).into_response()
}

// ============ GET /metrics ============

async fn handle_metrics(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(state.monitoring.metrics())
}
