// Main entry point for the batch image annotation service

use batch_lens::{
    core::{errors::ProcessError, Config},
    orchestration::batch_orchestrator::BatchOrchestrator,
    services::{metadata::MetadataWriter, ollama::OllamaClient, scanner},
    utils::Metrics,
};

use anyhow::{Context, Result};
use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

/// Application state shared across handlers
#[derive(Clone)]
struct AppState {
    ollama: Arc<OllamaClient>,
    orchestrator: Arc<BatchOrchestrator>,
    metrics: Metrics,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Arc::new(Config::new().context("Failed to load configuration")?);

    // Initialize logging
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::new(format!(
        "batch_lens={},tower_http=warn",
        match config.log_level() {
            tracing::Level::TRACE => "trace",
            tracing::Level::DEBUG => "debug",
            tracing::Level::INFO => "info",
            tracing::Level::WARN => "warn",
            tracing::Level::ERROR => "error",
        }
    ));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("=== BATCH LENS - VLM IMAGE TAGGER ===");
    info!(
        "Inference service: {}  Writer: {} (timeout {:?})",
        config.ollama_url(),
        config.writer_binary(),
        config.writer_timeout()
    );

    let metrics = Metrics::new();
    let ollama = Arc::new(OllamaClient::new(&config.ollama).context("Failed to create inference client")?);
    let writer = Arc::new(MetadataWriter::new(&config.writer));
    let orchestrator = Arc::new(BatchOrchestrator::new(
        Arc::clone(&ollama),
        writer,
        metrics.clone(),
    ));

    let state = AppState {
        ollama,
        orchestrator,
        metrics,
    };

    // Setup CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/models", get(list_models))
        .route("/scan", post(scan))
        .route("/process", post(process_image))
        .route("/batch/start", post(batch_start))
        .route("/batch/cancel", post(batch_cancel))
        .route("/batch/status", get(batch_status))
        .route("/serve", get(serve_image))
        .route("/metrics", get(metrics_endpoint))
        .route("/stats", get(stats_endpoint))
        .with_state(state)
        .layer(cors);

    let addr = format!("{}:{}", config.server_host(), config.server_port());
    info!("{}", "=".repeat(70));
    info!("Server starting on http://{}", addr);
    info!("{}", "-".repeat(70));
    info!("Endpoints:");
    info!("  GET  /                - Root endpoint");
    info!("  GET  /health          - Health check");
    info!("  GET  /models          - Installed inference models");
    info!("  POST /scan            - Scan a directory for images");
    info!("  POST /process         - Annotate a single image");
    info!("  POST /batch/start     - Start a batch run");
    info!("  POST /batch/cancel    - Cancel the active batch run");
    info!("  GET  /batch/status    - Batch state snapshot");
    info!("  GET  /serve           - Image preview bytes");
    info!("  GET  /metrics         - Prometheus metrics");
    info!("  GET  /stats           - Detailed statistics");
    info!("{}", "=".repeat(70));

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn root() -> &'static str {
    "Batch Lens - Local VLM Image Description & Metadata Tagger"
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

fn error_body(kind: &str, details: String) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "error": kind,
        "details": details,
    }))
}

/// Installed models, with a suggested default for the model selector
async fn list_models(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    match state.ollama.list_models().await {
        Ok(models) => {
            let default = OllamaClient::default_model(&models).map(str::to_string);
            Ok(Json(serde_json::json!({
                "models": models,
                "default": default,
            })))
        }
        Err(e) => {
            error!("model catalog request failed: {e}");
            Err((
                StatusCode::SERVICE_UNAVAILABLE,
                error_body(e.kind(), e.to_string()),
            ))
        }
    }
}

#[derive(Debug, Deserialize)]
struct ScanRequest {
    directory: String,
}

async fn scan(
    Json(request): Json<ScanRequest>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    match scanner::scan_directory(Path::new(&request.directory)).await {
        Ok(images) => {
            let images: Vec<String> = images.iter().map(|p| p.display().to_string()).collect();
            Ok(Json(serde_json::json!({ "images": images })))
        }
        Err(e) => {
            error!("scan failed: {e}");
            Err((StatusCode::BAD_REQUEST, error_body(e.kind(), e.to_string())))
        }
    }
}

#[derive(Debug, Deserialize)]
struct ProcessRequest {
    file_path: String,
    model: String,
}

fn process_error_status(err: &ProcessError) -> StatusCode {
    match err.kind() {
        "FILE_NOT_FOUND" => StatusCode::NOT_FOUND,
        "FILE_ACCESS_DENIED" => StatusCode::FORBIDDEN,
        "MODEL_ERROR" => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

async fn process_image(
    State(state): State<AppState>,
    Json(request): Json<ProcessRequest>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    let path = PathBuf::from(&request.file_path);
    match state.orchestrator.process_image(&path, &request.model).await {
        Ok(description) => Ok(Json(serde_json::json!({
            "success": true,
            "description": description.text,
            "truncated": description.truncated,
        }))),
        Err(e) => {
            error!("processing failed for {}: {e}", path.display());
            Err((process_error_status(&e), error_body(e.kind(), e.to_string())))
        }
    }
}

#[derive(Debug, Deserialize)]
struct BatchStartRequest {
    #[serde(default)]
    directory: Option<String>,
    #[serde(default)]
    images: Option<Vec<String>>,
    model: String,
}

async fn batch_start(
    State(state): State<AppState>,
    Json(request): Json<BatchStartRequest>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    let images: Vec<PathBuf> = match (&request.images, &request.directory) {
        (Some(images), _) => images.iter().map(PathBuf::from).collect(),
        (None, Some(directory)) => scanner::scan_directory(Path::new(directory))
            .await
            .map_err(|e| (StatusCode::BAD_REQUEST, error_body(e.kind(), e.to_string())))?,
        (None, None) => {
            return Err((
                StatusCode::BAD_REQUEST,
                error_body("INVALID_REQUEST", "missing 'images' or 'directory'".into()),
            ))
        }
    };

    let total = images.len();
    state
        .orchestrator
        .start_batch(images, request.model)
        .map_err(|e| (StatusCode::CONFLICT, error_body(e.kind(), e.to_string())))?;

    Ok(Json(serde_json::json!({ "started": true, "total": total })))
}

async fn batch_cancel(State(state): State<AppState>) -> Json<serde_json::Value> {
    let cancelled = state.orchestrator.cancel();
    Json(serde_json::json!({ "cancelling": cancelled }))
}

async fn batch_status(State(state): State<AppState>) -> Json<batch_lens::BatchSnapshot> {
    Json(state.orchestrator.snapshot())
}

#[derive(Debug, Deserialize)]
struct ServeQuery {
    path: String,
}

/// Preview bytes for the grid: only files with an accepted image extension
/// are served.
async fn serve_image(
    Query(query): Query<ServeQuery>,
) -> Result<impl IntoResponse, (StatusCode, Json<serde_json::Value>)> {
    let path = PathBuf::from(&query.path);
    if !scanner::is_image_path(&path) {
        return Err((
            StatusCode::FORBIDDEN,
            error_body("INVALID_PATH", format!("not an image path: '{}'", path.display())),
        ));
    }

    let bytes = tokio::fs::read(&path).await.map_err(|e| {
        (
            StatusCode::NOT_FOUND,
            error_body("FILE_NOT_FOUND", e.to_string()),
        )
    })?;

    let content_type = match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        _ => "image/tiff",
    };

    Ok(([(header::CONTENT_TYPE, content_type)], bytes))
}

/// Prometheus metrics endpoint
async fn metrics_endpoint(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.to_prometheus(),
    )
}

/// Detailed statistics endpoint (JSON)
async fn stats_endpoint(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let snapshot = state.metrics.snapshot();
    serde_json::to_value(snapshot).map(Json).map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to serialize metrics: {}", e),
        )
    })
}
