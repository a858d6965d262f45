//! HTTP server for the reshape API.
//!
//! # API Endpoints
//!
//! | Method | Path            | Description                              |
//! |--------|-----------------|------------------------------------------|
//! | GET    | `/health`       | Health check                             |
//! | POST   | `/validate-csv` | Reshape and validate a local source file |
//! | GET    | `/api/logs`     | SSE stream of run progress               |

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, Method, StatusCode},
    response::{sse::Event, IntoResponse, Json, Response, Sse},
    routing::{get, post},
    Router,
};
use futures::stream::Stream;
use serde_json::{json, Value};
use std::{convert::Infallible, net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt as _;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use uuid::Uuid;

use super::logs::{log_error, RunLogger, LOG_BROADCASTER};
use super::types::{error_response, ReadyResponse, SourceMetadata, ValidateRequest, ValidationFailure};
use crate::config::Settings;
use crate::error::{PipelineError, ServerError, ServerResult, SourceError};
use crate::export::{to_delimited_preview, to_json_preview, write_transformed, PreviewFormat};
use crate::parser::Source;
use crate::schema::Schema;
use crate::transform::pipeline::{Pipeline, PipelineOptions, RunOutcome};
use crate::validation::Validator;

#[derive(Debug, Clone)]
struct AppState {
    settings: Arc<Settings>,
}

/// Build the application router.
pub fn build_router(settings: Settings) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .expose_headers([header::CONTENT_TYPE, header::CONTENT_DISPOSITION]);

    let state = AppState {
        settings: Arc::new(settings),
    };

    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/validate-csv", post(validate_csv))
        .route("/api/logs", get(sse_logs))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Start the HTTP server
pub async fn start_server(settings: Settings) -> ServerResult<()> {
    let port = settings.port;
    let app = build_router(settings);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "Reshape server listening");
    info!("  POST /validate-csv - Reshape and validate a source file");
    info!("  GET  /api/logs     - SSE progress stream");
    info!("  GET  /health       - Health check");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Health check endpoint
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "reshape",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "validate": "POST /validate-csv",
            "logs": "GET /api/logs (SSE)"
        }
    }))
}

/// SSE endpoint for real-time progress streaming
async fn sse_logs() -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = LOG_BROADCASTER.subscribe();

    let stream = BroadcastStream::new(rx).filter_map(|result| match result {
        Ok(entry) => {
            let json = serde_json::to_string(&entry).ok()?;
            Some(Ok(Event::default().data(json)))
        }
        // Lagged subscribers skip what they missed
        Err(_) => None,
    });

    Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

/// Reshape a source file according to the posted schema.
///
/// - validation failure: 422 with the report
/// - success with `size > 0`: preview of the reshaped rows
/// - success otherwise: the reshaped file is written and its path returned
///
/// The `jobId` of the response is the run id on every `/api/logs` entry the
/// request produced.
async fn validate_csv(
    State(state): State<AppState>,
    payload: Result<Json<ValidateRequest>, JsonRejection>,
) -> ServerResult<Response> {
    let Json(request) = payload.map_err(|e| ServerError::BadRequest(e.body_text()))?;
    let settings = &state.settings;
    let job_id = Uuid::new_v4().to_string();
    let progress = RunLogger::new(job_id.clone());

    let schema = Schema::from_value(request.structure.clone()).map_err(PipelineError::from)?;
    progress.info(format!(
        "New request: {} ({} column rule(s))",
        request.csv_url,
        schema.len()
    ));

    let bytes = tokio::fs::read(&request.csv_url)
        .await
        .map_err(|source| {
            PipelineError::from(SourceError::Io {
                path: request.csv_url.clone(),
                source,
            })
        })?;
    let source = Source::from_bytes(&bytes).map_err(PipelineError::from)?;

    let pipeline = Pipeline::new(schema, Validator::new()).with_options(PipelineOptions {
        workers: settings.workers,
        delimiter: None,
        run_id: Some(job_id.clone()),
    });

    let table = match pipeline.run(&source).await? {
        RunOutcome::Succeeded(table) => table,
        RunOutcome::Failed(report) => {
            let body = ValidationFailure::new(job_id, &report, settings.report_max_chars);
            return Ok((StatusCode::UNPROCESSABLE_ENTITY, Json(body)).into_response());
        }
    };

    if let Some(size) = request.preview_size() {
        let response = match request.format {
            PreviewFormat::Json => {
                let preview =
                    to_json_preview(&table.rows, pipeline.schema(), size).map_err(PipelineError::from)?;
                Json(preview).into_response()
            }
            PreviewFormat::Csv => {
                let preview = to_delimited_preview(
                    &table.rows,
                    pipeline.schema(),
                    size,
                    settings.output_delimiter,
                )
                .map_err(PipelineError::from)?;
                (
                    [
                        (header::CONTENT_TYPE, "text/csv"),
                        (
                            header::CONTENT_DISPOSITION,
                            "attachment; filename=validated_data.csv",
                        ),
                    ],
                    preview,
                )
                    .into_response()
            }
        };
        return Ok(response);
    }

    let metadata = SourceMetadata::from(&table);
    let source_path = PathBuf::from(&request.csv_url);
    let schema = pipeline.schema().clone();
    let settings = Arc::clone(&state.settings);
    let rows = table.rows;

    let path = tokio::task::spawn_blocking(move || {
        write_transformed(&source_path, &rows, &schema, &settings)
    })
    .await?
    .map_err(PipelineError::from)?;
    let output_file = path.display().to_string();
    progress.success(format!("Reshaped file written to {}", output_file));

    Ok(Json(ReadyResponse::new(job_id, output_file, metadata)).into_response())
}

impl ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::Pipeline(PipelineError::Schema(_)) => StatusCode::BAD_REQUEST,
            ServerError::Pipeline(_) | ServerError::Io(_) | ServerError::Task(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match &self {
            ServerError::Pipeline(e) => e.to_string(),
            other => other.to_string(),
        };
        if status.is_server_error() {
            warn!(error = %message, "Request failed");
        }
        log_error(message.clone());
        (status, Json(error_response(&message))).into_response()
    }
}
