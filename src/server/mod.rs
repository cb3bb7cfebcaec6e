mod ui;

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use axum::{
    extract::{Json, State as AxumState},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::backend::CandleBackend;
use crate::config::ServiceConfig;
use crate::error::ServiceError;
use crate::session::GenerationSession;

#[derive(Clone)]
pub struct AppState {
    pub session: Arc<GenerationSession>,
}

impl AppState {
    pub fn new(session: Arc<GenerationSession>) -> Self {
        Self { session }
    }
}

#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    pub message: String,
    #[serde(default)]
    pub max_new_tokens: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GenerateResponse {
    pub thinking: String,
    pub content: String,
    /// Seconds spent in generation.
    pub processing_time: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub model_loaded: bool,
}

impl HealthResponse {
    pub fn from_ready(model_loaded: bool) -> Self {
        let status = if model_loaded { "healthy" } else { "unhealthy" };
        Self {
            status: status.to_string(),
            model_loaded,
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            ServiceError::NotReady => (StatusCode::SERVICE_UNAVAILABLE, "Model not loaded".to_string()),
            ServiceError::Generation(message) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Generation failed: {message}"),
            ),
            ServiceError::InvalidRequest(message) => (StatusCode::UNPROCESSABLE_ENTITY, message),
            other => (StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
        };

        (status, Json(json!({ "detail": detail }))).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/generate", post(generate))
        .route("/health", get(health))
        .route("/", get(ui::index))
        .route("/ui/generate", post(ui::generate))
        .route("/ui/status", get(ui::status))
        .layer(axum::middleware::from_fn(crate::middleware::log_requests))
        .with_state(state)
}

/// Loads the model, then serves until Ctrl-C.
///
/// A failed load is logged and the service keeps running unhealthy.
pub async fn serve(config: ServiceConfig) -> Result<()> {
    let backend = Arc::new(CandleBackend::new(config.device, config.dtype));
    let session = Arc::new(GenerationSession::from_config(backend, &config));

    if let Err(e) = session.load().await {
        tracing::error!("Serving without a model: {}", e);
    }

    let app = router(AppState::new(session));
    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutting down service");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}

async fn generate(
    AxumState(state): AxumState<AppState>,
    Json(req): Json<GenerateRequest>,
) -> Result<Json<GenerateResponse>, ServiceError> {
    let start = Instant::now();
    let result = state
        .session
        .generate(&req.message, req.max_new_tokens)
        .await?;
    let processing_time = start.elapsed().as_secs_f64();

    Ok(Json(GenerateResponse {
        thinking: result.thinking,
        content: result.content,
        processing_time,
    }))
}

async fn health(AxumState(state): AxumState<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse::from_ready(state.session.is_ready()))
}
