//! Browser front end. The page calls the two endpoints below, which mirror the HTTP API
//! but report every outcome as text for display.

use axum::{
    extract::{Json, State as AxumState},
    response::Html,
};
use serde::{Deserialize, Serialize};

use super::AppState;
use crate::error::ServiceError;

const INDEX_HTML: &str = include_str!("index.html");

#[derive(Debug, Deserialize)]
pub struct UiGenerateRequest {
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct UiGenerateResponse {
    pub thinking: String,
    pub content: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UiStatusResponse {
    pub status: String,
}

pub async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

pub async fn generate(
    AxumState(state): AxumState<AppState>,
    Json(req): Json<UiGenerateRequest>,
) -> Json<UiGenerateResponse> {
    let (thinking, content) = match state.session.generate(&req.message, None).await {
        Ok(result) => (result.thinking, result.content),
        Err(ServiceError::NotReady) => (
            "Model not loaded".to_string(),
            "Error: Model not loaded".to_string(),
        ),
        Err(e) => (String::new(), format!("Error: {e}")),
    };

    Json(UiGenerateResponse { thinking, content })
}

pub async fn status(AxumState(state): AxumState<AppState>) -> Json<UiStatusResponse> {
    Json(UiStatusResponse {
        status: status_text(state.session.is_ready()),
    })
}

pub fn status_text(model_loaded: bool) -> String {
    let status = if model_loaded { "Healthy" } else { "Unhealthy" };
    let loaded = if model_loaded { "Yes" } else { "No" };
    format!("Status: {status}\nModel Loaded: {loaded}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_text_lines() {
        assert_eq!(status_text(true), "Status: Healthy\nModel Loaded: Yes");
        assert_eq!(status_text(false), "Status: Unhealthy\nModel Loaded: No");
    }

    #[test]
    fn page_wires_both_endpoints() {
        assert!(INDEX_HTML.contains("/ui/generate"));
        assert!(INDEX_HTML.contains("/ui/status"));
    }
}
