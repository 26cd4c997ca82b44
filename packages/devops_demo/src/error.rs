use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::error;

use crate::models::FieldErrors;

pub const REGISTRY_NOT_CONFIGURED: &str = "Docker Hub credentials not configured";
pub const CHAT_NOT_CONFIGURED: &str = "DeepSeek API key not configured";

/// Every failure a handler can answer with.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// A credential the endpoint needs is missing.
    #[error("{0}")]
    Configuration(&'static str),

    #[error("invalid request: {}", render_field_errors(.0))]
    Validation(FieldErrors),

    #[error("{0}")]
    Upstream(String),

    #[error("not found")]
    NotFound,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Configuration(_) | Self::Upstream(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Text stored in the call log for this failure.
    pub fn log_message(&self) -> String {
        match self {
            Self::Validation(errors) => render_field_errors(errors),
            other => other.to_string(),
        }
    }
}

pub fn render_field_errors(errors: &FieldErrors) -> String {
    serde_json::to_string(errors).unwrap_or_else(|_| format!("{errors:?}"))
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            Self::Validation(errors) => (status, Json(errors)).into_response(),
            Self::NotFound => (status, Json(json!({ "error": "Not found" }))).into_response(),
            Self::Internal(e) => {
                error!("Internal error: {:#}", e);
                (status, Json(json!({ "error": e.to_string() }))).into_response()
            }
            Self::Configuration(message) => {
                (status, Json(json!({ "error": message }))).into_response()
            }
            Self::Upstream(message) => (status, Json(json!({ "error": message }))).into_response(),
        }
    }
}
