use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use rubric_core::error::Error as CoreError;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub timestamp: String,
}

/// Core errors carried across the handler boundary. The variant decides
/// the status code; the message is the user-visible text.
pub struct ApiError(pub CoreError);

impl From<CoreError> for ApiError {
    fn from(e: CoreError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            CoreError::Validation { .. } | CoreError::CorpusParse(_) | CoreError::Config(_) => {
                StatusCode::BAD_REQUEST
            }
            CoreError::NotFound { .. } => StatusCode::NOT_FOUND,
            CoreError::Conflict(_) | CoreError::StaleVersion { .. } => StatusCode::CONFLICT,
            CoreError::Provider(_) | CoreError::Timeout { .. } => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        }
        let body = ErrorResponse {
            error: status
                .canonical_reason()
                .unwrap_or("error")
                .to_string(),
            message: self.0.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };
        (status, Json(body)).into_response()
    }
}
