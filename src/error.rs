//! Error handling

use axum::{
    response::{IntoResponse, Response},
    http::StatusCode,
    Json,
};
use serde_json::json;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug)]
pub enum AppError {
    // Input errors
    InvalidInput(String),
    NotFound(String),

    // External service errors
    ServiceUnavailable(String),
    ExternalServiceError(String),

    // Generic errors
    InternalError(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            AppError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg.as_str()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.as_str()),
            AppError::ServiceUnavailable(msg) => {
                tracing::warn!("Service unavailable: {}", msg);
                (StatusCode::SERVICE_UNAVAILABLE, msg.as_str())
            }
            AppError::ExternalServiceError(msg) => {
                tracing::error!("External service error: {}", msg);
                (StatusCode::BAD_GATEWAY, "External service error")
            }
            AppError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        };

        let body = Json(json!({
            "success": false,
            "error": error_message,
            "status": status.as_u16()
        }));

        (status, body).into_response()
    }
}

impl From<crate::inference::image::ImageError> for AppError {
    fn from(err: crate::inference::image::ImageError) -> Self {
        AppError::InvalidInput(format!("Invalid image file: {}", err))
    }
}

impl From<crate::nutrition::NutritionError> for AppError {
    fn from(err: crate::nutrition::NutritionError) -> Self {
        use crate::nutrition::NutritionError;

        match err {
            NutritionError::NotConfigured => {
                AppError::ServiceUnavailable("Nutrition database is not configured".to_string())
            }
            NutritionError::InvalidQuery(msg) => AppError::InvalidInput(msg),
            other => AppError::ExternalServiceError(other.to_string()),
        }
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        AppError::InternalError(format!("Worker task failed: {}", err))
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::InvalidInput(err.to_string())
    }
}
