//! Maps `dispatchd_core::Error` (and request-validation failures) onto
//! HTTP status codes and a small JSON error envelope.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use dispatchd_core::Error as CoreError;

#[derive(Debug, Serialize)]
struct ErrorBody {
    error_type: String,
    message: String,
}

/// Thin wrapper so handlers can `?` straight out of `dispatchd_core::Result`
/// and axum's request extractors.
#[derive(Debug)]
pub enum ApiError {
    Core(CoreError),
    Validation(String),
    Unauthorized(String),
    Forbidden(String),
    NotFound(String),
    TooManyRequests,
    PayloadTooLarge,
}

impl From<CoreError> for ApiError {
    fn from(e: CoreError) -> Self {
        ApiError::Core(e)
    }
}

impl ApiError {
    fn status_and_type(&self) -> (StatusCode, String) {
        match self {
            ApiError::Core(e) => (status_for_core_error(e), e.error_type().to_string()),
            ApiError::Validation(_) => (StatusCode::BAD_REQUEST, "ValidationError".to_string()),
            ApiError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()),
            ApiError::Forbidden(_) => (StatusCode::FORBIDDEN, "Forbidden".to_string()),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NotFound".to_string()),
            ApiError::TooManyRequests => (StatusCode::TOO_MANY_REQUESTS, "RateLimited".to_string()),
            ApiError::PayloadTooLarge => (StatusCode::PAYLOAD_TOO_LARGE, "PayloadTooLarge".to_string()),
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::Core(e) => e.to_string(),
            ApiError::Validation(m) => m.clone(),
            ApiError::Unauthorized(m) => m.clone(),
            ApiError::Forbidden(m) => m.clone(),
            ApiError::NotFound(m) => m.clone(),
            ApiError::TooManyRequests => "rate limit exceeded".to_string(),
            ApiError::PayloadTooLarge => "request body exceeds the allowed size".to_string(),
        }
    }
}

/// `ModelNotFound`/`Routing` are client mistakes (4xx); everything else
/// that survives the engine's retry loop is a server-side failure.
fn status_for_core_error(e: &CoreError) -> StatusCode {
    match e {
        CoreError::Routing(_) => StatusCode::BAD_REQUEST,
        CoreError::ModelNotFound { .. } => StatusCode::BAD_REQUEST,
        CoreError::JobNotFound(_) => StatusCode::NOT_FOUND,
        CoreError::ExecutionTimeout(_) => StatusCode::INTERNAL_SERVER_ERROR,
        CoreError::ExecutorSaturated(_) => StatusCode::INTERNAL_SERVER_ERROR,
        CoreError::Pipeline(_) => StatusCode::INTERNAL_SERVER_ERROR,
        CoreError::JobCancelled(_) => StatusCode::INTERNAL_SERVER_ERROR,
        CoreError::PoolUnknown(_) => StatusCode::INTERNAL_SERVER_ERROR,
        CoreError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        CoreError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
        CoreError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type) = self.status_and_type();
        let message = self.message();
        tracing::warn!(status = status.as_u16(), error_type = %error_type, "request failed: {message}");
        (status, Json(ErrorBody { error_type, message })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_not_found_is_a_client_error() {
        let err = ApiError::Core(CoreError::ModelNotFound { name: "echo".into(), version: "v99".into() });
        let (status, _) = err.status_and_type();
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn execution_timeout_is_a_server_error() {
        let err = ApiError::Core(CoreError::ExecutionTimeout(std::time::Duration::from_secs(1)));
        let (status, _) = err.status_and_type();
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
