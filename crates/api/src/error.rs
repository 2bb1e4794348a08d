//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use analytics::AnalyticsError;
use pipeline::PipelineError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Bad request from the client.
    BadRequest(String),
    /// Missing or invalid caller identification.
    Unauthorized(String),
    /// Pipeline operation error.
    Pipeline(PipelineError),
    /// Analytics computation error.
    Analytics(AnalyticsError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::Pipeline(err) => pipeline_error_to_response(err),
            ApiError::Analytics(err) => analytics_error_to_response(err),
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn pipeline_error_to_response(err: PipelineError) -> (StatusCode, String) {
    match &err {
        PipelineError::InvalidInput(_) | PipelineError::MalformedEvent(_) => {
            (StatusCode::BAD_REQUEST, err.to_string())
        }
        PipelineError::AuthenticationFailed => (StatusCode::UNAUTHORIZED, err.to_string()),
        PipelineError::Forbidden => (StatusCode::FORBIDDEN, err.to_string()),
        PipelineError::OrderNotFound(_) => (StatusCode::NOT_FOUND, err.to_string()),
        PipelineError::Gateway(_) => (StatusCode::BAD_GATEWAY, err.to_string()),
        PipelineError::GatewayTimeout(_) => (StatusCode::GATEWAY_TIMEOUT, err.to_string()),
        _ => {
            tracing::error!(error = %err, "internal server error");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal server error".to_string(),
            )
        }
    }
}

fn analytics_error_to_response(err: AnalyticsError) -> (StatusCode, String) {
    match err {
        AnalyticsError::UnknownRange(_) => (StatusCode::BAD_REQUEST, err.to_string()),
        AnalyticsError::Catalog(inner) => pipeline_error_to_response(inner),
        AnalyticsError::Store(_) => {
            tracing::error!(error = %err, "internal server error");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal server error".to_string(),
            )
        }
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        ApiError::Pipeline(err)
    }
}

impl From<AnalyticsError> for ApiError {
    fn from(err: AnalyticsError) -> Self {
        ApiError::Analytics(err)
    }
}
