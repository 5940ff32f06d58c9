//! Error responses for the ingress and admin surfaces.
//!
//! # Responsibilities
//! - Map normalized `ErrorCode`s to HTTP status codes
//! - Render a small JSON error body without internal detail
//!
//! # Design Decisions
//! - 5xx for processing failures so webhook providers redeliver
//! - Error messages are already credential-scrubbed by the time they get here

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::error::{ErrorCode, IntegrationError};

/// HTTP status for an error code.
pub fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::InvalidSignature => StatusCode::UNAUTHORIZED,
        ErrorCode::InvalidPayload => StatusCode::BAD_REQUEST,
        ErrorCode::RateLimit => StatusCode::TOO_MANY_REQUESTS,
        ErrorCode::CircuitOpen | ErrorCode::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorCode::Timeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorCode::Cancelled
        | ErrorCode::ProviderError
        | ErrorCode::TemporaryFailure
        | ErrorCode::Configuration => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// `IntegrationError` rendered as an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub IntegrationError);

impl From<IntegrationError> for ApiError {
    fn from(err: IntegrationError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(self.0.code);
        let message = if status.is_server_error() {
            "request could not be processed".to_string()
        } else {
            self.0.message
        };
        let body = json!({
            "error": {
                "code": self.0.code.as_str(),
                "message": message,
            }
        });
        (status, Json(body)).into_response()
    }
}
