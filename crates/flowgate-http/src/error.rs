// flowgate-http/src/error.rs
// ============================================================================
// Module: API Error Mapping
// Description: Total mapping from flowgate-core's error taxonomy to HTTP
//              status codes and the wire {code, message} body.
// Purpose: Give every handler a single place to translate a domain failure
//          into a response, never leaking internal diagnostics.
// Dependencies: flowgate_core::errors, axum
// ============================================================================

use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::Json;

use flowgate_core::errors::ExecutorError;
use flowgate_core::errors::WireError;

use crate::dto::ErrorBody;

/// A handler-facing error: an HTTP status plus the wire error body.
#[derive(Debug, Clone)]
pub struct ApiError {
    /// HTTP status code to send.
    pub status: StatusCode,
    /// Wire body, never containing internal diagnostics.
    pub body: ErrorBody,
}

impl ApiError {
    /// Builds an `ApiError` directly from a code/message/status triple.
    #[must_use]
    pub fn new(status: StatusCode, code: &str, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorBody {
                code: code.to_string(),
                message: message.into(),
            },
        }
    }

    /// A generic 400 for malformed or missing request fields.
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "invalid_request", message)
    }
}

impl From<ExecutorError> for ApiError {
    fn from(err: ExecutorError) -> Self {
        let status = status_for(&err);
        let message = err.to_string();
        Self::new(status, err.wire_code(), message)
    }
}

/// Maps every [`ExecutorError`] variant to its HTTP status code.
fn status_for(err: &ExecutorError) -> StatusCode {
    match err {
        ExecutorError::FlowNotFound(_)
        | ExecutorError::SessionNotFound(_)
        | ExecutorError::PlanNotFound => StatusCode::NOT_FOUND,
        ExecutorError::NodeNotFound(_) | ExecutorError::NextNodeNotFound(_) => StatusCode::INTERNAL_SERVER_ERROR,
        ExecutorError::InvalidSession => StatusCode::FORBIDDEN,
        ExecutorError::SessionExists => StatusCode::CONFLICT,
        ExecutorError::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
        ExecutorError::SessionTimeout => StatusCode::GONE,
        ExecutorError::CircularReference | ExecutorError::FlowTooLong => StatusCode::CONFLICT,
        ExecutorError::DangerousKey => StatusCode::BAD_REQUEST,
        ExecutorError::HookDenied(_) => StatusCode::FORBIDDEN,
        ExecutorError::InitFailed(_)
        | ExecutorError::SubmitFailed(_)
        | ExecutorError::StateFetchFailed(_)
        | ExecutorError::CancelFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}
