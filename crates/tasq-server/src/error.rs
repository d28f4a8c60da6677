use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tasq_core::EngineError;
use tracing::error;

/// Wrapper mapping engine errors onto HTTP responses, so handlers can use
/// `?` on engine calls directly.
pub struct ApiError(EngineError);

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self.0 {
            // The rejection branch: receipt mismatch, lease expired, or
            // message gone. One status for all of them — the caller's
            // recovery path is identical.
            err @ EngineError::InvalidQueueOperation { .. } => {
                (StatusCode::NOT_FOUND, err.to_string()).into_response()
            }
            err @ (EngineError::InvalidQueueName(_) | EngineError::InvalidLease(_)) => {
                (StatusCode::BAD_REQUEST, err.to_string()).into_response()
            }
            EngineError::Storage(err) => {
                error!(error = %err, "storage failure");
                (StatusCode::INTERNAL_SERVER_ERROR, "storage error".to_string())
                    .into_response()
            }
        }
    }
}
