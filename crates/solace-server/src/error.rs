use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use solace_core::TurnError;

/// HTTP surface of the typed turn errors. Usage limits come back with their
/// reset time, generation outages are marked retryable, and storage failures
/// stay opaque.
pub struct ApiError(pub TurnError);

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    kind: &'static str,
    retryable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    limit: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    resets_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind, limit, resets_at) = match &self.0 {
            TurnError::UsageLimitExceeded { limit, resets_at } => (
                StatusCode::TOO_MANY_REQUESTS,
                "usage_limit_exceeded",
                Some(*limit),
                Some(*resets_at),
            ),
            TurnError::ConversationNotFound => {
                (StatusCode::NOT_FOUND, "conversation_not_found", None, None)
            }
            TurnError::GenerationUnavailable { .. } => (
                StatusCode::SERVICE_UNAVAILABLE,
                "generation_unavailable",
                None,
                None,
            ),
            TurnError::Storage(err) => {
                tracing::error!(error = %err, "storage failure in request handler");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal", None, None)
            }
        };
        let body = ErrorBody {
            error: self.0.to_string(),
            kind,
            retryable: self.0.is_retryable(),
            limit,
            resets_at,
        };
        (status, Json(body)).into_response()
    }
}

impl From<TurnError> for ApiError {
    fn from(err: TurnError) -> Self {
        Self(err)
    }
}
