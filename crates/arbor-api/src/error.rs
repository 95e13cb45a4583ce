use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use arbor_gen::GenError;
use arbor_persist::PersistError;

/// Error surface of the HTTP API.
///
/// Every variant maps to one status code. These mappings only apply before
/// the SSE stream has started; once the status line is committed, failures
/// are relayed in-band as error events.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("conversation not found: {0}")]
    ConversationNotFound(String),

    #[error("parent message not found: {0}")]
    ParentNotFound(String),

    #[error("knowledge base not found: {0}")]
    KnowledgeBaseNotFound(i64),

    #[error("generation service unavailable: {0}")]
    Upstream(String),

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::ConversationNotFound(_)
            | ApiError::ParentNotFound(_)
            | ApiError::KnowledgeBaseNotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::Persistence(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        (status, Json(json!({ "msg": self.to_string() }))).into_response()
    }
}

impl From<PersistError> for ApiError {
    fn from(err: PersistError) -> Self {
        match err {
            PersistError::ConversationNotFound(id) => ApiError::ConversationNotFound(id),
            PersistError::ParentNotFound(id) => ApiError::ParentNotFound(id),
            PersistError::DuplicateMessage(id) => {
                ApiError::InvalidRequest(format!("duplicate message_id: {id}"))
            }
            other => ApiError::Persistence(other.to_string()),
        }
    }
}

impl From<GenError> for ApiError {
    fn from(err: GenError) -> Self {
        ApiError::Upstream(err.to_string())
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ApiError::Unauthorized("no token".into()).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::ParentNotFound("m-ghost".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::Upstream("dial failed".into()).status_code(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_duplicate_message_is_a_validation_error() {
        let err: ApiError = PersistError::DuplicateMessage("m1".into()).into();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }
}
