use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::collab::SessionVerifier;
use crate::error::ApiError;
use crate::state::AppState;

/// The authenticated caller, inserted into request extensions by
/// `auth_session`.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser(pub i64);

/// Verifies the Authorization header against the collaborator service and
/// attaches the resolved user id to the request.
pub async fn auth_session(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .unwrap_or_default();

    if token.is_empty() {
        return ApiError::Unauthorized("missing Authorization header".to_string()).into_response();
    }

    match state.sessions.verify(token).await {
        Ok(Some(user_id)) => {
            request.extensions_mut().insert(AuthUser(user_id));
            next.run(request).await
        }
        Ok(None) => {
            ApiError::Unauthorized("invalid or expired session".to_string()).into_response()
        }
        Err(err) => {
            tracing::error!(error = %err, "session verification failed");
            ApiError::Internal("session verification failed".to_string()).into_response()
        }
    }
}
