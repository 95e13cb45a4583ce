use std::sync::Arc;

use axum::extract::{Path, State};
use axum::{Extension, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use utoipa::ToSchema;

use arbor_persist::ConversationStore;

use crate::error::{ApiError, ApiResult};
use crate::middleware::session::AuthUser;
use crate::state::AppState;

/// List the user's conversations, most recently updated first.
#[utoipa::path(
    get,
    path = "/conversations",
    responses((status = 200, description = "The user's conversations")),
    tag = "conversations"
)]
pub async fn list_conversations(
    State(state): State<Arc<AppState>>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
) -> ApiResult<Json<Value>> {
    let conversations = state.store.list_conversations(user_id).await?;
    Ok(Json(json!({ "conversations": conversations })))
}

#[utoipa::path(
    get,
    path = "/conversations/{conversation_id}",
    params(("conversation_id" = String, Path, description = "Conversation id")),
    responses(
        (status = 200, description = "The conversation"),
        (status = 404, description = "Not found")
    ),
    tag = "conversations"
)]
pub async fn get_conversation(
    State(state): State<Arc<AppState>>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(conversation_id): Path<String>,
) -> ApiResult<Json<Value>> {
    let conversation = state
        .store
        .find_conversation(user_id, &conversation_id)
        .await?
        .ok_or(ApiError::ConversationNotFound(conversation_id))?;
    Ok(Json(json!({ "conversation": conversation })))
}

/// History of a conversation: every message plus the current branch tip.
#[utoipa::path(
    get,
    path = "/conversations/{conversation_id}/messages",
    params(("conversation_id" = String, Path, description = "Conversation id")),
    responses(
        (status = 200, description = "Messages, newest first, with current_id"),
        (status = 404, description = "Not found")
    ),
    tag = "messages"
)]
pub async fn list_messages(
    State(state): State<Arc<AppState>>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(conversation_id): Path<String>,
) -> ApiResult<Json<Value>> {
    let conversation = state
        .store
        .find_conversation(user_id, &conversation_id)
        .await?
        .ok_or_else(|| ApiError::ConversationNotFound(conversation_id.clone()))?;

    let messages = state.store.list_messages(&conversation_id).await?;
    Ok(Json(json!({
        "current_id": conversation.current_node,
        "messages": messages,
    })))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateConversationRequest {
    pub title: Option<String>,
    pub is_archived: Option<bool>,
}

/// Rename and/or archive a conversation.
#[utoipa::path(
    patch,
    path = "/conversations/{conversation_id}",
    params(("conversation_id" = String, Path, description = "Conversation id")),
    request_body = UpdateConversationRequest,
    responses(
        (status = 200, description = "Updated"),
        (status = 404, description = "Not found")
    ),
    tag = "conversations"
)]
pub async fn update_conversation(
    State(state): State<Arc<AppState>>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(conversation_id): Path<String>,
    Json(request): Json<UpdateConversationRequest>,
) -> ApiResult<Json<Value>> {
    if request.title.is_none() && request.is_archived.is_none() {
        return Err(ApiError::InvalidRequest(
            "nothing to update: provide title or is_archived".into(),
        ));
    }

    if let Some(title) = &request.title {
        if title.trim().is_empty() {
            return Err(ApiError::InvalidRequest("title must not be empty".into()));
        }
        state
            .store
            .rename_conversation(user_id, &conversation_id, title)
            .await?;
    }
    if let Some(archived) = request.is_archived {
        state
            .store
            .set_archived(user_id, &conversation_id, archived)
            .await?;
    }

    Ok(Json(json!({ "msg": "conversation updated" })))
}

/// Cascade-delete one conversation: its messages first, then the
/// conversation itself.
#[utoipa::path(
    delete,
    path = "/conversations/{conversation_id}",
    params(("conversation_id" = String, Path, description = "Conversation id")),
    responses(
        (status = 200, description = "Deleted"),
        (status = 404, description = "Not found")
    ),
    tag = "conversations"
)]
pub async fn delete_conversation(
    State(state): State<Arc<AppState>>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(conversation_id): Path<String>,
) -> ApiResult<Json<Value>> {
    state.tree.cascade_delete(user_id, &conversation_id).await?;
    Ok(Json(json!({ "msg": "conversation deleted" })))
}

/// Cascade-delete every conversation of the user.
#[utoipa::path(
    delete,
    path = "/conversations",
    responses((status = 200, description = "All conversations deleted")),
    tag = "conversations"
)]
pub async fn delete_all_conversations(
    State(state): State<Arc<AppState>>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
) -> ApiResult<Json<Value>> {
    let removed = state.tree.cascade_delete_all(user_id).await?;
    Ok(Json(json!({ "deleted": removed })))
}
