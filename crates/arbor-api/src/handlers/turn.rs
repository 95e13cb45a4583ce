use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::response::Response;
use axum::{Extension, Json};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use utoipa::ToSchema;

use arbor_gen::{GenRequest, Generator};
use arbor_persist::{ChatMessage, TurnAccumulator};
use arbor_types::{AuthorRole, Message, MessageStatus, RelayEvent};

use crate::collab::KnowledgeResolver;
use crate::error::{ApiError, ApiResult};
use crate::middleware::session::AuthUser;
use crate::relay;
use crate::state::AppState;

/// One user turn: the new message, where it attaches in the tree, and the
/// generation options.
#[derive(Debug, Deserialize, ToSchema)]
pub struct NewMessageRequest {
    #[serde(default)]
    pub action: String,
    #[schema(value_type = Object)]
    pub message: Message,
    pub message_id: String,
    pub conversation_id: String,
    pub parent: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub use_deep_think: bool,
    /// Knowledge base to ground the answer on; `0` means none.
    #[serde(default)]
    pub base_id: i64,
    pub created_at: Option<DateTime<Utc>>,
}

impl NewMessageRequest {
    fn validate(&self) -> ApiResult<()> {
        if self.message_id.trim().is_empty() {
            return Err(ApiError::InvalidRequest("message_id is required".into()));
        }
        if self.conversation_id.trim().is_empty() {
            return Err(ApiError::InvalidRequest(
                "conversation_id is required".into(),
            ));
        }
        if self.parent.trim().is_empty() {
            return Err(ApiError::InvalidRequest("parent is required".into()));
        }
        if self.message.text.is_empty() {
            return Err(ApiError::InvalidRequest("message text is required".into()));
        }
        if self.message.author_role != AuthorRole::User {
            return Err(ApiError::InvalidRequest(
                "new messages must carry the user role".into(),
            ));
        }
        Ok(())
    }
}

/// Accept a user turn and stream the generated answer back as SSE.
///
/// The body starts flowing only after the user message and its parent link
/// are durable; everything after that point is reported in-band.
#[utoipa::path(
    post,
    path = "/new-message",
    request_body = NewMessageRequest,
    responses(
        (status = 200, description = "SSE stream of answer fragments", content_type = "text/event-stream"),
        (status = 400, description = "Malformed request or duplicate message id"),
        (status = 401, description = "Missing or invalid session"),
        (status = 404, description = "Conversation, parent message, or knowledge base not found"),
        (status = 502, description = "Generation service unavailable")
    ),
    tag = "turns"
)]
pub async fn new_message(
    State(state): State<Arc<AppState>>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Json(request): Json<NewMessageRequest>,
) -> ApiResult<Response> {
    request.validate()?;

    // Snapshot of enabled documents, taken before any side effect so a
    // missing knowledge base rejects the turn cleanly.
    let doc_ids = match request.base_id {
        0 => None,
        base_id => {
            let ids = state
                .knowledge
                .enabled_doc_ids(user_id, base_id)
                .await
                .map_err(|err| {
                    tracing::error!(error = %err, base_id, "knowledge base lookup failed");
                    ApiError::Internal("knowledge base lookup failed".to_string())
                })?
                .ok_or(ApiError::KnowledgeBaseNotFound(base_id))?;
            Some(ids)
        }
    };

    let model = if request.model.is_empty() {
        "auto".to_string()
    } else {
        request.model.clone()
    };

    let mut payload = request.message;
    payload.model = model.clone();
    payload.status = MessageStatus::FinishedSuccessfully;

    let user_message = ChatMessage::new(
        request.conversation_id.as_str(),
        request.message_id.as_str(),
        request.parent.as_str(),
        payload,
        request.created_at.unwrap_or_else(Utc::now),
    );

    // Steps (a)-(d): conversation resolved, user message linked, persisted,
    // and made the current node.
    let conversation = state
        .tree
        .begin_turn(user_id, request.base_id, user_message)
        .await?;

    // Step (e): one streaming call per turn. current_node is the user
    // message we just advanced to.
    let mut gen_request =
        GenRequest::new(conversation.conversation_id.as_str(), request.message_id.as_str());
    if let Some(ids) = doc_ids {
        gen_request = gen_request.with_doc_ids(ids);
    }
    let frames = state.generator.open_stream(gen_request).await?;

    tracing::debug!(
        conversation_id = %conversation.conversation_id,
        message_id = %request.message_id,
        "generation stream opened"
    );

    let cancel = CancellationToken::new();
    let (tx, rx) = mpsc::channel(state.config.relay.channel_capacity.max(1));
    tokio::spawn(relay::pump_frames(
        frames,
        tx,
        cancel.clone(),
        Duration::from_secs(state.config.relay.turn_timeout_secs),
    ));

    let accumulator = TurnAccumulator::new(
        conversation.conversation_id.as_str(),
        request.message_id.as_str(),
        model.as_str(),
    );
    let meta = RelayEvent::Meta {
        conversation_id: conversation.conversation_id.clone(),
    };

    Ok(relay::sse_response(
        rx,
        cancel,
        accumulator,
        state.tree.clone(),
        meta,
    ))
}
