use arbor_types::Message;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One node of a conversation tree (collection `chat_messages`).
///
/// The tree is an id-keyed arena: `parent` and `children` hold message ids,
/// never embedded documents. Messages with `parent == ROOT_PARENT` are the
/// roots of the forest. After insertion a message is only ever mutated by
/// appending to `children`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub conversation_id: String,
    pub message_id: String,
    pub parent: String,
    pub children: Vec<String>,
    pub message: Message,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(
        conversation_id: impl Into<String>,
        message_id: impl Into<String>,
        parent: impl Into<String>,
        message: Message,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            message_id: message_id.into(),
            parent: parent.into(),
            children: Vec::new(),
            message,
            created_at,
            updated_at: Utc::now(),
        }
    }
}
