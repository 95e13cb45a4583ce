use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One conversation document (collection `conversations`).
///
/// `current_node` names the tip of the active branch; once the conversation
/// has at least one message it always references an existing
/// `ChatMessage.message_id` of the same conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub conversation_id: String,
    pub user_id: i64,
    pub title: String,
    pub current_node: String,
    pub default_model: String,
    /// Knowledge base backing this conversation; `0` means none.
    pub base_id: i64,
    pub is_archived: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    /// A fresh conversation whose first (root) message is already known.
    ///
    /// `created_at` is the client timestamp of that first message, so the
    /// conversation never predates its own root.
    pub fn new(
        conversation_id: impl Into<String>,
        user_id: i64,
        first_message_id: impl Into<String>,
        base_id: i64,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            user_id,
            title: "New Chat".to_string(),
            current_node: first_message_id.into(),
            default_model: "auto".to_string(),
            base_id,
            is_archived: false,
            created_at,
            updated_at: Utc::now(),
        }
    }
}
