use serde::{Deserialize, Serialize};

/// Reserved parent id marking the first message of a new conversation.
///
/// The sentinel is never stored as a message of its own; messages carrying it
/// as `parent` are the roots of the conversation forest.
pub const ROOT_PARENT: &str = "client-created-root";

/// The content of one chat message, shared between the HTTP request body and
/// the persisted `ChatMessage` document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub author_role: AuthorRole,
    pub content_type: String,
    pub text: String,
    #[serde(default)]
    pub status: MessageStatus,
    #[serde(default)]
    pub model: String,
    #[serde(default = "default_weight")]
    pub weight: f32,
}

fn default_weight() -> f32 {
    1.0
}

impl Message {
    /// A finished assistant message carrying the accumulated answer text.
    pub fn assistant(text: String, model: String) -> Self {
        Self {
            author_role: AuthorRole::Assistant,
            content_type: "text".to_string(),
            text,
            status: MessageStatus::FinishedSuccessfully,
            model,
            weight: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthorRole {
    User,
    Assistant,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    InProgress,
    #[default]
    FinishedSuccessfully,
    ClientAbort,
    Error,
}
