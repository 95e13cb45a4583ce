use chrono::Utc;

use arbor_types::Message;

use crate::models::ChatMessage;

/// Collects the fragments of one generation stream and produces the
/// assistant `ChatMessage` persisted when the stream completes.
///
/// The assistant message id is generated up front so the caller can refer to
/// it while the stream is still running. Fragments are stored concatenated,
/// exactly as relayed to the client.
pub struct TurnAccumulator {
    conversation_id: String,
    parent_id: String,
    message_id: String,
    model: String,
    buffer: String,
}

impl TurnAccumulator {
    /// `parent_id` is the user message the assistant answer branches from.
    pub fn new(
        conversation_id: impl Into<String>,
        parent_id: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            parent_id: parent_id.into(),
            message_id: uuid::Uuid::new_v4().to_string(),
            model: model.into(),
            buffer: String::new(),
        }
    }

    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    pub fn push_fragment(&mut self, text: &str) {
        self.buffer.push_str(text);
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// The finished assistant message for this turn.
    pub fn finalize(self) -> ChatMessage {
        let payload = Message::assistant(self.buffer, self.model);
        ChatMessage::new(
            self.conversation_id,
            self.message_id,
            self.parent_id,
            payload,
            Utc::now(),
        )
    }
}
