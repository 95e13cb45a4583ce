use serde::Serialize;

use crate::error::Result;

/// Compact per-turn request sent to the generation service, JSON-encoded
/// into the single string field of the RPC request.
///
/// The service reads the conversation history itself; the backend only names
/// the conversation, the branch tip, and the snapshot of enabled knowledge
/// base documents taken when the turn started.
#[derive(Debug, Clone, Serialize)]
pub struct GenRequest {
    pub conversation_id: String,
    pub current_node: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc_ids: Option<Vec<String>>,
}

impl GenRequest {
    pub fn new(conversation_id: impl Into<String>, current_node: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            current_node: current_node.into(),
            doc_ids: None,
        }
    }

    pub fn with_doc_ids(mut self, doc_ids: Vec<String>) -> Self {
        self.doc_ids = Some(doc_ids);
        self
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
