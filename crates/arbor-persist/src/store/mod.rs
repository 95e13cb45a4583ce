pub mod memory;
pub mod mongo;

pub use memory::MemoryStore;
pub use mongo::MongoStore;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{ChatMessage, Conversation};

/// Durable storage for conversations and message trees.
///
/// The contract is deliberately narrow: every method is one atomic
/// filter-and-update against a single document. There are no multi-document
/// transactions; the tree manager sequences these primitives so that partial
/// failure always leaves a readable, resumable state.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn insert_conversation(&self, conversation: Conversation) -> Result<()>;

    async fn find_conversation(
        &self,
        user_id: i64,
        conversation_id: &str,
    ) -> Result<Option<Conversation>>;

    /// The user's conversations, most recently updated first.
    async fn list_conversations(&self, user_id: i64) -> Result<Vec<Conversation>>;

    /// Unconditionally repoints `current_node` and bumps `updated_at`.
    async fn set_current_node(&self, conversation_id: &str, node_id: &str) -> Result<()>;

    async fn rename_conversation(
        &self,
        user_id: i64,
        conversation_id: &str,
        title: &str,
    ) -> Result<()>;

    async fn set_archived(
        &self,
        user_id: i64,
        conversation_id: &str,
        archived: bool,
    ) -> Result<()>;

    async fn delete_conversation(&self, user_id: i64, conversation_id: &str) -> Result<()>;

    /// Fails with `DuplicateMessage` when the message id already exists.
    async fn insert_message(&self, message: ChatMessage) -> Result<()>;

    async fn find_message(
        &self,
        conversation_id: &str,
        message_id: &str,
    ) -> Result<Option<ChatMessage>>;

    /// All messages of a conversation, newest first.
    async fn list_messages(&self, conversation_id: &str) -> Result<Vec<ChatMessage>>;

    /// Adds `child_id` to the parent's `children` with set semantics
    /// (duplicate add is a no-op) and bumps the parent's `updated_at`.
    /// Fails with `ParentNotFound` when no such parent message exists.
    async fn push_child(
        &self,
        conversation_id: &str,
        parent_id: &str,
        child_id: &str,
    ) -> Result<()>;

    /// Deletes every message of the conversation, returning the count.
    async fn delete_messages(&self, conversation_id: &str) -> Result<u64>;
}
