use std::sync::Arc;

use chrono::{DateTime, Utc};

use arbor_types::ROOT_PARENT;

use crate::error::{PersistError, Result};
use crate::models::{ChatMessage, Conversation};
use crate::store::ConversationStore;

/// Maintains the parent/children links and the `current_node` pointer of
/// conversation trees.
///
/// This is the only component that writes `current_node` and `children`.
/// Each primitive is one store operation; the composite helpers sequence
/// them so that any partial failure leaves the conversation pointing at a
/// message that exists.
#[derive(Clone)]
pub struct ConversationTree {
    store: Arc<dyn ConversationStore>,
}

impl ConversationTree {
    pub fn new(store: Arc<dyn ConversationStore>) -> Self {
        Self { store }
    }

    /// Returns the conversation for `conversation_id`, creating it when the
    /// turn starts a new thread (`parent` is the root sentinel).
    ///
    /// A continuation against a missing conversation fails with
    /// `ConversationNotFound` rather than conjuring a thread the client
    /// never created.
    pub async fn resolve_or_create(
        &self,
        user_id: i64,
        conversation_id: &str,
        parent: &str,
        first_message_id: &str,
        base_id: i64,
        created_at: DateTime<Utc>,
    ) -> Result<Conversation> {
        if let Some(existing) = self.store.find_conversation(user_id, conversation_id).await? {
            return Ok(existing);
        }

        if parent != ROOT_PARENT {
            return Err(PersistError::ConversationNotFound(
                conversation_id.to_string(),
            ));
        }

        let conversation = Conversation::new(
            conversation_id,
            user_id,
            first_message_id,
            base_id,
            created_at,
        );
        self.store.insert_conversation(conversation.clone()).await?;
        tracing::debug!(conversation_id, user_id, "created conversation");
        Ok(conversation)
    }

    /// Adds `child_id` under `parent_id` with set semantics. The sentinel
    /// parent is implicit and never stored, so linking under it is a no-op.
    pub async fn link_child(
        &self,
        conversation_id: &str,
        parent_id: &str,
        child_id: &str,
    ) -> Result<()> {
        if parent_id == ROOT_PARENT {
            return Ok(());
        }
        self.store
            .push_child(conversation_id, parent_id, child_id)
            .await
    }

    /// Repoints the conversation at the latest turn's message. This is the
    /// serialization point defining the tip of the active branch.
    pub async fn advance_current_node(&self, conversation_id: &str, node_id: &str) -> Result<()> {
        self.store.set_current_node(conversation_id, node_id).await
    }

    /// Persists a new message. For non-root messages the caller links the
    /// parent edge first, so the edge and the node become visible together.
    pub async fn append_message(&self, message: ChatMessage) -> Result<()> {
        self.store.insert_message(message).await
    }

    /// Steps (a)-(d) of a turn: resolve or create the conversation, link the
    /// user message under its parent, persist it, and advance
    /// `current_node` to it.
    ///
    /// Rejects a resubmitted `message_id` before touching the tree.
    pub async fn begin_turn(
        &self,
        user_id: i64,
        base_id: i64,
        message: ChatMessage,
    ) -> Result<Conversation> {
        if self
            .store
            .find_message(&message.conversation_id, &message.message_id)
            .await?
            .is_some()
        {
            return Err(PersistError::DuplicateMessage(message.message_id.clone()));
        }

        let conversation = self
            .resolve_or_create(
                user_id,
                &message.conversation_id,
                &message.parent,
                &message.message_id,
                base_id,
                message.created_at,
            )
            .await?;

        self.link_child(
            &conversation.conversation_id,
            &message.parent,
            &message.message_id,
        )
        .await?;

        let message_id = message.message_id.clone();
        self.append_message(message).await?;
        self.advance_current_node(&conversation.conversation_id, &message_id)
            .await?;

        Ok(conversation)
    }

    /// Steps (f)-(g) of a turn: persist the assistant message as a child of
    /// the user message and advance `current_node` to it.
    ///
    /// Skipping this after a failed or aborted generation leaves the
    /// conversation at the user message, which is a valid, resumable state.
    pub async fn complete_turn(
        &self,
        conversation_id: &str,
        user_message_id: &str,
        assistant: ChatMessage,
    ) -> Result<()> {
        let assistant_id = assistant.message_id.clone();
        self.link_child(conversation_id, user_message_id, &assistant_id)
            .await?;
        self.append_message(assistant).await?;
        self.advance_current_node(conversation_id, &assistant_id)
            .await
    }

    /// Deletes a conversation and everything in it: messages first, then
    /// the conversation document.
    pub async fn cascade_delete(&self, user_id: i64, conversation_id: &str) -> Result<()> {
        if self
            .store
            .find_conversation(user_id, conversation_id)
            .await?
            .is_none()
        {
            return Err(PersistError::ConversationNotFound(
                conversation_id.to_string(),
            ));
        }
        let deleted = self.store.delete_messages(conversation_id).await?;
        self.store
            .delete_conversation(user_id, conversation_id)
            .await?;
        tracing::info!(conversation_id, deleted, "conversation deleted");
        Ok(())
    }

    /// Cascade-deletes every conversation of the user, returning how many
    /// conversations were removed.
    pub async fn cascade_delete_all(&self, user_id: i64) -> Result<u64> {
        let conversations = self.store.list_conversations(user_id).await?;
        let mut removed = 0;
        for conversation in &conversations {
            self.store
                .delete_messages(&conversation.conversation_id)
                .await?;
            self.store
                .delete_conversation(user_id, &conversation.conversation_id)
                .await?;
            removed += 1;
        }
        Ok(removed)
    }
}
