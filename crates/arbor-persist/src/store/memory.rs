use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;

use crate::error::{PersistError, Result};
use crate::models::{ChatMessage, Conversation};
use crate::store::ConversationStore;

/// In-memory store with the same filter-and-update semantics as
/// `MongoStore`. Backs tests and local development without a database.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    conversations: HashMap<String, Conversation>,
    // message_id is globally unique, matching the unique index.
    messages: HashMap<String, ChatMessage>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // Lock poisoning only happens after a panicking writer; tests want
        // the underlying panic, not a masked one.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl ConversationStore for MemoryStore {
    async fn insert_conversation(&self, conversation: Conversation) -> Result<()> {
        let mut inner = self.lock();
        if inner
            .conversations
            .contains_key(&conversation.conversation_id)
        {
            return Err(PersistError::Internal(format!(
                "conversation already exists: {}",
                conversation.conversation_id
            )));
        }
        inner
            .conversations
            .insert(conversation.conversation_id.clone(), conversation);
        Ok(())
    }

    async fn find_conversation(
        &self,
        user_id: i64,
        conversation_id: &str,
    ) -> Result<Option<Conversation>> {
        let inner = self.lock();
        Ok(inner
            .conversations
            .get(conversation_id)
            .filter(|c| c.user_id == user_id)
            .cloned())
    }

    async fn list_conversations(&self, user_id: i64) -> Result<Vec<Conversation>> {
        let inner = self.lock();
        let mut conversations: Vec<Conversation> = inner
            .conversations
            .values()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect();
        conversations.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(conversations)
    }

    async fn set_current_node(&self, conversation_id: &str, node_id: &str) -> Result<()> {
        let mut inner = self.lock();
        let conversation = inner
            .conversations
            .get_mut(conversation_id)
            .ok_or_else(|| PersistError::ConversationNotFound(conversation_id.to_string()))?;
        conversation.current_node = node_id.to_string();
        conversation.updated_at = Utc::now();
        Ok(())
    }

    async fn rename_conversation(
        &self,
        user_id: i64,
        conversation_id: &str,
        title: &str,
    ) -> Result<()> {
        let mut inner = self.lock();
        let conversation = inner
            .conversations
            .get_mut(conversation_id)
            .filter(|c| c.user_id == user_id)
            .ok_or_else(|| PersistError::ConversationNotFound(conversation_id.to_string()))?;
        conversation.title = title.to_string();
        conversation.updated_at = Utc::now();
        Ok(())
    }

    async fn set_archived(
        &self,
        user_id: i64,
        conversation_id: &str,
        archived: bool,
    ) -> Result<()> {
        let mut inner = self.lock();
        let conversation = inner
            .conversations
            .get_mut(conversation_id)
            .filter(|c| c.user_id == user_id)
            .ok_or_else(|| PersistError::ConversationNotFound(conversation_id.to_string()))?;
        conversation.is_archived = archived;
        conversation.updated_at = Utc::now();
        Ok(())
    }

    async fn delete_conversation(&self, user_id: i64, conversation_id: &str) -> Result<()> {
        let mut inner = self.lock();
        let owned = inner
            .conversations
            .get(conversation_id)
            .is_some_and(|c| c.user_id == user_id);
        if !owned {
            return Err(PersistError::ConversationNotFound(
                conversation_id.to_string(),
            ));
        }
        inner.conversations.remove(conversation_id);
        Ok(())
    }

    async fn insert_message(&self, message: ChatMessage) -> Result<()> {
        let mut inner = self.lock();
        if inner.messages.contains_key(&message.message_id) {
            return Err(PersistError::DuplicateMessage(message.message_id.clone()));
        }
        inner.messages.insert(message.message_id.clone(), message);
        Ok(())
    }

    async fn find_message(
        &self,
        conversation_id: &str,
        message_id: &str,
    ) -> Result<Option<ChatMessage>> {
        let inner = self.lock();
        Ok(inner
            .messages
            .get(message_id)
            .filter(|m| m.conversation_id == conversation_id)
            .cloned())
    }

    async fn list_messages(&self, conversation_id: &str) -> Result<Vec<ChatMessage>> {
        let inner = self.lock();
        let mut messages: Vec<ChatMessage> = inner
            .messages
            .values()
            .filter(|m| m.conversation_id == conversation_id)
            .cloned()
            .collect();
        messages.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(messages)
    }

    async fn push_child(
        &self,
        conversation_id: &str,
        parent_id: &str,
        child_id: &str,
    ) -> Result<()> {
        let mut inner = self.lock();
        let parent = inner
            .messages
            .get_mut(parent_id)
            .filter(|m| m.conversation_id == conversation_id)
            .ok_or_else(|| PersistError::ParentNotFound(parent_id.to_string()))?;
        if !parent.children.iter().any(|c| c == child_id) {
            parent.children.push(child_id.to_string());
        }
        parent.updated_at = Utc::now();
        Ok(())
    }

    async fn delete_messages(&self, conversation_id: &str) -> Result<u64> {
        let mut inner = self.lock();
        let before = inner.messages.len();
        inner
            .messages
            .retain(|_, m| m.conversation_id != conversation_id);
        Ok((before - inner.messages.len()) as u64)
    }
}
