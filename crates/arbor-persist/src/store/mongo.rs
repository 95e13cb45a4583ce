use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use futures::TryStreamExt;
use mongodb::bson::{doc, Bson};
use mongodb::options::IndexOptions;
use mongodb::{Client, Collection, IndexModel};

use crate::error::{is_duplicate_key, PersistError, Result};
use crate::models::{ChatMessage, Conversation};
use crate::store::ConversationStore;

/// MongoDB-backed store.
#[derive(Clone)]
pub struct MongoStore {
    conversations: Collection<Conversation>,
    messages: Collection<ChatMessage>,
}

impl MongoStore {
    /// Connect and ensure the indexes the tree queries rely on.
    pub async fn connect(mongodb_uri: &str, db_name: &str) -> Result<Self> {
        let client = Client::with_uri_str(mongodb_uri)
            .await
            .map_err(|e| PersistError::Connection(e.to_string()))?;

        let db = client.database(db_name);
        let store = Self {
            conversations: db.collection("conversations"),
            messages: db.collection("chat_messages"),
        };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> Result<()> {
        // message_id is globally unique; (conversation_id, parent) serves
        // children lookups.
        self.messages
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "message_id": 1 })
                    .options(IndexOptions::builder().unique(true).build())
                    .build(),
            )
            .await?;
        self.messages
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "conversation_id": 1, "parent": 1 })
                    .build(),
            )
            .await?;
        // Exactly one Conversation per conversation_id.
        self.conversations
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "conversation_id": 1 })
                    .options(IndexOptions::builder().unique(true).build())
                    .build(),
            )
            .await?;
        self.conversations
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "user_id": 1, "updated_at": -1 })
                    .build(),
            )
            .await?;
        Ok(())
    }
}

/// Timestamps are stored in the exact string form chrono's serde emits, so
/// updates compare and sort consistently with inserted documents.
fn bson_now() -> Bson {
    Bson::String(Utc::now().to_rfc3339_opts(SecondsFormat::AutoSi, true))
}

#[async_trait]
impl ConversationStore for MongoStore {
    async fn insert_conversation(&self, conversation: Conversation) -> Result<()> {
        self.conversations.insert_one(&conversation).await?;
        Ok(())
    }

    async fn find_conversation(
        &self,
        user_id: i64,
        conversation_id: &str,
    ) -> Result<Option<Conversation>> {
        let filter = doc! { "user_id": user_id, "conversation_id": conversation_id };
        Ok(self.conversations.find_one(filter).await?)
    }

    async fn list_conversations(&self, user_id: i64) -> Result<Vec<Conversation>> {
        let conversations = self
            .conversations
            .find(doc! { "user_id": user_id })
            .sort(doc! { "updated_at": -1 })
            .await?
            .try_collect()
            .await?;
        Ok(conversations)
    }

    async fn set_current_node(&self, conversation_id: &str, node_id: &str) -> Result<()> {
        let result = self
            .conversations
            .update_one(
                doc! { "conversation_id": conversation_id },
                doc! { "$set": { "current_node": node_id, "updated_at": bson_now() } },
            )
            .await?;
        if result.matched_count == 0 {
            return Err(PersistError::ConversationNotFound(
                conversation_id.to_string(),
            ));
        }
        Ok(())
    }

    async fn rename_conversation(
        &self,
        user_id: i64,
        conversation_id: &str,
        title: &str,
    ) -> Result<()> {
        let result = self
            .conversations
            .update_one(
                doc! { "user_id": user_id, "conversation_id": conversation_id },
                doc! { "$set": { "title": title, "updated_at": bson_now() } },
            )
            .await?;
        if result.matched_count == 0 {
            return Err(PersistError::ConversationNotFound(
                conversation_id.to_string(),
            ));
        }
        Ok(())
    }

    async fn set_archived(
        &self,
        user_id: i64,
        conversation_id: &str,
        archived: bool,
    ) -> Result<()> {
        let result = self
            .conversations
            .update_one(
                doc! { "user_id": user_id, "conversation_id": conversation_id },
                doc! { "$set": { "is_archived": archived, "updated_at": bson_now() } },
            )
            .await?;
        if result.matched_count == 0 {
            return Err(PersistError::ConversationNotFound(
                conversation_id.to_string(),
            ));
        }
        Ok(())
    }

    async fn delete_conversation(&self, user_id: i64, conversation_id: &str) -> Result<()> {
        let filter = doc! { "user_id": user_id, "conversation_id": conversation_id };
        let result = self.conversations.delete_one(filter).await?;
        if result.deleted_count == 0 {
            return Err(PersistError::ConversationNotFound(
                conversation_id.to_string(),
            ));
        }
        Ok(())
    }

    async fn insert_message(&self, message: ChatMessage) -> Result<()> {
        match self.messages.insert_one(&message).await {
            Ok(_) => Ok(()),
            Err(e) if is_duplicate_key(&e) => {
                Err(PersistError::DuplicateMessage(message.message_id.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn find_message(
        &self,
        conversation_id: &str,
        message_id: &str,
    ) -> Result<Option<ChatMessage>> {
        let filter = doc! { "conversation_id": conversation_id, "message_id": message_id };
        Ok(self.messages.find_one(filter).await?)
    }

    async fn list_messages(&self, conversation_id: &str) -> Result<Vec<ChatMessage>> {
        let messages = self
            .messages
            .find(doc! { "conversation_id": conversation_id })
            .sort(doc! { "created_at": -1 })
            .await?
            .try_collect()
            .await?;
        Ok(messages)
    }

    async fn push_child(
        &self,
        conversation_id: &str,
        parent_id: &str,
        child_id: &str,
    ) -> Result<()> {
        let result = self
            .messages
            .update_one(
                doc! { "conversation_id": conversation_id, "message_id": parent_id },
                doc! {
                    "$addToSet": { "children": child_id },
                    "$set": { "updated_at": bson_now() },
                },
            )
            .await?;
        if result.matched_count == 0 {
            return Err(PersistError::ParentNotFound(parent_id.to_string()));
        }
        Ok(())
    }

    async fn delete_messages(&self, conversation_id: &str) -> Result<u64> {
        let result = self
            .messages
            .delete_many(doc! { "conversation_id": conversation_id })
            .await?;
        Ok(result.deleted_count)
    }
}
