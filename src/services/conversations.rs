// src/services/conversations.rs
use crate::identity::UserKey;
use crate::models::chat::{ConversationMeta, ConversationSummary, Message};
use crate::store::{DocPath, DocumentStore, StoreError};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use super::user_root;

/// Conversation histories and their metadata for one backing store.
///
/// Layout: `users/{key}/chats/{id}` holds the message array,
/// `users/{key}/chat_meta/{id}` holds `{title, created_at}`.
#[derive(Clone)]
pub struct ConversationStore {
    store: Arc<dyn DocumentStore>,
}

impl ConversationStore {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    fn messages_path(user: &UserKey, convo_id: &str) -> DocPath {
        user_root(user).child("chats").child(convo_id)
    }

    fn meta_path(user: &UserKey, convo_id: &str) -> DocPath {
        user_root(user).child("chat_meta").child(convo_id)
    }

    /// Starts a new empty conversation and returns its id.
    pub async fn create(&self, user: &UserKey) -> Result<String, StoreError> {
        let convo_id = uuid::Uuid::new_v4().to_string();
        let meta = ConversationMeta {
            title: None,
            created_at: Some(chrono::Utc::now()),
        };
        self.store
            .set(&Self::meta_path(user, &convo_id), serde_json::to_value(&meta)?)
            .await?;
        tracing::info!(user = %user, conversation = %convo_id, "started conversation");
        Ok(convo_id)
    }

    /// Stored messages in order. Missing or unreadable history reads as empty.
    pub async fn load(&self, user: &UserKey, convo_id: &str) -> Vec<Message> {
        match self.try_load(user, convo_id).await {
            Ok(messages) => messages.unwrap_or_default(),
            Err(e) => {
                tracing::warn!(user = %user, conversation = %convo_id, "failed to load history, treating as empty: {}", e);
                Vec::new()
            }
        }
    }

    /// Like [`load`](Self::load) but surfaces store errors and absence.
    pub async fn try_load(&self, user: &UserKey, convo_id: &str) -> Result<Option<Vec<Message>>, StoreError> {
        match self.store.get(&Self::messages_path(user, convo_id)).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Overwrites the whole message list in a single write.
    pub async fn save(&self, user: &UserKey, convo_id: &str, messages: &[Message]) -> Result<(), StoreError> {
        self.store
            .set(&Self::messages_path(user, convo_id), serde_json::to_value(messages)?)
            .await
    }

    /// Conversation ids with their metadata. Guests keep no durable list.
    pub async fn list(&self, user: &UserKey) -> Result<BTreeMap<String, ConversationSummary>, StoreError> {
        if user.is_guest() {
            return Ok(BTreeMap::new());
        }

        let meta = self.store.get(&user_root(user).child("chat_meta")).await?;
        let chats = self.store.get(&user_root(user).child("chats")).await?;

        let mut summaries = BTreeMap::new();
        if let Some(Value::Object(entries)) = meta {
            for (id, value) in entries {
                let meta: ConversationMeta = serde_json::from_value(value).unwrap_or_default();
                summaries.insert(id.clone(), ConversationSummary { id, title: meta.title, created_at: meta.created_at });
            }
        }
        // Histories written before any metadata still show up.
        if let Some(Value::Object(entries)) = chats {
            for id in entries.keys() {
                summaries
                    .entry(id.clone())
                    .or_insert_with(|| ConversationSummary { id: id.clone(), title: None, created_at: None });
            }
        }
        Ok(summaries)
    }

    pub async fn exists(&self, user: &UserKey, convo_id: &str) -> Result<bool, StoreError> {
        if self.store.get(&Self::meta_path(user, convo_id)).await?.is_some() {
            return Ok(true);
        }
        Ok(self.store.get(&Self::messages_path(user, convo_id)).await?.is_some())
    }

    pub async fn title(&self, user: &UserKey, convo_id: &str) -> Result<Option<String>, StoreError> {
        let value = self.store.get(&Self::meta_path(user, convo_id).child("title")).await?;
        Ok(value.and_then(|v| v.as_str().map(str::to_string)))
    }

    pub async fn set_title(&self, user: &UserKey, convo_id: &str, title: &str) -> Result<(), StoreError> {
        self.store
            .set(&Self::meta_path(user, convo_id).child("title"), Value::String(title.to_string()))
            .await
    }

    /// Removes the message list and its metadata.
    pub async fn delete(&self, user: &UserKey, convo_id: &str) -> Result<(), StoreError> {
        self.store.delete(&Self::messages_path(user, convo_id)).await?;
        self.store.delete(&Self::meta_path(user, convo_id)).await?;
        tracing::info!(user = %user, conversation = %convo_id, "deleted conversation");
        Ok(())
    }

    /// Removes everything stored for the user: conversations, settings, session, events, profile.
    pub async fn delete_all(&self, user: &UserKey) -> Result<(), StoreError> {
        self.store.delete(&user_root(user)).await?;
        tracing::info!(user = %user, "deleted all user data");
        Ok(())
    }
}

/// Serializes turns on the same conversation within this process, closing the
/// window between loading history and saving it back.
#[derive(Default)]
pub struct ConversationLocks {
    locks: Mutex<HashMap<(UserKey, String), Arc<AsyncMutex<()>>>>,
}

impl ConversationLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, user: &UserKey, convo_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            // Drop entries nobody is holding so the map tracks live conversations only.
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks
                .entry((user.clone(), convo_id.to_string()))
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}
