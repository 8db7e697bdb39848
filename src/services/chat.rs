// src/services/chat.rs
use crate::agent::{EventExtractor, TitleSummarizer};
use crate::clock::LocalClock;
use crate::groq_client::CompletionClient;
use crate::identity::UserKey;
use crate::models::calendar::EventResponse;
use crate::models::chat::{Message, Role};
use crate::models::settings::Settings;
use crate::store::{is_valid_segment, StoreError};
use serde::Serialize;
use thiserror::Error;

use super::{CalendarStore, ConversationLocks, ConversationStore, SessionStore, UserStores};

#[derive(Error, Debug)]
pub enum ChatError {
    #[error("message is empty")]
    EmptyMessage,
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Serialize)]
pub struct TurnOutcome {
    pub conversation_id: String,
    pub reply: String,
    pub title: Option<String>,
    /// Set when the message was a calendar request and the event was stored.
    pub event: Option<EventResponse>,
    pub message_count: usize,
}

/// Runs one chat turn end to end: history, completion, persistence, then the
/// best-effort calendar and title side effects.
pub struct ChatService {
    stores: UserStores,
    completion: CompletionClient,
    summarizer: TitleSummarizer,
    extractor: EventExtractor,
    locks: ConversationLocks,
    clock: LocalClock,
}

impl ChatService {
    pub fn new(stores: UserStores, completion: CompletionClient, clock: LocalClock) -> Self {
        let summarizer = TitleSummarizer::new(completion.backend());
        let extractor = EventExtractor::new(summarizer.clone());
        Self {
            stores,
            completion,
            summarizer,
            extractor,
            locks: ConversationLocks::new(),
            clock,
        }
    }

    /// Resolves the conversation a message goes to: the given id, else the
    /// active one, else a fresh conversation. The result becomes active.
    pub async fn resolve_conversation(&self, user: &UserKey, requested: Option<&str>) -> Result<String, StoreError> {
        let store = self.stores.for_user(user);
        let sessions = SessionStore::new(store.clone());
        let conversations = ConversationStore::new(store);

        let convo_id = match requested {
            Some(id) if !is_valid_segment(id) => {
                return Err(StoreError::InvalidPath(format!("conversation id {:?}", id)))
            }
            Some(id) => id.to_string(),
            None => {
                let active = sessions.active_conversation(user).await.unwrap_or_else(|e| {
                    tracing::warn!(user = %user, "failed to read active conversation: {}", e);
                    None
                });
                match active {
                    Some(id) => return Ok(id),
                    None => conversations.create(user).await?,
                }
            }
        };
        sessions.set_active_conversation(user, &convo_id).await?;
        Ok(convo_id)
    }

    pub async fn send_message(
        &self,
        user: &UserKey,
        requested: Option<&str>,
        message: &str,
    ) -> Result<TurnOutcome, ChatError> {
        let message = message.trim();
        if message.is_empty() {
            return Err(ChatError::EmptyMessage);
        }

        let convo_id = self.resolve_conversation(user, requested).await?;
        let store = self.stores.for_user(user);
        let conversations = ConversationStore::new(store.clone());
        let sessions = SessionStore::new(store.clone());

        let _guard = self.locks.acquire(user, &convo_id).await;

        let mut history = conversations.load(user, &convo_id).await;
        let settings = sessions.settings(user).await;
        let reply = self
            .completion
            .complete(&persona_prompt(&settings), &history, message)
            .await;

        let stamp = self.clock.display_time();
        history.push(Message::new(Role::User, message, stamp.clone()));
        history.push(Message::new(Role::Assistant, reply.clone(), stamp));
        conversations.save(user, &convo_id, &history).await?;
        tracing::info!(user = %user, conversation = %convo_id, messages = history.len(), "chat turn saved");

        let event = self.record_event(user, message, CalendarStore::new(store)).await;
        let title = self.ensure_title(user, &convo_id, &history, &conversations).await;

        Ok(TurnOutcome {
            conversation_id: convo_id,
            reply,
            title,
            event,
            message_count: history.len(),
        })
    }

    async fn record_event(&self, user: &UserKey, message: &str, calendar: CalendarStore) -> Option<EventResponse> {
        let new_event = self.extractor.extract(message, self.clock.today()).await?;
        match calendar.add(user, new_event).await {
            Ok(mut events) if !events.is_empty() => Some(EventResponse::from(events.remove(0))),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(user = %user, "calendar event from chat not saved: {}", e);
                None
            }
        }
    }

    /// Titles a conversation once, from its first user message.
    async fn ensure_title(
        &self,
        user: &UserKey,
        convo_id: &str,
        history: &[Message],
        conversations: &ConversationStore,
    ) -> Option<String> {
        match conversations.title(user, convo_id).await {
            Ok(Some(title)) => return Some(title),
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(user = %user, conversation = %convo_id, "could not read title: {}", e);
                return None;
            }
        }

        let first = history.iter().find(|m| m.role == Role::User)?;
        let title = self.summarizer.title_for(&first.content).await;
        if let Err(e) = conversations.set_title(user, convo_id, &title).await {
            tracing::warn!(user = %user, conversation = %convo_id, "could not save title: {}", e);
        }
        Some(title)
    }
}

/// System prompt shaped by the user's persona settings.
pub fn persona_prompt(settings: &Settings) -> String {
    let length = match settings.reply_length.as_str() {
        "short" => "Keep replies brief, a few sentences at most.",
        "long" => "Give thorough, detailed replies.",
        _ => "Keep replies reasonably concise.",
    };
    let personality = settings.personality.trim();
    let personality = if personality.is_empty() { "friendly" } else { personality };
    format!("You are a helpful, {} personal assistant. {}", personality, length)
}
