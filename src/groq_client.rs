use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

use crate::config::CompletionConfig;
use crate::models::chat::{Message, Role};

/// Reply appended when the service answered but carried no text.
pub const NO_REPLY_FALLBACK: &str = "⚠️ AI: no reply received.";
/// Reply appended when the request itself failed.
pub const ERROR_FALLBACK: &str = "❌ Error generating response.";

#[derive(Error, Debug)]
pub enum CompletionError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("completion service returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("completion response had no message content")]
    EmptyReply,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role: role.as_str().to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Anything that can answer a chat-completion request.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn chat(&self, messages: Vec<ChatMessage>) -> Result<String, CompletionError>;
}

/// OpenAI-compatible chat completions endpoint (Groq by default).
#[derive(Debug, Clone)]
pub struct GroqClient {
    client: Client,
    api_key: String,
    url: String,
    model: String,
}

impl GroqClient {
    pub fn new(config: &CompletionConfig) -> Self {
        Self {
            client: Client::new(),
            api_key: config.api_key.clone(),
            url: config.url.clone(),
            model: config.model.clone(),
        }
    }
}

#[async_trait]
impl CompletionBackend for GroqClient {
    async fn chat(&self, messages: Vec<ChatMessage>) -> Result<String, CompletionError> {
        let request = ChatCompletionRequest {
            model: &self.model,
            messages: &messages,
        };

        tracing::debug!("Completion request: {} messages, model {}", messages.len(), self.model);

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        tracing::debug!("Completion status: {}", status);
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CompletionError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body: ChatCompletionResponse = response.json().await?;
        body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(CompletionError::EmptyReply)
    }
}

/// Assembles the context window and always produces a reply string.
#[derive(Clone)]
pub struct CompletionClient {
    backend: Arc<dyn CompletionBackend>,
    window: usize,
}

impl CompletionClient {
    pub fn new(backend: Arc<dyn CompletionBackend>, window: usize) -> Self {
        Self { backend, window }
    }

    pub fn backend(&self) -> Arc<dyn CompletionBackend> {
        self.backend.clone()
    }

    /// `[system] + last N prior turns (role and content only) + [user]`.
    pub fn build_messages(&self, system_prompt: &str, prior: &[Message], user_prompt: &str) -> Vec<ChatMessage> {
        let start = prior.len().saturating_sub(self.window);
        let mut messages = Vec::with_capacity(prior.len() - start + 2);
        messages.push(ChatMessage::new(Role::System, system_prompt));
        messages.extend(prior[start..].iter().map(|m| ChatMessage::new(m.role, m.content.clone())));
        messages.push(ChatMessage::new(Role::User, user_prompt));
        messages
    }

    /// Never fails: errors come back as a fallback reply that the caller stores like any other.
    pub async fn complete(&self, system_prompt: &str, prior: &[Message], user_prompt: &str) -> String {
        let messages = self.build_messages(system_prompt, prior, user_prompt);
        match self.backend.chat(messages).await {
            Ok(reply) => reply,
            Err(CompletionError::EmptyReply) => {
                tracing::warn!("Completion returned no content");
                NO_REPLY_FALLBACK.to_string()
            }
            Err(e) => {
                tracing::error!("Completion failed: {}", e);
                ERROR_FALLBACK.to_string()
            }
        }
    }
}
