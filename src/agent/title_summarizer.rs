// src/agent/title_summarizer.rs
use crate::groq_client::{ChatMessage, CompletionBackend};
use crate::models::chat::Role;
use std::sync::Arc;

const TITLE_SYSTEM_PROMPT: &str = "Summarize the user's message as a short title of 3 to 5 words. \
Reply with the title only. Do not use punctuation or quotation marks.";

const FALLBACK_CHARS: usize = 27;
const MAX_TITLE_CHARS: usize = 60;

/// Condenses a message into a short label for the conversation list.
#[derive(Clone)]
pub struct TitleSummarizer {
    backend: Arc<dyn CompletionBackend>,
}

impl TitleSummarizer {
    pub fn new(backend: Arc<dyn CompletionBackend>) -> Self {
        Self { backend }
    }

    /// `None` on any failure or unusable output.
    pub async fn summarize(&self, message: &str) -> Option<String> {
        let messages = vec![
            ChatMessage::new(Role::System, TITLE_SYSTEM_PROMPT),
            ChatMessage::new(Role::User, message),
        ];
        match self.backend.chat(messages).await {
            Ok(raw) => sanitize_title(&raw),
            Err(e) => {
                tracing::debug!("Title summarization failed: {}", e);
                None
            }
        }
    }

    /// Summarized title, or the truncated message when summarization fails.
    pub async fn title_for(&self, message: &str) -> String {
        match self.summarize(message).await {
            Some(title) => title,
            None => fallback_title(message),
        }
    }
}

/// Trims quotes and whitespace from both ends.
pub fn trim_quotes(text: &str) -> &str {
    text.trim_matches(|c: char| c.is_whitespace() || matches!(c, '"' | '\'' | '`' | '“' | '”' | '‘' | '’'))
}

/// First usable line of a model reply, without a `Title:` label, quotes or trailing punctuation.
pub fn sanitize_title(raw: &str) -> Option<String> {
    let line = raw.lines().map(trim_quotes).find(|l| !l.is_empty())?;
    let line = match line.get(..6) {
        Some(prefix) if prefix.eq_ignore_ascii_case("title:") => trim_quotes(&line[6..]),
        _ => line,
    };
    let line = line
        .trim_end_matches(|c: char| matches!(c, '.' | '!' | '?' | ',' | ';' | ':'))
        .trim_end();
    let line = trim_quotes(line);
    if line.is_empty() {
        return None;
    }
    Some(line.chars().take(MAX_TITLE_CHARS).collect::<String>().trim_end().to_string())
}

/// First 27 characters plus `...`; shorter messages are kept whole.
pub fn fallback_title(message: &str) -> String {
    let message = trim_quotes(message);
    if message.is_empty() {
        return "New chat".to_string();
    }
    if message.chars().count() <= FALLBACK_CHARS {
        return message.to_string();
    }
    let head: String = message.chars().take(FALLBACK_CHARS).collect();
    format!("{}...", head)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::groq_client::CompletionError;
    use async_trait::async_trait;

    struct Fixed(Result<&'static str, ()>);

    #[async_trait]
    impl CompletionBackend for Fixed {
        async fn chat(&self, _messages: Vec<ChatMessage>) -> Result<String, CompletionError> {
            self.0
                .map(str::to_string)
                .map_err(|_| CompletionError::Status { status: 503, body: String::new() })
        }
    }

    #[test]
    fn test_sanitize_title() {
        assert_eq!(sanitize_title("\"Weekend Hiking Plans.\""), Some("Weekend Hiking Plans".to_string()));
        assert_eq!(sanitize_title("Title: Rust Borrow Checker\nextra"), Some("Rust Borrow Checker".to_string()));
        assert_eq!(sanitize_title("\n\n  'Dinner Ideas!'  "), Some("Dinner Ideas".to_string()));
        assert_eq!(sanitize_title("  \"\"  "), None);
        assert!(sanitize_title(&"word ".repeat(40)).unwrap().chars().count() <= MAX_TITLE_CHARS);
    }

    #[test]
    fn test_fallback_title() {
        assert_eq!(fallback_title("Short question"), "Short question");
        assert_eq!(
            fallback_title("Can you explain how lifetimes work in Rust?"),
            "Can you explain how lifetim..."
        );
        assert_eq!(fallback_title("   "), "New chat");
        // Multi-byte characters are counted, not bytes.
        assert_eq!(fallback_title(&"é".repeat(30)), format!("{}...", "é".repeat(27)));
    }

    #[tokio::test]
    async fn test_summarize_success_and_failure() {
        let ok = TitleSummarizer::new(Arc::new(Fixed(Ok("'Trip To Lisbon'"))));
        assert_eq!(ok.summarize("plan my trip").await.as_deref(), Some("Trip To Lisbon"));

        let failing = TitleSummarizer::new(Arc::new(Fixed(Err(()))));
        assert_eq!(failing.summarize("plan my trip").await, None);
        assert_eq!(
            failing.title_for("Please help me plan a trip to Lisbon in May").await,
            "Please help me plan a trip ..."
        );
    }
}
