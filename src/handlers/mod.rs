// src/handlers/mod.rs
pub mod account;
pub mod auth;
pub mod calendar;
pub mod chat;
pub mod settings;

#[cfg(test)]
pub(crate) mod tests {
    use crate::clock::LocalClock;
    use crate::google_oauth::GoogleOAuth;
    use crate::groq_client::{ChatMessage, CompletionBackend, CompletionClient, CompletionError};
    use crate::identity::Identity;
    use crate::services::{ChatService, UserStores};
    use crate::store::MemoryStore;
    use crate::AppState;
    use async_trait::async_trait;
    use axum::{
        body::Body,
        http::{header, Method, Request},
        response::Response,
    };
    use serde_json::Value;
    use std::sync::Arc;
    use tower::ServiceExt;

    pub const TEST_SECRET: &str = "test-secret";

    struct Scripted;

    #[async_trait]
    impl CompletionBackend for Scripted {
        async fn chat(&self, messages: Vec<ChatMessage>) -> Result<String, CompletionError> {
            if messages[0].content.starts_with("Summarize") {
                Ok("Scripted Title".to_string())
            } else {
                Ok("scripted reply".to_string())
            }
        }
    }

    pub fn test_state() -> Arc<AppState> {
        state_with_google(None)
    }

    pub fn state_with_google(google: Option<GoogleOAuth>) -> Arc<AppState> {
        let stores = UserStores::new(Arc::new(MemoryStore::new()));
        let completion = CompletionClient::new(Arc::new(Scripted), 10);
        Arc::new(AppState {
            chat: ChatService::new(stores.clone(), completion, LocalClock::default()),
            stores,
            google,
            jwt_secret: TEST_SECRET.to_string(),
            store_backend: "memory",
        })
    }

    pub fn user_token(state: &AppState, email: &str) -> String {
        let identity = Identity::from_google(email, None, None).unwrap();
        super::auth::issue_token(&identity, &state.jwt_secret, chrono::Duration::hours(1)).unwrap()
    }

    pub fn guest_token(state: &AppState) -> String {
        super::auth::issue_token(&Identity::guest(), &state.jwt_secret, chrono::Duration::hours(1)).unwrap()
    }

    pub async fn send(
        state: &Arc<AppState>,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Response {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            request = request.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => request
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };
        crate::app(state.clone()).oneshot(request).await.unwrap()
    }

    pub async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }
}
