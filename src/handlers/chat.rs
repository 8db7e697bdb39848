// src/handlers/chat.rs
use crate::error::AppError;
use crate::identity::Identity;
use crate::middleware::auth::auth_middleware;
use crate::models::chat::{ChatRequest, ConversationSummary};
use crate::services::{ConversationStore, SessionStore};
use crate::AppState;
use axum::{
    extract::{Extension, Path},
    response::Json,
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;

pub fn chat_routes() -> Router {
    Router::new()
        .route("/api/conversations", get(list_conversations).post(new_conversation))
        .route(
            "/api/conversations/:id",
            get(get_conversation).delete(delete_conversation),
        )
        .route("/api/chat", post(send_message))
        .route_layer(axum::middleware::from_fn(auth_middleware))
}

/// Newest first; conversations without a creation time go last.
async fn list_conversations(
    Extension(state): Extension<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<Value>, AppError> {
    let store = state.stores.for_user(&identity.key);
    let mut conversations: Vec<ConversationSummary> = ConversationStore::new(store.clone())
        .list(&identity.key)
        .await?
        .into_values()
        .collect();
    conversations.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    let active = SessionStore::new(store)
        .active_conversation(&identity.key)
        .await
        .unwrap_or_else(|e| {
            tracing::warn!(user = %identity.key, "failed to read active conversation: {}", e);
            None
        });

    Ok(Json(json!({
        "success": true,
        "conversations": conversations,
        "active": active,
    })))
}

async fn new_conversation(
    Extension(state): Extension<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<Value>, AppError> {
    let store = state.stores.for_user(&identity.key);
    let convo_id = ConversationStore::new(store.clone()).create(&identity.key).await?;
    SessionStore::new(store)
        .set_active_conversation(&identity.key, &convo_id)
        .await?;

    Ok(Json(json!({
        "success": true,
        "conversation_id": convo_id,
    })))
}

async fn get_conversation(
    Extension(state): Extension<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(convo_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let conversations = ConversationStore::new(state.stores.for_user(&identity.key));
    let messages = match conversations.try_load(&identity.key, &convo_id).await? {
        Some(messages) => messages,
        None if conversations.exists(&identity.key, &convo_id).await? => Vec::new(),
        None => return Err(AppError::NotFound(format!("Conversation not found: {}", convo_id))),
    };
    let title = conversations.title(&identity.key, &convo_id).await?;

    Ok(Json(json!({
        "success": true,
        "id": convo_id,
        "title": title,
        "messages": messages,
    })))
}

async fn delete_conversation(
    Extension(state): Extension<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(convo_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let store = state.stores.for_user(&identity.key);
    let conversations = ConversationStore::new(store.clone());
    if !conversations.exists(&identity.key, &convo_id).await? {
        return Err(AppError::NotFound(format!("Conversation not found: {}", convo_id)));
    }
    conversations.delete(&identity.key, &convo_id).await?;

    let sessions = SessionStore::new(store);
    if sessions.active_conversation(&identity.key).await?.as_deref() == Some(convo_id.as_str()) {
        sessions.clear_active_conversation(&identity.key).await?;
    }

    Ok(Json(json!({ "success": true })))
}

async fn send_message(
    Extension(state): Extension<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<Value>, AppError> {
    let outcome = state
        .chat
        .send_message(&identity.key, request.conversation_id.as_deref(), &request.message)
        .await?;

    Ok(Json(json!({
        "success": true,
        "conversation_id": outcome.conversation_id,
        "reply": outcome.reply,
        "title": outcome.title,
        "event": outcome.event,
        "message_count": outcome.message_count,
    })))
}

#[cfg(test)]
mod tests {
    use crate::handlers::tests::{body_json, guest_token, send, test_state, user_token};
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    #[tokio::test]
    async fn test_chat_turn_and_history() {
        let state = test_state();
        let token = user_token(&state, "ana@example.com");

        let response = send(&state, Method::POST, "/api/chat", Some(&token), Some(json!({"message": "Hello there"}))).await;
        assert_eq!(response.status(), StatusCode::OK);
        let turn = body_json(response).await;
        assert_eq!(turn["reply"], "scripted reply");
        assert_eq!(turn["title"], "Scripted Title");
        let convo = turn["conversation_id"].as_str().unwrap().to_string();

        let listed = body_json(send(&state, Method::GET, "/api/conversations", Some(&token), None).await).await;
        assert_eq!(listed["conversations"].as_array().unwrap().len(), 1);
        assert_eq!(listed["active"], convo.as_str());

        let uri = format!("/api/conversations/{}", convo);
        let detail = body_json(send(&state, Method::GET, &uri, Some(&token), None).await).await;
        assert_eq!(detail["messages"].as_array().unwrap().len(), 2);
        assert_eq!(detail["messages"][0]["role"], "user");
        assert_eq!(detail["title"], "Scripted Title");

        let deleted = send(&state, Method::DELETE, &uri, Some(&token), None).await;
        assert_eq!(deleted.status(), StatusCode::OK);
        let missing = send(&state, Method::GET, &uri, Some(&token), None).await;
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
        let listed = body_json(send(&state, Method::GET, "/api/conversations", Some(&token), None).await).await;
        assert_eq!(listed["active"], serde_json::Value::Null);
    }

    #[tokio::test]
    async fn test_new_conversation_becomes_active() {
        let state = test_state();
        let token = user_token(&state, "ana@example.com");

        let first = body_json(send(&state, Method::POST, "/api/chat", Some(&token), Some(json!({"message": "one"}))).await).await;
        let created = body_json(send(&state, Method::POST, "/api/conversations", Some(&token), None).await).await;
        let fresh = created["conversation_id"].as_str().unwrap();
        assert_ne!(fresh, first["conversation_id"].as_str().unwrap());

        let next = body_json(send(&state, Method::POST, "/api/chat", Some(&token), Some(json!({"message": "two"}))).await).await;
        assert_eq!(next["conversation_id"], fresh);
        assert_eq!(next["message_count"], 2);
    }

    #[tokio::test]
    async fn test_bad_requests() {
        let state = test_state();
        let token = user_token(&state, "ana@example.com");

        let empty = send(&state, Method::POST, "/api/chat", Some(&token), Some(json!({"message": "  "}))).await;
        assert_eq!(empty.status(), StatusCode::BAD_REQUEST);

        let bad_id = send(
            &state,
            Method::POST,
            "/api/chat",
            Some(&token),
            Some(json!({"message": "hi", "conversation_id": "a.b"})),
        )
        .await;
        assert_eq!(bad_id.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_guest_list_is_empty_but_chat_works() {
        let state = test_state();
        let token = guest_token(&state);

        let turn = body_json(send(&state, Method::POST, "/api/chat", Some(&token), Some(json!({"message": "hi"}))).await).await;
        assert_eq!(turn["reply"], "scripted reply");

        let listed = body_json(send(&state, Method::GET, "/api/conversations", Some(&token), None).await).await;
        assert!(listed["conversations"].as_array().unwrap().is_empty());
    }
}
