use crate::error::AppError;
use crate::identity::Identity;
use crate::middleware::auth::auth_middleware;
use crate::services::ConversationStore;
use crate::AppState;
use axum::{extract::Extension, response::Json, routing::delete, Router};
use serde_json::{json, Value};
use std::sync::Arc;

pub fn account_routes() -> Router {
    Router::new()
        .route("/api/account", delete(delete_account))
        .route_layer(axum::middleware::from_fn(auth_middleware))
}

/// Erases every conversation, setting, event and the profile. The token stays
/// valid but now addresses an empty tree.
async fn delete_account(
    Extension(state): Extension<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<Value>, AppError> {
    ConversationStore::new(state.stores.for_user(&identity.key))
        .delete_all(&identity.key)
        .await?;
    tracing::info!(user = %identity.key, "🗑️ Account data deleted");
    Ok(Json(json!({ "success": true })))
}

#[cfg(test)]
mod tests {
    use crate::handlers::tests::{body_json, send, test_state, user_token};
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    #[tokio::test]
    async fn test_delete_account_cascades() {
        let state = test_state();
        let token = user_token(&state, "ana@example.com");
        let other = user_token(&state, "bo@example.com");

        for t in [&token, &other] {
            send(&state, Method::POST, "/api/chat", Some(t), Some(json!({"message": "hello"}))).await;
        }
        send(
            &state,
            Method::POST,
            "/api/calendar",
            Some(&token),
            Some(json!({"title": "Dentist", "date": "2024-05-01"})),
        )
        .await;

        let response = send(&state, Method::DELETE, "/api/account", Some(&token), None).await;
        assert_eq!(response.status(), StatusCode::OK);

        let listed = body_json(send(&state, Method::GET, "/api/conversations", Some(&token), None).await).await;
        assert!(listed["conversations"].as_array().unwrap().is_empty());
        let events = body_json(send(&state, Method::GET, "/api/calendar", Some(&token), None).await).await;
        assert!(events["events"].as_array().unwrap().is_empty());

        // Other users are untouched.
        let listed = body_json(send(&state, Method::GET, "/api/conversations", Some(&other), None).await).await;
        assert_eq!(listed["conversations"].as_array().unwrap().len(), 1);
    }
}
