use crate::error::AppError;
use crate::identity::Identity;
use crate::middleware::auth::auth_middleware;
use crate::models::calendar::{EventResponse, NewEvent};
use crate::services::CalendarStore;
use crate::AppState;
use axum::{
    extract::{Extension, Path},
    response::Json,
    routing::{delete, get},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;

pub fn calendar_routes() -> Router {
    Router::new()
        .route("/api/calendar", get(list_events).post(add_event))
        .route("/api/calendar/:id", delete(delete_event))
        .route_layer(axum::middleware::from_fn(auth_middleware))
}

async fn list_events(
    Extension(state): Extension<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<Value>, AppError> {
    let events: Vec<EventResponse> = CalendarStore::new(state.stores.for_user(&identity.key))
        .list(&identity.key)
        .await?
        .into_iter()
        .map(EventResponse::from)
        .collect();
    Ok(Json(json!({ "success": true, "events": events })))
}

async fn add_event(
    Extension(state): Extension<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Json(new_event): Json<NewEvent>,
) -> Result<Json<Value>, AppError> {
    let events: Vec<EventResponse> = CalendarStore::new(state.stores.for_user(&identity.key))
        .add(&identity.key, new_event)
        .await?
        .into_iter()
        .map(EventResponse::from)
        .collect();
    Ok(Json(json!({ "success": true, "events": events })))
}

/// Removes the event together with every occurrence created alongside it.
async fn delete_event(
    Extension(state): Extension<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(event_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let removed = CalendarStore::new(state.stores.for_user(&identity.key))
        .delete(&identity.key, &event_id)
        .await?;
    Ok(Json(json!({ "success": true, "removed": removed })))
}

#[cfg(test)]
mod tests {
    use crate::handlers::tests::{body_json, send, test_state, user_token};
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    #[tokio::test]
    async fn test_add_weekly_then_delete_series() {
        let state = test_state();
        let token = user_token(&state, "ana@example.com");

        let added = send(
            &state,
            Method::POST,
            "/api/calendar",
            Some(&token),
            Some(json!({
                "title": "Standup",
                "date": "2024-03-04",
                "time": "09:30",
                "repeat": "weekly",
                "occurrences": 3
            })),
        )
        .await;
        assert_eq!(added.status(), StatusCode::OK);
        let added = body_json(added).await;
        let events = added["events"].as_array().unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[2]["date"], "2024-03-18");
        assert_eq!(events[0]["all_day"], false);

        let listed = body_json(send(&state, Method::GET, "/api/calendar", Some(&token), None).await).await;
        assert_eq!(listed["events"].as_array().unwrap().len(), 3);

        // Deleting any occurrence removes the whole series.
        let uri = format!("/api/calendar/{}", events[1]["id"].as_str().unwrap());
        let removed = body_json(send(&state, Method::DELETE, &uri, Some(&token), None).await).await;
        assert_eq!(removed["removed"].as_array().unwrap().len(), 3);

        let listed = body_json(send(&state, Method::GET, "/api/calendar", Some(&token), None).await).await;
        assert!(listed["events"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_and_unknown_events() {
        let state = test_state();
        let token = user_token(&state, "ana@example.com");

        let too_many = send(
            &state,
            Method::POST,
            "/api/calendar",
            Some(&token),
            Some(json!({"title": "Gym", "date": "2024-03-04", "repeat": "daily", "occurrences": 53})),
        )
        .await;
        assert_eq!(too_many.status(), StatusCode::BAD_REQUEST);

        let missing = send(&state, Method::DELETE, "/api/calendar/nope", Some(&token), None).await;
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }
}
