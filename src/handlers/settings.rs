use crate::error::AppError;
use crate::identity::Identity;
use crate::middleware::auth::auth_middleware;
use crate::models::settings::Settings;
use crate::services::SessionStore;
use crate::AppState;
use axum::{extract::Extension, response::Json, routing::get, Router};
use serde_json::{json, Value};
use std::sync::Arc;

pub fn settings_routes() -> Router {
    Router::new()
        .route("/api/settings", get(get_settings).put(put_settings))
        .route_layer(axum::middleware::from_fn(auth_middleware))
}

async fn get_settings(
    Extension(state): Extension<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
) -> Json<Value> {
    let settings = SessionStore::new(state.stores.for_user(&identity.key))
        .settings(&identity.key)
        .await;
    Json(json!({ "success": true, "settings": settings }))
}

/// Replaces the stored settings wholesale; omitted fields take their defaults.
async fn put_settings(
    Extension(state): Extension<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Json(settings): Json<Settings>,
) -> Result<Json<Value>, AppError> {
    SessionStore::new(state.stores.for_user(&identity.key))
        .save_settings(&identity.key, &settings)
        .await?;
    tracing::info!(user = %identity.key, "settings updated");
    Ok(Json(json!({ "success": true, "settings": settings })))
}
