// src/services/session.rs
use crate::identity::UserKey;
use crate::models::auth::Profile;
use crate::models::settings::Settings;
use crate::store::{DocPath, DocumentStore, StoreError};
use serde_json::Value;
use std::sync::Arc;

use super::user_root;

/// Per-user settings, profile and the active conversation pointer.
#[derive(Clone)]
pub struct SessionStore {
    store: Arc<dyn DocumentStore>,
}

impl SessionStore {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    fn settings_path(user: &UserKey) -> DocPath {
        user_root(user).child("settings")
    }

    fn active_path(user: &UserKey) -> DocPath {
        user_root(user).child("session").child("active_conversation")
    }

    /// Stored settings with defaults filled in. Unreadable settings fall back to defaults.
    pub async fn settings(&self, user: &UserKey) -> Settings {
        match self.store.get(&Self::settings_path(user)).await {
            Ok(Some(value)) => serde_json::from_value(value).unwrap_or_else(|e| {
                tracing::warn!(user = %user, "stored settings unreadable, using defaults: {}", e);
                Settings::default()
            }),
            Ok(None) => Settings::default(),
            Err(e) => {
                tracing::warn!(user = %user, "failed to load settings, using defaults: {}", e);
                Settings::default()
            }
        }
    }

    /// Replaces all settings at once; last writer wins.
    pub async fn save_settings(&self, user: &UserKey, settings: &Settings) -> Result<(), StoreError> {
        self.store
            .set(&Self::settings_path(user), serde_json::to_value(settings)?)
            .await
    }

    pub async fn active_conversation(&self, user: &UserKey) -> Result<Option<String>, StoreError> {
        let value = self.store.get(&Self::active_path(user)).await?;
        Ok(value.and_then(|v| v.as_str().map(str::to_string)))
    }

    pub async fn set_active_conversation(&self, user: &UserKey, convo_id: &str) -> Result<(), StoreError> {
        self.store
            .set(&Self::active_path(user), Value::String(convo_id.to_string()))
            .await
    }

    pub async fn clear_active_conversation(&self, user: &UserKey) -> Result<(), StoreError> {
        self.store.delete(&Self::active_path(user)).await
    }

    fn expiry_path(user: &UserKey) -> DocPath {
        user_root(user).child("session").child("expires_at")
    }

    /// Unix time after which the session's data may be discarded.
    pub async fn session_expiry(&self, user: &UserKey) -> Result<Option<i64>, StoreError> {
        let value = self.store.get(&Self::expiry_path(user)).await?;
        Ok(value.and_then(|v| v.as_i64()))
    }

    pub async fn set_session_expiry(&self, user: &UserKey, expires_at: i64) -> Result<(), StoreError> {
        self.store.set(&Self::expiry_path(user), Value::from(expires_at)).await
    }

    pub async fn save_profile(&self, user: &UserKey, profile: &Profile) -> Result<(), StoreError> {
        self.store
            .set(&user_root(user).child("profile"), serde_json::to_value(profile)?)
            .await
    }
}
