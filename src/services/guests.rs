// src/services/guests.rs
use crate::identity::UserKey;
use crate::store::{DocPath, DocumentStore, StoreError};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use super::{user_root, SessionStore, UserStores};

/// Drops guest data once the guest session has run out.
pub struct GuestSweeper {
    store: Arc<dyn DocumentStore>,
    interval: Duration,
}

impl GuestSweeper {
    pub fn new(stores: &UserStores, interval: Duration) -> Self {
        Self {
            store: stores.ephemeral(),
            interval,
        }
    }

    pub async fn run(self) {
        tracing::info!("🧹 Sweeping expired guest sessions every {:?}", self.interval);
        loop {
            match self.sweep_once(chrono::Utc::now().timestamp()).await {
                Ok(0) => tracing::debug!("Guest sweep found nothing expired"),
                Ok(n) => tracing::info!("Guest sweep removed {} session(s)", n),
                Err(e) => tracing::error!("❌ Guest sweep failed: {}", e),
            }
            tokio::time::sleep(self.interval).await;
        }
    }

    /// Removes every guest subtree whose expiry is at or before `now`.
    /// A subtree without an expiry has no live login behind it and goes too.
    pub async fn sweep_once(&self, now: i64) -> Result<usize, StoreError> {
        let Some(Value::Object(users)) = self.store.get(&DocPath::new(["users"])).await? else {
            return Ok(0);
        };
        let sessions = SessionStore::new(self.store.clone());
        let mut removed = 0;

        for key in users.keys() {
            let user = UserKey::from_trusted(key.clone());
            if !user.is_guest() {
                continue;
            }
            match sessions.session_expiry(&user).await? {
                Some(expires_at) if expires_at > now => continue,
                _ => {}
            }
            self.store.delete(&user_root(&user)).await?;
            tracing::debug!(user = %user, "expired guest data removed");
            removed += 1;
        }
        Ok(removed)
    }
}
