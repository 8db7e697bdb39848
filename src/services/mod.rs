// src/services/mod.rs
pub mod calendar;
pub mod chat;
pub mod conversations;
pub mod guests;
pub mod reminders;
pub mod session;

pub use calendar::{CalendarError, CalendarStore};
pub use chat::{ChatService, TurnOutcome};
pub use conversations::{ConversationLocks, ConversationStore};
pub use guests::GuestSweeper;
pub use reminders::ReminderPoller;
pub use session::SessionStore;

use crate::identity::UserKey;
use crate::store::{DocPath, DocumentStore, MemoryStore};
use std::sync::Arc;

/// Root of everything stored for one user.
pub fn user_root(user: &UserKey) -> DocPath {
    DocPath::new(["users", user.as_str()])
}

/// Picks the backing store for a user: guests only ever touch the
/// process-local ephemeral tree, everyone else the durable backend.
#[derive(Clone)]
pub struct UserStores {
    durable: Arc<dyn DocumentStore>,
    ephemeral: Arc<MemoryStore>,
}

impl UserStores {
    pub fn new(durable: Arc<dyn DocumentStore>) -> Self {
        Self {
            durable,
            ephemeral: Arc::new(MemoryStore::new()),
        }
    }

    pub fn durable(&self) -> Arc<dyn DocumentStore> {
        self.durable.clone()
    }

    pub fn ephemeral(&self) -> Arc<dyn DocumentStore> {
        self.ephemeral.clone()
    }

    /// Every backing store, durable first.
    pub fn all(&self) -> Vec<Arc<dyn DocumentStore>> {
        vec![self.durable.clone(), self.ephemeral.clone()]
    }

    pub fn for_user(&self, user: &UserKey) -> Arc<dyn DocumentStore> {
        if user.is_guest() {
            self.ephemeral.clone()
        } else {
            self.durable.clone()
        }
    }
}
