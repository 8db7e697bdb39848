// src/services/reminders.rs
use crate::clock::LocalClock;
use crate::identity::UserKey;
use crate::models::calendar::Event;
use crate::store::{DocPath, DocumentStore, StoreError};
use chrono::{NaiveDateTime, NaiveTime};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use super::{CalendarStore, UserStores};

/// Background scan that flags calendar events once their start has passed.
pub struct ReminderPoller {
    stores: Vec<Arc<dyn DocumentStore>>,
    clock: LocalClock,
    interval: Duration,
}

impl ReminderPoller {
    pub fn new(stores: &UserStores, clock: LocalClock, interval: Duration) -> Self {
        Self {
            stores: stores.all(),
            clock,
            interval,
        }
    }

    pub async fn run(self) {
        tracing::info!("⏰ Starting reminder polling every {:?}", self.interval);
        loop {
            match self.poll_once().await {
                Ok(0) => tracing::debug!("Reminder poll found nothing due"),
                Ok(n) => tracing::info!("Reminder poll delivered {} reminder(s)", n),
                Err(e) => tracing::error!("❌ Reminder polling failed: {}", e),
            }
            tokio::time::sleep(self.interval).await;
        }
    }

    /// One pass over every user's events. Returns how many were marked.
    pub async fn poll_once(&self) -> Result<usize, StoreError> {
        let now = self.clock.now();
        let mut delivered = 0;

        for store in &self.stores {
            let Some(Value::Object(users)) = store.get(&DocPath::new(["users"])).await? else {
                continue;
            };
            let calendar = CalendarStore::new(store.clone());

            for (key, tree) in users {
                let Some(Value::Object(events)) = tree.get("events").cloned() else {
                    continue;
                };
                let user = UserKey::from_trusted(key);

                for (id, value) in events {
                    let event: Event = match serde_json::from_value(value) {
                        Ok(event) => event,
                        Err(e) => {
                            tracing::warn!(user = %user, event = %id, "skipping unreadable event: {}", e);
                            continue;
                        }
                    };
                    if event.notified || !is_due(&event, now) {
                        continue;
                    }

                    tracing::info!(
                        user = %user,
                        event = %event.id,
                        title = %event.title,
                        date = %event.date,
                        "reminder due"
                    );
                    if let Err(e) = calendar.mark_notified(&user, &id).await {
                        tracing::warn!(user = %user, event = %id, "could not mark reminder delivered: {}", e);
                        continue;
                    }
                    delivered += 1;
                }
            }
        }
        Ok(delivered)
    }
}

/// All-day events are due from the start of their date.
pub fn is_due(event: &Event, now: NaiveDateTime) -> bool {
    let time = event.time.unwrap_or(NaiveTime::MIN);
    event.date.and_time(time) <= now
}
