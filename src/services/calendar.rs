// src/services/calendar.rs
use crate::identity::UserKey;
use crate::models::calendar::{Event, NewEvent, Repeat, MAX_OCCURRENCES};
use crate::store::{DocPath, DocumentStore, StoreError};
use chrono::{Duration, Months, NaiveDate};
use serde_json::{Map, Value};
use std::sync::Arc;
use thiserror::Error;

use super::user_root;

#[derive(Error, Debug)]
pub enum CalendarError {
    #[error("event not found: {0}")]
    NotFound(String),
    #[error("invalid event: {0}")]
    Invalid(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Calendar events under `users/{key}/events/{id}`.
#[derive(Clone)]
pub struct CalendarStore {
    store: Arc<dyn DocumentStore>,
}

impl CalendarStore {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    fn events_path(user: &UserKey) -> DocPath {
        user_root(user).child("events")
    }

    /// All events ordered by date then time; all-day events sort first on their date.
    pub async fn list(&self, user: &UserKey) -> Result<Vec<Event>, StoreError> {
        let mut events = match self.store.get(&Self::events_path(user)).await? {
            Some(Value::Object(entries)) => entries
                .into_iter()
                .filter_map(|(id, value)| match serde_json::from_value::<Event>(value) {
                    Ok(event) => Some(event),
                    Err(e) => {
                        tracing::warn!(user = %user, event = %id, "skipping unreadable event: {}", e);
                        None
                    }
                })
                .collect::<Vec<_>>(),
            _ => Vec::new(),
        };
        events.sort_by(|a, b| (a.date, a.time, &a.id).cmp(&(b.date, b.time, &b.id)));
        Ok(events)
    }

    /// Stores the event, expanding repeats into linked occurrences that share a parent id.
    pub async fn add(&self, user: &UserKey, new_event: NewEvent) -> Result<Vec<Event>, CalendarError> {
        let title = new_event.title.trim();
        if title.is_empty() {
            return Err(CalendarError::Invalid("title is required".to_string()));
        }
        let occurrences = match (new_event.repeat, new_event.occurrences) {
            (Repeat::None, _) => 1,
            (_, None) => 1,
            (_, Some(n)) if (1..=MAX_OCCURRENCES).contains(&n) => n,
            (_, Some(n)) => {
                return Err(CalendarError::Invalid(format!(
                    "occurrences must be between 1 and {}, got {}",
                    MAX_OCCURRENCES, n
                )))
            }
        };

        let parent_id = uuid::Uuid::new_v4().to_string();
        let mut events = Vec::with_capacity(occurrences as usize);
        for index in 0..occurrences {
            let Some(date) = occurrence_date(new_event.date, new_event.repeat, index) else {
                break;
            };
            let id = if index == 0 { parent_id.clone() } else { uuid::Uuid::new_v4().to_string() };
            events.push(Event {
                id,
                title: title.to_string(),
                description: new_event.description.trim().to_string(),
                date,
                time: new_event.time,
                repeat: new_event.repeat,
                parent_id: parent_id.clone(),
                notified: false,
            });
        }

        let mut children = Map::new();
        for event in &events {
            children.insert(event.id.clone(), serde_json::to_value(event).map_err(StoreError::from)?);
        }
        self.store.update(&Self::events_path(user), children).await?;

        tracing::info!(user = %user, parent = %parent_id, count = events.len(), "added calendar event");
        Ok(events)
    }

    /// Deletes the event and every event linked to it through `parent_id`.
    /// Returns the ids removed.
    pub async fn delete(&self, user: &UserKey, event_id: &str) -> Result<Vec<String>, CalendarError> {
        let events = self.list(user).await?;
        let target = events
            .iter()
            .find(|e| e.id == event_id)
            .ok_or_else(|| CalendarError::NotFound(event_id.to_string()))?;

        let removed: Vec<String> = events
            .iter()
            .filter(|e| e.parent_id == target.parent_id || e.id == target.id)
            .map(|e| e.id.clone())
            .collect();

        let mut children = Map::new();
        for id in &removed {
            children.insert(id.clone(), Value::Null);
        }
        self.store.update(&Self::events_path(user), children).await?;

        tracing::info!(user = %user, event = %event_id, removed = removed.len(), "deleted calendar event");
        Ok(removed)
    }

    pub async fn mark_notified(&self, user: &UserKey, event_id: &str) -> Result<(), StoreError> {
        let mut children = Map::new();
        children.insert("notified".to_string(), Value::Bool(true));
        self.store
            .update(&Self::events_path(user).child(event_id), children)
            .await
    }
}

fn occurrence_date(start: NaiveDate, repeat: Repeat, index: u32) -> Option<NaiveDate> {
    match repeat {
        Repeat::None => (index == 0).then_some(start),
        Repeat::Daily => start.checked_add_signed(Duration::days(index as i64)),
        Repeat::Weekly => start.checked_add_signed(Duration::weeks(index as i64)),
        Repeat::Monthly => start.checked_add_months(Months::new(index)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::clean_user_key;
    use crate::store::MemoryStore;
    use chrono::NaiveTime;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn new_event(title: &str, date: NaiveDate) -> NewEvent {
        NewEvent {
            title: title.to_string(),
            description: String::new(),
            date,
            time: None,
            repeat: Repeat::None,
            occurrences: None,
        }
    }

    #[tokio::test]
    async fn test_add_and_list_sorted() {
        let calendar = CalendarStore::new(Arc::new(MemoryStore::new()));
        let user = clean_user_key("a@b.com").unwrap();

        let mut later = new_event("Later", date(2024, 6, 2));
        later.time = NaiveTime::from_hms_opt(9, 0, 0);
        calendar.add(&user, later).await.unwrap();
        calendar.add(&user, new_event("Earlier", date(2024, 6, 1))).await.unwrap();

        let events = calendar.list(&user).await.unwrap();
        let titles: Vec<&str> = events.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["Earlier", "Later"]);
        assert!(events[0].all_day());
        assert_eq!(events[0].id, events[0].parent_id);
    }

    #[tokio::test]
    async fn test_weekly_repeat_expands_and_links() {
        let calendar = CalendarStore::new(Arc::new(MemoryStore::new()));
        let user = clean_user_key("a@b.com").unwrap();
        let mut weekly = new_event("Standup", date(2024, 1, 31));
        weekly.repeat = Repeat::Weekly;
        weekly.occurrences = Some(3);

        let created = calendar.add(&user, weekly).await.unwrap();
        assert_eq!(created.len(), 3);
        assert_eq!(created[2].date, date(2024, 2, 14));
        assert!(created.iter().all(|e| e.parent_id == created[0].id));
    }

    #[test]
    fn test_monthly_repeat_clamps_short_months() {
        assert_eq!(occurrence_date(date(2024, 1, 31), Repeat::Monthly, 1), Some(date(2024, 2, 29)));
        assert_eq!(occurrence_date(date(2024, 1, 31), Repeat::None, 1), None);
    }

    #[tokio::test]
    async fn test_delete_removes_linked_events_only() {
        let calendar = CalendarStore::new(Arc::new(MemoryStore::new()));
        let user = clean_user_key("a@b.com").unwrap();
        let mut daily = new_event("Pills", date(2024, 3, 1));
        daily.repeat = Repeat::Daily;
        daily.occurrences = Some(4);
        let series = calendar.add(&user, daily).await.unwrap();
        let single = calendar.add(&user, new_event("Dentist", date(2024, 3, 2))).await.unwrap();

        let removed = calendar.delete(&user, &series[2].id).await.unwrap();
        assert_eq!(removed.len(), 4);

        let remaining = calendar.list(&user).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, single[0].id);
    }

    #[tokio::test]
    async fn test_delete_unknown_event() {
        let calendar = CalendarStore::new(Arc::new(MemoryStore::new()));
        let user = clean_user_key("a@b.com").unwrap();
        let err = calendar.delete(&user, "missing").await.unwrap_err();
        assert!(matches!(err, CalendarError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_rejects_bad_requests() {
        let calendar = CalendarStore::new(Arc::new(MemoryStore::new()));
        let user = clean_user_key("a@b.com").unwrap();
        assert!(matches!(
            calendar.add(&user, new_event("   ", date(2024, 1, 1))).await,
            Err(CalendarError::Invalid(_))
        ));
        let mut too_many = new_event("x", date(2024, 1, 1));
        too_many.repeat = Repeat::Daily;
        too_many.occurrences = Some(MAX_OCCURRENCES + 1);
        assert!(matches!(calendar.add(&user, too_many).await, Err(CalendarError::Invalid(_))));
    }

    #[tokio::test]
    async fn test_mark_notified() {
        let calendar = CalendarStore::new(Arc::new(MemoryStore::new()));
        let user = clean_user_key("a@b.com").unwrap();
        let created = calendar.add(&user, new_event("Call", date(2024, 3, 1))).await.unwrap();
        calendar.mark_notified(&user, &created[0].id).await.unwrap();
        let events = calendar.list(&user).await.unwrap();
        assert!(events[0].notified);
        assert_eq!(events[0].title, "Call");
    }
}
