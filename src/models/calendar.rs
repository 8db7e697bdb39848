// src/models/calendar.rs
use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

pub const MAX_OCCURRENCES: u32 = 52;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Repeat {
    #[default]
    None,
    Daily,
    Weekly,
    Monthly,
}

/// Stored calendar entry. Events created together share `parent_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub date: NaiveDate,
    /// `None` for all-day events; serialized as `"HH:MM"` or `""`.
    #[serde(default, with = "clock_time")]
    pub time: Option<NaiveTime>,
    #[serde(default)]
    pub repeat: Repeat,
    pub parent_id: String,
    #[serde(default)]
    pub notified: bool,
}

impl Event {
    pub fn all_day(&self) -> bool {
        self.time.is_none()
    }
}

/// Event as requested by a user or produced by the extractor.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewEvent {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub date: NaiveDate,
    #[serde(default, with = "clock_time")]
    pub time: Option<NaiveTime>,
    #[serde(default)]
    pub repeat: Repeat,
    /// How many events a repeating request expands into. Defaults to 1.
    #[serde(default)]
    pub occurrences: Option<u32>,
}

/// API view of an event with the derived `all_day` flag.
#[derive(Debug, Serialize)]
pub struct EventResponse {
    #[serde(flatten)]
    pub event: Event,
    pub all_day: bool,
}

impl From<Event> for EventResponse {
    fn from(event: Event) -> Self {
        let all_day = event.all_day();
        EventResponse { event, all_day }
    }
}

/// `"HH:MM"` when set, `""` for all-day.
mod clock_time {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &Option<NaiveTime>, serializer: S) -> Result<S::Ok, S::Error> {
        match time {
            Some(t) => serializer.serialize_str(&t.format("%H:%M").to_string()),
            None => serializer.serialize_str(""),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<NaiveTime>, D::Error> {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        match raw.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(s) => NaiveTime::parse_from_str(s, "%H:%M")
                .map(Some)
                .map_err(serde::de::Error::custom),
        }
    }
}
