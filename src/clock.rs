use chrono::{FixedOffset, Local, NaiveDate, NaiveDateTime, Utc};

/// Wall clock in the user's configured offset, or host local time.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalClock {
    offset: Option<FixedOffset>,
}

impl LocalClock {
    pub fn new(offset: Option<FixedOffset>) -> Self {
        Self { offset }
    }

    pub fn now(&self) -> NaiveDateTime {
        match self.offset {
            Some(offset) => Utc::now().with_timezone(&offset).naive_local(),
            None => Local::now().naive_local(),
        }
    }

    pub fn today(&self) -> NaiveDate {
        self.now().date()
    }

    /// Timestamp shown next to chat messages, e.g. `03:07 PM`.
    pub fn display_time(&self) -> String {
        self.now().format("%I:%M %p").to_string()
    }
}
