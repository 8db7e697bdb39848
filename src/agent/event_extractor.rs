// src/agent/event_extractor.rs
//! Best-effort detection of calendar requests in chat messages.
//!
//! Date rules are tried in a fixed order and the first hit wins:
//! relative offsets ("in 3 days"), month name and day ("march 5th"),
//! then a fuzzy pass (ISO dates, `M/D[/Y]`, "tomorrow", weekday names),
//! and finally today. Times come from "at H[:MM][am|pm]"; no time means
//! an all-day event.

use chrono::{Datelike, Duration, NaiveDate, NaiveTime, Weekday};
use regex::{Captures, Regex};
use std::ops::Range;

use super::title_summarizer::{fallback_title, trim_quotes, TitleSummarizer};
use crate::models::calendar::{NewEvent, Repeat};

pub const TRIGGERS: [&str; 4] = ["remind me", "add to calendar", "add calendar", "can you add"];

lazy_static::lazy_static! {
    static ref TRIGGER_RE: Regex =
        Regex::new(r"(?i)\b(?:remind me|add to (?:my )?calendar|add calendar|can you add)\b").expect("valid regex");
    static ref RELATIVE_RE: Regex = Regex::new(
        r"(?i)\bin\s+(\d{1,3}|an?|one|two|three|four|five|six|seven|eight|nine|ten)\s+(days?|weeks?)\b"
    ).expect("valid regex");
    static ref MONTH_DAY_RE: Regex = Regex::new(
        r"(?i)\b(january|february|march|april|may|june|july|august|september|october|november|december|jan|feb|mar|apr|jun|jul|aug|sept|sep|oct|nov|dec)\.?\s+(\d{1,2})(?:st|nd|rd|th)?\b"
    ).expect("valid regex");
    static ref ISO_DATE_RE: Regex = Regex::new(r"\b(\d{4})-(\d{1,2})-(\d{1,2})\b").expect("valid regex");
    static ref SLASH_DATE_RE: Regex =
        Regex::new(r"\b(\d{1,2})/(\d{1,2})(?:/(\d{4}|\d{2}))?\b").expect("valid regex");
    static ref DAY_WORD_RE: Regex =
        Regex::new(r"(?i)\b(day after tomorrow|tomorrow|today|tonight)\b").expect("valid regex");
    static ref WEEKDAY_RE: Regex = Regex::new(
        r"(?i)\b(?:(?:next|this|on)\s+)?(monday|tuesday|wednesday|thursday|friday|saturday|sunday)\b"
    ).expect("valid regex");
    static ref TIME_RE: Regex = Regex::new(
        r"(?i)\bat\s+(?:(noon|midnight)\b|(\d{1,2})(?::(\d{2}))?(?:\s*([ap])\.?m\b\.?)?(?:\b|$))"
    ).expect("valid regex");
}

/// Which rule produced a date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateRule {
    Relative,
    MonthDay,
    Fuzzy,
    Today,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DateMatch {
    pub date: NaiveDate,
    pub rule: DateRule,
    span: Option<Range<usize>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimeMatch {
    pub time: NaiveTime,
    span: Range<usize>,
}

/// Case-insensitive substring test against the trigger phrases.
pub fn is_calendar_request(message: &str) -> bool {
    let lowered = message.to_lowercase();
    TRIGGERS.iter().any(|t| lowered.contains(t))
}

pub fn extract_date(message: &str, today: NaiveDate) -> DateMatch {
    relative_date(message, today)
        .or_else(|| month_day_date(message, today))
        .or_else(|| fuzzy_date(message, today))
        .unwrap_or(DateMatch {
            date: today,
            rule: DateRule::Today,
            span: None,
        })
}

pub fn extract_time(message: &str) -> Option<TimeMatch> {
    time_outside(message, None)
}

/// First time phrase that does not overlap `taken` ("at 3/4" is a date, not 3 o'clock).
fn time_outside(message: &str, taken: Option<&Range<usize>>) -> Option<TimeMatch> {
    TIME_RE.captures_iter(message).find_map(|caps| {
        let span = caps.get(0)?.range();
        if taken.is_some_and(|t| span.start < t.end && t.start < span.end) {
            return None;
        }
        let time = clock_time(&caps)?;
        Some(TimeMatch { time, span })
    })
}

fn relative_date(message: &str, today: NaiveDate) -> Option<DateMatch> {
    RELATIVE_RE.captures_iter(message).find_map(|caps| {
        let amount = number_word(&caps[1])?;
        let unit = caps[2].to_lowercase();
        let days = if unit.starts_with("week") { amount * 7 } else { amount };
        let date = today.checked_add_signed(Duration::days(days))?;
        Some(DateMatch {
            date,
            rule: DateRule::Relative,
            span: caps.get(0).map(|m| m.range()),
        })
    })
}

fn month_day_date(message: &str, today: NaiveDate) -> Option<DateMatch> {
    MONTH_DAY_RE.captures_iter(message).find_map(|caps| {
        let month = month_number(&caps[1])?;
        let day: u32 = caps[2].parse().ok()?;
        let date = NaiveDate::from_ymd_opt(today.year(), month, day)?;
        Some(DateMatch {
            date,
            rule: DateRule::MonthDay,
            span: caps.get(0).map(|m| m.range()),
        })
    })
}

/// A date as written, before the missing year is filled in.
struct PartialDate {
    year: Option<i32>,
    month: u32,
    day: u32,
}

impl PartialDate {
    /// A date written without a year lands in the current year.
    fn resolve(&self, today: NaiveDate) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year.unwrap_or(today.year()), self.month, self.day)
    }
}

fn fuzzy_date(message: &str, today: NaiveDate) -> Option<DateMatch> {
    let found = |date: NaiveDate, caps: &Captures| DateMatch {
        date,
        rule: DateRule::Fuzzy,
        span: caps.get(0).map(|m| m.range()),
    };

    let iso = ISO_DATE_RE.captures_iter(message).find_map(|caps| {
        let partial = PartialDate {
            year: Some(caps[1].parse().ok()?),
            month: caps[2].parse().ok()?,
            day: caps[3].parse().ok()?,
        };
        Some(found(partial.resolve(today)?, &caps))
    });
    if iso.is_some() {
        return iso;
    }

    let slashed = SLASH_DATE_RE.captures_iter(message).find_map(|caps| {
        let year = match caps.get(3) {
            Some(y) if y.as_str().len() == 2 => Some(2000 + y.as_str().parse::<i32>().ok()?),
            Some(y) => Some(y.as_str().parse().ok()?),
            None => None,
        };
        let partial = PartialDate {
            year,
            month: caps[1].parse().ok()?,
            day: caps[2].parse().ok()?,
        };
        Some(found(partial.resolve(today)?, &caps))
    });
    if slashed.is_some() {
        return slashed;
    }

    if let Some(caps) = DAY_WORD_RE.captures(message) {
        let offset = match caps[1].to_lowercase().as_str() {
            "day after tomorrow" => 2,
            "tomorrow" => 1,
            _ => 0,
        };
        if let Some(date) = today.checked_add_signed(Duration::days(offset)) {
            return Some(found(date, &caps));
        }
    }

    let caps = WEEKDAY_RE.captures(message)?;
    let weekday = caps[1].to_lowercase().parse::<Weekday>().ok()?;
    Some(found(next_weekday(today, weekday), &caps))
}

/// Next occurrence strictly after `today`.
fn next_weekday(today: NaiveDate, weekday: Weekday) -> NaiveDate {
    let ahead = (weekday.num_days_from_monday() as i64 - today.weekday().num_days_from_monday() as i64).rem_euclid(7);
    let ahead = if ahead == 0 { 7 } else { ahead };
    today + Duration::days(ahead)
}

fn clock_time(caps: &Captures) -> Option<NaiveTime> {
    if let Some(word) = caps.get(1) {
        return match word.as_str().to_lowercase().as_str() {
            "noon" => NaiveTime::from_hms_opt(12, 0, 0),
            _ => NaiveTime::from_hms_opt(0, 0, 0),
        };
    }
    let mut hour: u32 = caps.get(2)?.as_str().parse().ok()?;
    let minute: u32 = match caps.get(3) {
        Some(m) => m.as_str().parse().ok()?,
        None => 0,
    };
    if let Some(meridiem) = caps.get(4).map(|m| m.as_str().to_ascii_lowercase()) {
        if hour == 0 || hour > 12 {
            return None;
        }
        if meridiem == "p" && hour < 12 {
            hour += 12;
        } else if meridiem == "a" && hour == 12 {
            hour = 0;
        }
    }
    NaiveTime::from_hms_opt(hour, minute, 0)
}

fn number_word(raw: &str) -> Option<i64> {
    let value = match raw.to_lowercase().as_str() {
        "a" | "an" | "one" => 1,
        "two" => 2,
        "three" => 3,
        "four" => 4,
        "five" => 5,
        "six" => 6,
        "seven" => 7,
        "eight" => 8,
        "nine" => 9,
        "ten" => 10,
        digits => digits.parse().ok()?,
    };
    Some(value)
}

fn month_number(name: &str) -> Option<u32> {
    let month = match name.get(..3)?.to_lowercase().as_str() {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    Some(month)
}

/// What is left of the message once the trigger, date and time phrases are removed.
fn residual_title(message: &str, date: &DateMatch, time: Option<&TimeMatch>) -> String {
    let mut spans: Vec<Range<usize>> = date.span.iter().cloned().collect();
    if let Some(time) = time {
        spans.push(time.span.clone());
    }
    spans.sort_by_key(|s| s.start);

    let mut text = String::with_capacity(message.len());
    let mut cursor = 0;
    for span in spans {
        if span.start > cursor {
            text.push_str(&message[cursor..span.start]);
            text.push(' ');
        }
        cursor = cursor.max(span.end);
    }
    text.push_str(&message[cursor..]);

    let text = TRIGGER_RE.replace_all(&text, " ");
    let mut words: Vec<&str> = text.split_whitespace().collect();
    while let Some(first) = words.first() {
        let word = first.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase();
        if word.is_empty() || matches!(word.as_str(), "to" | "that" | "about" | "please" | "for" | "of" | "and") {
            words.remove(0);
        } else {
            break;
        }
    }
    while let Some(last) = words.last() {
        if matches!(last.to_lowercase().as_str(), "at" | "on" | "by") {
            words.pop();
        } else {
            break;
        }
    }
    let joined = words.join(" ");
    let cleaned = trim_quotes(joined.trim_matches(|c: char| matches!(c, ',' | ':' | ';' | '.' | '!' | '?' | '-')));
    let cleaned = trim_quotes(cleaned);

    let mut chars = cleaned.chars();
    match chars.next() {
        Some(first) => fallback_title(&format!("{}{}", first.to_uppercase(), chars.as_str())),
        None => "Reminder".to_string(),
    }
}

/// Turns a triggering chat message into an event request.
#[derive(Clone)]
pub struct EventExtractor {
    summarizer: TitleSummarizer,
}

impl EventExtractor {
    pub fn new(summarizer: TitleSummarizer) -> Self {
        Self { summarizer }
    }

    /// `None` when the message is not a calendar request. Never fails otherwise:
    /// an unparseable date means today, an unparseable time means all-day, and a
    /// failed summary falls back to the message text.
    pub async fn extract(&self, message: &str, today: NaiveDate) -> Option<NewEvent> {
        if !is_calendar_request(message) {
            return None;
        }

        let date = extract_date(message, today);
        let time = time_outside(message, date.span.as_ref());
        tracing::debug!(rule = ?date.rule, date = %date.date, time = ?time.as_ref().map(|t| t.time), "calendar request detected");

        let title = match self.summarizer.summarize(message).await {
            Some(title) => title,
            None => residual_title(message, &date, time.as_ref()),
        };

        Some(NewEvent {
            title,
            description: trim_quotes(message).to_string(),
            date: date.date,
            time: time.map(|t| t.time),
            repeat: Repeat::None,
            occurrences: None,
        })
    }
}
