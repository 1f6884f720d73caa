//! Webinars and mentoring sessions as they come out of the document store.
//!
//! Records are written by admin screens that post raw form values, so decoding is lenient: dates may be plain
//! `YYYY-MM-DD` or full ISO timestamps, durations may be numbers or numeric strings, and an unknown session
//! status reads as scheduled.

use beacon::data_model::Document;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Deserializer};

pub const DEFAULT_DURATION_MINUTES: u32 = 60;
pub const UNKNOWN_MENTOR: &str = "Unknown Mentor";

#[derive(Clone, Debug, PartialEq, tsify::Tsify, serde::Serialize, serde::Deserialize)]
#[tsify(into_wasm_abi, from_wasm_abi)]
#[serde(rename_all = "camelCase")]
pub struct Webinar {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub presenter: String,
    #[serde(default)]
    pub platform: String,
    #[serde(default)]
    pub category: String,
    #[serde(with = "calendar_date")]
    #[tsify(type = "string")]
    pub date: NaiveDate,
    #[serde(default)]
    pub time: String,
    #[serde(default, deserialize_with = "lenient_minutes")]
    pub duration: Option<u32>,
    #[serde(default)]
    pub session_link: Option<String>,
}

impl Webinar {
    pub fn from_document(document: &Document) -> Result<Self, serde_json::Error> {
        let mut webinar: Webinar = document.decode()?;
        webinar.id = document.id.clone();
        Ok(webinar)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, tsify::Tsify, serde::Serialize, serde::Deserialize)]
#[tsify(into_wasm_abi, from_wasm_abi)]
pub struct MentorRef {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub expertise: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, tsify::Tsify, serde::Serialize, serde::Deserialize)]
#[tsify(into_wasm_abi, from_wasm_abi)]
pub struct StudentRef {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, tsify::Tsify, serde::Serialize, serde::Deserialize,
)]
#[tsify(into_wasm_abi, from_wasm_abi)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    #[default]
    Scheduled,
    Completed,
    Cancelled,
    Pending,
}

impl SessionStatus {
    /// Anything unrecognised is treated as scheduled.
    pub fn from_stored(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some("completed") => Self::Completed,
            Some("cancelled") => Self::Cancelled,
            Some("pending") => Self::Pending,
            _ => Self::Scheduled,
        }
    }
}

#[derive(Clone, Debug, PartialEq, tsify::Tsify, serde::Serialize, serde::Deserialize)]
#[tsify(into_wasm_abi, from_wasm_abi)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub mentor: Option<MentorRef>,
    /// `None` together with `for_all_students` means every student.
    #[serde(default)]
    pub student: Option<StudentRef>,
    #[serde(default)]
    pub for_all_students: bool,
    #[serde(default)]
    pub topic: String,
    #[serde(default, deserialize_with = "lenient_status")]
    pub status: SessionStatus,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(with = "calendar_date")]
    #[tsify(type = "string")]
    pub date: NaiveDate,
    #[serde(default)]
    pub time: String,
    #[serde(default, deserialize_with = "lenient_minutes")]
    pub duration: Option<u32>,
    #[serde(default)]
    pub session_link: Option<String>,
}

impl Session {
    pub fn from_document(document: &Document) -> Result<Self, serde_json::Error> {
        let mut session: Session = document.decode()?;
        session.id = document.id.clone();
        Ok(session)
    }

    pub fn is_visible_to(&self, uid: Option<&str>) -> bool {
        if self.for_all_students {
            return true;
        }
        match (uid, &self.student) {
            (Some(uid), Some(student)) => student.id == uid,
            _ => false,
        }
    }
}

/// A session plus the mentor fields the UI shows, derived once per snapshot.
#[derive(Clone, Debug, PartialEq, tsify::Tsify, serde::Serialize)]
#[tsify(into_wasm_abi)]
#[serde(rename_all = "camelCase")]
pub struct SessionItem {
    #[serde(flatten)]
    pub session: Session,
    pub mentor_name: String,
    pub mentor_expertise: String,
}

impl SessionItem {
    pub fn new(session: Session) -> Self {
        let mentor = session.mentor.as_ref();
        let mentor_name = mentor
            .map(|m| m.name.trim())
            .filter(|name| !name.is_empty())
            .unwrap_or(UNKNOWN_MENTOR)
            .to_string();
        let mentor_expertise = mentor.map(|m| m.expertise.clone()).unwrap_or_default();
        Self {
            session,
            mentor_name,
            mentor_expertise,
        }
    }
}

#[derive(Clone, Debug, PartialEq, tsify::Tsify, serde::Serialize)]
#[tsify(into_wasm_abi)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ScheduledItem {
    Webinar(Webinar),
    Session(SessionItem),
}

impl ScheduledItem {
    pub fn id(&self) -> &str {
        match self {
            ScheduledItem::Webinar(webinar) => &webinar.id,
            ScheduledItem::Session(item) => &item.session.id,
        }
    }

    pub fn date(&self) -> NaiveDate {
        match self {
            ScheduledItem::Webinar(webinar) => webinar.date,
            ScheduledItem::Session(item) => item.session.date,
        }
    }

    pub fn time(&self) -> &str {
        match self {
            ScheduledItem::Webinar(webinar) => &webinar.time,
            ScheduledItem::Session(item) => &item.session.time,
        }
    }

    pub fn duration_minutes(&self) -> u32 {
        let duration = match self {
            ScheduledItem::Webinar(webinar) => webinar.duration,
            ScheduledItem::Session(item) => item.session.duration,
        };
        duration.unwrap_or(DEFAULT_DURATION_MINUTES)
    }

    /// The join/share link, if one was entered.
    pub fn link(&self) -> Option<&str> {
        let link = match self {
            ScheduledItem::Webinar(webinar) => webinar.session_link.as_deref(),
            ScheduledItem::Session(item) => item.session.session_link.as_deref(),
        };
        link.map(str::trim).filter(|link| !link.is_empty())
    }

    pub fn title(&self) -> String {
        match self {
            ScheduledItem::Webinar(webinar) => webinar.title.clone(),
            ScheduledItem::Session(item) => format!("Session with {}", item.mentor_name),
        }
    }

    pub fn summary(&self) -> &str {
        match self {
            ScheduledItem::Webinar(webinar) => &webinar.description,
            ScheduledItem::Session(item) => &item.session.topic,
        }
    }

    /// Start of the item in local time, or `None` when the stored time can't be read.
    pub fn starts_at(&self) -> Option<NaiveDateTime> {
        parse_time(self.time()).map(|time| self.date().and_time(time))
    }
}

pub fn parse_time(time: &str) -> Option<NaiveTime> {
    let time = time.trim();
    NaiveTime::parse_from_str(time, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(time, "%H:%M:%S"))
        .ok()
}

pub fn parse_date(date: &str) -> Option<NaiveDate> {
    // full timestamps carry the calendar date in their first ten characters
    let date = date.trim();
    let day = date.get(..10).unwrap_or(date);
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}

pub(crate) mod calendar_date {
    use chrono::NaiveDate;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(date: &NaiveDate, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&date.format("%Y-%m-%d").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDate, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_date(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("not a calendar date: {raw:?}")))
    }
}

fn lenient_minutes<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u32>, D::Error> {
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    let minutes = raw.and_then(|value| match value {
        serde_json::Value::Number(number) => number.as_f64(),
        serde_json::Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    });
    Ok(minutes
        .filter(|minutes| minutes.is_finite() && *minutes >= 1.0)
        .map(|minutes| minutes.min(u32::MAX as f64) as u32))
}

fn lenient_status<'de, D: Deserializer<'de>>(deserializer: D) -> Result<SessionStatus, D::Error> {
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(SessionStatus::from_stored(raw.as_deref()))
}
