//! # Projector
//! Pure functions from (feed, viewer, wall clock) to what the schedule page shows. Nothing here is cached: the page
//! re-projects on every feed change and every clock tick.

use chrono::{Duration, NaiveDateTime};

use crate::schedule::{ScheduledItem, SessionStatus};

#[derive(Clone, Copy, Debug, PartialEq, Eq, tsify::Tsify, serde::Serialize)]
#[tsify(into_wasm_abi)]
#[serde(rename_all = "camelCase")]
pub enum StatusLabel {
    Register,
    JoinNow,
    Ended,
    Cancelled,
    Completed,
    Pending,
}

impl StatusLabel {
    /// Button text.
    pub fn text(self) -> &'static str {
        match self {
            StatusLabel::Register => "Register",
            StatusLabel::JoinNow => "Join Now",
            StatusLabel::Ended => "Ended",
            StatusLabel::Cancelled => "Cancelled",
            StatusLabel::Completed => "Completed",
            StatusLabel::Pending => "Pending",
        }
    }

    fn is_upcoming(self) -> bool {
        matches!(self, StatusLabel::Register | StatusLabel::JoinNow)
    }

    fn is_past(self) -> bool {
        matches!(self, StatusLabel::Ended | StatusLabel::Completed)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, tsify::Tsify, serde::Serialize)]
#[tsify(into_wasm_abi)]
#[serde(rename_all = "camelCase")]
pub struct DerivedStatus {
    pub label: StatusLabel,
    pub disabled: bool,
    pub link: Option<String>,
}

impl DerivedStatus {
    fn inactive(label: StatusLabel) -> Self {
        Self {
            label,
            disabled: true,
            link: None,
        }
    }

    fn open(label: StatusLabel, link: Option<&str>) -> Self {
        Self {
            label,
            disabled: false,
            link: link.map(str::to_string),
        }
    }
}

pub fn status_of(item: &ScheduledItem, now: NaiveDateTime) -> DerivedStatus {
    match item {
        // webinars only look at the day, not the time
        ScheduledItem::Webinar(webinar) => {
            if webinar.date.and_time(chrono::NaiveTime::MIN) >= now {
                DerivedStatus::open(StatusLabel::Register, item.link())
            } else {
                DerivedStatus::inactive(StatusLabel::Ended)
            }
        }
        ScheduledItem::Session(session) => match session.session.status {
            SessionStatus::Cancelled => DerivedStatus::inactive(StatusLabel::Cancelled),
            SessionStatus::Completed => DerivedStatus::inactive(StatusLabel::Completed),
            SessionStatus::Pending => DerivedStatus::inactive(StatusLabel::Pending),
            SessionStatus::Scheduled => {
                let Some(start) = item.starts_at() else {
                    log::warn!("Session {} has an unreadable time {:?}", item.id(), item.time());
                    return DerivedStatus::inactive(StatusLabel::Ended);
                };
                let end = start + Duration::minutes(i64::from(item.duration_minutes()));
                if now < start {
                    DerivedStatus::open(StatusLabel::Register, item.link())
                } else if now <= end {
                    match item.link() {
                        Some(link) => DerivedStatus::open(StatusLabel::JoinNow, Some(link)),
                        None => DerivedStatus::inactive(StatusLabel::JoinNow),
                    }
                } else {
                    DerivedStatus::inactive(StatusLabel::Ended)
                }
            }
        },
    }
}

/// Whether the share button should be offered for an item right now.
pub fn can_share(item: &ScheduledItem, now: NaiveDateTime) -> bool {
    status_of(item, now).label.is_upcoming()
}

fn is_visible_to(item: &ScheduledItem, uid: Option<&str>) -> bool {
    match item {
        ScheduledItem::Webinar(_) => true,
        ScheduledItem::Session(session) => session.session.is_visible_to(uid),
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Partition {
    /// Soonest first.
    pub upcoming: Vec<ScheduledItem>,
    /// Most recent first.
    pub past: Vec<ScheduledItem>,
}

/// Splits what `uid` may see into upcoming and past. Cancelled and pending sessions are in neither.
pub fn partition<'a>(
    feed: impl IntoIterator<Item = &'a ScheduledItem>,
    uid: Option<&str>,
    now: NaiveDateTime,
) -> Partition {
    let (webinars, sessions): (Vec<&ScheduledItem>, Vec<&ScheduledItem>) = feed
        .into_iter()
        .filter(|item| is_visible_to(item, uid))
        .partition(|item| matches!(item, ScheduledItem::Webinar(_)));

    let mut split = Partition::default();
    for item in webinars.into_iter().chain(sessions) {
        let label = status_of(item, now).label;
        if label.is_upcoming() {
            split.upcoming.push(item.clone());
        } else if label.is_past() {
            split.past.push(item.clone());
        }
    }
    split.upcoming.sort_by_key(ScheduledItem::date);
    split.past.sort_by_key(|item| std::cmp::Reverse(item.date()));
    split
}

/// The headline item and the grid beneath it.
pub fn featured(upcoming: &[ScheduledItem]) -> (Option<&ScheduledItem>, &[ScheduledItem]) {
    match upcoming.split_first() {
        Some((first, rest)) => (Some(first), rest),
        None => (None, upcoming),
    }
}

#[derive(Clone, Debug, PartialEq, tsify::Tsify, serde::Serialize)]
#[tsify(into_wasm_abi)]
#[serde(rename_all = "camelCase")]
pub struct ItemView {
    pub item: ScheduledItem,
    pub title: String,
    pub status: DerivedStatus,
    pub status_text: String,
    pub can_share: bool,
}

impl ItemView {
    fn new(item: &ScheduledItem, now: NaiveDateTime) -> Self {
        let status = status_of(item, now);
        Self {
            item: item.clone(),
            title: item.title(),
            status_text: status.label.text().to_string(),
            can_share: status.label.is_upcoming(),
            status,
        }
    }
}

/// Everything the schedule page renders.
#[derive(Clone, Debug, Default, PartialEq, tsify::Tsify, serde::Serialize)]
#[tsify(into_wasm_abi)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleView {
    pub featured: Option<ItemView>,
    pub upcoming: Vec<ItemView>,
    pub past: Vec<ItemView>,
}

pub fn project(feed: &im::Vector<ScheduledItem>, uid: Option<&str>, now: NaiveDateTime) -> ScheduleView {
    let split = partition(feed, uid, now);
    let (first, rest) = featured(&split.upcoming);
    ScheduleView {
        featured: first.map(|item| ItemView::new(item, now)),
        upcoming: rest.iter().map(|item| ItemView::new(item, now)).collect(),
        past: split.past.iter().map(|item| ItemView::new(item, now)).collect(),
    }
}

#[cfg(test)]
mod tests {
    use beacon::data_model::Document;
    use chrono::NaiveDate;
    use serde_json::json;

    use super::*;
    use crate::schedule::{Session, SessionItem, Webinar};

    fn at(date: &str, time: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(&format!("{date} {time}"), "%Y-%m-%d %H:%M").unwrap()
    }

    fn webinar(id: &str, date: &str, link: &str) -> ScheduledItem {
        let document = Document::new(
            id,
            json!({"title": format!("Webinar {id}"), "date": date, "time": "10:00", "sessionLink": link}),
        );
        ScheduledItem::Webinar(Webinar::from_document(&document).unwrap())
    }

    fn session(id: &str, date: &str, time: &str, status: &str, link: &str) -> ScheduledItem {
        session_for(id, date, time, status, link, None)
    }

    fn session_for(
        id: &str,
        date: &str,
        time: &str,
        status: &str,
        link: &str,
        student: Option<&str>,
    ) -> ScheduledItem {
        let audience = match student {
            Some(uid) => json!({"student": {"id": uid, "name": "Student"}, "forAllStudents": false}),
            None => json!({"student": null, "forAllStudents": true}),
        };
        let mut data = json!({
            "mentor": {"id": "m1", "name": "Grace", "expertise": "Compilers"},
            "topic": "Resume review",
            "status": status,
            "date": date,
            "time": time,
            "duration": 90,
            "sessionLink": link,
        });
        if let (Some(data), Some(audience)) = (data.as_object_mut(), audience.as_object()) {
            data.extend(audience.clone());
        }
        let document = Document::new(id, data);
        ScheduledItem::Session(SessionItem::new(Session::from_document(&document).unwrap()))
    }

    fn ids(items: &[ScheduledItem]) -> Vec<&str> {
        items.iter().map(ScheduledItem::id).collect()
    }

    #[test]
    fn test_past_webinars_have_ended() {
        let item = webinar("w1", "2024-06-01", "https://meet.example/w1");
        for now in [
            at("2024-06-01", "00:01"),
            at("2024-06-01", "23:59"),
            at("2024-06-02", "09:00"),
            at("2030-01-01", "00:00"),
        ] {
            assert_eq!(status_of(&item, now), DerivedStatus::inactive(StatusLabel::Ended));
        }
    }

    #[test]
    fn test_future_webinar_registers_with_link() {
        let item = webinar("w1", "2024-06-02", " https://meet.example/w1 ");
        let status = status_of(&item, at("2024-06-01", "12:00"));
        assert_eq!(status.label, StatusLabel::Register);
        assert!(!status.disabled);
        assert_eq!(status.link.as_deref(), Some("https://meet.example/w1"));

        // the start of the day itself still counts
        let status = status_of(&item, at("2024-06-02", "00:00"));
        assert_eq!(status.label, StatusLabel::Register);
    }

    #[test]
    fn test_cancelled_ignores_the_clock() {
        let item = session("s1", "2024-06-01", "10:00", "cancelled", "https://meet.example/s1");
        for now in [at("2020-01-01", "00:00"), at("2024-06-01", "10:30"), at("2030-01-01", "00:00")] {
            let status = status_of(&item, now);
            assert_eq!(status.label, StatusLabel::Cancelled);
            assert!(status.disabled);
        }
    }

    #[test]
    fn test_completed_and_pending_map_directly() {
        let now = at("2020-01-01", "00:00");
        let completed = session("s1", "2024-06-01", "10:00", "completed", "");
        let pending = session("s2", "2024-06-01", "10:00", "pending", "");
        assert_eq!(status_of(&completed, now).label, StatusLabel::Completed);
        assert_eq!(status_of(&pending, now).label, StatusLabel::Pending);
    }

    #[test]
    fn test_scheduled_session_window() {
        let item = session("s1", "2024-06-01", "10:00", "scheduled", "https://meet.example/s1");
        assert_eq!(status_of(&item, at("2024-06-01", "09:59")).label, StatusLabel::Register);

        for now in [at("2024-06-01", "10:00"), at("2024-06-01", "10:45"), at("2024-06-01", "11:30")] {
            let status = status_of(&item, now);
            assert_eq!(status.label, StatusLabel::JoinNow);
            assert!(!status.disabled);
            assert_eq!(status.link.as_deref(), Some("https://meet.example/s1"));
        }

        assert_eq!(status_of(&item, at("2024-06-01", "11:31")).label, StatusLabel::Ended);
    }

    #[test]
    fn test_join_now_without_link_is_disabled() {
        let item = session("s1", "2024-06-01", "10:00", "scheduled", "   ");
        let status = status_of(&item, at("2024-06-01", "10:15"));
        assert_eq!(status.label, StatusLabel::JoinNow);
        assert!(status.disabled);
        assert_eq!(status.link, None);
    }

    #[test]
    fn test_unreadable_time_has_ended() {
        let item = session("s1", "2024-06-01", "soon", "scheduled", "https://meet.example/s1");
        assert_eq!(status_of(&item, at("2020-01-01", "00:00")).label, StatusLabel::Ended);
    }

    #[test]
    fn test_partition_covers_every_listed_status_once() {
        let now = at("2024-06-10", "12:00");
        let feed = vec![
            webinar("w-past", "2024-06-01", ""),
            webinar("w-next", "2024-06-20", ""),
            session("s-register", "2024-06-15", "10:00", "scheduled", ""),
            session("s-join", "2024-06-10", "11:30", "scheduled", "https://meet.example"),
            session("s-ended", "2024-06-09", "10:00", "scheduled", ""),
            session("s-completed", "2024-06-05", "10:00", "completed", ""),
            session("s-cancelled", "2024-06-12", "10:00", "cancelled", ""),
            session("s-pending", "2024-06-12", "10:00", "pending", ""),
        ];
        let split = partition(&feed, Some("u1"), now);

        assert_eq!(ids(&split.upcoming), vec!["s-join", "s-register", "w-next"]);
        assert_eq!(ids(&split.past), vec!["s-ended", "s-completed", "w-past"]);

        for item in &feed {
            let label = status_of(item, now).label;
            let appearances = split
                .upcoming
                .iter()
                .chain(&split.past)
                .filter(|listed| listed.id() == item.id())
                .count();
            let expected = usize::from(label.is_upcoming() || label.is_past());
            assert_eq!(appearances, expected, "{}", item.id());
        }
    }

    #[test]
    fn test_partition_sorts_are_stable() {
        let now = at("2024-06-01", "00:00");
        let feed = vec![
            session("s1", "2024-06-05", "18:00", "scheduled", ""),
            webinar("w1", "2024-06-05", ""),
            session("s2", "2024-06-05", "08:00", "scheduled", ""),
        ];
        let split = partition(&feed, None, now);
        // webinars come first, then sessions in feed order
        assert_eq!(ids(&split.upcoming), vec!["w1", "s1", "s2"]);
    }

    #[test]
    fn test_sessions_are_filtered_by_viewer() {
        let now = at("2024-06-01", "00:00");
        let feed = vec![
            session_for("mine", "2024-06-05", "10:00", "scheduled", "", Some("u1")),
            session_for("theirs", "2024-06-05", "10:00", "scheduled", "", Some("u2")),
            session_for("everyone", "2024-06-06", "10:00", "scheduled", "", None),
        ];
        assert_eq!(ids(&partition(&feed, Some("u1"), now).upcoming), vec!["mine", "everyone"]);
        assert_eq!(ids(&partition(&feed, None, now).upcoming), vec!["everyone"]);
    }

    #[test]
    fn test_featured_of_nothing() {
        let (first, rest) = featured(&[]);
        assert_eq!(first, None);
        assert!(rest.is_empty());
    }

    #[test]
    fn test_tomorrow_webinar_and_yesterday_completed_session() {
        let today = NaiveDate::from_ymd_opt(2024, 6, 10).unwrap();
        let now = today.and_hms_opt(15, 0, 0).unwrap();
        let feed = vec![
            webinar("w1", "2024-06-11", "https://meet.example/w1"),
            session("s1", "2024-06-09", "10:00", "completed", ""),
        ];

        let split = partition(&feed, Some("u1"), now);
        assert_eq!(ids(&split.upcoming), vec!["w1"]);
        assert_eq!(ids(&split.past), vec!["s1"]);
        let (first, rest) = featured(&split.upcoming);
        assert_eq!(first.map(ScheduledItem::id), Some("w1"));
        assert!(rest.is_empty());
    }

    #[test]
    fn test_can_share_only_upcoming() {
        let now = at("2024-06-10", "10:30");
        assert!(can_share(&session("s1", "2024-06-10", "10:00", "scheduled", "x"), now));
        assert!(can_share(&webinar("w1", "2024-06-11", "x"), now));
        assert!(!can_share(&webinar("w2", "2024-06-09", "x"), now));
        assert!(!can_share(&session("s2", "2024-06-10", "10:00", "cancelled", "x"), now));
    }

    #[test]
    fn test_project_builds_page() {
        let now = at("2024-06-10", "12:00");
        let feed: im::Vector<_> = vec![
            webinar("w1", "2024-06-11", "https://meet.example/w1"),
            webinar("w2", "2024-06-12", ""),
            session("s1", "2024-06-01", "10:00", "scheduled", ""),
        ]
        .into_iter()
        .collect();

        let view = project(&feed, Some("u1"), now);
        let featured = view.featured.unwrap();
        assert_eq!(featured.item.id(), "w1");
        assert_eq!(featured.status_text, "Register");
        assert!(featured.can_share);
        assert_eq!(view.upcoming.len(), 1);
        assert_eq!(view.past.len(), 1);
        assert_eq!(view.past[0].title, "Session with Grace");
        assert!(!view.past[0].can_share);
    }
}
