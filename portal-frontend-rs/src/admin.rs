//! Admin screens for webinars and mentoring sessions. Every call checks the current identity first.

use std::rc::Rc;

use beacon::data_model::{Direction, Query};
use beacon::{DocumentStore, StoreError};
use serde_json::json;

use crate::access::{AccessError, ValidationError, require_admin, require_text};
use crate::config::{SESSIONS, SESSIONS_PAGE_SIZE, WEBINARS};
use crate::schedule::{
    DEFAULT_DURATION_MINUTES, MentorRef, Session, SessionStatus, StudentRef, parse_date, parse_time,
};
use crate::state::PortalContext;
use crate::utils::timestamp;

pub const MIN_SESSION_MINUTES: u32 = 15;

fn require_date(value: &str) -> Result<String, ValidationError> {
    let value = require_text("Date", value)?;
    parse_date(value)
        .map(|date| date.format("%Y-%m-%d").to_string())
        .ok_or(ValidationError::Invalid {
            field: "Date",
            message: "must look like YYYY-MM-DD",
        })
}

fn require_time(value: &str) -> Result<String, ValidationError> {
    let value = require_text("Time", value)?;
    parse_time(value)
        .map(|time| time.format("%H:%M").to_string())
        .ok_or(ValidationError::Invalid {
            field: "Time",
            message: "must look like HH:MM",
        })
}

fn optional_text(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

#[derive(Clone, Debug, Default, tsify::Tsify, serde::Deserialize)]
#[tsify(from_wasm_abi)]
#[serde(rename_all = "camelCase", default)]
pub struct WebinarDraft {
    pub title: String,
    pub description: String,
    pub presenter: String,
    pub platform: String,
    pub category: String,
    pub date: String,
    pub time: String,
    pub duration: Option<u32>,
    pub session_link: Option<String>,
}

impl WebinarDraft {
    /// The document body to write, or the first thing wrong with the form.
    pub fn to_document(&self) -> Result<serde_json::Value, ValidationError> {
        let title = require_text("Title", &self.title)?;
        let date = require_date(&self.date)?;
        let time = require_time(&self.time)?;
        Ok(json!({
            "title": title,
            "description": self.description.trim(),
            "presenter": self.presenter.trim(),
            "platform": self.platform.trim(),
            "category": self.category.trim(),
            "date": date,
            "time": time,
            "duration": self.duration.filter(|minutes| *minutes > 0).unwrap_or(DEFAULT_DURATION_MINUTES),
            "sessionLink": optional_text(&self.session_link),
        }))
    }
}

#[derive(Clone, Debug, tsify::Tsify, serde::Deserialize)]
#[tsify(from_wasm_abi)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionDraft {
    pub mentor: Option<MentorRef>,
    pub student: Option<StudentRef>,
    pub for_all_students: bool,
    pub topic: String,
    pub status: SessionStatus,
    pub notes: Option<String>,
    pub date: String,
    pub time: String,
    pub duration: u32,
    pub session_link: Option<String>,
}

impl Default for SessionDraft {
    fn default() -> Self {
        Self {
            mentor: None,
            student: None,
            for_all_students: false,
            topic: String::new(),
            status: SessionStatus::Scheduled,
            notes: None,
            date: String::new(),
            time: String::new(),
            duration: DEFAULT_DURATION_MINUTES,
            session_link: None,
        }
    }
}

impl SessionDraft {
    /// Exactly one of a named student or `forAllStudents` ends up in the document.
    pub fn to_document(&self) -> Result<serde_json::Value, ValidationError> {
        let mentor = self
            .mentor
            .as_ref()
            .filter(|mentor| !mentor.id.trim().is_empty())
            .ok_or(ValidationError::Required("Mentor"))?;
        let student = if self.for_all_students {
            None
        } else {
            let student = self
                .student
                .as_ref()
                .filter(|student| !student.id.trim().is_empty())
                .ok_or(ValidationError::Required("Student"))?;
            Some(student)
        };
        let topic = require_text("Topic", &self.topic)?;
        let date = require_date(&self.date)?;
        let time = require_time(&self.time)?;
        if self.duration < MIN_SESSION_MINUTES {
            return Err(ValidationError::Invalid {
                field: "Duration",
                message: "must be at least 15 minutes",
            });
        }

        Ok(json!({
            "mentor": mentor,
            "student": student,
            "forAllStudents": self.for_all_students,
            "topic": topic,
            "status": self.status,
            "notes": optional_text(&self.notes),
            "date": date,
            "time": time,
            "duration": self.duration,
            "sessionLink": optional_text(&self.session_link),
        }))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AdminError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Access(#[from] AccessError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Clone, Debug, PartialEq, tsify::Tsify, serde::Serialize)]
#[tsify(into_wasm_abi)]
#[serde(rename_all = "camelCase")]
pub struct SessionPage {
    pub sessions: Vec<Session>,
    /// Pass back to fetch the next page.
    pub cursor: Option<String>,
    pub has_more: bool,
}

fn stamp(mut data: serde_json::Value, created: bool) -> serde_json::Value {
    let now = timestamp();
    if let Some(fields) = data.as_object_mut() {
        if created {
            fields.insert("createdAt".to_string(), json!(now));
        }
        fields.insert("updatedAt".to_string(), json!(now));
    }
    data
}

pub struct AdminDesk {
    store: Rc<dyn DocumentStore>,
    context: PortalContext,
}

impl AdminDesk {
    pub fn new(store: Rc<dyn DocumentStore>, context: PortalContext) -> Self {
        Self { store, context }
    }

    fn check_admin(&self) -> Result<(), AccessError> {
        let identity = self.context.identity();
        require_admin(identity.as_ref()).map(|_| ())
    }

    async fn add(&self, collection: &str, data: serde_json::Value) -> Result<String, AdminError> {
        let id = self.store.add(collection, None, stamp(data, true)).await?;
        log::info!("Added {collection}/{id}");
        Ok(id)
    }

    async fn update(&self, collection: &str, id: &str, data: serde_json::Value) -> Result<(), AdminError> {
        self.store.update(collection, id, stamp(data, false)).await?;
        log::info!("Updated {collection}/{id}");
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), AdminError> {
        self.check_admin()?;
        self.store.delete(collection, id).await?;
        log::info!("Deleted {collection}/{id}");
        Ok(())
    }

    pub async fn add_webinar(&self, draft: &WebinarDraft) -> Result<String, AdminError> {
        self.check_admin()?;
        self.add(WEBINARS, draft.to_document()?).await
    }

    pub async fn update_webinar(&self, id: &str, draft: &WebinarDraft) -> Result<(), AdminError> {
        self.check_admin()?;
        self.update(WEBINARS, id, draft.to_document()?).await
    }

    pub async fn delete_webinar(&self, id: &str) -> Result<(), AdminError> {
        self.delete(WEBINARS, id).await
    }

    pub async fn add_session(&self, draft: &SessionDraft) -> Result<String, AdminError> {
        self.check_admin()?;
        self.add(SESSIONS, draft.to_document()?).await
    }

    pub async fn update_session(&self, id: &str, draft: &SessionDraft) -> Result<(), AdminError> {
        self.check_admin()?;
        self.update(SESSIONS, id, draft.to_document()?).await
    }

    pub async fn delete_session(&self, id: &str) -> Result<(), AdminError> {
        self.delete(SESSIONS, id).await
    }

    /// Newest sessions first, [`SESSIONS_PAGE_SIZE`] at a time. `after` is the previous page's cursor.
    pub async fn fetch_sessions_page(&self, after: Option<&str>) -> Result<SessionPage, AdminError> {
        self.check_admin()?;
        let mut query = Query::collection(SESSIONS)
            .order_by("date", Direction::Descending)
            .limit(SESSIONS_PAGE_SIZE);
        if let Some(after) = after {
            query = query.start_after(after);
        }

        let snapshot = self.store.query(query).await?;
        let has_more = snapshot.len() == SESSIONS_PAGE_SIZE;
        let cursor = snapshot.last().map(|document| document.id.clone());
        let sessions = snapshot
            .iter()
            .filter_map(|document| match Session::from_document(document) {
                Ok(session) => Some(session),
                Err(e) => {
                    log::warn!("Skipping malformed session {}: {e}", document.id);
                    None
                }
            })
            .collect();
        Ok(SessionPage {
            sessions,
            cursor,
            has_more,
        })
    }
}

#[cfg(test)]
mod tests {
    use beacon::memory::MemoryDocumentStore;
    use futures::executor::block_on;

    use super::*;
    use crate::identity::{Role, SessionIdentity};

    fn desk(role: Option<Role>) -> (AdminDesk, MemoryDocumentStore) {
        let store = MemoryDocumentStore::new();
        let context = PortalContext::new();
        let identity = role.map(|role| SessionIdentity {
            uid: "admin-1".into(),
            email: None,
            display_name: None,
            role,
        });
        context.update(|state| state.set_identity(identity, None));
        (AdminDesk::new(Rc::new(store.clone()), context), store)
    }

    fn webinar_draft() -> WebinarDraft {
        WebinarDraft {
            title: "Intro to Rust".into(),
            description: "Ownership".into(),
            presenter: "Ferris".into(),
            date: "2024-06-01".into(),
            time: "9:30".into(),
            session_link: Some(" ".into()),
            ..Default::default()
        }
    }

    fn session_draft() -> SessionDraft {
        SessionDraft {
            mentor: Some(MentorRef {
                id: "m1".into(),
                name: "Grace".into(),
                expertise: "Compilers".into(),
            }),
            for_all_students: true,
            topic: "Mock interview".into(),
            date: "2024-06-01".into(),
            time: "10:00".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_add_webinar_stamps_and_normalizes() {
        let (desk, store) = desk(Some(Role::Admin));
        let id = block_on(desk.add_webinar(&webinar_draft())).unwrap();

        let stored = store.document(WEBINARS, &id).unwrap();
        assert_eq!(stored["time"], "09:30");
        assert_eq!(stored["duration"], 60);
        assert!(stored["sessionLink"].is_null());
        assert!(stored["createdAt"].is_string());
        assert_eq!(stored["createdAt"], stored["updatedAt"]);
    }

    #[test]
    fn test_students_and_strangers_are_turned_away() {
        for (role, expected) in [
            (Some(Role::Student), AccessError::AdminRequired),
            (None, AccessError::SignedOut),
        ] {
            let (desk, store) = desk(role);
            let error = block_on(desk.add_webinar(&webinar_draft())).unwrap_err();
            assert!(matches!(error, AdminError::Access(ref e) if *e == expected));
            let error = block_on(desk.delete_session("s1")).unwrap_err();
            assert!(matches!(error, AdminError::Access(_)));
            assert_eq!(store.len(WEBINARS), 0);
        }
    }

    #[test]
    fn test_webinar_validation() {
        let (desk, store) = desk(Some(Role::Admin));
        let missing_title = WebinarDraft {
            title: "  ".into(),
            ..webinar_draft()
        };
        assert!(matches!(
            block_on(desk.add_webinar(&missing_title)),
            Err(AdminError::Validation(ValidationError::Required("Title")))
        ));
        let bad_time = WebinarDraft {
            time: "half past nine".into(),
            ..webinar_draft()
        };
        assert!(matches!(
            block_on(desk.add_webinar(&bad_time)),
            Err(AdminError::Validation(ValidationError::Invalid { field: "Time", .. }))
        ));
        assert_eq!(store.len(WEBINARS), 0);
    }

    #[test]
    fn test_update_and_delete_webinar() {
        let (desk, store) = desk(Some(Role::Admin));
        let id = block_on(desk.add_webinar(&webinar_draft())).unwrap();
        let created = store.document(WEBINARS, &id).unwrap()["createdAt"].clone();

        let renamed = WebinarDraft {
            title: "Advanced Rust".into(),
            ..webinar_draft()
        };
        block_on(desk.update_webinar(&id, &renamed)).unwrap();
        let stored = store.document(WEBINARS, &id).unwrap();
        assert_eq!(stored["title"], "Advanced Rust");
        assert_eq!(stored["createdAt"], created);

        block_on(desk.delete_webinar(&id)).unwrap();
        assert_eq!(store.document(WEBINARS, &id), None);
    }

    #[test]
    fn test_update_missing_webinar() {
        let (desk, _) = desk(Some(Role::Admin));
        assert!(matches!(
            block_on(desk.update_webinar("nope", &webinar_draft())),
            Err(AdminError::Store(StoreError::NotFound { .. }))
        ));
    }

    #[test]
    fn test_session_audience_is_exclusive() {
        let named = SessionDraft {
            for_all_students: true,
            student: Some(StudentRef {
                id: "u1".into(),
                name: Some("Ada".into()),
            }),
            ..session_draft()
        };
        let document = named.to_document().unwrap();
        assert!(document["student"].is_null());
        assert_eq!(document["forAllStudents"], true);

        let nobody = SessionDraft {
            for_all_students: false,
            ..session_draft()
        };
        assert_eq!(nobody.to_document(), Err(ValidationError::Required("Student")));

        let one = SessionDraft {
            for_all_students: false,
            student: Some(StudentRef {
                id: "u1".into(),
                name: Some("Ada".into()),
            }),
            ..session_draft()
        };
        let document = one.to_document().unwrap();
        assert_eq!(document["student"]["id"], "u1");
        assert_eq!(document["forAllStudents"], false);
    }

    #[test]
    fn test_session_validation() {
        let no_mentor = SessionDraft {
            mentor: None,
            ..session_draft()
        };
        assert_eq!(no_mentor.to_document(), Err(ValidationError::Required("Mentor")));

        let short = SessionDraft {
            duration: 10,
            ..session_draft()
        };
        assert!(matches!(
            short.to_document(),
            Err(ValidationError::Invalid { field: "Duration", .. })
        ));
    }

    #[test]
    fn test_added_session_reads_back() {
        let (desk, store) = desk(Some(Role::Admin));
        let id = block_on(desk.add_session(&session_draft())).unwrap();

        let stored = store.document(SESSIONS, &id).unwrap();
        assert_eq!(stored["status"], "scheduled");
        let session = Session::from_document(&beacon::data_model::Document::new(id.clone(), stored)).unwrap();
        assert_eq!(session.id, id);
        assert!(session.is_visible_to(None));
        assert_eq!(session.mentor.map(|mentor| mentor.name), Some("Grace".to_string()));

        block_on(desk.delete_session(&id)).unwrap();
        assert_eq!(store.len(SESSIONS), 0);
    }

    #[test]
    fn test_sessions_paging() {
        let (desk, store) = desk(Some(Role::Admin));
        for day in 1..=12 {
            store.insert(
                SESSIONS,
                &format!("s{day:02}"),
                json!({"forAllStudents": true, "topic": "Review", "date": format!("2024-06-{day:02}"), "time": "10:00"}),
            );
        }

        let first = block_on(desk.fetch_sessions_page(None)).unwrap();
        assert_eq!(first.sessions.len(), 10);
        assert_eq!(first.sessions[0].id, "s12");
        assert!(first.has_more);

        let second = block_on(desk.fetch_sessions_page(first.cursor.as_deref())).unwrap();
        let ids: Vec<_> = second.sessions.iter().map(|session| session.id.as_str()).collect();
        assert_eq!(ids, vec!["s02", "s01"]);
        assert!(!second.has_more);
    }
}
