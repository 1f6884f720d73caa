//! Sharing an event link: native share sheet, then clipboard, then a manual selection copy.

use chrono::NaiveDateTime;
use futures::future::LocalBoxFuture;

use crate::config::COPY_ACKNOWLEDGEMENT;
use crate::schedule::ScheduledItem;

pub const NO_LINK_MESSAGE: &str = "No session link available to share for this event.";
pub const SHARE_FAILED_MESSAGE: &str = "Could not share this event. Please try again.";

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct SharePayload {
    pub title: String,
    pub text: String,
    pub url: String,
}

impl SharePayload {
    /// `None` when the item has no link to share.
    pub fn for_item(item: &ScheduledItem) -> Option<Self> {
        let url = item.link()?;
        Some(Self {
            title: item.title(),
            text: item.summary().to_string(),
            url: url.to_string(),
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Delivery {
    /// Handed to the platform share sheet.
    Shared,
    /// The link is on the clipboard.
    Copied,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ShareError {
    #[error("not available here")]
    Unsupported,
    #[error("{0}")]
    Rejected(String),
}

pub trait ShareStrategy {
    fn name(&self) -> &'static str;

    fn attempt<'a>(
        &'a self,
        payload: &'a SharePayload,
    ) -> LocalBoxFuture<'a, Result<Delivery, ShareError>>;
}

#[derive(Clone, Debug, PartialEq, Eq, tsify::Tsify, serde::Serialize)]
#[tsify(into_wasm_abi)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum ShareOutcome {
    Shared,
    Copied,
    Failed { message: String },
}

impl ShareOutcome {
    fn failed(message: &str) -> Self {
        ShareOutcome::Failed {
            message: message.to_string(),
        }
    }
}

/// Strategies in the order they are tried. The first one to succeed wins.
pub struct ShareChain {
    strategies: Vec<Box<dyn ShareStrategy>>,
}

impl ShareChain {
    pub fn new(strategies: Vec<Box<dyn ShareStrategy>>) -> Self {
        Self { strategies }
    }

    pub async fn share(&self, item: &ScheduledItem) -> ShareOutcome {
        let Some(payload) = SharePayload::for_item(item) else {
            return ShareOutcome::failed(NO_LINK_MESSAGE);
        };

        for strategy in &self.strategies {
            match strategy.attempt(&payload).await {
                Ok(Delivery::Shared) => return ShareOutcome::Shared,
                Ok(Delivery::Copied) => return ShareOutcome::Copied,
                Err(ShareError::Unsupported) => {
                    log::debug!("{} is not available, trying the next option", strategy.name());
                }
                Err(e) => {
                    log::warn!("{} failed for {}: {e}", strategy.name(), item.id());
                }
            }
        }
        ShareOutcome::failed(SHARE_FAILED_MESSAGE)
    }
}

/// Remembers which item was just copied, so its button can say so for a moment.
#[derive(Clone, Debug, Default)]
pub struct CopyAcknowledgement {
    copied: Option<(String, NaiveDateTime)>,
}

impl CopyAcknowledgement {
    pub fn acknowledge(&mut self, item_id: &str, now: NaiveDateTime) {
        self.copied = Some((item_id.to_string(), now));
    }

    pub fn is_showing(&self, item_id: &str, now: NaiveDateTime) -> bool {
        match &self.copied {
            Some((id, since)) if id == item_id => (now - *since)
                .to_std()
                .is_ok_and(|elapsed| elapsed < COPY_ACKNOWLEDGEMENT),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use beacon::data_model::Document;
    use futures::FutureExt;
    use futures::executor::block_on;
    use serde_json::json;

    use super::*;
    use crate::schedule::{Session, SessionItem, Webinar};

    struct Scripted {
        name: &'static str,
        result: Result<Delivery, ShareError>,
        calls: Rc<Cell<usize>>,
    }

    impl ShareStrategy for Scripted {
        fn name(&self) -> &'static str {
            self.name
        }

        fn attempt<'a>(
            &'a self,
            _: &'a SharePayload,
        ) -> LocalBoxFuture<'a, Result<Delivery, ShareError>> {
            self.calls.set(self.calls.get() + 1);
            futures::future::ready(self.result.clone()).boxed_local()
        }
    }

    fn chain(
        results: Vec<Result<Delivery, ShareError>>,
    ) -> (ShareChain, Vec<Rc<Cell<usize>>>) {
        let names = ["native", "clipboard", "selection"];
        let mut counters = Vec::new();
        let strategies = results
            .into_iter()
            .zip(names)
            .map(|(result, name)| {
                let calls = Rc::new(Cell::new(0));
                counters.push(calls.clone());
                Box::new(Scripted { name, result, calls }) as Box<dyn ShareStrategy>
            })
            .collect();
        (ShareChain::new(strategies), counters)
    }

    fn counts(counters: &[Rc<Cell<usize>>]) -> Vec<usize> {
        counters.iter().map(|calls| calls.get()).collect()
    }

    fn webinar(link: &str) -> ScheduledItem {
        let document = Document::new(
            "w1",
            json!({"title": "Systems design", "description": "Caching", "date": "2024-06-01", "sessionLink": link}),
        );
        ScheduledItem::Webinar(Webinar::from_document(&document).unwrap())
    }

    fn all_tiers() -> Vec<Result<Delivery, ShareError>> {
        vec![
            Ok(Delivery::Shared),
            Ok(Delivery::Copied),
            Ok(Delivery::Copied),
        ]
    }

    #[test]
    fn test_empty_link_touches_nothing() {
        let (chain, counters) = chain(all_tiers());
        for link in ["", "   "] {
            let outcome = block_on(chain.share(&webinar(link)));
            assert_eq!(outcome, ShareOutcome::failed(NO_LINK_MESSAGE));
        }
        assert_eq!(counts(&counters), vec![0, 0, 0]);
    }

    #[test]
    fn test_native_share_short_circuits() {
        let (chain, counters) = chain(all_tiers());
        let outcome = block_on(chain.share(&webinar("https://meet.example/w1")));
        assert_eq!(outcome, ShareOutcome::Shared);
        assert_eq!(counts(&counters), vec![1, 0, 0]);
    }

    #[test]
    fn test_falls_back_to_clipboard() {
        let (chain, counters) = chain(vec![
            Err(ShareError::Unsupported),
            Ok(Delivery::Copied),
            Ok(Delivery::Copied),
        ]);
        let outcome = block_on(chain.share(&webinar("https://meet.example/w1")));
        assert_eq!(outcome, ShareOutcome::Copied);
        assert_eq!(counts(&counters), vec![1, 1, 0]);
    }

    #[test]
    fn test_selection_copy_is_last_resort() {
        let (chain, counters) = chain(vec![
            Err(ShareError::Rejected("AbortError".into())),
            Err(ShareError::Rejected("NotAllowedError".into())),
            Ok(Delivery::Copied),
        ]);
        let outcome = block_on(chain.share(&webinar("https://meet.example/w1")));
        assert_eq!(outcome, ShareOutcome::Copied);
        assert_eq!(counts(&counters), vec![1, 1, 1]);
    }

    #[test]
    fn test_every_tier_is_tried_before_failing() {
        let (chain, counters) = chain(vec![
            Err(ShareError::Unsupported),
            Err(ShareError::Rejected("denied".into())),
            Err(ShareError::Rejected("execCommand returned false".into())),
        ]);
        let outcome = block_on(chain.share(&webinar("https://meet.example/w1")));
        assert_eq!(outcome, ShareOutcome::failed(SHARE_FAILED_MESSAGE));
        assert_eq!(counts(&counters), vec![1, 1, 1]);
    }

    #[test]
    fn test_session_payload() {
        let document = Document::new(
            "s1",
            json!({
                "mentor": {"id": "m1", "name": "Grace", "expertise": "Compilers"},
                "forAllStudents": true,
                "topic": "Mock interview",
                "date": "2024-06-01",
                "time": "10:00",
                "sessionLink": "https://meet.example/s1",
            }),
        );
        let item = ScheduledItem::Session(SessionItem::new(Session::from_document(&document).unwrap()));
        assert_eq!(
            SharePayload::for_item(&item),
            Some(SharePayload {
                title: "Session with Grace".into(),
                text: "Mock interview".into(),
                url: "https://meet.example/s1".into(),
            })
        );
    }

    #[test]
    fn test_copy_acknowledgement_window() {
        let copied_at = NaiveDateTime::parse_from_str("2024-06-01 10:00:00", "%Y-%m-%d %H:%M:%S").unwrap();
        let mut acknowledgement = CopyAcknowledgement::default();
        assert!(!acknowledgement.is_showing("w1", copied_at));

        acknowledgement.acknowledge("w1", copied_at);
        assert!(acknowledgement.is_showing("w1", copied_at));
        assert!(acknowledgement.is_showing("w1", copied_at + chrono::Duration::milliseconds(1999)));
        assert!(!acknowledgement.is_showing("w1", copied_at + chrono::Duration::seconds(2)));
        assert!(!acknowledgement.is_showing("w2", copied_at));
    }
}
