//! # Feed
//! Keeps the merged events feed in [`PortalContext`] in sync with two realtime queries, one over webinars and one over
//! sessions. Whenever either side fires, the feed is rebuilt from the latest snapshot of both sides.
//!
//! Each `start()` opens its listeners under a fresh [`Generation`] token. Anything that arrives for an older token
//! (after `stop()`, or after a restart) is dropped on the floor.

use std::cell::RefCell;
use std::rc::Rc;

use beacon::data_model::{Direction, Generation, GenerationToken, Query, Snapshot};
use beacon::{DocumentStore, StoreError, Unsubscribe};

use crate::config::{SESSIONS, WEBINARS};
use crate::schedule::{ScheduledItem, Session, SessionItem, Webinar};
use crate::state::PortalContext;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Source {
    Webinars,
    Sessions,
}

impl Source {
    fn collection(self) -> &'static str {
        match self {
            Source::Webinars => WEBINARS,
            Source::Sessions => SESSIONS,
        }
    }

    fn query(self) -> Query {
        Query::collection(self.collection()).order_by("date", Direction::Descending)
    }

    fn decode(self, snapshot: &Snapshot) -> im::Vector<ScheduledItem> {
        snapshot
            .iter()
            .filter_map(|document| {
                let decoded = match self {
                    Source::Webinars => Webinar::from_document(document).map(ScheduledItem::Webinar),
                    Source::Sessions => Session::from_document(document)
                        .map(|session| ScheduledItem::Session(SessionItem::new(session))),
                };
                match decoded {
                    Ok(item) => Some(item),
                    Err(e) => {
                        log::warn!(
                            "Skipping malformed {}/{}: {e}",
                            self.collection(),
                            document.id
                        );
                        None
                    }
                }
            })
            .collect()
    }

    fn failure_message(self, error: &StoreError) -> String {
        let message = error.to_string();
        if message.is_empty() {
            format!("Failed to subscribe to {}", self.collection())
        } else {
            message
        }
    }
}

/// Latest decoded snapshot from each side, for one generation.
#[derive(Default)]
struct MergeBuffer {
    webinars: Option<im::Vector<ScheduledItem>>,
    sessions: Option<im::Vector<ScheduledItem>>,
    /// Set by the first listener error. Nothing more is published for this generation.
    halted: bool,
}

impl MergeBuffer {
    fn store(&mut self, source: Source, items: im::Vector<ScheduledItem>) {
        match source {
            Source::Webinars => self.webinars = Some(items),
            Source::Sessions => self.sessions = Some(items),
        }
    }

    /// Webinars first, then sessions. `None` until both sides have delivered.
    fn merged(&self) -> Option<im::Vector<ScheduledItem>> {
        if self.halted {
            return None;
        }
        let mut merged = self.webinars.clone()?;
        merged.append(self.sessions.clone()?);
        Some(merged)
    }
}

struct FeedListeners {
    token: GenerationToken,
    _webinars: Unsubscribe,
    _sessions: Unsubscribe,
}

type SharedListeners = Rc<RefCell<Option<FeedListeners>>>;

/// Stops the generation `token` names (or whichever is current, when `token` is `None`) and releases its listeners.
///
/// Moving the generation on is what stops a `start()` that is still opening its listeners, since those are not
/// stored yet.
fn release(listeners: &SharedListeners, generation: &Generation, token: Option<GenerationToken>) -> bool {
    if token.is_some_and(|token| !generation.is_current(token)) {
        return false;
    }
    generation.advance();
    let released = listeners.borrow_mut().take();
    // dropping the handles releases the upstream listeners
    released.is_some()
}

pub struct FeedMultiplexer {
    store: Rc<dyn DocumentStore>,
    context: PortalContext,
    generation: Generation,
    listeners: SharedListeners,
}

impl FeedMultiplexer {
    pub fn new(store: Rc<dyn DocumentStore>, context: PortalContext) -> Self {
        Self {
            store,
            context,
            generation: Generation::default(),
            listeners: Rc::new(RefCell::new(None)),
        }
    }

    /// Opens both listeners, replacing any that are already open.
    pub fn start(&self) -> SubscriptionHandle {
        release(&self.listeners, &self.generation, None);
        let token = self.generation.advance();
        log::debug!("Starting events feed ({token:?})");

        self.context.update(|state| state.begin_feed_loading(None));

        let buffer = Rc::new(RefCell::new(MergeBuffer::default()));
        let webinars = self.listen(Source::Webinars, token, &buffer);
        let sessions = self.listen(Source::Sessions, token, &buffer);

        let opened = FeedListeners {
            token,
            _webinars: webinars,
            _sessions: sessions,
        };
        if self.generation.is_current(token) {
            *self.listeners.borrow_mut() = Some(opened);
        } else {
            // a listener stopped or restarted the feed while the first snapshots were being delivered
            log::debug!("Events feed {token:?} was superseded while starting");
            drop(opened);
        }

        SubscriptionHandle {
            token,
            generation: self.generation.clone(),
            listeners: self.listeners.clone(),
        }
    }

    /// Releases both listeners. Safe to call at any time, any number of times.
    pub fn stop(&self) {
        if release(&self.listeners, &self.generation, None) {
            log::debug!("Stopped events feed");
        }
    }

    /// Stops the feed and forgets everything it delivered, as on sign-out.
    pub fn clear(&self) {
        self.stop();
        self.context.update(|state| state.clear_feed(None));
    }

    pub fn is_running(&self) -> bool {
        self.listeners.borrow().is_some()
    }

    fn listen(
        &self,
        source: Source,
        token: GenerationToken,
        buffer: &Rc<RefCell<MergeBuffer>>,
    ) -> Unsubscribe {
        let on_next = {
            let generation = self.generation.clone();
            let buffer = buffer.clone();
            let context = self.context.clone();
            move |snapshot: Snapshot| {
                if !generation.is_current(token) {
                    return;
                }
                let items = source.decode(&snapshot);
                let merged = {
                    let mut buffer = buffer.borrow_mut();
                    buffer.store(source, items);
                    buffer.merged()
                };
                if let Some(merged) = merged {
                    context.update(|state| state.set_feed_items(merged, None));
                }
            }
        };

        let on_error = {
            let generation = self.generation.clone();
            let buffer = buffer.clone();
            let context = self.context.clone();
            move |error: StoreError| {
                if !generation.is_current(token) {
                    return;
                }
                if std::mem::replace(&mut buffer.borrow_mut().halted, true) {
                    return;
                }
                log::error!("Error in {} subscription: {error}", source.collection());
                let message = source.failure_message(&error);
                context.update(|state| state.set_feed_error(message, None));
            }
        };

        self.store
            .subscribe(source.query(), Box::new(on_next), Box::new(on_error))
    }
}

impl Drop for FeedMultiplexer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Returned by [`FeedMultiplexer::start`]. Stops that particular start and nothing newer.
#[derive(Clone)]
pub struct SubscriptionHandle {
    token: GenerationToken,
    generation: Generation,
    listeners: SharedListeners,
}

impl SubscriptionHandle {
    pub fn stop(&self) {
        release(&self.listeners, &self.generation, Some(self.token));
    }

    pub fn is_active(&self) -> bool {
        self.listeners
            .borrow()
            .as_ref()
            .is_some_and(|open| open.token == self.token)
    }
}

impl std::fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("token", &self.token)
            .field("active", &self.is_active())
            .finish()
    }
}
