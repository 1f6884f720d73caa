//! Shared app state: who is signed in, and the merged events feed.
//!
//! All mutation goes through [`PortalContext::update`]. Listeners are run after the update returns and the borrow is
//! released, since many of them call straight back into the portal.

use std::cell::RefCell;
use std::rc::Rc;

use beacon::data_model::{DirtyTracker, ListenerKey, ListenerRegistry};

use crate::identity::SessionIdentity;
use crate::schedule::ScheduledItem;

#[derive(Clone, Copy, Debug, PartialEq, Eq, tsify::Tsify, serde::Serialize, serde::Deserialize)]
#[tsify(into_wasm_abi, from_wasm_abi)]
#[serde(rename_all = "camelCase")]
pub enum Topic {
    Identity,
    Feed,
    /// The schedule clock ticked; derived views should be recomputed.
    Clock,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct FeedSlice {
    pub items: im::Vector<ScheduledItem>,
    pub loading: bool,
    pub error: Option<String>,
}

#[derive(Default)]
pub struct PortalState {
    identity: DirtyTracker<Option<SessionIdentity>>,
    feed: DirtyTracker<FeedSlice>,
    listeners: ListenerRegistry<Topic>,
}

impl PortalState {
    pub fn identity(&self) -> Option<&SessionIdentity> {
        self.identity.state().as_ref()
    }

    /// False until the first auth callback has been resolved.
    pub fn identity_resolved(&self) -> bool {
        self.identity.loaded_at_least_once()
    }

    pub fn feed(&self) -> &FeedSlice {
        self.feed.state()
    }

    pub fn set_identity(&mut self, identity: Option<SessionIdentity>, modifier: Option<ListenerKey>) {
        self.identity.mark_loaded(modifier);
        if self.identity.state() != &identity {
            self.identity.replace(identity, modifier);
        }
    }

    pub fn begin_feed_loading(&mut self, modifier: Option<ListenerKey>) {
        let mut feed = self.feed.state_mut(modifier);
        feed.loading = true;
        feed.error = None;
    }

    pub fn set_feed_items(&mut self, items: im::Vector<ScheduledItem>, modifier: Option<ListenerKey>) {
        self.feed.mark_loaded(modifier);
        let mut feed = self.feed.state_mut(modifier);
        feed.items = items;
        feed.loading = false;
    }

    /// Keeps whatever items were last delivered so the page doesn't go blank.
    pub fn set_feed_error(&mut self, message: String, modifier: Option<ListenerKey>) {
        let mut feed = self.feed.state_mut(modifier);
        feed.error = Some(message);
        feed.loading = false;
    }

    pub fn clear_feed(&mut self, modifier: Option<ListenerKey>) {
        self.feed.replace(FeedSlice::default(), modifier);
    }

    pub fn register_listener(&mut self, listener: impl Fn(ListenerKey, Topic) + 'static) -> ListenerKey {
        self.listeners.register(listener)
    }

    pub fn unregister_listener(&mut self, key: ListenerKey) {
        self.listeners.unregister(key)
    }

    pub fn drain_due_notifications(&mut self) -> Vec<Box<dyn FnOnce()>> {
        let mut notifications = self
            .listeners
            .drain_due_notifications(Topic::Identity, &mut self.identity);
        notifications.extend(
            self.listeners
                .drain_due_notifications(Topic::Feed, &mut self.feed),
        );
        notifications
    }
}

/// Handle to the shared state. Cloning shares it.
#[derive(Clone, Default)]
pub struct PortalContext {
    state: Rc<RefCell<PortalState>>,
}

impl PortalContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read<R>(&self, f: impl FnOnce(&PortalState) -> R) -> R {
        f(&self.state.borrow())
    }

    pub fn update<R>(&self, f: impl FnOnce(&mut PortalState) -> R) -> R {
        let result = f(&mut self.state.borrow_mut());
        self.flush_notifications();
        result
    }

    pub fn identity(&self) -> Option<SessionIdentity> {
        self.read(|state| state.identity().cloned())
    }

    pub fn feed(&self) -> FeedSlice {
        self.read(|state| state.feed().clone())
    }

    pub fn subscribe(&self, listener: impl Fn(ListenerKey, Topic) + 'static) -> ListenerKey {
        self.state.borrow_mut().register_listener(listener)
    }

    pub fn unsubscribe(&self, key: ListenerKey) {
        self.state.borrow_mut().unregister_listener(key)
    }

    /// Tells every listener the clock moved on.
    pub fn tick(&self) {
        let notifications = self.state.borrow().listeners.broadcast(Topic::Clock);
        for notification in notifications {
            notification();
        }
    }

    fn flush_notifications(&self) {
        // do it like this to avoid holding the borrow while we call the callbacks
        let notifications = self.state.borrow_mut().drain_due_notifications();
        for notification in notifications {
            notification();
        }
    }
}
