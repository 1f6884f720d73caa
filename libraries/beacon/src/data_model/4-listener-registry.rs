//! # ListenerRegistry
//! Listeners register once and hear about every topic; they filter for the topics they care about.
//! Notifications are collected first and run later, so callbacks never run while app state is borrowed.

use std::rc::Rc;

use crate::data_model::{DirtyState, DirtyTracker, ListenerKey};

type Listener<Topic> = Rc<dyn Fn(ListenerKey, Topic)>;

pub struct ListenerRegistry<Topic> {
    listeners: slotmap::SlotMap<slotmap::DefaultKey, Listener<Topic>>,
}

impl<Topic> Default for ListenerRegistry<Topic> {
    fn default() -> Self {
        Self {
            listeners: Default::default(),
        }
    }
}

impl<Topic: Clone + 'static> ListenerRegistry<Topic> {
    pub fn register(&mut self, listener: impl Fn(ListenerKey, Topic) + 'static) -> ListenerKey {
        let key = self.listeners.insert(Rc::new(listener));
        ListenerKey(key)
    }

    /// Unregistering an unknown or already-removed key does nothing.
    pub fn unregister(&mut self, key: ListenerKey) {
        self.listeners.remove(key.0);
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Drains the tracker's dirty state and returns one notification per listener that should hear about it.
    pub fn drain_due_notifications<State>(
        &self,
        topic: Topic,
        tracker: &mut DirtyTracker<State>,
    ) -> Vec<Box<dyn FnOnce()>> {
        let exclude_key = match tracker.take_dirty() {
            DirtyState::Clean => return Vec::new(),
            DirtyState::DirtyExcept(key) => Some(key),
            DirtyState::DirtyAll => None,
        };

        let mut notifications: Vec<Box<dyn FnOnce()>> = Vec::new();
        for (key, listener) in self.listeners.iter() {
            let listener_key = ListenerKey(key);
            if exclude_key == Some(listener_key) {
                continue;
            }
            let listener = listener.clone();
            let topic = topic.clone();
            notifications.push(Box::new(move || listener(listener_key, topic)));
        }
        notifications
    }

    /// Notifications for an event that has no backing state, such as a clock tick.
    pub fn broadcast(&self, topic: Topic) -> Vec<Box<dyn FnOnce()>> {
        self.listeners
            .iter()
            .map(|(key, listener)| {
                let listener = listener.clone();
                let topic = topic.clone();
                Box::new(move || listener(ListenerKey(key), topic)) as Box<dyn FnOnce()>
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;

    #[test]
    fn test_clean_tracker_produces_nothing() {
        let mut registry = ListenerRegistry::<&'static str>::default();
        registry.register(|_, _| {});
        let mut tracker = DirtyTracker::new(0);
        assert!(registry.drain_due_notifications("feed", &mut tracker).is_empty());
    }

    #[test]
    fn test_modifier_is_not_notified() {
        let heard = Rc::new(RefCell::new(Vec::new()));
        let mut registry = ListenerRegistry::default();

        let log = heard.clone();
        let first = registry.register(move |key, topic| log.borrow_mut().push((key, topic)));
        let log = heard.clone();
        let second = registry.register(move |key, topic| log.borrow_mut().push((key, topic)));

        let mut tracker = DirtyTracker::new(0);
        *tracker.state_mut(Some(first)) = 5;

        for notification in registry.drain_due_notifications("feed", &mut tracker) {
            notification();
        }

        assert_eq!(*heard.borrow(), vec![(second, "feed")]);
        assert!(!tracker.is_dirty());
    }

    #[test]
    fn test_unregister_twice_is_harmless() {
        let mut registry = ListenerRegistry::<u8>::default();
        let key = registry.register(|_, _| {});
        registry.unregister(key);
        registry.unregister(key);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_broadcast_reaches_everyone() {
        let count = Rc::new(RefCell::new(0));
        let mut registry = ListenerRegistry::default();
        for _ in 0..3 {
            let count = count.clone();
            registry.register(move |_, _: ()| *count.borrow_mut() += 1);
        }
        for notification in registry.broadcast(()) {
            notification();
        }
        assert_eq!(*count.borrow(), 3);
    }
}
