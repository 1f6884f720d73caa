//! # DirtyTracker
//! A DirtyTracker wraps a piece of app state and records whether it changed since listeners were last told.
//! Consumers use this to know when to re-compute derived data, without being told twice about a change they made themselves.

use std::ops::{Deref, DerefMut};

use crate::data_model::ListenerKey;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DirtyState {
    /// Not dirty, no pending notifications
    Clean,
    /// Dirty, notify all listeners except the specified one
    DirtyExcept(ListenerKey),
    /// Dirty, notify all listeners
    DirtyAll,
}

#[derive(Clone, Debug)]
pub struct DirtyTracker<State> {
    state: State,
    /// Tracks whether there are pending notifications and who should be notified
    pub dirty_state: DirtyState,
    loaded_at_least_once: bool,
}

impl<State: Default> Default for DirtyTracker<State> {
    fn default() -> Self {
        Self::new(State::default())
    }
}

/// Smart pointer that marks the state as dirty when dereferenced mutably
pub struct DirtyOnDerefMut<'a, State> {
    state: &'a mut State,
    dirty_state: &'a mut DirtyState,
    modifier: Option<ListenerKey>,
}

impl<State> Deref for DirtyOnDerefMut<'_, State> {
    type Target = State;

    fn deref(&self) -> &Self::Target {
        self.state
    }
}

impl<State> DerefMut for DirtyOnDerefMut<'_, State> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.mark_dirty();
        self.state
    }
}

impl<State> DirtyOnDerefMut<'_, State> {
    fn mark_dirty(&mut self) {
        use DirtyState::*;
        *self.dirty_state = match (&self.dirty_state, self.modifier) {
            (Clean, Some(key)) => DirtyExcept(key),
            (DirtyExcept(key1), Some(key2)) if key1 == &key2 => DirtyExcept(*key1),
            (Clean, None) => DirtyAll,
            (DirtyExcept(_), _) | (DirtyAll, _) => DirtyAll,
        };
    }
}

impl<State> DirtyTracker<State> {
    /// A fresh tracker starts clean: nobody needs to hear about the initial value.
    pub fn new(state: State) -> Self {
        Self {
            state,
            dirty_state: DirtyState::Clean,
            loaded_at_least_once: false,
        }
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn state_mut(&mut self, modifier: Option<ListenerKey>) -> DirtyOnDerefMut<'_, State> {
        DirtyOnDerefMut {
            state: &mut self.state,
            dirty_state: &mut self.dirty_state,
            modifier,
        }
    }

    /// Replaces the state wholesale and marks it dirty.
    pub fn replace(&mut self, state: State, modifier: Option<ListenerKey>) {
        *self.state_mut(modifier) = state;
    }

    /// Returns the pending dirty state and resets it to clean.
    pub fn take_dirty(&mut self) -> DirtyState {
        std::mem::replace(&mut self.dirty_state, DirtyState::Clean)
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty_state != DirtyState::Clean
    }

    /// Returns true if the `loaded` marker was changed
    pub fn mark_loaded(&mut self, modifier: Option<ListenerKey>) -> bool {
        if !self.loaded_at_least_once {
            self.loaded_at_least_once = true;
            self.state_mut(modifier).mark_dirty();
            true
        } else {
            false
        }
    }

    pub fn loaded_at_least_once(&self) -> bool {
        self.loaded_at_least_once
    }
}

#[cfg(test)]
mod tests {
    use slotmap::SlotMap;

    use super::*;

    fn keys() -> (ListenerKey, ListenerKey) {
        let mut map: SlotMap<slotmap::DefaultKey, ()> = SlotMap::new();
        (ListenerKey(map.insert(())), ListenerKey(map.insert(())))
    }

    #[test]
    fn test_starts_clean() {
        let tracker = DirtyTracker::new(1);
        assert!(!tracker.is_dirty());
        assert!(!tracker.loaded_at_least_once());
    }

    #[test]
    fn test_read_only_access_stays_clean() {
        let mut tracker = DirtyTracker::new(1);
        let value = *tracker.state_mut(None);
        assert_eq!(value, 1);
        assert!(!tracker.is_dirty());
    }

    #[test]
    fn test_same_modifier_keeps_exclusion() {
        let (a, _) = keys();
        let mut tracker = DirtyTracker::new(0);
        *tracker.state_mut(Some(a)) += 1;
        *tracker.state_mut(Some(a)) += 1;
        assert_eq!(tracker.dirty_state, DirtyState::DirtyExcept(a));
    }

    #[test]
    fn test_two_modifiers_notify_everyone() {
        let (a, b) = keys();
        let mut tracker = DirtyTracker::new(0);
        *tracker.state_mut(Some(a)) += 1;
        *tracker.state_mut(Some(b)) += 1;
        assert_eq!(tracker.dirty_state, DirtyState::DirtyAll);
        assert_eq!(tracker.take_dirty(), DirtyState::DirtyAll);
        assert!(!tracker.is_dirty());
    }

    #[test]
    fn test_mark_loaded_once() {
        let mut tracker = DirtyTracker::new(());
        assert!(tracker.mark_loaded(None));
        assert!(!tracker.mark_loaded(None));
        assert!(tracker.loaded_at_least_once());
        assert!(tracker.is_dirty());
    }
}
