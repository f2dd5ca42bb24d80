//! Live feed of occupant location states.
//!
//! Occupants (tracked persons, usually `person.*`) report a location state: the
//! object id of the zone they are in (`office`, `home`), or anything else when
//! they are outside every zone. The feed keeps the latest state per occupant and
//! broadcasts every change as an [`OccupantEvent`].
//!
//! Subscribers get a [`Subscription`] (a broadcast receiver) and drain it without
//! blocking. Dropping the receiver is the unsubscribe.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;
use crate::engine::zone::EntityId;
use crate::engine::DEFAULT_CHANNEL_CAPACITY;

/// A change in an occupant's reported location state.
#[derive(Clone, Debug, PartialEq)]
pub struct OccupantEvent {
    pub entity_id: EntityId,
    pub old_state: Option<String>,
    /// `None` when the occupant was removed from the feed
    pub new_state: Option<String>,
}

/// A handle for receiving occupant change notifications.
pub type Subscription = broadcast::Receiver<OccupantEvent>;

#[derive(Debug)]
struct FeedInner {
    states: BTreeMap<EntityId, String>,
    tx: broadcast::Sender<OccupantEvent>,
}

#[derive(Clone, Debug)]
pub struct OccupantFeed {
    inner: Arc<RwLock<FeedInner>>,
}

impl Default for OccupantFeed {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }
}

impl OccupantFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self {
            inner: Arc::new(RwLock::new(FeedInner {
                states: BTreeMap::new(),
                tx,
            })),
        }
    }

    /// Records the new state of `entity_id` and broadcasts the change. Reporting
    /// the same state again is not a change.
    pub fn set_state(&self, entity_id: EntityId, state: impl Into<String>) {
        let state = state.into();
        let mut inner = self.write();
        let old_state = inner.states.insert(entity_id.clone(), state.clone());
        if old_state.as_deref() == Some(state.as_str()) {
            return;
        }
        // send() fails only when there are no receivers, which is fine.
        let _ = inner.tx.send(OccupantEvent {
            entity_id,
            old_state,
            new_state: Some(state),
        });
    }

    /// Forgets `entity_id`, broadcasting a change with no new state.
    pub fn clear_state(&self, entity_id: &EntityId) {
        let mut inner = self.write();
        if let Some(old_state) = inner.states.remove(entity_id) {
            let _ = inner.tx.send(OccupantEvent {
                entity_id: entity_id.clone(),
                old_state: Some(old_state),
                new_state: None,
            });
        }
    }

    pub fn state(&self, entity_id: &EntityId) -> Option<String> {
        self.read().states.get(entity_id).cloned()
    }

    pub fn subscribe(&self) -> Subscription {
        self.read().tx.subscribe()
    }

    /// Copies the current states of every occupant in `domain` and subscribes in
    /// the same critical section, so no change falls between the two.
    pub fn snapshot_and_subscribe(&self, domain: &str) -> (Vec<(EntityId, String)>, Subscription) {
        let inner = self.read();
        (Self::collect_domain(&inner, domain), inner.tx.subscribe())
    }

    /// Current states of every occupant in `domain`.
    pub fn snapshot(&self, domain: &str) -> Vec<(EntityId, String)> {
        Self::collect_domain(&self.read(), domain)
    }

    fn collect_domain(inner: &FeedInner, domain: &str) -> Vec<(EntityId, String)> {
        inner
            .states
            .iter()
            .filter(|(id, _)| id.domain() == domain)
            .map(|(id, state)| (id.clone(), state.clone()))
            .collect()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, FeedInner> {
        self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, FeedInner> {
        self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> EntityId {
        EntityId::new("person", "alice")
    }

    #[test]
    fn set_state_broadcasts_old_and_new() {
        let feed = OccupantFeed::new();
        let mut rx = feed.subscribe();

        feed.set_state(alice(), "office");
        feed.set_state(alice(), "not_home");

        let first = rx.try_recv().unwrap();
        assert_eq!(first.old_state, None);
        assert_eq!(first.new_state.as_deref(), Some("office"));

        let second = rx.try_recv().unwrap();
        assert_eq!(second.old_state.as_deref(), Some("office"));
        assert_eq!(second.new_state.as_deref(), Some("not_home"));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn repeated_state_is_not_broadcast() {
        let feed = OccupantFeed::new();
        feed.set_state(alice(), "office");
        let mut rx = feed.subscribe();
        feed.set_state(alice(), "office");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn clear_state_emits_none() {
        let feed = OccupantFeed::new();
        feed.set_state(alice(), "office");
        let mut rx = feed.subscribe();

        feed.clear_state(&alice());
        let ev = rx.try_recv().unwrap();
        assert_eq!(ev.new_state, None);
        assert_eq!(feed.state(&alice()), None);

        // clearing an unknown occupant is silent
        feed.clear_state(&alice());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn snapshot_filters_by_domain() {
        let feed = OccupantFeed::new();
        feed.set_state(alice(), "office");
        feed.set_state(EntityId::new("device_tracker", "phone"), "office");

        let (states, _sub) = feed.snapshot_and_subscribe("person");
        assert_eq!(states, vec![(alice(), "office".to_string())]);
        assert_eq!(feed.snapshot("device_tracker").len(), 1);
    }
}
