use std::collections::BTreeSet;
use log::{debug, warn};
use tokio::sync::broadcast::error::TryRecvError;
use crate::engine::occupant::{OccupantEvent, OccupantFeed, Subscription};
use crate::engine::zone::EntityId;

enum TrackerState {
    Uninitialized,
    Tracking(Subscription),
}

/// Keeps the set of occupants whose location state names a single zone.
///
/// The tracker is *uninitialized* until [`attach`](Self::attach) scans the feed
/// and subscribes. [`detach`](Self::detach) drops the subscription on the spot,
/// so nothing queued on it is ever processed afterwards.
pub struct MembershipTracker {
    /// Object id of the zone (`office` for `zone.office`)
    zone_object_id: String,
    /// Only occupants of this domain count
    occupant_domain: String,
    occupants: BTreeSet<EntityId>,
    state: TrackerState,
}

impl MembershipTracker {
    pub fn new(zone_object_id: impl Into<String>, occupant_domain: impl Into<String>) -> Self {
        Self {
            zone_object_id: zone_object_id.into(),
            occupant_domain: occupant_domain.into(),
            occupants: BTreeSet::new(),
            state: TrackerState::Uninitialized,
        }
    }

    pub fn is_tracking(&self) -> bool {
        matches!(self.state, TrackerState::Tracking(_))
    }

    pub fn occupants(&self) -> &BTreeSet<EntityId> {
        &self.occupants
    }

    pub fn count(&self) -> usize {
        self.occupants.len()
    }

    /// Seeds the occupant set from the feed and starts tracking.
    pub fn attach(&mut self, feed: &OccupantFeed) {
        let (states, subscription) = feed.snapshot_and_subscribe(&self.occupant_domain);
        self.occupants = self.matching(states);
        self.state = TrackerState::Tracking(subscription);
    }

    /// Stops tracking and forgets all occupants.
    pub fn detach(&mut self) {
        self.state = TrackerState::Uninitialized;
        self.occupants.clear();
    }

    /// Applies a single event. Returns `true` when the occupant count changed.
    pub fn handle_event(&mut self, event: &OccupantEvent) -> bool {
        if !self.is_tracking() || event.entity_id.domain() != self.occupant_domain {
            return false;
        }

        let before = self.occupants.len();
        if event.new_state.as_deref() == Some(self.zone_object_id.as_str()) {
            self.occupants.insert(event.entity_id.clone());
        } else {
            self.occupants.remove(&event.entity_id);
        }
        self.occupants.len() != before
    }

    /// Drains every pending event without blocking. Returns `true` when any of
    /// them changed the occupant count.
    pub fn pump(&mut self, feed: &OccupantFeed) -> bool {
        let mut changed = false;

        loop {
            let next = match &mut self.state {
                TrackerState::Uninitialized => return changed,
                TrackerState::Tracking(rx) => rx.try_recv(),
            };

            match next {
                Ok(event) => changed |= self.handle_event(&event),
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return changed,
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!(
                        "zone.{}: occupant feed lagged by {skipped} events, resynchronising",
                        self.zone_object_id
                    );
                    changed |= self.resync(feed);
                }
            }
        }
    }

    /// Rebuilds the occupant set from a fresh snapshot and replaces the lagging
    /// subscription with one taken at the same moment.
    fn resync(&mut self, feed: &OccupantFeed) -> bool {
        let before = self.occupants.len();
        self.attach(feed);
        debug!("zone.{}: resynced to {} occupants", self.zone_object_id, self.occupants.len());
        self.occupants.len() != before
    }

    fn matching(&self, states: Vec<(EntityId, String)>) -> BTreeSet<EntityId> {
        states
            .into_iter()
            .filter(|(_, state)| *state == self.zone_object_id)
            .map(|(id, _)| id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person(name: &str) -> EntityId {
        EntityId::new("person", name)
    }

    fn tracker() -> MembershipTracker {
        MembershipTracker::new("office", "person")
    }

    #[test]
    fn attach_seeds_from_current_states() {
        let feed = OccupantFeed::new();
        feed.set_state(person("alice"), "office");
        feed.set_state(person("bob"), "home");
        feed.set_state(EntityId::new("device_tracker", "phone"), "office");

        let mut t = tracker();
        assert!(!t.is_tracking());
        t.attach(&feed);

        assert!(t.is_tracking());
        assert_eq!(t.count(), 1);
        assert!(t.occupants().contains(&person("alice")));
    }

    #[test]
    fn join_and_leave_change_the_count() {
        let feed = OccupantFeed::new();
        let mut t = tracker();
        t.attach(&feed);

        feed.set_state(person("alice"), "office");
        assert!(t.pump(&feed));
        assert_eq!(t.count(), 1);

        feed.set_state(person("alice"), "not_home");
        assert!(t.pump(&feed));
        assert_eq!(t.count(), 0);
    }

    #[test]
    fn unrelated_moves_do_not_change_the_count() {
        let feed = OccupantFeed::new();
        let mut t = tracker();
        t.attach(&feed);

        feed.set_state(person("bob"), "home");
        feed.set_state(person("bob"), "gym");
        feed.set_state(EntityId::new("device_tracker", "phone"), "office");
        assert!(!t.pump(&feed));
        assert_eq!(t.count(), 0);
    }

    #[test]
    fn removed_occupant_leaves() {
        let feed = OccupantFeed::new();
        feed.set_state(person("alice"), "office");
        let mut t = tracker();
        t.attach(&feed);

        feed.clear_state(&person("alice"));
        assert!(t.pump(&feed));
        assert_eq!(t.count(), 0);
    }

    #[test]
    fn events_before_attach_are_ignored() {
        let mut t = tracker();
        let ev = OccupantEvent {
            entity_id: person("alice"),
            old_state: None,
            new_state: Some("office".into()),
        };
        assert!(!t.handle_event(&ev));
        assert_eq!(t.count(), 0);
    }

    #[test]
    fn nothing_is_delivered_after_detach() {
        let feed = OccupantFeed::new();
        let mut t = tracker();
        t.attach(&feed);

        feed.set_state(person("alice"), "office");
        t.detach();
        feed.set_state(person("bob"), "office");

        assert!(!t.pump(&feed));
        assert_eq!(t.count(), 0);
        assert!(!t.is_tracking());
    }

    #[test]
    fn lagging_subscription_resyncs_from_the_feed() {
        let feed = OccupantFeed::with_capacity(2);
        let mut t = tracker();
        t.attach(&feed);

        for name in ["a", "b", "c", "d", "e"] {
            feed.set_state(person(name), "office");
        }
        feed.set_state(person("a"), "home");

        assert!(t.pump(&feed));
        let names: Vec<&str> = t.occupants().iter().map(|p| p.object_id()).collect();
        assert_eq!(names, ["b", "c", "d", "e"]);
    }
}
