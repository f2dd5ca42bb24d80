use std::collections::BTreeSet;
use serde::{Deserialize, Serialize};
use crate::engine::occupant::OccupantFeed;
use crate::engine::zone::definition::{ZoneAttributes, ZoneDefinition};
use crate::engine::zone::membership::MembershipTracker;
use crate::engine::zone::EntityId;

/// Where a zone entity came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ZoneOrigin {
    /// Static declarative source, keyed by the slug of the zone name
    Source { key: String },
    /// Mutable store, keyed by the stable store id
    Store { id: String },
    /// The synthesized home zone
    Home,
}

impl ZoneOrigin {
    /// Only store-backed zones (and, conceptually, home) are editable.
    pub fn editable(&self) -> bool {
        !matches!(self, ZoneOrigin::Source { .. })
    }
}

/// Observable state of a zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ZoneState {
    /// The zone record is absent or broken; it never contains anything
    Unavailable,
    /// Number of occupants currently in the zone
    Occupied(usize),
}

/// A live zone: its current definition, derived attributes and occupants.
pub struct ZoneEntity {
    entity_id: EntityId,
    origin: ZoneOrigin,
    definition: ZoneDefinition,
    attributes: ZoneAttributes,
    available: bool,
    tracker: MembershipTracker,
}

impl ZoneEntity {
    pub fn new(
        entity_id: EntityId,
        definition: ZoneDefinition,
        origin: ZoneOrigin,
        occupant_domain: &str,
    ) -> Self {
        let attributes = ZoneAttributes::derive(&definition, origin.editable());
        let tracker = MembershipTracker::new(entity_id.object_id(), occupant_domain);
        Self {
            entity_id,
            origin,
            definition,
            attributes,
            available: true,
            tracker,
        }
    }

    pub fn entity_id(&self) -> &EntityId {
        &self.entity_id
    }

    pub fn origin(&self) -> &ZoneOrigin {
        &self.origin
    }

    pub fn definition(&self) -> &ZoneDefinition {
        &self.definition
    }

    pub fn attributes(&self) -> &ZoneAttributes {
        &self.attributes
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn icon(&self) -> Option<&str> {
        self.definition.icon.as_deref()
    }

    /// Store id of store-backed zones.
    pub fn unique_id(&self) -> Option<&str> {
        self.definition.id.as_deref()
    }

    pub fn editable(&self) -> bool {
        self.attributes.editable
    }

    pub fn state(&self) -> ZoneState {
        if self.available {
            ZoneState::Occupied(self.tracker.count())
        } else {
            ZoneState::Unavailable
        }
    }

    pub fn is_available(&self) -> bool {
        self.available
    }

    /// Flags the zone record as broken (or healthy again).
    pub fn set_available(&mut self, available: bool) {
        self.available = available;
    }

    pub fn occupants(&self) -> &BTreeSet<EntityId> {
        self.tracker.occupants()
    }

    /// Replaces the definition and regenerates the attributes. Returns `false`
    /// without touching anything when the new definition is identical.
    pub fn apply_definition(&mut self, definition: ZoneDefinition) -> bool {
        if self.definition == definition {
            return false;
        }
        self.attributes = ZoneAttributes::derive(&definition, self.origin.editable());
        self.definition = definition;
        true
    }

    pub(crate) fn attach(&mut self, feed: &OccupantFeed) {
        self.tracker.attach(feed);
    }

    pub(crate) fn detach(&mut self) {
        self.tracker.detach();
    }

    /// Drains pending occupant events. Returns `true` when the count changed.
    pub(crate) fn pump_occupants(&mut self, feed: &OccupantFeed) -> bool {
        self.tracker.pump(feed)
    }

    pub fn snapshot(&self) -> ZoneSnapshot {
        ZoneSnapshot {
            entity_id: self.entity_id.clone(),
            name: self.definition.name.clone(),
            icon: self.definition.icon.clone(),
            unique_id: self.definition.id.clone(),
            state: self.state(),
            attributes: self.attributes,
            occupants: self.occupants().iter().cloned().collect(),
        }
    }
}

/// Owned, point-in-time view of a zone handed out to consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneSnapshot {
    pub entity_id: EntityId,
    pub name: String,
    pub icon: Option<String>,
    pub unique_id: Option<String>,
    pub state: ZoneState,
    pub attributes: ZoneAttributes,
    pub occupants: Vec<EntityId>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::zone::definition::ZoneCreate;

    fn definition(radius: f64) -> ZoneDefinition {
        ZoneCreate::new("Office", 40.0, -75.0).radius(radius).into_definition().unwrap()
    }

    fn entity(origin: ZoneOrigin) -> ZoneEntity {
        ZoneEntity::new(EntityId::zone("office"), definition(50.0), origin, "person")
    }

    #[test]
    fn editable_follows_origin() {
        assert!(!entity(ZoneOrigin::Source { key: "office".into() }).editable());
        assert!(entity(ZoneOrigin::Store { id: "office".into() }).editable());
        assert!(entity(ZoneOrigin::Home).attributes().editable);
    }

    #[test]
    fn identical_definition_is_a_no_op() {
        let mut zone = entity(ZoneOrigin::Store { id: "office".into() });
        assert!(!zone.apply_definition(definition(50.0)));
    }

    #[test]
    fn changed_definition_regenerates_attributes() {
        let mut zone = entity(ZoneOrigin::Source { key: "office".into() });
        assert!(zone.apply_definition(definition(80.0)));
        assert_eq!(zone.attributes().radius, 80.0);
        assert!(!zone.attributes().editable);
    }

    #[test]
    fn definition_changes_keep_occupants() {
        let feed = OccupantFeed::new();
        feed.set_state(EntityId::new("person", "alice"), "office");

        let mut zone = entity(ZoneOrigin::Store { id: "office".into() });
        zone.attach(&feed);
        assert_eq!(zone.state(), ZoneState::Occupied(1));

        zone.apply_definition(definition(10.0));
        assert_eq!(zone.state(), ZoneState::Occupied(1));
    }

    #[test]
    fn unavailable_overrides_the_count() {
        let mut zone = entity(ZoneOrigin::Home);
        zone.set_available(false);
        assert_eq!(zone.state(), ZoneState::Unavailable);
        assert_eq!(zone.snapshot().state, ZoneState::Unavailable);
    }
}
