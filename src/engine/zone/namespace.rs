//! One namespace of live zone entities fed by two origins.
//!
//! - The **source** partition is replaced wholesale by [`ZoneNamespace::load_source`]
//!   and [`ZoneNamespace::reload`].
//! - The **store** partition is edited one record at a time through
//!   [`create`](ZoneNamespace::create), [`update`](ZoneNamespace::update) and
//!   [`remove`](ZoneNamespace::remove), always persisting before touching the
//!   live entity.
//! - The **home** zone is installed once and then only updated.
//!
//! All three share a single [`IdManager`], so a handle is never handed out
//! twice regardless of which origin asks for it.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use log::{debug, info, warn};
use tokio::sync::broadcast;
use crate::engine::events::ZoneEvent;
use crate::engine::geo::{DistanceMetric, Vincenty};
use crate::engine::occupant::OccupantFeed;
use crate::engine::source::{StaticZoneSource, ZoneSourceHandle};
use crate::engine::store::{InMemoryZoneStore, ZoneStoreHandle};
use crate::engine::zone::containment::{active_zone, is_inside};
use crate::engine::zone::definition::{ZoneCreate, ZoneDefinition, ZoneUpdate};
use crate::engine::zone::entity::{ZoneEntity, ZoneOrigin, ZoneSnapshot};
use crate::engine::zone::home::{home_definition, LocationConfig};
use crate::engine::zone::id_manager::IdManager;
use crate::engine::zone::{EntityId, HOME_ZONE};
use crate::engine::ZoneError;

/// Collaborators the namespace reads from and writes to.
#[derive(Clone)]
pub struct ZoneServices {
    /// Declarative zones (source origin)
    pub source: ZoneSourceHandle,
    /// Persisted zones (store origin)
    pub store: ZoneStoreHandle,
    /// Occupant location states
    pub feed: OccupantFeed,
    /// Distance primitive for containment checks
    pub metric: Arc<dyn DistanceMetric>,
}

impl ZoneServices {
    /// Empty static source, in-memory store, fresh feed, Vincenty distances.
    pub fn in_memory() -> Self {
        Self {
            source: Arc::new(StaticZoneSource::default()),
            store: Arc::new(InMemoryZoneStore::new()),
            feed: OccupantFeed::new(),
            metric: Arc::new(Vincenty),
        }
    }
}

pub struct ZoneNamespace {
    /// Every live zone, ordered by entity id
    entities: BTreeMap<EntityId, ZoneEntity>,
    ids: IdManager,
    services: ZoneServices,
    occupant_domain: String,
    event_tx: broadcast::Sender<ZoneEvent>,
}

impl ZoneNamespace {
    pub fn new(
        services: ZoneServices,
        occupant_domain: impl Into<String>,
        event_tx: broadcast::Sender<ZoneEvent>,
    ) -> Self {
        let mut ids = IdManager::new();
        ids.reserve(HOME_ZONE);

        Self {
            entities: BTreeMap::new(),
            ids,
            services,
            occupant_domain: occupant_domain.into(),
            event_tx,
        }
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn get(&self, entity_id: &EntityId) -> Option<&ZoneEntity> {
        self.entities.get(entity_id)
    }

    /// All zones in entity id order.
    pub fn iter(&self) -> impl Iterator<Item = &ZoneEntity> {
        self.entities.values()
    }

    pub fn list(&self) -> Vec<ZoneSnapshot> {
        self.iter().map(ZoneEntity::snapshot).collect()
    }

    /// Snapshots of the source-origin partition only.
    pub fn source_zones(&self) -> Vec<ZoneSnapshot> {
        self.iter()
            .filter(|z| matches!(z.origin(), ZoneOrigin::Source { .. }))
            .map(ZoneEntity::snapshot)
            .collect()
    }

    pub fn feed(&self) -> &OccupantFeed {
        &self.services.feed
    }

    // ****************************************
    // ** Queries

    /// The zone to report for a point, see [`active_zone`].
    pub fn active_zone(&self, latitude: f64, longitude: f64, radius: f64) -> Option<&ZoneEntity> {
        active_zone(self.iter(), latitude, longitude, radius, self.services.metric.as_ref())
    }

    /// Whether a point lies in the zone `entity_id`, see [`is_inside`].
    pub fn in_zone(
        &self,
        entity_id: &EntityId,
        latitude: f64,
        longitude: f64,
        radius: f64,
    ) -> Result<bool, ZoneError> {
        let zone = self
            .get(entity_id)
            .ok_or_else(|| ZoneError::UnknownHandle(entity_id.to_string()))?;
        Ok(is_inside(zone, latitude, longitude, radius, self.services.metric.as_ref()))
    }

    // ****************************************
    // ** Source origin

    /// Fetches the declarative zones and replaces the source partition with them.
    ///
    /// A failed fetch or an invalid definition leaves the namespace untouched.
    pub fn reload(&mut self) -> Result<usize, ZoneError> {
        let raw = self.services.source.fetch().map_err(|e| {
            warn!("zone reload aborted, source fetch failed: {e:#}");
            ZoneError::ReloadFetch(e)
        })?;
        self.load_source(raw)
    }

    /// Replaces the source partition with `raw`.
    ///
    /// Zones are matched to existing entities by the slug of their name: matches
    /// are updated in place (keeping handle and occupants), the rest are created,
    /// and source zones no longer listed are removed. Returns the new partition size.
    pub fn load_source(&mut self, raw: Vec<ZoneCreate>) -> Result<usize, ZoneError> {
        let definitions = raw
            .into_iter()
            .map(ZoneCreate::into_definition)
            .collect::<Result<Vec<_>, _>>()?;

        // Duplicate names within one load get suffixed keys, in list order.
        let key_ids = IdManager::new();
        let mut keys = BTreeSet::new();
        let mut keyed = Vec::with_capacity(definitions.len());
        for definition in definitions {
            let key = key_ids.generate(&definition.name, |k| keys.contains(k));
            keys.insert(key.clone());
            keyed.push((key, definition));
        }

        let current: BTreeMap<String, EntityId> = self
            .entities
            .values()
            .filter_map(|z| match z.origin() {
                ZoneOrigin::Source { key } => Some((key.clone(), z.entity_id().clone())),
                _ => None,
            })
            .collect();

        for (key, entity_id) in &current {
            if !keys.contains(key) {
                self.detach_and_remove(entity_id);
            }
        }

        let count = keyed.len();
        for (key, definition) in keyed {
            match current.get(&key) {
                Some(entity_id) => {
                    self.apply_to_existing(entity_id, definition);
                }
                None => {
                    let object_id = self.generate_object_id(&key);
                    self.insert(EntityId::zone(&object_id), definition, ZoneOrigin::Source { key });
                }
            }
        }

        info!("loaded {count} zones from the zone source");
        self.publish(ZoneEvent::Reloaded { zones: count });
        Ok(count)
    }

    // ****************************************
    // ** Store origin

    /// Loads every persisted zone. Records that fail validation are kept but
    /// marked unavailable; records without an id are skipped.
    pub fn restore(&mut self) -> Result<usize, ZoneError> {
        let records = self.services.store.load_all().map_err(ZoneError::Persistence)?;

        let mut restored = 0;
        for definition in records {
            let Some(id) = definition.id.clone() else {
                warn!("skipping stored zone {:?} without an id", definition.name);
                continue;
            };
            let broken = definition.validate().err();

            let object_id = self.generate_object_id(&id);
            let entity_id = EntityId::zone(&object_id);
            self.insert(entity_id.clone(), definition, ZoneOrigin::Store { id });
            if let Some(reason) = broken {
                warn!("{entity_id}: stored zone is invalid ({reason}), marking unavailable");
                self.set_available(&entity_id, false);
            }
            restored += 1;
        }

        info!("restored {restored} zones from the zone store");
        Ok(restored)
    }

    /// Creates and persists a new zone. The id is derived from the name and
    /// suffixed when it collides with any live zone or reserved id.
    pub fn create(&mut self, fields: ZoneCreate) -> Result<ZoneSnapshot, ZoneError> {
        let mut definition = fields.into_definition()?;
        let id = self.generate_object_id(&definition.name);
        definition.id = Some(id.clone());

        self.services.store.save(&definition).map_err(|e| {
            warn!("cannot persist new zone {:?}: {e:#}", definition.name);
            ZoneError::Persistence(e)
        })?;

        let entity_id = EntityId::zone(&id);
        self.insert(entity_id.clone(), definition, ZoneOrigin::Store { id });
        Ok(self.snapshot_of(&entity_id))
    }

    /// Merges `patch` into a stored zone, persists it, then applies it.
    pub fn update(&mut self, entity_id: &EntityId, patch: ZoneUpdate) -> Result<ZoneSnapshot, ZoneError> {
        let (current, _) = self.stored_entity(entity_id)?;
        let merged = patch.apply_to(current.definition())?;

        self.services.store.save(&merged).map_err(|e| {
            warn!("{entity_id}: cannot persist update: {e:#}");
            ZoneError::Persistence(e)
        })?;

        self.apply_to_existing(entity_id, merged);
        self.set_available(entity_id, true);
        Ok(self.snapshot_of(entity_id))
    }

    /// Deletes a stored zone from the store, then from the namespace.
    pub fn remove(&mut self, entity_id: &EntityId) -> Result<(), ZoneError> {
        let id = self.stored_entity(entity_id)?.1.to_string();

        self.services.store.remove(&id).map_err(|e| {
            warn!("{entity_id}: cannot delete from store: {e:#}");
            ZoneError::Persistence(e)
        })?;

        self.detach_and_remove(entity_id);
        Ok(())
    }

    // ****************************************
    // ** Home zone

    /// Installs `zone.home` for `location`, or updates it if already present.
    pub fn install_home(&mut self, location: &LocationConfig) {
        let entity_id = EntityId::home();
        if self.entities.contains_key(&entity_id) {
            self.update_home(location);
            return;
        }

        let definition = home_definition(location);
        let broken = definition.validate().err();
        self.insert(entity_id.clone(), definition, ZoneOrigin::Home);
        if let Some(reason) = broken {
            warn!("{entity_id}: location is invalid ({reason}), marking unavailable");
            self.set_available(&entity_id, false);
        }
    }

    /// Recomputes the home zone from `location`. Returns `true` when its
    /// definition changed (and an update was published).
    pub fn update_home(&mut self, location: &LocationConfig) -> bool {
        let entity_id = EntityId::home();
        if !self.entities.contains_key(&entity_id) {
            return false;
        }

        let definition = home_definition(location);
        let valid = definition.validate().is_ok();
        let changed = self.apply_to_existing(&entity_id, definition);
        self.set_available(&entity_id, valid);
        changed
    }

    // ****************************************
    // ** Occupants

    /// Drains occupant events into every zone tracker. Returns how many zones
    /// changed their occupant count.
    pub fn pump_occupants(&mut self) -> usize {
        let feed = &self.services.feed;
        let changed: Vec<_> = self
            .entities
            .values_mut()
            .filter_map(|zone| zone.pump_occupants(feed).then(|| (zone.entity_id().clone(), zone.state())))
            .collect();

        for (entity_id, state) in &changed {
            debug!("{entity_id}: occupant state is now {state:?}");
            self.publish(ZoneEvent::StateChanged {
                entity_id: entity_id.clone(),
                state: *state,
            });
        }
        changed.len()
    }

    // ****************************************
    // ** Internals

    /// First free object id for `suggestion` across the whole namespace.
    fn generate_object_id(&self, suggestion: &str) -> String {
        let entities = &self.entities;
        self.ids.generate(suggestion, |candidate| {
            entities.contains_key(&EntityId::zone(candidate))
                || entities
                    .values()
                    .any(|z| matches!(z.origin(), ZoneOrigin::Store { id } if id == candidate))
        })
    }

    /// A store-origin zone together with its store id.
    fn stored_entity(&self, entity_id: &EntityId) -> Result<(&ZoneEntity, &str), ZoneError> {
        self.entities
            .get(entity_id)
            .and_then(|z| match z.origin() {
                ZoneOrigin::Store { id } => Some((z, id.as_str())),
                _ => None,
            })
            .ok_or_else(|| ZoneError::UnknownHandle(entity_id.to_string()))
    }

    fn snapshot_of(&self, entity_id: &EntityId) -> ZoneSnapshot {
        self.entities[entity_id].snapshot()
    }

    fn insert(&mut self, entity_id: EntityId, definition: ZoneDefinition, origin: ZoneOrigin) {
        let mut zone = ZoneEntity::new(entity_id.clone(), definition, origin, &self.occupant_domain);
        zone.attach(&self.services.feed);
        debug!("{entity_id}: added ({:?})", zone.origin());
        let snapshot = zone.snapshot();
        self.entities.insert(entity_id, zone);
        self.publish(ZoneEvent::Added { zone: snapshot });
    }

    /// Applies a new definition to an existing entity, publishing only on change.
    fn apply_to_existing(&mut self, entity_id: &EntityId, definition: ZoneDefinition) -> bool {
        let Some(zone) = self.entities.get_mut(entity_id) else {
            return false;
        };
        if !zone.apply_definition(definition) {
            return false;
        }
        debug!("{entity_id}: definition updated");
        let snapshot = zone.snapshot();
        self.publish(ZoneEvent::Updated { zone: snapshot });
        true
    }

    fn set_available(&mut self, entity_id: &EntityId, available: bool) {
        let Some(zone) = self.entities.get_mut(entity_id) else {
            return;
        };
        if zone.is_available() == available {
            return;
        }
        zone.set_available(available);
        let state = zone.state();
        self.publish(ZoneEvent::StateChanged {
            entity_id: entity_id.clone(),
            state,
        });
    }

    fn detach_and_remove(&mut self, entity_id: &EntityId) {
        if let Some(mut zone) = self.entities.remove(entity_id) {
            zone.detach();
            debug!("{entity_id}: removed");
            self.publish(ZoneEvent::Removed {
                entity_id: entity_id.clone(),
            });
        }
    }

    fn publish(&self, event: ZoneEvent) {
        // send() fails only when nobody listens.
        let _ = self.event_tx.send(event);
    }
}
