use std::collections::BTreeMap;
use std::sync::Mutex;
use anyhow::Result;
use crate::engine::store::{record_id, ZoneStore};
use crate::engine::zone::ZoneDefinition;

/// In‑memory zone store (no persistence).
#[derive(Default)]
pub struct InMemoryZoneStore {
    zones: Mutex<BTreeMap<String, ZoneDefinition>>,
}

impl InMemoryZoneStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-filled with `zones`, as if they had been persisted earlier.
    pub fn with_zones(zones: impl IntoIterator<Item = ZoneDefinition>) -> Result<Self> {
        let store = Self::new();
        for zone in zones {
            store.save(&zone)?;
        }
        Ok(store)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, id: &str) -> Option<ZoneDefinition> {
        self.lock().get(id).cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, ZoneDefinition>> {
        self.zones.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ZoneStore for InMemoryZoneStore {
    fn load_all(&self) -> Result<Vec<ZoneDefinition>> {
        Ok(self.lock().values().cloned().collect())
    }

    fn save(&self, zone: &ZoneDefinition) -> Result<()> {
        let id = record_id(zone)?;
        self.lock().insert(id.to_string(), zone.clone());
        Ok(())
    }

    fn remove(&self, id: &str) -> Result<()> {
        self.lock().remove(id);
        Ok(())
    }
}
