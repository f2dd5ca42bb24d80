//! Zone store infrastructure.
//!
//! A **zone store** is the durable home of store-origin zones: a mapping from a
//! stable id to zone fields. The namespace writes to the store *before* it
//! touches the live entity, so the in-memory view never runs ahead of what was
//! persisted.
//!
//! This module exports three implementations:
//! - [`InMemoryZoneStore`]: no persistence, for tests and ephemeral setups.
//! - [`JsonZoneStore`]: a single JSON file.
//! - [`SqliteZoneStore`]: SQLite through an r2d2 pool (feature `sqlite_store`).
//!
//! ## Example
//! ```rust,no_run
//! use geozone::store::{JsonZoneStore, ZoneStore};
//!
//! let store = JsonZoneStore::new("zones.json");
//! for zone in store.load_all().unwrap() {
//!     println!("{:?}: {}", zone.id, zone.name);
//! }
//! ```
mod in_memory;
mod json;
#[cfg(feature = "sqlite_store")]
mod sqlite;

use std::sync::Arc;
use anyhow::Result;
use crate::engine::zone::ZoneDefinition;

pub use in_memory::InMemoryZoneStore;
pub use json::JsonZoneStore;
#[cfg(feature = "sqlite_store")]
pub use sqlite::SqliteZoneStore;

/// Version written into file-backed stores.
pub const STORAGE_VERSION: u32 = 1;

pub type ZoneStoreHandle = Arc<dyn ZoneStore>;

/// Durable mapping from store id to zone fields.
///
/// Every record handed to or returned from a store carries `Some(id)`.
/// Implementations must be `Send + Sync`; the engine calls them from its own task.
pub trait ZoneStore: Send + Sync {
    /// Returns every stored zone.
    fn load_all(&self) -> Result<Vec<ZoneDefinition>>;

    /// Inserts or replaces the record with `zone.id`.
    fn save(&self, zone: &ZoneDefinition) -> Result<()>;

    /// Deletes the record with `id`. Deleting an unknown id is not an error.
    fn remove(&self, id: &str) -> Result<()>;
}

/// Extracts the store id, rejecting records without one.
pub(crate) fn record_id(zone: &ZoneDefinition) -> Result<&str> {
    zone.id
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("zone {:?} has no store id", zone.name))
}
