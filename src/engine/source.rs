//! Declarative zone sources.
//!
//! A [`ZoneSource`] produces the full list of statically configured zones. The
//! namespace fetches it once at startup and again on every reload; the whole
//! source-origin partition is replaced by what it returns.

use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use anyhow::{Context, Result};
use crate::engine::zone::ZoneCreate;

pub type ZoneSourceHandle = Arc<dyn ZoneSource>;

pub trait ZoneSource: Send + Sync {
    /// Returns the current raw definitions. Validation happens in the namespace.
    fn fetch(&self) -> Result<Vec<ZoneCreate>>;
}

/// Source backed by an in-process list that can be swapped out before a reload.
#[derive(Default)]
pub struct StaticZoneSource {
    zones: RwLock<Vec<ZoneCreate>>,
}

impl StaticZoneSource {
    pub fn new(zones: Vec<ZoneCreate>) -> Self {
        Self {
            zones: RwLock::new(zones),
        }
    }

    /// Replaces the configured zones. Takes effect on the next reload.
    pub fn replace(&self, zones: Vec<ZoneCreate>) {
        *self.zones.write().unwrap_or_else(|poisoned| poisoned.into_inner()) = zones;
    }
}

impl ZoneSource for StaticZoneSource {
    fn fetch(&self) -> Result<Vec<ZoneCreate>> {
        Ok(self.zones.read().unwrap_or_else(|poisoned| poisoned.into_inner()).clone())
    }
}

/// Source reading a JSON array of zones from disk on every fetch.
///
/// ```json
/// [ { "name": "Office", "latitude": 40.0, "longitude": -75.0, "radius": 50 } ]
/// ```
///
/// A missing file is an error, not an empty list, so a reload against a file
/// that was moved away keeps the current zones.
pub struct JsonFileZoneSource {
    path: PathBuf,
}

impl JsonFileZoneSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ZoneSource for JsonFileZoneSource {
    fn fetch(&self) -> Result<Vec<ZoneCreate>> {
        let contents = std::fs::read_to_string(&self.path)
            .with_context(|| format!("cannot read zone config {}", self.path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("cannot parse zone config {}", self.path.display()))
    }
}
