//! The always-present home zone, derived from the system's own location.

use serde::{Deserialize, Serialize};
use crate::engine::zone::definition::{ZoneDefinition, DEFAULT_RADIUS};

pub const ICON_HOME: &str = "mdi:home";

/// Where the system itself lives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationConfig {
    /// Display name of the location (becomes the home zone name)
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            name: "Home".to_string(),
            latitude: 0.0,
            longitude: 0.0,
        }
    }
}

impl LocationConfig {
    pub fn new(name: impl Into<String>, latitude: f64, longitude: f64) -> Self {
        Self {
            name: name.into(),
            latitude,
            longitude,
        }
    }
}

/// Definition of the home zone for `location`: default radius, home icon, never passive.
pub fn home_definition(location: &LocationConfig) -> ZoneDefinition {
    ZoneDefinition {
        name: location.name.clone(),
        latitude: location.latitude,
        longitude: location.longitude,
        radius: DEFAULT_RADIUS,
        passive: false,
        icon: Some(ICON_HOME.to_string()),
        id: None,
    }
}
