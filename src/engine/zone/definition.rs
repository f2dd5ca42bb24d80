//! Zone records and the payloads used to create and edit them.
//!
//! - [`ZoneDefinition`] is the full, validated record of one zone version.
//! - [`ZoneCreate`] is what a source or a management client hands in; missing
//!   optional fields get their defaults in [`ZoneCreate::into_definition`].
//! - [`ZoneUpdate`] is a partial edit merged onto an existing definition.
//! - [`ZoneAttributes`] is the derived, published view of a definition.

use serde::{Deserialize, Serialize};
use crate::engine::errors::ValidationError;

/// Radius in meters used when a definition does not specify one.
pub const DEFAULT_RADIUS: f64 = 100.0;
pub const DEFAULT_PASSIVE: bool = false;

/// One version of a zone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneDefinition {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    /// Radius in meters
    #[serde(default = "default_radius")]
    pub radius: f64,
    /// Passive zones are skipped by active zone resolution
    #[serde(default)]
    pub passive: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    /// Stable store identifier; only set for zones backed by a [`ZoneStore`](crate::store::ZoneStore)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

fn default_radius() -> f64 {
    DEFAULT_RADIUS
}

impl ZoneDefinition {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyName);
        }
        if !self.latitude.is_finite() || !(-90.0..=90.0).contains(&self.latitude) {
            return Err(ValidationError::InvalidLatitude(self.latitude));
        }
        if !self.longitude.is_finite() || !(-180.0..=180.0).contains(&self.longitude) {
            return Err(ValidationError::InvalidLongitude(self.longitude));
        }
        if !self.radius.is_finite() || self.radius <= 0.0 {
            return Err(ValidationError::InvalidRadius(self.radius));
        }
        if let Some(icon) = &self.icon {
            if !is_valid_icon(icon) {
                return Err(ValidationError::InvalidIcon(icon.clone()));
            }
        }
        Ok(())
    }
}

/// Icons are `prefix:name`, e.g. `mdi:home`.
fn is_valid_icon(icon: &str) -> bool {
    matches!(icon.split_once(':'), Some((prefix, name)) if !prefix.is_empty() && !name.is_empty())
}

/// Fields accepted when a zone is created.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ZoneCreate {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub radius: Option<f64>,
    #[serde(default)]
    pub passive: Option<bool>,
    #[serde(default)]
    pub icon: Option<String>,
}

impl ZoneCreate {
    pub fn new(name: impl Into<String>, latitude: f64, longitude: f64) -> Self {
        Self {
            name: name.into(),
            latitude,
            longitude,
            ..Default::default()
        }
    }

    pub fn radius(mut self, radius: f64) -> Self {
        self.radius = Some(radius);
        self
    }

    pub fn passive(mut self, passive: bool) -> Self {
        self.passive = Some(passive);
        self
    }

    pub fn icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }

    /// Applies defaults and validates. The result carries no store id.
    pub fn into_definition(self) -> Result<ZoneDefinition, ValidationError> {
        let definition = ZoneDefinition {
            name: self.name,
            latitude: self.latitude,
            longitude: self.longitude,
            radius: self.radius.unwrap_or(DEFAULT_RADIUS),
            passive: self.passive.unwrap_or(DEFAULT_PASSIVE),
            icon: self.icon,
            id: None,
        };
        definition.validate()?;
        Ok(definition)
    }
}

/// Partial edit of a stored zone. `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ZoneUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub radius: Option<f64>,
    #[serde(default)]
    pub passive: Option<bool>,
    #[serde(default)]
    pub icon: Option<String>,
}

impl ZoneUpdate {
    /// Merges this edit onto `current` and validates the result. The store id is
    /// always carried over.
    pub fn apply_to(&self, current: &ZoneDefinition) -> Result<ZoneDefinition, ValidationError> {
        let merged = ZoneDefinition {
            name: self.name.clone().unwrap_or_else(|| current.name.clone()),
            latitude: self.latitude.unwrap_or(current.latitude),
            longitude: self.longitude.unwrap_or(current.longitude),
            radius: self.radius.unwrap_or(current.radius),
            passive: self.passive.unwrap_or(current.passive),
            icon: self.icon.clone().or_else(|| current.icon.clone()),
            id: current.id.clone(),
        };
        merged.validate()?;
        Ok(merged)
    }
}

/// Published attributes of a zone, regenerated from its definition.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZoneAttributes {
    pub latitude: f64,
    pub longitude: f64,
    pub radius: f64,
    pub passive: bool,
    pub editable: bool,
}

impl ZoneAttributes {
    pub fn derive(definition: &ZoneDefinition, editable: bool) -> Self {
        Self {
            latitude: definition.latitude,
            longitude: definition.longitude,
            radius: definition.radius,
            passive: definition.passive,
            editable,
        }
    }
}
