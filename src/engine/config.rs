//! Engine configuration.
//!
//! `ZoneEngineConfig` controls the plumbing of a [`ZoneEngine`](crate::ZoneEngine):
//! how deep its channels are and which entity domain counts as an occupant.
//!
//! # Examples
//!
//! ## Use defaults
//! ```rust
//! use geozone::ZoneEngineConfig;
//! let cfg = ZoneEngineConfig::default();
//! assert_eq!(cfg.channel_capacity, 128);
//! assert_eq!(cfg.occupant_domain, "person");
//! ```
//!
//! ## Customize with the builder
//! ```rust
//! use geozone::ZoneEngineConfig;
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let cfg = ZoneEngineConfig::builder()
//!     .channel_capacity(32)
//!     .occupant_domain("device_tracker")
//!     .build()?; // returns Result<ZoneEngineConfig, ConfigError>
//! # Ok(()) }
//! ```
//!
//! # Errors
//!
//! Builder validation returns [`ConfigError`] for a zero channel capacity or an
//! occupant domain that is not a plain lowercase identifier.

use crate::engine::DEFAULT_CHANNEL_CAPACITY;

/// Domain of the entities whose location state is tracked by default.
pub const DEFAULT_OCCUPANT_DOMAIN: &str = "person";

#[derive(Debug, Clone, PartialEq)]
pub struct ZoneEngineConfig {
    /// Capacity of the command channel and of the zone event bus
    pub channel_capacity: usize,
    /// Only occupants in this domain count toward a zone's state
    pub occupant_domain: String,
}

impl Default for ZoneEngineConfig {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            occupant_domain: DEFAULT_OCCUPANT_DOMAIN.to_string(),
        }
    }
}

impl ZoneEngineConfig {
    pub fn builder() -> ZoneEngineConfigBuilder {
        ZoneEngineConfigBuilder::default()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ZoneEngineConfigBuilder {
    inner: ZoneEngineConfig,
}

impl ZoneEngineConfigBuilder {
    #[inline]
    fn map(mut self, f: impl FnOnce(&mut ZoneEngineConfig)) -> Self {
        f(&mut self.inner);
        self
    }

    pub fn channel_capacity(self, n: usize) -> Self { self.map(|c| c.channel_capacity = n) }
    pub fn occupant_domain<S: Into<String>>(self, domain: S) -> Self { self.map(|c| c.occupant_domain = domain.into()) }

    /// Apply multiple changes in one go.
    pub fn with(self, f: impl FnOnce(&mut ZoneEngineConfig)) -> Self { self.map(f) }

    /// Validate and build the final config.
    pub fn build(self) -> Result<ZoneEngineConfig, ConfigError> {
        validate(&self.inner)?;
        Ok(self.inner)
    }
}

// ---------- Validation ----------

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("channel_capacity must be at least 1")]
    ZeroCapacity,

    #[error("occupant_domain {0:?} must be a non-empty lowercase identifier")]
    InvalidDomain(String),
}

fn validate(c: &ZoneEngineConfig) -> Result<(), ConfigError> {
    if c.channel_capacity == 0 {
        return Err(ConfigError::ZeroCapacity);
    }
    let domain_ok = !c.occupant_domain.is_empty()
        && c.occupant_domain
            .chars()
            .all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '_');
    if !domain_ok {
        return Err(ConfigError::InvalidDomain(c.occupant_domain.clone()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_applies_fields() {
        let cfg = ZoneEngineConfig::builder()
            .channel_capacity(8)
            .occupant_domain("device_tracker")
            .build()
            .unwrap();
        assert_eq!(cfg.channel_capacity, 8);
        assert_eq!(cfg.occupant_domain, "device_tracker");
    }

    #[test]
    fn builder_rejects_bad_values() {
        assert_eq!(
            ZoneEngineConfig::builder().channel_capacity(0).build(),
            Err(ConfigError::ZeroCapacity)
        );
        for domain in ["", "Person", "person.alice"] {
            assert_eq!(
                ZoneEngineConfig::builder().occupant_domain(domain).build(),
                Err(ConfigError::InvalidDomain(domain.to_string()))
            );
        }
    }
}
