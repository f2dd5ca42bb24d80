use std::fmt::Display;
use serde::{Deserialize, Serialize};

/// Domain every zone entity lives in.
pub const DOMAIN: &str = "zone";

/// Object id reserved for the synthesized home zone.
pub const HOME_ZONE: &str = "home";

/// Handle of an addressable entity, formatted as `domain.object_id`.
///
/// Zones use the `zone` domain (`zone.office`); occupants use their own domain
/// (`person.alice`). Ordering is plain string ordering, which is what the active
/// zone resolution relies on for deterministic tie-breaking.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntityId(String);

impl EntityId {
    pub fn new(domain: &str, object_id: &str) -> Self {
        Self(format!("{domain}.{object_id}"))
    }

    /// Handle for an object id inside the zone domain.
    pub fn zone(object_id: &str) -> Self {
        Self::new(DOMAIN, object_id)
    }

    /// The reserved `zone.home` handle.
    pub fn home() -> Self {
        Self::zone(HOME_ZONE)
    }

    /// Parses `domain.object_id`. Both halves must be non-empty.
    pub fn parse(s: &str) -> Option<Self> {
        let (domain, object_id) = s.split_once('.')?;
        if domain.is_empty() || object_id.is_empty() {
            return None;
        }
        Some(Self(s.to_string()))
    }

    pub fn domain(&self) -> &str {
        self.split().0
    }

    /// The bare identifier after the domain prefix (`office` for `zone.office`).
    pub fn object_id(&self) -> &str {
        self.split().1
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn split(&self) -> (&str, &str) {
        // Construction guarantees a separator
        self.0.split_once('.').unwrap_or((self.0.as_str(), ""))
    }
}

impl Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for EntityId {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        EntityId::parse(&value).ok_or_else(|| format!("invalid entity id: {value:?}"))
    }
}

impl From<EntityId> for String {
    fn from(id: EntityId) -> Self {
        id.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_domain_and_object_id() {
        let id = EntityId::zone("office");
        assert_eq!(id.as_str(), "zone.office");
        assert_eq!(id.domain(), "zone");
        assert_eq!(id.object_id(), "office");
    }

    #[test]
    fn parse_rejects_missing_halves() {
        assert!(EntityId::parse("person.alice").is_some());
        assert!(EntityId::parse("alice").is_none());
        assert!(EntityId::parse(".alice").is_none());
        assert!(EntityId::parse("person.").is_none());
    }

    #[test]
    fn ordering_is_lexicographic_on_the_full_handle() {
        let mut ids = vec![EntityId::zone("beta"), EntityId::zone("alpha"), EntityId::home()];
        ids.sort();
        let names: Vec<&str> = ids.iter().map(|i| i.object_id()).collect();
        assert_eq!(names, ["alpha", "beta", "home"]);
    }

    #[test]
    fn serde_uses_the_plain_string() {
        let json = serde_json::to_string(&EntityId::zone("office")).unwrap();
        assert_eq!(json, "\"zone.office\"");
        let back: EntityId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, EntityId::zone("office"));
        assert!(serde_json::from_str::<EntityId>("\"nodot\"").is_err());
    }
}
