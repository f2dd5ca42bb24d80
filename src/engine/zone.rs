mod containment;
mod definition;
mod entity;
mod entity_id;
mod home;
mod id_manager;
mod membership;
mod namespace;

pub use containment::{active_zone, is_inside};
pub use definition::{ZoneAttributes, ZoneCreate, ZoneDefinition, ZoneUpdate, DEFAULT_PASSIVE, DEFAULT_RADIUS};
pub use entity::{ZoneEntity, ZoneOrigin, ZoneSnapshot, ZoneState};
pub use entity_id::{EntityId, DOMAIN, HOME_ZONE};
pub use home::{home_definition, LocationConfig, ICON_HOME};
pub use id_manager::{slugify, IdManager};
pub use membership::MembershipTracker;
pub use namespace::{ZoneNamespace, ZoneServices};
