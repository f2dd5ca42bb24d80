//! Point-in-zone checks and active zone resolution.
//!
//! Both functions are pure: they read zone entities and call the distance
//! metric, nothing else. An undefined distance means "not inside".

use log::debug;
use crate::engine::geo::DistanceMetric;
use crate::engine::zone::entity::{ZoneEntity, ZoneState};

/// Is (`latitude`, `longitude`) inside `zone`, given an extra accuracy radius
/// around the point?
///
/// The boundary is exclusive: a point whose distance minus `radius` equals the
/// zone radius is outside. Passive zones are checked like any other.
pub fn is_inside(
    zone: &ZoneEntity,
    latitude: f64,
    longitude: f64,
    radius: f64,
    metric: &dyn DistanceMetric,
) -> bool {
    if zone.state() == ZoneState::Unavailable {
        return false;
    }

    let attrs = zone.attributes();
    let Some(zone_dist) = metric.distance(latitude, longitude, attrs.latitude, attrs.longitude) else {
        return false;
    };
    if !attrs.radius.is_finite() {
        return false;
    }

    zone_dist - radius < attrs.radius
}

/// Finds the zone that should be reported for a point.
///
/// Passive and unavailable zones are ignored. Among the zones containing the
/// point, the closest center wins; on equal distance the smaller radius wins;
/// on a full tie the lowest entity id wins. Zones are visited in entity id order
/// regardless of the order they are passed in.
pub fn active_zone<'a>(
    zones: impl IntoIterator<Item = &'a ZoneEntity>,
    latitude: f64,
    longitude: f64,
    radius: f64,
    metric: &dyn DistanceMetric,
) -> Option<&'a ZoneEntity> {
    let mut candidates: Vec<&ZoneEntity> = zones
        .into_iter()
        .filter(|z| z.state() != ZoneState::Unavailable && !z.attributes().passive)
        .collect();
    candidates.sort_by(|a, b| a.entity_id().cmp(b.entity_id()));

    let mut closest: Option<(&ZoneEntity, f64)> = None;

    for zone in candidates {
        let attrs = zone.attributes();
        let Some(zone_dist) = metric.distance(latitude, longitude, attrs.latitude, attrs.longitude) else {
            debug!("{}: distance to ({latitude}, {longitude}) is undefined, skipping", zone.entity_id());
            continue;
        };

        let within_zone = zone_dist - radius < attrs.radius;
        let better = match closest {
            None => true,
            Some((best, min_dist)) => {
                zone_dist < min_dist
                    || (zone_dist == min_dist && attrs.radius < best.attributes().radius)
            }
        };

        if within_zone && better {
            closest = Some((zone, zone_dist));
        }
    }

    closest.map(|(zone, _)| zone)
}
