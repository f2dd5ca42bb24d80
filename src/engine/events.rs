//! Engine event types and commands.
//!
//! - [`ZoneEvent`]: what the engine publishes when zones appear, change, or go away.
//! - [`ZoneCommand`]: what a [`ZoneEngineHandle`](crate::ZoneEngineHandle) sends to
//!   the engine task. Every command carries a `oneshot` responder.

use tokio::sync::oneshot;
use crate::engine::zone::{EntityId, ZoneCreate, ZoneSnapshot, ZoneState, ZoneUpdate};
use crate::engine::ZoneError;

/// Republish notifications for zone entities.
#[derive(Debug, Clone, PartialEq)]
pub enum ZoneEvent {
    /// A zone entity became addressable
    Added { zone: ZoneSnapshot },
    /// A zone definition changed; attributes were regenerated
    Updated { zone: ZoneSnapshot },
    /// The occupant count (or availability) of a zone changed
    StateChanged { entity_id: EntityId, state: ZoneState },
    /// A zone entity was removed and its tracker detached
    Removed { entity_id: EntityId },
    /// The source-origin partition was replaced; `zones` is its new size
    Reloaded { zones: usize },
}

type Reply<T> = oneshot::Sender<Result<T, ZoneError>>;

#[derive(Debug)]
pub enum ZoneCommand {
    // ****************************************
    // ** Store-origin CRUD
    /// Create a new stored zone
    Create { fields: ZoneCreate, reply: Reply<ZoneSnapshot> },
    /// Merge partial fields into a stored zone
    Update { entity_id: EntityId, patch: ZoneUpdate, reply: Reply<ZoneSnapshot> },
    /// Delete a stored zone
    Remove { entity_id: EntityId, reply: Reply<()> },

    // ****************************************
    // ** Reads
    /// Snapshot of every zone, all origins
    List { reply: Reply<Vec<ZoneSnapshot>> },
    /// Snapshot of one zone
    Get { entity_id: EntityId, reply: Reply<Option<ZoneSnapshot>> },
    /// Resolve the active zone for a point
    ActiveZone { latitude: f64, longitude: f64, radius: f64, reply: Reply<Option<ZoneSnapshot>> },
    /// Check a single zone for a point
    InZone { entity_id: EntityId, latitude: f64, longitude: f64, radius: f64, reply: Reply<bool> },

    // ****************************************
    // ** Administrative
    /// Replace the source-origin zones with a fresh fetch
    Reload { reply: Reply<usize> },
    /// Stop the engine loop
    Shutdown { reply: Reply<()> },
}
