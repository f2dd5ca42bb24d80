pub mod config;
mod engine;
pub mod errors;
pub mod events;
pub mod geo;
mod handle;
pub mod occupant;
pub mod source;
pub mod store;
pub mod zone;

/// Capacity of the command channel and of every broadcast bus.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 128;

pub use config::{ConfigError, ZoneEngineConfig};
pub use engine::ZoneEngine;
pub use errors::{ValidationError, ZoneError};
pub use handle::ZoneEngineHandle;
