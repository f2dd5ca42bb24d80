/// Reasons a zone definition is rejected before it touches the namespace.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("zone name must not be empty")]
    EmptyName,

    #[error("latitude {0} is out of range (expected -90.0..=90.0)")]
    InvalidLatitude(f64),

    #[error("longitude {0} is out of range (expected -180.0..=180.0)")]
    InvalidLongitude(f64),

    #[error("radius {0} must be a finite number greater than zero")]
    InvalidRadius(f64),

    #[error("icon {0:?} must have the form `prefix:name`")]
    InvalidIcon(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ZoneError {
    #[error("Invalid zone: {0}")]
    Validation(#[from] ValidationError),

    #[error("Unknown or read-only zone: {0}")]
    UnknownHandle(String),

    #[error("Zone reload failed, keeping previous zones: {0}")]
    ReloadFetch(#[source] anyhow::Error),

    #[error("Zone store error: {0}")]
    Persistence(#[source] anyhow::Error),

    #[error("Zone engine failed to start: {0}")]
    Startup(#[source] anyhow::Error),

    #[error("Zone engine channel closed")]
    ChannelClosed,
}
