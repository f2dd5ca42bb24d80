use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use crate::engine::events::{ZoneCommand, ZoneEvent};
use crate::engine::zone::{EntityId, ZoneCreate, ZoneSnapshot, ZoneUpdate};
use crate::engine::ZoneError;

/// Cloneable client of a running [`ZoneEngine`](crate::ZoneEngine).
///
/// Every call is a round trip to the engine task, so results always reflect a
/// fully reconciled namespace. Once the engine stops, every call returns
/// [`ZoneError::ChannelClosed`].
#[derive(Clone)]
pub struct ZoneEngineHandle {
    /// Engine command sender
    cmd_tx: mpsc::Sender<ZoneCommand>,
    /// Event sender, kept to hand out subscriptions
    event_tx: broadcast::Sender<ZoneEvent>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for ZoneEngineHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZoneEngineHandle")
            .field("cmd_tx", &self.cmd_tx)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

impl ZoneEngineHandle {
    pub(crate) fn new(
        cmd_tx: mpsc::Sender<ZoneCommand>,
        event_tx: broadcast::Sender<ZoneEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            cmd_tx,
            event_tx,
            cancel,
        }
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ZoneEvent> {
        self.event_tx.subscribe()
    }

    /// Token that stops the engine when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Sends a command built around a fresh responder and awaits the reply.
    async fn request<T>(
        &self,
        cmd: impl FnOnce(oneshot::Sender<Result<T, ZoneError>>) -> ZoneCommand,
    ) -> Result<T, ZoneError> {
        let (tx, rx) = oneshot::channel();

        self.cmd_tx
            .send(cmd(tx))
            .await
            .map_err(|_| ZoneError::ChannelClosed)?;

        rx.await.map_err(|_| ZoneError::ChannelClosed)?
    }

    // ****************************************
    // ** Store-origin CRUD

    /// Creates and persists a new zone; missing radius/passive get their defaults.
    pub async fn create_zone(&self, fields: ZoneCreate) -> Result<ZoneSnapshot, ZoneError> {
        self.request(|reply| ZoneCommand::Create { fields, reply }).await
    }

    /// Merges the given fields into a stored zone.
    pub async fn update_zone(&self, entity_id: &EntityId, patch: ZoneUpdate) -> Result<ZoneSnapshot, ZoneError> {
        let entity_id = entity_id.clone();
        self.request(|reply| ZoneCommand::Update { entity_id, patch, reply }).await
    }

    pub async fn remove_zone(&self, entity_id: &EntityId) -> Result<(), ZoneError> {
        let entity_id = entity_id.clone();
        self.request(|reply| ZoneCommand::Remove { entity_id, reply }).await
    }

    // ****************************************
    // ** Reads

    /// Every zone of every origin, ordered by entity id.
    pub async fn list_zones(&self) -> Result<Vec<ZoneSnapshot>, ZoneError> {
        self.request(|reply| ZoneCommand::List { reply }).await
    }

    pub async fn get_zone(&self, entity_id: &EntityId) -> Result<Option<ZoneSnapshot>, ZoneError> {
        let entity_id = entity_id.clone();
        self.request(|reply| ZoneCommand::Get { entity_id, reply }).await
    }

    /// The zone to report for a point with the given accuracy radius (meters).
    pub async fn active_zone(
        &self,
        latitude: f64,
        longitude: f64,
        radius: f64,
    ) -> Result<Option<ZoneSnapshot>, ZoneError> {
        self.request(|reply| ZoneCommand::ActiveZone { latitude, longitude, radius, reply }).await
    }

    pub async fn in_zone(
        &self,
        entity_id: &EntityId,
        latitude: f64,
        longitude: f64,
        radius: f64,
    ) -> Result<bool, ZoneError> {
        let entity_id = entity_id.clone();
        self.request(|reply| ZoneCommand::InZone { entity_id, latitude, longitude, radius, reply }).await
    }

    // ****************************************
    // ** Administrative

    /// Re-fetches the zone source. Returns the number of source zones now live.
    pub async fn reload(&self) -> Result<usize, ZoneError> {
        self.request(|reply| ZoneCommand::Reload { reply }).await
    }

    /// Stops the engine loop after the commands queued before this one.
    pub async fn shutdown(&self) -> Result<(), ZoneError> {
        self.request(|reply| ZoneCommand::Shutdown { reply }).await
    }
}
