use log::{debug, info, warn};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use crate::engine::config::ZoneEngineConfig;
use crate::engine::events::{ZoneCommand, ZoneEvent};
use crate::engine::handle::ZoneEngineHandle;
use crate::engine::occupant::Subscription;
use crate::engine::zone::{LocationConfig, ZoneNamespace, ZoneServices};
use crate::engine::ZoneError;

/// Owner of the zone namespace.
///
/// The engine is built, then [`start`](Self::start)ed: the namespace is fully
/// populated (source zones, stored zones, home) before the run loop is spawned
/// and the first [`ZoneEngineHandle`] exists. From then on every query and
/// mutation goes through the handle and is served by the single engine task.
pub struct ZoneEngine {
    /// Configuration for the whole engine.
    config: ZoneEngineConfig,
    /// All live zones
    namespace: ZoneNamespace,
    /// System location; changes move the home zone
    location_rx: watch::Receiver<LocationConfig>,
    /// Engine's own feed subscription, only used to wake the loop
    occupant_rx: Subscription,
    /// Zone event bus
    event_tx: broadcast::Sender<ZoneEvent>,
    /// Stops the run loop
    cancel: CancellationToken,
}

impl ZoneEngine {
    pub fn new(
        config: ZoneEngineConfig,
        services: ZoneServices,
        location_rx: watch::Receiver<LocationConfig>,
    ) -> Self {
        // Broadcast event bus. Subscribe through a handle to receive zone events.
        let (event_tx, _first_rx) = broadcast::channel::<ZoneEvent>(config.channel_capacity.max(1));

        let occupant_rx = services.feed.subscribe();
        let namespace = ZoneNamespace::new(services, config.occupant_domain.clone(), event_tx.clone());

        Self {
            config,
            namespace,
            location_rx,
            occupant_rx,
            event_tx,
            cancel: CancellationToken::new(),
        }
    }

    /// Token that stops the run loop when cancelled. Handles share it.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Populates the namespace and spawns the run loop on the current runtime.
    ///
    /// Fails without spawning when the source zones are invalid or unreadable,
    /// or when the store cannot be read.
    pub fn start(mut self) -> Result<(ZoneEngineHandle, JoinHandle<()>), ZoneError> {
        self.populate()?;

        // Command channel on which handles send requests to the engine task. The
        // engine keeps no sender, so the loop ends once every handle is dropped.
        let (cmd_tx, cmd_rx) = mpsc::channel::<ZoneCommand>(self.config.channel_capacity.max(1));

        let handle = ZoneEngineHandle::new(cmd_tx, self.event_tx.clone(), self.cancel.clone());
        let join_handle = tokio::spawn(self.run(cmd_rx));

        Ok((handle, join_handle))
    }

    fn populate(&mut self) -> Result<(), ZoneError> {
        self.namespace.reload().map_err(|e| match e {
            ZoneError::ReloadFetch(source) => ZoneError::Startup(source),
            other => other,
        })?;

        self.namespace.restore().map_err(|e| match e {
            ZoneError::Persistence(source) => ZoneError::Startup(source),
            other => other,
        })?;

        let location = self.location_rx.borrow_and_update().clone();
        self.namespace.install_home(&location);

        info!(
            "zone engine started with {} zones (occupant domain {:?})",
            self.namespace.len(),
            self.config.occupant_domain
        );
        Ok(())
    }

    /// Run the engine's inbound loop.
    ///
    /// Location changes are served first, then occupant events, then commands
    /// from handles. The loop ends on [`ZoneCommand::Shutdown`], on cancellation,
    /// or when every handle is dropped.
    async fn run(mut self, mut cmd_rx: mpsc::Receiver<ZoneCommand>) {
        let mut location_open = true;
        let mut occupants_open = true;

        loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => {
                    debug!("zone engine cancelled");
                    break;
                }

                changed = self.location_rx.changed(), if location_open => {
                    match changed {
                        Ok(()) => self.apply_location(),
                        Err(_) => {
                            debug!("location sender dropped, home zone is frozen");
                            location_open = false;
                        }
                    }
                }

                woken = self.occupant_rx.recv(), if occupants_open => {
                    match woken {
                        Ok(_) | Err(RecvError::Lagged(_)) => {
                            self.drain_wakeups();
                            self.namespace.pump_occupants();
                        }
                        Err(RecvError::Closed) => occupants_open = false,
                    }
                }

                cmd = cmd_rx.recv() => {
                    let Some(cmd) = cmd else {
                        debug!("all zone engine handles dropped");
                        break;
                    };
                    if !self.handle_command(cmd) {
                        break;
                    }
                }
            }
        }

        self.cancel.cancel();
        info!("zone engine stopped");
    }

    /// Dispatches one command. Returns `false` when the loop must stop.
    fn handle_command(&mut self, cmd: ZoneCommand) -> bool {
        // Commands observe every location and occupant change sent before them.
        self.sync_pending();

        match cmd {
            ZoneCommand::Create { fields, reply } => {
                let _ = reply.send(self.namespace.create(fields));
            }
            ZoneCommand::Update { entity_id, patch, reply } => {
                let _ = reply.send(self.namespace.update(&entity_id, patch));
            }
            ZoneCommand::Remove { entity_id, reply } => {
                let _ = reply.send(self.namespace.remove(&entity_id));
            }
            ZoneCommand::List { reply } => {
                let _ = reply.send(Ok(self.namespace.list()));
            }
            ZoneCommand::Get { entity_id, reply } => {
                let _ = reply.send(Ok(self.namespace.get(&entity_id).map(|z| z.snapshot())));
            }
            ZoneCommand::ActiveZone { latitude, longitude, radius, reply } => {
                let zone = self.namespace.active_zone(latitude, longitude, radius);
                let _ = reply.send(Ok(zone.map(|z| z.snapshot())));
            }
            ZoneCommand::InZone { entity_id, latitude, longitude, radius, reply } => {
                let _ = reply.send(self.namespace.in_zone(&entity_id, latitude, longitude, radius));
            }
            ZoneCommand::Reload { reply } => {
                let _ = reply.send(self.namespace.reload());
            }
            ZoneCommand::Shutdown { reply } => {
                let _ = reply.send(Ok(()));
                return false;
            }
        }
        true
    }

    fn sync_pending(&mut self) {
        if self.location_rx.has_changed().unwrap_or(false) {
            self.apply_location();
        }
        self.drain_wakeups();
        self.namespace.pump_occupants();
    }

    fn apply_location(&mut self) {
        let location = self.location_rx.borrow_and_update().clone();
        if self.namespace.update_home(&location) {
            info!("home zone moved to {:?} ({}, {})", location.name, location.latitude, location.longitude);
        }
    }

    fn drain_wakeups(&mut self) {
        loop {
            match self.occupant_rx.try_recv() {
                Ok(_) => continue,
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    warn!("zone engine wake-up queue lagged by {skipped} events");
                }
                Err(_) => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;
    use crate::engine::occupant::OccupantFeed;
    use crate::engine::source::StaticZoneSource;
    use crate::engine::store::{InMemoryZoneStore, JsonZoneStore, ZoneStore};
    use crate::engine::zone::{EntityId, ZoneCreate, ZoneDefinition, ZoneState, ZoneUpdate};

    fn init_logger() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    struct Fixture {
        source: Arc<StaticZoneSource>,
        feed: OccupantFeed,
        location_tx: watch::Sender<LocationConfig>,
        handle: ZoneEngineHandle,
        join: JoinHandle<()>,
    }

    fn start_with(source_zones: Vec<ZoneCreate>, store: Arc<dyn ZoneStore>) -> Fixture {
        init_logger();
        let source = Arc::new(StaticZoneSource::new(source_zones));
        let feed = OccupantFeed::new();
        let services = ZoneServices {
            source: source.clone(),
            store,
            feed: feed.clone(),
            ..ZoneServices::in_memory()
        };
        let (location_tx, location_rx) = watch::channel(LocationConfig::new("Home", 52.0, 4.0));

        let engine = ZoneEngine::new(ZoneEngineConfig::default(), services, location_rx);
        let (handle, join) = engine.start().unwrap();
        Fixture { source, feed, location_tx, handle, join }
    }

    fn start() -> Fixture {
        start_with(
            vec![ZoneCreate::new("Office", 40.0, -75.0).radius(50.0)],
            Arc::new(InMemoryZoneStore::new()),
        )
    }

    fn ids(zones: &[crate::engine::zone::ZoneSnapshot]) -> Vec<String> {
        zones.iter().map(|z| z.entity_id.to_string()).collect()
    }

    #[tokio::test]
    async fn startup_populates_every_origin() {
        let mut gym = ZoneCreate::new("Gym", 41.0, -75.0).into_definition().unwrap();
        gym.id = Some("gym".into());
        let store = Arc::new(InMemoryZoneStore::with_zones([gym]).unwrap());

        let fx = start_with(vec![ZoneCreate::new("Office", 40.0, -75.0)], store);
        let zones = fx.handle.list_zones().await.unwrap();
        assert_eq!(ids(&zones), ["zone.gym", "zone.home", "zone.office"]);

        let home = fx.handle.get_zone(&EntityId::home()).await.unwrap().unwrap();
        assert_eq!(home.icon.as_deref(), Some("mdi:home"));
        assert_eq!(home.attributes.radius, 100.0);
    }

    #[tokio::test]
    async fn startup_fails_on_invalid_source() {
        init_logger();
        let services = ZoneServices {
            source: Arc::new(StaticZoneSource::new(vec![ZoneCreate::new("Bad", 91.0, 0.0)])),
            ..ZoneServices::in_memory()
        };
        let (_tx, rx) = watch::channel(LocationConfig::default());
        let result = ZoneEngine::new(ZoneEngineConfig::default(), services, rx).start();
        assert!(matches!(result, Err(ZoneError::Validation(_))));
    }

    #[tokio::test]
    async fn startup_fails_on_unreadable_store() {
        init_logger();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("zones.json");
        std::fs::write(&path, "garbage").unwrap();

        let services = ZoneServices {
            store: Arc::new(JsonZoneStore::new(&path)),
            ..ZoneServices::in_memory()
        };
        let (_tx, rx) = watch::channel(LocationConfig::default());
        let result = ZoneEngine::new(ZoneEngineConfig::default(), services, rx).start();
        assert!(matches!(result, Err(ZoneError::Startup(_))));
    }

    #[tokio::test]
    async fn crud_round_trip_publishes_events() {
        let fx = start();
        let mut events = fx.handle.subscribe_events();

        let created = fx.handle.create_zone(ZoneCreate::new("Office", 40.5, -75.0)).await.unwrap();
        assert_eq!(created.entity_id, EntityId::zone("office_2"));
        assert!(created.attributes.editable);

        let updated = fx
            .handle
            .update_zone(&created.entity_id, ZoneUpdate { name: Some("Annex".into()), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(updated.name, "Annex");
        assert_eq!(updated.entity_id, created.entity_id);

        fx.handle.remove_zone(&created.entity_id).await.unwrap();
        assert!(fx.handle.get_zone(&created.entity_id).await.unwrap().is_none());

        assert!(matches!(events.recv().await.unwrap(), ZoneEvent::Added { .. }));
        assert!(matches!(events.recv().await.unwrap(), ZoneEvent::Updated { zone } if zone.name == "Annex"));
        assert_eq!(
            events.recv().await.unwrap(),
            ZoneEvent::Removed { entity_id: created.entity_id.clone() }
        );
    }

    #[tokio::test]
    async fn source_zones_are_read_only() {
        let fx = start();
        let office = EntityId::zone("office");
        assert!(matches!(
            fx.handle.update_zone(&office, ZoneUpdate::default()).await,
            Err(ZoneError::UnknownHandle(_))
        ));
        assert!(matches!(fx.handle.remove_zone(&office).await, Err(ZoneError::UnknownHandle(_))));
        assert!(matches!(fx.handle.remove_zone(&EntityId::home()).await, Err(ZoneError::UnknownHandle(_))));
    }

    #[tokio::test]
    async fn created_zones_persist_to_the_store() {
        let store = Arc::new(InMemoryZoneStore::new());
        let fx = start_with(vec![], store.clone());

        fx.handle.create_zone(ZoneCreate::new("Gym", 41.0, -75.0).passive(true)).await.unwrap();
        let saved: ZoneDefinition = store.get("gym").unwrap();
        assert!(saved.passive);
        assert_eq!(saved.radius, 100.0);
    }

    #[tokio::test]
    async fn queries_resolve_the_active_zone() {
        let fx = start();
        fx.handle.create_zone(ZoneCreate::new("Home zone", 40.0, -75.0001)).await.unwrap();

        let active = fx.handle.active_zone(40.00002, -75.0, 0.0).await.unwrap().unwrap();
        assert_eq!(active.entity_id, EntityId::zone("office"));
        assert!(fx.handle.active_zone(0.0, 0.0, 0.0).await.unwrap().is_none());

        assert!(fx.handle.in_zone(&EntityId::zone("home_zone"), 40.00002, -75.0, 0.0).await.unwrap());
        assert!(!fx.handle.in_zone(&EntityId::home(), 40.00002, -75.0, 0.0).await.unwrap());
        assert!(matches!(
            fx.handle.in_zone(&EntityId::zone("nowhere"), 0.0, 0.0, 0.0).await,
            Err(ZoneError::UnknownHandle(_))
        ));
    }

    #[tokio::test]
    async fn occupant_changes_update_zone_state() {
        let fx = start();
        let mut events = fx.handle.subscribe_events();
        let office = EntityId::zone("office");

        fx.feed.set_state(EntityId::new("person", "alice"), "office");
        fx.feed.set_state(EntityId::new("device_tracker", "phone"), "office");

        let zone = fx.handle.get_zone(&office).await.unwrap().unwrap();
        assert_eq!(zone.state, ZoneState::Occupied(1));
        assert_eq!(zone.occupants, [EntityId::new("person", "alice")]);
        assert_eq!(
            events.recv().await.unwrap(),
            ZoneEvent::StateChanged { entity_id: office.clone(), state: ZoneState::Occupied(1) }
        );

        fx.feed.clear_state(&EntityId::new("person", "alice"));
        let zone = fx.handle.get_zone(&office).await.unwrap().unwrap();
        assert_eq!(zone.state, ZoneState::Occupied(0));
    }

    #[tokio::test]
    async fn occupant_changes_are_published_without_queries() {
        let fx = start();
        let mut events = fx.handle.subscribe_events();

        fx.feed.set_state(EntityId::new("person", "alice"), "home");
        let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            event,
            ZoneEvent::StateChanged { entity_id: EntityId::home(), state: ZoneState::Occupied(1) }
        );
    }

    #[tokio::test]
    async fn location_changes_move_the_home_zone() {
        let fx = start();
        fx.location_tx.send(LocationConfig::new("Cabin", 60.0, 10.0)).unwrap();

        let home = fx.handle.get_zone(&EntityId::home()).await.unwrap().unwrap();
        assert_eq!(home.name, "Cabin");
        assert_eq!((home.attributes.latitude, home.attributes.longitude), (60.0, 10.0));
        assert!(fx.handle.in_zone(&EntityId::home(), 60.0, 10.0, 0.0).await.unwrap());
    }

    #[tokio::test]
    async fn reload_replaces_source_zones() {
        let fx = start();
        fx.source.replace(vec![
            ZoneCreate::new("Office", 40.0, -75.0).radius(75.0),
            ZoneCreate::new("Park", 42.0, -75.0).icon("mdi:tree"),
        ]);

        assert_eq!(fx.handle.reload().await.unwrap(), 2);
        let zones = fx.handle.list_zones().await.unwrap();
        assert_eq!(ids(&zones), ["zone.home", "zone.office", "zone.park"]);
        assert_eq!(zones[1].attributes.radius, 75.0);
        assert!(!zones[2].attributes.editable);

        fx.source.replace(vec![ZoneCreate::new("", 0.0, 0.0)]);
        assert!(matches!(fx.handle.reload().await, Err(ZoneError::Validation(_))));
        assert_eq!(fx.handle.list_zones().await.unwrap(), zones);
    }

    #[tokio::test]
    async fn shutdown_stops_the_loop() {
        let fx = start();
        fx.handle.shutdown().await.unwrap();
        fx.join.await.unwrap();

        assert!(matches!(fx.handle.list_zones().await, Err(ZoneError::ChannelClosed)));
    }

    #[tokio::test]
    async fn cancellation_stops_the_loop() {
        let fx = start();
        fx.handle.cancellation_token().cancel();
        fx.join.await.unwrap();
        assert!(matches!(fx.handle.list_zones().await, Err(ZoneError::ChannelClosed)));
    }
}
