use geozone::{
    occupant::OccupantFeed,
    source::StaticZoneSource,
    store::JsonZoneStore,
    zone::{EntityId, LocationConfig, ZoneCreate, ZoneServices, ZoneUpdate},
    ZoneEngine, ZoneEngineConfig, ZoneError,
};
use geozone::events::ZoneEvent;
use geozone::geo::Vincenty;
use std::sync::Arc;
use tokio::sync::watch;

#[tokio::main]
async fn main() -> Result<(), ZoneError> {
    env_logger::init();

    // Configure the engine through the config builder. Only person.* entities
    // count as occupants.
    let engine_cfg = ZoneEngineConfig::builder()
        .occupant_domain("person")
        .build()
        .expect("Configuration is not valid");

    // Declarative zones. These are read-only; a reload replaces them wholesale.
    let source = StaticZoneSource::new(vec![
        ZoneCreate::new("Office", 40.0, -75.0).radius(50.0).icon("mdi:briefcase"),
        ZoneCreate::new("Park", 40.01, -75.01).radius(250.0).passive(true),
    ]);

    // Zones created at runtime are persisted in a JSON file in the temp directory.
    let store_path = std::env::temp_dir().join("geozone_demo_zones.json");
    let feed = OccupantFeed::new();
    let services = ZoneServices {
        source: Arc::new(source),
        store: Arc::new(JsonZoneStore::new(&store_path)),
        feed: feed.clone(),
        metric: Arc::new(Vincenty),
    };

    // The home zone follows the system location.
    let (location_tx, location_rx) = watch::channel(LocationConfig::new("Home", 40.0, -75.0001));

    let engine = ZoneEngine::new(engine_cfg, services, location_rx);
    let (handle, join) = engine.start()?;

    // You will only receive events sent from this point on.
    let mut event_rx = handle.subscribe_events();

    let gym = match handle.get_zone(&EntityId::zone("gym")).await? {
        Some(existing) => existing,
        None => handle.create_zone(ZoneCreate::new("Gym", 40.02, -75.0)).await?,
    };
    handle
        .update_zone(&gym.entity_id, ZoneUpdate { radius: Some(120.0), ..Default::default() })
        .await?;

    for zone in handle.list_zones().await? {
        println!(
            "{:<14} {:<16} radius={:>6.1}m passive={:<5} editable={}",
            zone.entity_id.to_string(),
            zone.name,
            zone.attributes.radius,
            zone.attributes.passive,
            zone.attributes.editable,
        );
    }

    let points = [
        (40.00002, -75.0, 0.0),
        (40.0101, -75.0101, 10.0),
        (40.02, -75.0, 0.0),
        (41.0, -75.0, 0.0),
    ];
    for (lat, lon, accuracy) in points {
        let active = handle.active_zone(lat, lon, accuracy).await?;
        println!(
            "({lat:.5}, {lon:.5}) ±{accuracy}m -> {}",
            active.map(|z| z.entity_id.to_string()).unwrap_or_else(|| "not_home".into())
        );
    }

    // Occupants report the object id of the zone they are in.
    feed.set_state(EntityId::new("person", "alice"), "office");
    feed.set_state(EntityId::new("person", "bob"), "home");
    let _ = location_tx.send(LocationConfig::new("Home", 40.0005, -75.0));

    let office = handle.get_zone(&EntityId::zone("office")).await?;
    println!("office: {:?}", office.map(|z| z.state));

    while let Ok(event) = event_rx.try_recv() {
        match event {
            ZoneEvent::StateChanged { entity_id, state } => println!("{entity_id} -> {state:?}"),
            ZoneEvent::Updated { zone } => println!("{} updated", zone.entity_id),
            other => println!("{other:?}"),
        }
    }

    handle.shutdown().await?;
    let _ = join.await;
    Ok(())
}
