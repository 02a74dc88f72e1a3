//! rig-dashboard binary: config → broker session → ingestion pipeline and
//! observers, plus the navigation loop. Nothing here is fatal: without a
//! broker the process keeps running with no live data.

use anyhow::Result;
use rig_dashboard::config::{load_config, DashboardConfig, NavigationConf, PositionSource};
use rig_dashboard::dashboard::ConsoleDashboard;
use rig_dashboard::dispatch::EventDispatcher;
use rig_dashboard::error::PublishError;
use rig_dashboard::health::PipelineStats;
use rig_dashboard::models::{Coordinate, SensorKind};
use rig_dashboard::mqtt::{Publisher, TransportClient};
use rig_dashboard::navigation::{spawn_simulation, GpsFixObserver, NavigationEngine, SimulatedTrack};
use rig_dashboard::pipeline::IngestPipeline;
use rig_dashboard::ports::{spawn_persistence_writer, JsonFileStore, TelemetryStore};
use rig_dashboard::router::TopicRouter;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cfg = match load_config().await {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("invalid configuration, using defaults: {e}");
            DashboardConfig::default()
        }
    };
    info!("starting rig-dashboard v{}", env!("CARGO_PKG_VERSION"));

    let stats = PipelineStats::new();

    // broker session first: the navigation engine needs the publisher
    let router = TopicRouter::new(&cfg.topics);
    let transport = match TransportClient::connect(&cfg.mqtt, stats.clone()).await {
        Ok(client) => Some(client),
        Err(e) => {
            error!("MQTT connection failed: {e}; running without live data");
            None
        }
    };
    let publisher: Arc<dyn Publisher> = match &transport {
        Some(client) => Arc::new(client.publisher()),
        None => Arc::new(Offline),
    };

    // observers
    let mut dispatcher = EventDispatcher::new();
    let dashboard = Arc::new(ConsoleDashboard::new());
    dispatcher.on_all(dashboard.clone());
    dispatcher.on_alerts(dashboard);

    let _writer = match JsonFileStore::open(&cfg.persistence.data_dir) {
        Ok(store) => {
            let store: Arc<dyn TelemetryStore> = Arc::new(store);
            let (sink, handle) = spawn_persistence_writer(
                store,
                cfg.persistence.utc_offset(),
                cfg.persistence.queue_capacity,
                stats.clone(),
            );
            dispatcher.on_all(Arc::new(sink));
            Some(handle)
        }
        Err(e) => {
            error!("store unavailable at {}: {e}; readings will not be persisted", cfg.persistence.data_dir);
            None
        }
    };

    let start = match Coordinate::new(cfg.navigation.start.latitude, cfg.navigation.start.longitude) {
        Ok(start) => start,
        Err(e) => {
            warn!("navigation start rejected ({e}), using default");
            NavigationConf::default().start
        }
    };
    let engine = Arc::new(NavigationEngine::new(start, publisher.clone(), cfg.topics.guidance.clone(), stats.clone()));
    if let Some(target) = cfg.navigation.target {
        match Coordinate::new(target.latitude, target.longitude) {
            Ok(target) => engine.designate(target),
            Err(e) => warn!("initial target ignored: {e}"),
        }
    }

    let _simulation = match cfg.navigation.source {
        PositionSource::Simulated => {
            let track = SimulatedTrack { speed_kmh: cfg.navigation.speed_kmh, interval: cfg.navigation.tick_interval() };
            Some(spawn_simulation(engine.clone(), track))
        }
        PositionSource::Gps => {
            dispatcher.on_kinds(
                &[SensorKind::LocationLat, SensorKind::LocationLon],
                Arc::new(GpsFixObserver::new(engine.clone())),
            );
            None
        }
    };

    let pipeline = Arc::new(IngestPipeline::new(router, dispatcher, stats.clone()));

    let health_publisher = cfg.health.topic.clone().map(|topic| (publisher.clone(), topic));
    let _health = stats.spawn_health_reporter(cfg.health.report_interval(), health_publisher);

    if let Some(mut client) = transport {
        let set = pipeline.router().subscription_set();
        if let Err(e) = client.subscribe(&set).await {
            warn!("subscription incomplete: {e}");
        }
        let pipeline = pipeline.clone();
        tokio::spawn(async move {
            if let Err(e) = client.run(pipeline.as_ref()).await {
                error!("MQTT session ended: {e}");
            }
        });
    }

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    Ok(())
}

/// Publisher used when the broker was never reached.
struct Offline;

impl Publisher for Offline {
    fn publish(&self, topic: &str, _payload: &str) -> Result<(), PublishError> {
        Err(PublishError::Queue { topic: topic.to_string(), reason: "not connected".into() })
    }
}
