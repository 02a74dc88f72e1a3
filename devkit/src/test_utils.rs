/*!
Test harness wiring the full rig pipeline without a broker.

Router, parser, dispatcher, console dashboard, persistence writer (over a
[`MemoryStore`]) and navigation engine are the real ones; only the broker is
replaced by [`MockMqttClient`].
*/

use crate::memory_store::MemoryStore;
use crate::mqtt_stub::{MockMqttClient, SensorMessageBuilder};
use anyhow::Result;
use parking_lot::Mutex;
use rig_dashboard::config::TopicsConf;
use rig_dashboard::dashboard::ConsoleDashboard;
use rig_dashboard::dispatch::{DispatchOutcome, EventDispatcher, Observer};
use rig_dashboard::error::ObserverError;
use rig_dashboard::health::PipelineStats;
use rig_dashboard::models::{Coordinate, SensorEvent, SensorKind};
use rig_dashboard::navigation::{GpsFixObserver, NavigationEngine};
use rig_dashboard::pipeline::IngestPipeline;
use rig_dashboard::ports::spawn_persistence_writer;
use rig_dashboard::router::TopicRouter;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use time::UtcOffset;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Observer that keeps every event it receives.
#[derive(Default)]
pub struct EventRecorder {
    events: Mutex<Vec<SensorEvent>>,
}

impl EventRecorder {
    pub fn events(&self) -> Vec<SensorEvent> {
        self.events.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.events.lock().len()
    }
}

impl Observer for EventRecorder {
    fn name(&self) -> &str {
        "recorder"
    }

    fn on_event(&self, event: &SensorEvent) -> Result<(), ObserverError> {
        self.events.lock().push(event.clone());
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct HarnessOptions {
    pub topics: TopicsConf,
    pub start: Coordinate,
    /// Register the GPS fix observer so location readings move the engine.
    pub gps_source: bool,
    pub utc_offset: UtcOffset,
    pub queue_capacity: usize,
}

impl Default for HarnessOptions {
    fn default() -> Self {
        Self {
            topics: TopicsConf::default(),
            start: Coordinate { latitude: 51.539, longitude: 5.077 },
            gps_source: false,
            utc_offset: UtcOffset::UTC,
            queue_capacity: 1024,
        }
    }
}

pub struct TestHarness {
    pub mqtt_client: MockMqttClient,
    pub store: Arc<MemoryStore>,
    pub dashboard: Arc<ConsoleDashboard>,
    pub recorder: Arc<EventRecorder>,
    pub engine: Arc<NavigationEngine>,
    pub pipeline: IngestPipeline,
    pub stats: PipelineStats,
    pub messages: SensorMessageBuilder,
    guidance_topic: String,
    writer: JoinHandle<()>,
}

impl TestHarness {
    /// Needs a tokio runtime: the persistence writer is spawned here.
    pub fn new() -> Self {
        Self::with_options(HarnessOptions::default())
    }

    pub fn with_options(options: HarnessOptions) -> Self {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();

        let stats = PipelineStats::new();
        let mqtt_client = MockMqttClient::new();
        let store = Arc::new(MemoryStore::new());
        let dashboard = Arc::new(ConsoleDashboard::new());
        let recorder = Arc::new(EventRecorder::default());

        let engine = Arc::new(NavigationEngine::new(
            options.start,
            Arc::new(mqtt_client.clone()),
            options.topics.guidance.clone(),
            stats.clone(),
        ));

        let (sink, writer) =
            spawn_persistence_writer(store.clone(), options.utc_offset, options.queue_capacity, stats.clone());

        let mut dispatcher = EventDispatcher::new();
        dispatcher.on_all(recorder.clone());
        dispatcher.on_all(dashboard.clone());
        dispatcher.on_alerts(dashboard.clone());
        dispatcher.on_all(Arc::new(sink));
        if options.gps_source {
            dispatcher.on_kinds(
                &[SensorKind::LocationLat, SensorKind::LocationLon],
                Arc::new(GpsFixObserver::new(engine.clone())),
            );
        }

        let router = TopicRouter::new(&options.topics);
        mqtt_client.subscribe(&router.subscription_set());

        Self {
            pipeline: IngestPipeline::new(router, dispatcher, stats.clone()),
            messages: SensorMessageBuilder::new(options.topics.clone()),
            guidance_topic: options.topics.guidance,
            mqtt_client,
            store,
            dashboard,
            recorder,
            engine,
            stats,
            writer,
        }
    }

    /// One inbound message through the whole pipeline.
    pub fn send(&self, topic: &str, payload: &[u8]) -> Option<DispatchOutcome> {
        self.pipeline.ingest(topic, payload)
    }

    pub fn send_message(&self, message: &(String, Vec<u8>)) -> Option<DispatchOutcome> {
        self.send(&message.0, &message.1)
    }

    /// Waits until the store has seen `expected` calls (failed ones included).
    pub async fn wait_for_store_calls(&self, expected: usize, timeout_ms: u64) -> Result<()> {
        let deadline = tokio::time::Instant::now() + Duration::from_millis(timeout_ms);
        while tokio::time::Instant::now() < deadline {
            if self.store.call_count() >= expected {
                return Ok(());
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        warn!("timeout waiting for {expected} store calls");
        anyhow::bail!("expected {expected} store calls, saw {}", self.store.call_count())
    }

    /// Gives the writer a moment, then checks that no more than `expected` calls happened.
    pub async fn assert_store_calls_settle_at(&self, expected: usize) -> Result<()> {
        tokio::time::sleep(Duration::from_millis(100)).await;
        let actual = self.store.call_count();
        if actual != expected {
            anyhow::bail!("expected {expected} store calls, got {actual}");
        }
        Ok(())
    }

    pub fn guidance_payloads(&self) -> Vec<String> {
        self.mqtt_client.payloads_on(&self.guidance_topic)
    }

    pub fn assert_guidance_sent(&self, expected: &str) -> Result<()> {
        let payloads = self.guidance_payloads();
        if payloads.iter().any(|p| p == expected) {
            info!("found guidance {expected}");
            return Ok(());
        }
        anyhow::bail!("guidance {expected:?} not found in {payloads:?}")
    }

    pub fn get_stats(&self) -> TestStats {
        let mut topic_counts = HashMap::new();
        for msg in self.mqtt_client.get_published_messages() {
            *topic_counts.entry(msg.topic).or_insert(0) += 1;
        }
        TestStats {
            dispatched_events: self.recorder.count(),
            store_calls: self.store.call_count(),
            topic_counts,
            subscriptions: self.mqtt_client.get_subscriptions(),
        }
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TestHarness {
    fn drop(&mut self) {
        self.writer.abort();
    }
}

#[derive(Debug)]
pub struct TestStats {
    pub dispatched_events: usize,
    pub store_calls: usize,
    pub topic_counts: HashMap<String, usize>,
    pub subscriptions: Vec<String>,
}
