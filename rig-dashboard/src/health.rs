use crate::mqtt::Publisher;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::{self, JoinHandle};
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineHealth {
    pub uptime_seconds: u64,
    pub mqtt_status: String,
    pub mqtt_reconnects: u64,
    pub messages_received: u64,
    pub unknown_topics: u64,
    pub readings_rejected: u64,
    pub readings_dispatched: u64,
    pub observer_failures: u64,
    pub records_stored: u64,
    pub storage_errors: u64,
    pub guidance_published: u64,
    pub publish_errors: u64,
}

#[derive(Default)]
struct Counters {
    received: AtomicU64,
    unknown: AtomicU64,
    rejected: AtomicU64,
    dispatched: AtomicU64,
    observer_failures: AtomicU64,
    stored: AtomicU64,
    storage_errors: AtomicU64,
    guidance_published: AtomicU64,
    publish_errors: AtomicU64,
    reconnects: AtomicU64,
}

/// Counters shared by the ingestion path, the persistence writer and the
/// navigation loop. Cheap to clone.
#[derive(Clone)]
pub struct PipelineStats {
    start_time: Instant,
    counters: Arc<Counters>,
    mqtt_status: Arc<Mutex<String>>,
}

impl Default for PipelineStats {
    fn default() -> Self {
        Self::new()
    }
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

impl PipelineStats {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            counters: Arc::new(Counters::default()),
            mqtt_status: Arc::new(Mutex::new("connecting".to_string())),
        }
    }

    pub fn mark_mqtt_connected(&self) {
        *self.mqtt_status.lock() = "connected".to_string();
    }

    pub fn mark_mqtt_disconnected(&self) {
        *self.mqtt_status.lock() = "disconnected".to_string();
    }

    pub fn increment_reconnects(&self) {
        bump(&self.counters.reconnects);
        *self.mqtt_status.lock() = "reconnecting".to_string();
    }

    pub fn record_received(&self) { bump(&self.counters.received) }
    pub fn record_unknown(&self) { bump(&self.counters.unknown) }
    pub fn record_rejected(&self) { bump(&self.counters.rejected) }
    pub fn record_dispatched(&self) { bump(&self.counters.dispatched) }
    pub fn record_observer_failures(&self, n: usize) {
        self.counters.observer_failures.fetch_add(n as u64, Ordering::Relaxed);
    }
    pub fn record_stored(&self) { bump(&self.counters.stored) }
    pub fn record_storage_error(&self) { bump(&self.counters.storage_errors) }
    pub fn record_guidance_published(&self) { bump(&self.counters.guidance_published) }
    pub fn record_publish_error(&self) { bump(&self.counters.publish_errors) }

    pub fn snapshot(&self) -> PipelineHealth {
        let c = &self.counters;
        let load = |a: &AtomicU64| a.load(Ordering::Relaxed);
        PipelineHealth {
            uptime_seconds: self.start_time.elapsed().as_secs(),
            mqtt_status: self.mqtt_status.lock().clone(),
            mqtt_reconnects: load(&c.reconnects),
            messages_received: load(&c.received),
            unknown_topics: load(&c.unknown),
            readings_rejected: load(&c.rejected),
            readings_dispatched: load(&c.dispatched),
            observer_failures: load(&c.observer_failures),
            records_stored: load(&c.stored),
            storage_errors: load(&c.storage_errors),
            guidance_published: load(&c.guidance_published),
            publish_errors: load(&c.publish_errors),
        }
    }

    /// Periodic health report: always logged, also published as JSON when a topic is given.
    pub fn spawn_health_reporter(
        &self,
        period: Duration,
        publisher: Option<(Arc<dyn Publisher>, String)>,
    ) -> JoinHandle<()> {
        let stats = self.clone();
        task::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await;
            loop {
                interval.tick().await;
                let health = stats.snapshot();
                info!(
                    "health: mqtt={} received={} dispatched={} rejected={} unknown={} stored={} storage_errors={} guidance={} publish_errors={}",
                    health.mqtt_status,
                    health.messages_received,
                    health.readings_dispatched,
                    health.readings_rejected,
                    health.unknown_topics,
                    health.records_stored,
                    health.storage_errors,
                    health.guidance_published,
                    health.publish_errors,
                );
                if let Some((publisher, topic)) = &publisher {
                    match serde_json::to_string(&health) {
                        Ok(payload) => {
                            if let Err(e) = publisher.publish(topic, &payload) {
                                warn!("failed to publish health: {e}");
                            }
                        }
                        Err(e) => warn!("failed to serialize health: {e}"),
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_and_status() {
        let stats = PipelineStats::new();
        let clone = stats.clone();
        clone.record_received();
        clone.record_received();
        clone.record_unknown();
        clone.record_observer_failures(3);
        stats.mark_mqtt_connected();

        let health = stats.snapshot();
        assert_eq!(health.messages_received, 2);
        assert_eq!(health.unknown_topics, 1);
        assert_eq!(health.observer_failures, 3);
        assert_eq!(health.mqtt_status, "connected");

        stats.increment_reconnects();
        let health = stats.snapshot();
        assert_eq!(health.mqtt_reconnects, 1);
        assert_eq!(health.mqtt_status, "reconnecting");
    }
}
