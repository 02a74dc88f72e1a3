//! Persistence boundary.
//!
//! The pipeline only knows the [`TelemetryStore`] contract: one call per
//! accepted reading, sensor kinds to `record_sensor_reading`, GPS halves to
//! `record_position_fix`. Writes happen on a dedicated writer task fed by a
//! bounded channel. A slow or failing store never stalls ingestion: when
//! the queue is full the record is dropped and reported as an observer
//! failure.

pub mod json_store;

pub use json_store::JsonFileStore;

use crate::dispatch::Observer;
use crate::error::{ObserverError, StorageError};
use crate::health::PipelineStats;
use crate::models::{storage_timestamp, PositionFix, SensorEvent, SensorSample};
use std::sync::Arc;
use time::UtcOffset;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::{self, JoinHandle};
use tracing::{debug, error, warn};

pub trait TelemetryStore: Send + Sync {
    fn record_sensor_reading(&self, sample: &SensorSample) -> Result<(), StorageError>;

    fn record_position_fix(&self, fix: &PositionFix) -> Result<(), StorageError>;
}

/// One pending write.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreRecord {
    Sensor(SensorSample),
    Position(PositionFix),
}

impl StoreRecord {
    pub fn from_event(event: &SensorEvent, offset: UtcOffset) -> Option<Self> {
        let timestamp = storage_timestamp(event.received_at, offset);
        if event.kind().is_location() {
            PositionFix::from_value(&event.value, timestamp).map(StoreRecord::Position)
        } else {
            SensorSample::from_value(&event.value, timestamp).map(StoreRecord::Sensor)
        }
    }

    /// Exactly one store operation per record.
    pub fn write_to(&self, store: &dyn TelemetryStore) -> Result<(), StorageError> {
        match self {
            StoreRecord::Sensor(sample) => store.record_sensor_reading(sample),
            StoreRecord::Position(fix) => store.record_position_fix(fix),
        }
    }

    fn label(&self) -> &'static str {
        match self {
            StoreRecord::Sensor(_) => "sensor sample",
            StoreRecord::Position(_) => "position fix",
        }
    }
}

/// Dispatcher observer that hands records to the writer task.
pub struct PersistenceSink {
    tx: mpsc::Sender<StoreRecord>,
    utc_offset: UtcOffset,
}

impl Observer for PersistenceSink {
    fn name(&self) -> &str {
        "persistence"
    }

    fn on_event(&self, event: &SensorEvent) -> Result<(), ObserverError> {
        let Some(record) = StoreRecord::from_event(event, self.utc_offset) else {
            return Ok(());
        };
        self.tx.try_send(record).map_err(|e| match e {
            TrySendError::Full(_) => ObserverError::QueueFull,
            TrySendError::Closed(_) => ObserverError::QueueClosed,
        })
    }
}

/// Starts the writer task with room for `capacity` pending records. Storage
/// errors are logged and counted, the next record is written regardless.
pub fn spawn_persistence_writer(
    store: Arc<dyn TelemetryStore>,
    utc_offset: UtcOffset,
    capacity: usize,
    stats: PipelineStats,
) -> (PersistenceSink, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<StoreRecord>(capacity.max(1));

    let handle = task::spawn(async move {
        while let Some(record) = rx.recv().await {
            let label = record.label();
            let store = store.clone();
            match task::spawn_blocking(move || record.write_to(store.as_ref())).await {
                Ok(Ok(())) => {
                    stats.record_stored();
                    debug!("stored {label}");
                }
                Ok(Err(e)) => {
                    stats.record_storage_error();
                    warn!("failed to store {label}: {e}");
                }
                Err(e) => {
                    stats.record_storage_error();
                    error!("store task for {label} aborted: {e}");
                }
            }
        }
        debug!("persistence writer stopped");
    });

    (PersistenceSink { tx, utc_offset }, handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SensorValue;
    use parking_lot::Mutex;
    use time::macros::{datetime, offset};

    #[derive(Default)]
    struct FlakyStore {
        fail_next: Mutex<usize>,
        samples: Mutex<Vec<SensorSample>>,
        fixes: Mutex<Vec<PositionFix>>,
    }

    impl FlakyStore {
        fn check(&self) -> Result<(), StorageError> {
            let mut fail = self.fail_next.lock();
            if *fail > 0 {
                *fail -= 1;
                return Err(StorageError::Unavailable("disk full".into()));
            }
            Ok(())
        }
    }

    impl TelemetryStore for FlakyStore {
        fn record_sensor_reading(&self, sample: &SensorSample) -> Result<(), StorageError> {
            self.check()?;
            self.samples.lock().push(sample.clone());
            Ok(())
        }
        fn record_position_fix(&self, fix: &PositionFix) -> Result<(), StorageError> {
            self.check()?;
            self.fixes.lock().push(fix.clone());
            Ok(())
        }
    }

    fn event(value: SensorValue) -> SensorEvent {
        SensorEvent {
            value,
            raw_payload: String::new(),
            received_at: datetime!(2025-06-10 08:00:00 UTC),
        }
    }

    #[test]
    fn test_record_selection_by_kind() {
        let rec = StoreRecord::from_event(&event(SensorValue::Temperature(21.5)), offset!(+2)).unwrap();
        match rec {
            StoreRecord::Sensor(s) => {
                assert_eq!(s.temperature, Some(21.5));
                assert_eq!(s.timestamp, "2025-06-10 10:00:00");
            }
            other => panic!("unexpected {other:?}"),
        }

        let rec = StoreRecord::from_event(&event(SensorValue::LocationLat("51.539".into())), offset!(+2)).unwrap();
        assert!(matches!(rec, StoreRecord::Position(ref f) if f.latitude.as_deref() == Some("51.539")));
    }

    #[tokio::test]
    async fn test_writer_survives_storage_error() {
        let store = Arc::new(FlakyStore::default());
        *store.fail_next.lock() = 1;
        let stats = PipelineStats::new();
        let (sink, handle) = spawn_persistence_writer(store.clone(), offset!(+2), 16, stats.clone());

        sink.on_event(&event(SensorValue::Temperature(20.0))).unwrap();
        sink.on_event(&event(SensorValue::Heartbeat(80))).unwrap();
        sink.on_event(&event(SensorValue::LocationLon("5.077".into()))).unwrap();
        drop(sink);
        handle.await.unwrap();

        let samples = store.samples.lock();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].heartbeat, Some(80));
        assert_eq!(store.fixes.lock().len(), 1);

        let health = stats.snapshot();
        assert_eq!(health.storage_errors, 1);
        assert_eq!(health.records_stored, 2);
    }

    #[tokio::test]
    async fn test_closed_writer_reports_queue_closed() {
        let store = Arc::new(FlakyStore::default());
        let (sink, handle) = spawn_persistence_writer(store, offset!(+2), 16, PipelineStats::new());
        handle.abort();
        let _ = handle.await;
        let err = sink.on_event(&event(SensorValue::Oxygen(97))).unwrap_err();
        assert!(matches!(err, ObserverError::QueueClosed));
    }

    #[tokio::test]
    async fn test_full_queue_drops_record_without_blocking() {
        let store = Arc::new(FlakyStore::default());
        let stats = PipelineStats::new();
        // current-thread runtime: the writer cannot drain until we yield
        let (sink, handle) = spawn_persistence_writer(store.clone(), offset!(+2), 1, stats.clone());

        sink.on_event(&event(SensorValue::Heartbeat(70))).unwrap();
        let err = sink.on_event(&event(SensorValue::Heartbeat(71))).unwrap_err();
        assert!(matches!(err, ObserverError::QueueFull));

        drop(sink);
        handle.await.unwrap();
        let samples = store.samples.lock();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].heartbeat, Some(70));
        assert_eq!(stats.snapshot().records_stored, 1);
    }
}
