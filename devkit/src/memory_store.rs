/*!
In-memory telemetry store with failure injection.
*/

use parking_lot::Mutex;
use rig_dashboard::error::StorageError;
use rig_dashboard::models::{PositionFix, SensorSample};
use rig_dashboard::ports::TelemetryStore;

#[derive(Debug, Default)]
pub struct MemoryStore {
    samples: Mutex<Vec<SensorSample>>,
    fixes: Mutex<Vec<PositionFix>>,
    calls: Mutex<usize>,
    fail_next: Mutex<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `n` store calls fail with `StorageError::Unavailable`.
    pub fn fail_next(&self, n: usize) {
        *self.fail_next.lock() = n;
    }

    pub fn samples(&self) -> Vec<SensorSample> {
        self.samples.lock().clone()
    }

    pub fn fixes(&self) -> Vec<PositionFix> {
        self.fixes.lock().clone()
    }

    /// Every call, failed ones included.
    pub fn call_count(&self) -> usize {
        *self.calls.lock()
    }

    fn check(&self) -> Result<(), StorageError> {
        let mut fail = self.fail_next.lock();
        if *fail > 0 {
            *fail -= 1;
            return Err(StorageError::Unavailable("injected failure".into()));
        }
        Ok(())
    }

    /// Counted once the call has fully completed, so waiting on the count
    /// also waits for the row.
    fn finish(&self, result: Result<(), StorageError>) -> Result<(), StorageError> {
        *self.calls.lock() += 1;
        result
    }
}

impl TelemetryStore for MemoryStore {
    fn record_sensor_reading(&self, sample: &SensorSample) -> Result<(), StorageError> {
        let result = self.check().map(|()| {
            let mut samples = self.samples.lock();
            let mut row = sample.clone();
            row.id = Some(samples.len() as u64 + 1);
            samples.push(row);
        });
        self.finish(result)
    }

    fn record_position_fix(&self, fix: &PositionFix) -> Result<(), StorageError> {
        let result = self.check().map(|()| {
            let mut fixes = self.fixes.lock();
            let mut row = fix.clone();
            row.id = Some(fixes.len() as u64 + 1);
            fixes.push(row);
        });
        self.finish(result)
    }
}
