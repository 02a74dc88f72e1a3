//! Fan-out of accepted readings to observers (dashboard view, persistence,
//! GPS fix assembly) without the transport knowing about any of them.
//!
//! Observers run in registration order. Each one gets the same event; an
//! error or a panic in one is logged and the next still runs.

use crate::error::ObserverError;
use crate::models::{AlertEvent, SensorEvent, SensorKind};
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{error, warn};

pub trait Observer: Send + Sync {
    /// Short label used in logs.
    fn name(&self) -> &str;

    /// Must return quickly: this runs on the message-delivery path.
    fn on_event(&self, event: &SensorEvent) -> Result<(), ObserverError>;

    /// Only called for observers registered with `on_alerts`.
    fn on_alert(&self, _alert: &AlertEvent) -> Result<(), ObserverError> {
        Ok(())
    }
}

/// Result of one emission.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub delivered: usize,
    pub failed: usize,
}

#[derive(Default)]
pub struct EventDispatcher {
    observers: HashMap<SensorKind, Vec<Arc<dyn Observer>>>,
    alert_observers: Vec<Arc<dyn Observer>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(&mut self, kind: SensorKind, observer: Arc<dyn Observer>) {
        self.observers.entry(kind).or_default().push(observer);
    }

    pub fn on_kinds(&mut self, kinds: &[SensorKind], observer: Arc<dyn Observer>) {
        for kind in kinds {
            self.on(*kind, observer.clone());
        }
    }

    pub fn on_all(&mut self, observer: Arc<dyn Observer>) {
        self.on_kinds(&SensorKind::ALL, observer);
    }

    pub fn observer_count(&self, kind: SensorKind) -> usize {
        self.observers.get(&kind).map_or(0, Vec::len)
    }

    pub fn on_alerts(&mut self, observer: Arc<dyn Observer>) {
        self.alert_observers.push(observer);
    }

    /// No observers for the kind is a no-op, nothing is queued.
    pub fn emit(&self, event: &SensorEvent) -> DispatchOutcome {
        match self.observers.get(&event.kind()) {
            Some(observers) => deliver(observers, event.kind(), |o| o.on_event(event)),
            None => DispatchOutcome::default(),
        }
    }

    pub fn emit_alert(&self, alert: &AlertEvent) -> DispatchOutcome {
        deliver(&self.alert_observers, alert.kind, |o| o.on_alert(alert))
    }
}

fn deliver<F>(observers: &[Arc<dyn Observer>], kind: SensorKind, call: F) -> DispatchOutcome
where
    F: Fn(&dyn Observer) -> Result<(), ObserverError>,
{
    let mut outcome = DispatchOutcome::default();
    for observer in observers {
        match catch_unwind(AssertUnwindSafe(|| call(observer.as_ref()))) {
            Ok(Ok(())) => outcome.delivered += 1,
            Ok(Err(e)) => {
                warn!("observer '{}' failed on {}: {}", observer.name(), kind, e);
                outcome.failed += 1;
            }
            Err(_) => {
                error!("observer '{}' panicked on {}", observer.name(), kind);
                outcome.failed += 1;
            }
        }
    }
    outcome
}
