//! Inbound path: topic → kind → parsed reading → observers.
//!
//! One call per broker message, on the delivery task. Nothing here blocks:
//! observers either do in-memory work or hand off to their own task.

use crate::dispatch::{DispatchOutcome, EventDispatcher};
use crate::health::PipelineStats;
use crate::models::{AlertEvent, Reading};
use crate::mqtt::MessageHandler;
use crate::parser::{alert, parse};
use crate::router::TopicRouter;
use time::OffsetDateTime;
use tracing::{debug, info};

pub struct IngestPipeline {
    router: TopicRouter,
    dispatcher: EventDispatcher,
    stats: PipelineStats,
}

impl IngestPipeline {
    pub fn new(router: TopicRouter, dispatcher: EventDispatcher, stats: PipelineStats) -> Self {
        Self { router, dispatcher, stats }
    }

    pub fn router(&self) -> &TopicRouter {
        &self.router
    }

    /// Routes and parses one message. `None` for unknown topics. A payload
    /// that is not valid UTF-8 is always rejected.
    pub fn read(&self, topic: &str, payload: &[u8]) -> Option<Reading> {
        let kind = self.router.route(topic)?;
        let (raw_payload, value) = match std::str::from_utf8(payload) {
            Ok(text) => (text.to_string(), parse(kind, text).accepted()),
            Err(_) => (String::from_utf8_lossy(payload).into_owned(), None),
        };
        Some(Reading { kind, raw_payload, value, received_at: OffsetDateTime::now_utc() })
    }

    /// Full ingestion of one message. Returns the dispatch outcome, or
    /// `None` when nothing was emitted.
    pub fn ingest(&self, topic: &str, payload: &[u8]) -> Option<DispatchOutcome> {
        self.stats.record_received();

        let Some(reading) = self.read(topic, payload) else {
            self.stats.record_unknown();
            info!("ignoring message on unknown topic '{topic}'");
            return None;
        };

        // Alerts follow the raw payload, whether or not the reading is stored.
        if reading.kind.has_alert() && std::str::from_utf8(payload).is_ok() {
            self.raise_alert(&reading);
        }

        if reading.value.is_none() {
            self.stats.record_rejected();
            debug!("rejected {} payload {:?}", reading.kind, reading.raw_payload);
            return None;
        }
        let event = reading.into_event()?;

        let outcome = self.dispatcher.emit(&event);
        self.stats.record_dispatched();
        if outcome.failed > 0 {
            self.stats.record_observer_failures(outcome.failed);
        }
        Some(outcome)
    }

    fn raise_alert(&self, reading: &Reading) {
        let Some(text) = alert(reading.kind, &reading.raw_payload) else {
            debug!("no alert for {} payload {:?}", reading.kind, reading.raw_payload);
            return;
        };
        let event = AlertEvent {
            kind: reading.kind,
            text,
            raw_payload: reading.raw_payload.clone(),
            received_at: reading.received_at,
        };
        let outcome = self.dispatcher.emit_alert(&event);
        if outcome.failed > 0 {
            self.stats.record_observer_failures(outcome.failed);
        }
    }
}

impl MessageHandler for IngestPipeline {
    fn on_message(&self, topic: &str, payload: &[u8]) {
        self.ingest(topic, payload);
    }
}
