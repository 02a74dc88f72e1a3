//! Console stand-in for the dashboard view.
//!
//! Formats readings the way the widgets show them and keeps the latest raw
//! payload per kind for anyone who wants a snapshot. Sound and gas widgets
//! are driven by alerts, which also cover payloads the store rejects.

use crate::dispatch::Observer;
use crate::error::ObserverError;
use crate::models::{AlertEvent, SensorEvent, SensorKind, SensorValue};
use crate::state::{new_state, LatestMap, LatestValue, Shared};
use std::collections::HashMap;
use tracing::info;

pub struct ConsoleDashboard {
    latest: Shared<LatestMap>,
    alerts: Shared<HashMap<SensorKind, String>>,
}

impl Default for ConsoleDashboard {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsoleDashboard {
    pub fn new() -> Self {
        Self { latest: new_state(HashMap::new()), alerts: new_state(HashMap::new()) }
    }

    pub fn latest(&self, kind: SensorKind) -> Option<LatestValue> {
        self.latest.lock().get(&kind).cloned()
    }

    pub fn snapshot(&self) -> LatestMap {
        self.latest.lock().clone()
    }

    /// Last alert text shown for a kind.
    pub fn last_alert(&self, kind: SensorKind) -> Option<String> {
        self.alerts.lock().get(&kind).cloned()
    }

    fn remember(&self, kind: SensorKind, raw_payload: &str, received_at: time::OffsetDateTime) {
        self.latest
            .lock()
            .insert(kind, LatestValue { raw_payload: raw_payload.to_string(), received_at });
    }
}

/// Widget text for an event. `None` for sound and gas, whose widgets only
/// change on an alert.
pub fn display_text(event: &SensorEvent) -> Option<String> {
    match &event.value {
        SensorValue::Temperature(v) => Some(format!("temperature {v:.1} °C")),
        SensorValue::Heartbeat(v) => Some(format!("heartbeat {v} bpm")),
        SensorValue::Oxygen(v) => Some(format!("SpO2 {v} %")),
        SensorValue::Sound(_) | SensorValue::GasDetection(_) => None,
        SensorValue::LocationLat(raw) => Some(format!("gps lat {raw}")),
        SensorValue::LocationLon(raw) => Some(format!("gps lon {raw}")),
    }
}

pub fn alert_display(alert: &AlertEvent) -> String {
    match alert.kind {
        SensorKind::Sound => format!("sound alert, direction {}", alert.text),
        SensorKind::GasDetection => format!("gas alert {}", alert.text),
        other => format!("{other} alert {}", alert.text),
    }
}

impl Observer for ConsoleDashboard {
    fn name(&self) -> &str {
        "dashboard"
    }

    fn on_event(&self, event: &SensorEvent) -> Result<(), ObserverError> {
        self.remember(event.kind(), &event.raw_payload, event.received_at);
        if let Some(text) = display_text(event) {
            info!("{text}");
        }
        Ok(())
    }

    fn on_alert(&self, alert: &AlertEvent) -> Result<(), ObserverError> {
        self.remember(alert.kind, &alert.raw_payload, alert.received_at);
        let text = alert_display(alert);
        info!("{text}");
        self.alerts.lock().insert(alert.kind, text);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::OffsetDateTime;

    fn event(value: SensorValue, raw: &str) -> SensorEvent {
        SensorEvent { value, raw_payload: raw.into(), received_at: OffsetDateTime::now_utc() }
    }

    #[test]
    fn test_widget_formatting() {
        assert_eq!(
            display_text(&event(SensorValue::Temperature(21.46), "21.46")).as_deref(),
            Some("temperature 21.5 °C")
        );
        assert_eq!(display_text(&event(SensorValue::Heartbeat(72), "72")).as_deref(), Some("heartbeat 72 bpm"));
        assert_eq!(display_text(&event(SensorValue::Oxygen(97), " 97")).as_deref(), Some("SpO2 97 %"));
        assert_eq!(display_text(&event(SensorValue::Sound(123.456), "123.456")), None);
    }

    #[test]
    fn test_alerts_update_widget_and_latest() {
        let dashboard = ConsoleDashboard::new();
        let alert = |kind, text: &str, raw: &str| AlertEvent {
            kind,
            text: text.into(),
            raw_payload: raw.into(),
            received_at: OffsetDateTime::now_utc(),
        };
        dashboard.on_alert(&alert(SensorKind::Sound, "123.46", "123.456")).unwrap();
        dashboard.on_alert(&alert(SensorKind::GasDetection, "1.00", "1")).unwrap();
        dashboard.on_alert(&alert(SensorKind::GasDetection, "0.75", "0.75")).unwrap();

        assert_eq!(dashboard.last_alert(SensorKind::Sound).as_deref(), Some("sound alert, direction 123.46"));
        assert_eq!(dashboard.last_alert(SensorKind::GasDetection).as_deref(), Some("gas alert 0.75"));
        assert_eq!(dashboard.latest(SensorKind::GasDetection).unwrap().raw_payload, "0.75");
        assert!(dashboard.last_alert(SensorKind::Heartbeat).is_none());
    }

    #[test]
    fn test_latest_value_per_kind() {
        let dashboard = ConsoleDashboard::new();
        dashboard.on_event(&event(SensorValue::Heartbeat(70), "70")).unwrap();
        dashboard.on_event(&event(SensorValue::Heartbeat(75), "75")).unwrap();
        dashboard.on_event(&event(SensorValue::LocationLat("51.5".into()), "51.5")).unwrap();

        assert_eq!(dashboard.latest(SensorKind::Heartbeat).unwrap().raw_payload, "75");
        assert!(dashboard.latest(SensorKind::Temperature).is_none());
        assert_eq!(dashboard.snapshot().len(), 2);
    }
}
