//! Dashboard configuration.
//!
//! Loaded from YAML (`RIG_DASHBOARD_CONFIG`, default `dashboard.yaml`) with a
//! few environment overrides so credentials never need to live in the file.

use crate::error::ConfigError;
use crate::models::{Coordinate, SensorKind};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use time::UtcOffset;
use tokio::fs;
use tracing::{info, warn};

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct DashboardConfig {
    #[serde(default)]
    pub mqtt: MqttConf,
    #[serde(default)]
    pub topics: TopicsConf,
    #[serde(default)]
    pub persistence: PersistenceConf,
    #[serde(default)]
    pub navigation: NavigationConf,
    #[serde(default)]
    pub health: HealthConf,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MqttConf {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_tls")]
    pub tls: bool,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
    #[serde(default = "default_client_id_prefix")]
    pub client_id_prefix: String,
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Absent means a lost session stays lost.
    #[serde(default)]
    pub reconnect: Option<ReconnectConf>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ReconnectConf {
    pub initial_backoff_secs: u64,
    pub max_backoff_secs: u64,
}

/// Topic names, one per sensor kind, plus the outbound guidance topic.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TopicsConf {
    #[serde(default = "default_topic_temperature")]
    pub temperature: String,
    #[serde(default = "default_topic_heartbeat")]
    pub heartbeat: String,
    #[serde(default = "default_topic_oxygen")]
    pub oxygen: String,
    #[serde(default = "default_topic_sound")]
    pub sound: String,
    #[serde(default = "default_topic_gas")]
    pub gas_detection: String,
    #[serde(default = "default_topic_lat")]
    pub location_lat: String,
    #[serde(default = "default_topic_lon")]
    pub location_lon: String,
    #[serde(default = "default_topic_guidance")]
    pub guidance: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PersistenceConf {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_utc_offset_hours")]
    pub utc_offset_hours: i8,
    /// Pending writes held before new records are dropped.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum PositionSource {
    Simulated,
    Gps,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct NavigationConf {
    #[serde(default = "default_position_source")]
    pub source: PositionSource,
    #[serde(default = "default_start")]
    pub start: Coordinate,
    #[serde(default = "default_speed_kmh")]
    pub speed_kmh: f64,
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    #[serde(default)]
    pub target: Option<Coordinate>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct HealthConf {
    #[serde(default = "default_report_interval_secs")]
    pub report_interval_secs: u64,
    #[serde(default)]
    pub topic: Option<String>,
}

fn default_host() -> String { "localhost".into() }
fn default_port() -> u16 { 8883 }
fn default_tls() -> bool { true }
fn default_client_id_prefix() -> String { "rig-dashboard".into() }
fn default_keep_alive_secs() -> u64 { 30 }
fn default_connect_timeout_secs() -> u64 { 10 }

fn default_topic_temperature() -> String { "temperature sensor".into() }
fn default_topic_heartbeat() -> String { "heartbeat".into() }
fn default_topic_oxygen() -> String { "SPO2_Data".into() }
fn default_topic_sound() -> String { "geluid sensor".into() }
fn default_topic_gas() -> String { "MQ2 sensor".into() }
fn default_topic_lat() -> String { "Gps_sensor_lat".into() }
fn default_topic_lon() -> String { "Gps_sensor_lon".into() }
fn default_topic_guidance() -> String { "Gps_guidance".into() }

fn default_data_dir() -> String { "./data".into() }
fn default_utc_offset_hours() -> i8 { 2 }
fn default_queue_capacity() -> usize { 1024 }

fn default_position_source() -> PositionSource { PositionSource::Simulated }
fn default_start() -> Coordinate { Coordinate { latitude: 51.539, longitude: 5.077 } }
fn default_speed_kmh() -> f64 { 6.0 }
fn default_tick_interval_ms() -> u64 { 1000 }

fn default_report_interval_secs() -> u64 { 30 }

impl Default for MqttConf {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            tls: default_tls(),
            username: None,
            password: None,
            client_id_prefix: default_client_id_prefix(),
            keep_alive_secs: default_keep_alive_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            reconnect: None,
        }
    }
}

impl Default for TopicsConf {
    fn default() -> Self {
        Self {
            temperature: default_topic_temperature(),
            heartbeat: default_topic_heartbeat(),
            oxygen: default_topic_oxygen(),
            sound: default_topic_sound(),
            gas_detection: default_topic_gas(),
            location_lat: default_topic_lat(),
            location_lon: default_topic_lon(),
            guidance: default_topic_guidance(),
        }
    }
}

impl Default for PersistenceConf {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            utc_offset_hours: default_utc_offset_hours(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl Default for NavigationConf {
    fn default() -> Self {
        Self {
            source: default_position_source(),
            start: default_start(),
            speed_kmh: default_speed_kmh(),
            tick_interval_ms: default_tick_interval_ms(),
            target: None,
        }
    }
}

impl Default for HealthConf {
    fn default() -> Self {
        Self { report_interval_secs: default_report_interval_secs(), topic: None }
    }
}

impl MqttConf {
    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl TopicsConf {
    /// Inbound topic for a sensor kind. Both the subscription set and the
    /// router table are derived from this, so they cannot drift apart.
    pub fn topic_for(&self, kind: SensorKind) -> &str {
        match kind {
            SensorKind::Temperature => &self.temperature,
            SensorKind::Heartbeat => &self.heartbeat,
            SensorKind::Oxygen => &self.oxygen,
            SensorKind::Sound => &self.sound,
            SensorKind::GasDetection => &self.gas_detection,
            SensorKind::LocationLat => &self.location_lat,
            SensorKind::LocationLon => &self.location_lon,
        }
    }
}

impl PersistenceConf {
    pub fn utc_offset(&self) -> UtcOffset {
        UtcOffset::from_hms(self.utc_offset_hours, 0, 0).unwrap_or(UtcOffset::UTC)
    }
}

impl NavigationConf {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

impl HealthConf {
    pub fn report_interval(&self) -> Duration {
        Duration::from_secs(self.report_interval_secs.max(1))
    }
}

/// Reads the config file named by `RIG_DASHBOARD_CONFIG`, then applies env overrides.
pub async fn load_config() -> Result<DashboardConfig, ConfigError> {
    let path = std::env::var("RIG_DASHBOARD_CONFIG").unwrap_or_else(|_| "dashboard.yaml".into());
    load_config_from(&path, |key| std::env::var(key).ok()).await
}

/// Missing or empty file means defaults. Only an unreadable or invalid file
/// is an error; a bad override is skipped and the rest of the config kept.
pub async fn load_config_from<F>(path: &str, lookup: F) -> Result<DashboardConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut cfg = if Path::new(path).exists() {
        let txt = fs::read_to_string(path).await?;
        if txt.trim().is_empty() {
            DashboardConfig::default()
        } else {
            serde_yaml::from_str(&txt)?
        }
    } else {
        info!("no {path}, using default config");
        DashboardConfig::default()
    };
    apply_env_overrides(&mut cfg, lookup);
    Ok(cfg)
}

/// Environment overrides, with the lookup injected so tests don't touch the
/// process env. Invalid values leave the field untouched and are returned.
pub fn apply_env_overrides<F>(cfg: &mut DashboardConfig, lookup: F) -> Vec<ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut rejected = Vec::new();
    let mut reject = |key: &str, value: String| {
        warn!("ignoring {key}={value:?}: invalid value");
        rejected.push(ConfigError::InvalidEnv { key: key.into(), value });
    };

    if let Some(host) = lookup("RIG_MQTT_HOST") {
        cfg.mqtt.host = host;
    }
    if let Some(port) = lookup("RIG_MQTT_PORT") {
        match port.trim().parse() {
            Ok(port) => cfg.mqtt.port = port,
            Err(_) => reject("RIG_MQTT_PORT", port),
        }
    }
    if let Some(user) = lookup("RIG_MQTT_USERNAME") {
        cfg.mqtt.username = Some(user);
    }
    if let Some(password) = lookup("RIG_MQTT_PASSWORD") {
        cfg.mqtt.password = Some(password);
    }
    if let Some(target) = lookup("RIG_NAV_TARGET") {
        match target.parse::<Coordinate>() {
            Ok(coordinate) => cfg.navigation.target = Some(coordinate),
            Err(_) => reject("RIG_NAV_TARGET", target),
        }
    }
    rejected
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_match_rig_topics() {
        let cfg = DashboardConfig::default();
        assert_eq!(cfg.mqtt.port, 8883);
        assert!(cfg.mqtt.tls);
        assert!(cfg.mqtt.reconnect.is_none());
        assert_eq!(cfg.topics.topic_for(SensorKind::Oxygen), "SPO2_Data");
        assert_eq!(cfg.topics.topic_for(SensorKind::GasDetection), "MQ2 sensor");
        assert_eq!(cfg.topics.topic_for(SensorKind::Sound), "geluid sensor");
        assert_eq!(cfg.topics.topic_for(SensorKind::Temperature), "temperature sensor");
        assert_eq!(cfg.navigation.speed_kmh, 6.0);
        assert_eq!(cfg.persistence.utc_offset(), UtcOffset::from_hms(2, 0, 0).unwrap());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = r#"
mqtt:
  host: broker.example.org
  reconnect:
    initial_backoff_secs: 1
    max_backoff_secs: 30
topics:
  guidance: rig/guidance
navigation:
  source: gps
  target: { latitude: 51.54, longitude: 5.077 }
"#;
        let cfg: DashboardConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.mqtt.host, "broker.example.org");
        assert_eq!(cfg.mqtt.port, 8883);
        assert_eq!(
            cfg.mqtt.reconnect,
            Some(ReconnectConf { initial_backoff_secs: 1, max_backoff_secs: 30 })
        );
        assert_eq!(cfg.topics.guidance, "rig/guidance");
        assert_eq!(cfg.topics.heartbeat, "heartbeat");
        assert_eq!(cfg.navigation.source, PositionSource::Gps);
        assert_eq!(cfg.navigation.target.map(|t| t.latitude), Some(51.54));
        assert_eq!(cfg.persistence.data_dir, "./data");
        assert_eq!(cfg.persistence.queue_capacity, 1024);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("RIG_MQTT_USERNAME", "rig"),
            ("RIG_MQTT_PASSWORD", "secret"),
            ("RIG_MQTT_PORT", "1883"),
            ("RIG_NAV_TARGET", "51.540,5.077"),
        ]);
        let mut cfg = DashboardConfig::default();
        assert!(apply_env_overrides(&mut cfg, |k| env.get(k).map(|v| v.to_string())).is_empty());
        assert_eq!(cfg.mqtt.username.as_deref(), Some("rig"));
        assert_eq!(cfg.mqtt.password.as_deref(), Some("secret"));
        assert_eq!(cfg.mqtt.port, 1883);
        assert_eq!(cfg.navigation.target, Some(Coordinate { latitude: 51.54, longitude: 5.077 }));

        let mut cfg = DashboardConfig::default();
        let rejected = apply_env_overrides(&mut cfg, |k| (k == "RIG_MQTT_PORT").then(|| "abc".to_string()));
        assert!(matches!(rejected.as_slice(), [ConfigError::InvalidEnv { key, .. }] if key == "RIG_MQTT_PORT"));
        assert_eq!(cfg.mqtt.port, 8883);
    }

    #[tokio::test]
    async fn test_bad_override_keeps_file_settings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dashboard.yaml");
        std::fs::write(
            &path,
            "mqtt:\n  host: broker.example.org\n  username: rig\npersistence:\n  data_dir: /var/lib/rig\n",
        )
        .unwrap();
        let env: HashMap<&str, &str> = HashMap::from([
            ("RIG_NAV_TARGET", "51.54;5.077"),
            ("RIG_MQTT_PORT", "18x3"),
            ("RIG_MQTT_PASSWORD", "secret"),
        ]);

        let cfg = load_config_from(path.to_str().unwrap(), |k| env.get(k).map(|v| v.to_string()))
            .await
            .unwrap();

        assert_eq!(cfg.mqtt.host, "broker.example.org");
        assert_eq!(cfg.mqtt.username.as_deref(), Some("rig"));
        assert_eq!(cfg.mqtt.password.as_deref(), Some("secret"));
        assert_eq!(cfg.mqtt.port, 8883);
        assert_eq!(cfg.persistence.data_dir, "/var/lib/rig");
        assert!(cfg.navigation.target.is_none());
    }

    #[tokio::test]
    async fn test_missing_file_means_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.yaml");
        let cfg = load_config_from(path.to_str().unwrap(), |_| None).await.unwrap();
        assert_eq!(cfg.mqtt.host, "localhost");
    }
}
