//! Error types for the dashboard core.
//!
//! None of these is fatal to the process: the worst outcome of any of them is
//! stale or missing live data.

use std::time::Duration;
use thiserror::Error;

/// Broker unreachable, refused or timed out while establishing the session.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("MQTT transport error: {0}")]
    Transport(#[from] rumqttc::ConnectionError),
    #[error("broker refused the connection: {0}")]
    Refused(String),
    #[error("no CONNACK from broker within {0:?}")]
    Timeout(Duration),
}

#[derive(Debug, Error)]
pub enum SubscriptionError {
    #[error("subscribe request could not be queued: {0}")]
    Client(#[from] rumqttc::ClientError),
    #[error("connection lost while subscribing: {0}")]
    Connection(#[from] rumqttc::ConnectionError),
    #[error("broker rejected subscription to {0:?}")]
    Rejected(Vec<String>),
    #[error("no SUBACK from broker within {0:?}")]
    Timeout(Duration),
}

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("publish to '{topic}' could not be queued: {reason}")]
    Queue { topic: String, reason: String },
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("record {0} not found")]
    NotFound(u64),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config file: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid value for {key}: {value}")]
    InvalidEnv { key: String, value: String },
}

/// Failure reported by a dispatcher observer. Logged, never propagated.
#[derive(Debug, Error)]
pub enum ObserverError {
    #[error("persistence queue closed")]
    QueueClosed,
    #[error("persistence queue full, record dropped")]
    QueueFull,
    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Error, PartialEq)]
pub enum CoordinateError {
    #[error("expected 'latitude,longitude', got '{0}'")]
    Format(String),
    #[error("not a number: '{0}'")]
    Number(String),
    #[error("latitude {0} outside [-90, 90]")]
    Latitude(f64),
    #[error("longitude {0} outside [-180, 180]")]
    Longitude(f64),
}
