//! Rig dashboard core: MQTT telemetry ingestion, persistence hand-off and
//! navigation guidance for the sensor rig.
//!
//! Data flows one way in (broker → [`mqtt::TransportClient`] →
//! [`pipeline::IngestPipeline`] → [`dispatch::EventDispatcher`] → observers)
//! while the [`navigation::NavigationEngine`] runs on its own tick and
//! publishes guidance back out.

pub mod config;
pub mod dashboard;
pub mod dispatch;
pub mod error;
pub mod health;
pub mod models;
pub mod mqtt;
pub mod navigation;
pub mod parser;
pub mod pipeline;
pub mod ports;
pub mod router;
pub mod state;
