/*!
# Rig DevKit - test support for the rig dashboard

- Mock MQTT client recording outbound publishes and injecting sensor traffic
- In-memory telemetry store with failure injection
- Payload builders for every sensor topic
- A harness wiring the full pipeline without a broker
*/

pub mod memory_store;
pub mod mqtt_stub;
pub mod test_utils;

pub use memory_store::MemoryStore;
pub use mqtt_stub::{MockMqttClient, SensorMessageBuilder};
pub use test_utils::{HarnessOptions, TestHarness};
