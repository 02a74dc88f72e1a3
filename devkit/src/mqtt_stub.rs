/*!
Mock MQTT client for running the rig pipeline without a broker.

Records every outbound publish (guidance, health) and lets tests inject
inbound sensor messages, either straight into a handler or through a channel.
*/

use anyhow::Result;
use parking_lot::Mutex;
use rig_dashboard::config::TopicsConf;
use rig_dashboard::error::PublishError;
use rig_dashboard::models::SensorKind;
use rig_dashboard::mqtt::{MessageHandler, Publisher};
use rig_dashboard::router::SubscriptionSet;
use rumqttc::QoS;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq)]
pub struct MockMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QoS,
    pub retain: bool,
}

impl MockMessage {
    pub fn payload_str(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

/// Stand-in for the broker session: a [`Publisher`] that records, plus an
/// inbound side for simulated sensor traffic.
#[derive(Clone, Default)]
pub struct MockMqttClient {
    published_messages: Arc<Mutex<Vec<MockMessage>>>,
    subscriptions: Arc<Mutex<Vec<(String, QoS)>>>,
    message_sender: Arc<Mutex<Option<mpsc::UnboundedSender<MockMessage>>>>,
    failing: Arc<AtomicBool>,
}

impl MockMqttClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Channel receiving everything passed to `simulate_incoming`.
    pub fn setup_receiver(&self) -> mpsc::UnboundedReceiver<MockMessage> {
        let (sender, receiver) = mpsc::unbounded_channel();
        *self.message_sender.lock() = Some(sender);
        receiver
    }

    /// While set, every publish fails like a full client queue.
    pub fn fail_publishes(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn subscribe(&self, set: &SubscriptionSet) {
        let mut subscriptions = self.subscriptions.lock();
        for entry in set.entries() {
            subscriptions.push(entry.clone());
        }
        info!("[mock] subscribed to {} topics", set.len());
    }

    /// Queues an inbound message on the receiver channel, if one is set up.
    pub fn simulate_incoming<S, V>(&self, topic: S, payload: V) -> Result<()>
    where
        S: Into<String>,
        V: Into<Vec<u8>>,
    {
        let message = MockMessage {
            topic: topic.into(),
            payload: payload.into(),
            qos: QoS::AtLeastOnce,
            retain: false,
        };
        if let Some(sender) = self.message_sender.lock().as_ref() {
            sender.send(message.clone()).map_err(|e| anyhow::anyhow!("send error: {e}"))?;
        }
        debug!("[mock] simulated incoming on {}", message.topic);
        Ok(())
    }

    /// Delivers an inbound message straight to a handler, as the transport loop would.
    pub fn deliver<H: MessageHandler + ?Sized>(&self, handler: &H, topic: &str, payload: &[u8]) {
        debug!("[mock] delivering {} bytes on {topic}", payload.len());
        handler.on_message(topic, payload);
    }

    /// Forwards everything from `receiver` to `handler` until the channel closes.
    pub async fn pump<H: MessageHandler + ?Sized>(
        &self,
        mut receiver: mpsc::UnboundedReceiver<MockMessage>,
        handler: &H,
    ) {
        while let Some(message) = receiver.recv().await {
            handler.on_message(&message.topic, &message.payload);
        }
    }

    pub fn get_published_messages(&self) -> Vec<MockMessage> {
        self.published_messages.lock().clone()
    }

    pub fn get_subscriptions(&self) -> Vec<String> {
        self.subscriptions.lock().iter().map(|(t, _)| t.clone()).collect()
    }

    pub fn find_messages_by_topic(&self, topic: &str) -> Vec<MockMessage> {
        self.published_messages
            .lock()
            .iter()
            .filter(|msg| msg.topic == topic)
            .cloned()
            .collect()
    }

    /// Payloads published on `topic`, as text, in publish order.
    pub fn payloads_on(&self, topic: &str) -> Vec<String> {
        self.find_messages_by_topic(topic).iter().map(MockMessage::payload_str).collect()
    }

    pub fn get_last_json_message<T>(&self, topic: &str) -> Result<Option<T>>
    where
        T: for<'de> serde::Deserialize<'de>,
    {
        match self.find_messages_by_topic(topic).last() {
            Some(last) => Ok(Some(serde_json::from_slice(&last.payload)?)),
            None => Ok(None),
        }
    }

    pub fn clear(&self) {
        self.published_messages.lock().clear();
        self.subscriptions.lock().clear();
    }
}

impl Publisher for MockMqttClient {
    fn publish(&self, topic: &str, payload: &str) -> Result<(), PublishError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(PublishError::Queue { topic: topic.to_string(), reason: "mock queue full".into() });
        }
        self.published_messages.lock().push(MockMessage {
            topic: topic.to_string(),
            payload: payload.as_bytes().to_vec(),
            qos: QoS::AtLeastOnce,
            retain: false,
        });
        debug!("[mock] published to {topic}: {payload}");
        Ok(())
    }
}

/// Builds (topic, payload) pairs the way the rig firmware sends them.
#[derive(Debug, Clone, Default)]
pub struct SensorMessageBuilder {
    topics: TopicsConf,
}

impl SensorMessageBuilder {
    pub fn new(topics: TopicsConf) -> Self {
        Self { topics }
    }

    pub fn raw(&self, kind: SensorKind, payload: &str) -> (String, Vec<u8>) {
        (self.topics.topic_for(kind).to_string(), payload.as_bytes().to_vec())
    }

    pub fn temperature(&self, celsius: f64) -> (String, Vec<u8>) {
        self.raw(SensorKind::Temperature, &celsius.to_string())
    }

    pub fn heartbeat(&self, bpm: i32) -> (String, Vec<u8>) {
        self.raw(SensorKind::Heartbeat, &bpm.to_string())
    }

    pub fn oxygen(&self, percent: i32) -> (String, Vec<u8>) {
        self.raw(SensorKind::Oxygen, &percent.to_string())
    }

    pub fn sound(&self, direction: f64) -> (String, Vec<u8>) {
        self.raw(SensorKind::Sound, &direction.to_string())
    }

    pub fn gas(&self, level: i32) -> (String, Vec<u8>) {
        self.raw(SensorKind::GasDetection, &level.to_string())
    }

    /// Latitude then longitude, as two messages.
    pub fn gps(&self, latitude: f64, longitude: f64) -> [(String, Vec<u8>); 2] {
        [
            self.raw(SensorKind::LocationLat, &latitude.to_string()),
            self.raw(SensorKind::LocationLon, &longitude.to_string()),
        ]
    }
}
