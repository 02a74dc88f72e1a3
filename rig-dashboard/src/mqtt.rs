//! Broker connection: connect, subscribe, inbound delivery loop and the
//! fire-and-forget outbound publish used by navigation and health.

use crate::config::{MqttConf, ReconnectConf};
use crate::error::{ConnectionError, PublishError, SubscriptionError};
use crate::health::PipelineStats;
use crate::router::SubscriptionSet;
use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Packet, Publish, QoS,
    SubscribeFilter, SubscribeReasonCode, Transport,
};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Outbound side. No delivery confirmation reaches the caller.
pub trait Publisher: Send + Sync {
    fn publish(&self, topic: &str, payload: &str) -> Result<(), PublishError>;
}

/// Inbound side, called once per received publish, in wire order.
pub trait MessageHandler: Send + Sync {
    fn on_message(&self, topic: &str, payload: &[u8]);
}

#[derive(Clone)]
pub struct MqttPublisher {
    client: AsyncClient,
}

impl Publisher for MqttPublisher {
    fn publish(&self, topic: &str, payload: &str) -> Result<(), PublishError> {
        self.client
            .try_publish(topic, QoS::AtLeastOnce, false, payload.as_bytes().to_vec())
            .map_err(|e| PublishError::Queue { topic: topic.to_string(), reason: e.to_string() })
    }
}

pub fn mqtt_options(conf: &MqttConf) -> MqttOptions {
    let prefix = match conf.client_id_prefix.trim() {
        "" => "rig-dashboard",
        p => p,
    };
    let client_id = format!("{}-{}", prefix, Uuid::new_v4());

    let mut opts = MqttOptions::new(client_id, &conf.host, conf.port);
    opts.set_keep_alive(conf.keep_alive());
    opts.set_clean_session(true);
    if let Some(user) = &conf.username {
        opts.set_credentials(user, conf.password.clone().unwrap_or_default());
    }
    if conf.tls {
        opts.set_transport(Transport::tls_with_default_config());
    }
    opts
}

/// Doubles the previous delay, starting at the initial one, capped at the max.
pub fn next_backoff(previous: Option<Duration>, policy: &ReconnectConf) -> Duration {
    let max = Duration::from_secs(policy.max_backoff_secs.max(policy.initial_backoff_secs));
    match previous {
        None => Duration::from_secs(policy.initial_backoff_secs),
        Some(prev) => (prev * 2).min(max),
    }
}

pub struct TransportClient {
    client: AsyncClient,
    eventloop: EventLoop,
    ack_timeout: Duration,
    reconnect: Option<ReconnectConf>,
    subscriptions: Option<SubscriptionSet>,
    /// Publishes that arrived while waiting for SUBACK, delivered first by `run`.
    pending: VecDeque<Publish>,
    stats: PipelineStats,
}

impl TransportClient {
    /// Opens the session and waits for CONNACK.
    pub async fn connect(conf: &MqttConf, stats: PipelineStats) -> Result<Self, ConnectionError> {
        let opts = mqtt_options(conf);
        info!(
            "connecting to {}:{} as {} (tls: {})",
            conf.host,
            conf.port,
            opts.client_id(),
            conf.tls
        );
        let (client, mut eventloop) = AsyncClient::new(opts, 64);

        match timeout(conf.connect_timeout(), await_connack(&mut eventloop)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                stats.mark_mqtt_disconnected();
                return Err(e);
            }
            Err(_) => {
                stats.mark_mqtt_disconnected();
                return Err(ConnectionError::Timeout(conf.connect_timeout()));
            }
        }
        stats.mark_mqtt_connected();
        info!("MQTT connected");

        Ok(Self {
            client,
            eventloop,
            ack_timeout: conf.connect_timeout(),
            reconnect: conf.reconnect.clone(),
            subscriptions: None,
            pending: VecDeque::new(),
            stats,
        })
    }

    pub fn publisher(&self) -> MqttPublisher {
        MqttPublisher { client: self.client.clone() }
    }

    /// Subscribes to the whole set and waits for SUBACK. Topics the broker
    /// refused are reported, the accepted ones stay active.
    pub async fn subscribe(&mut self, set: &SubscriptionSet) -> Result<(), SubscriptionError> {
        self.client.subscribe_many(filters(set)).await?;
        self.subscriptions = Some(set.clone());

        let ack_timeout = self.ack_timeout;
        match timeout(ack_timeout, self.await_suback(set)).await {
            Ok(result) => result?,
            Err(_) => return Err(SubscriptionError::Timeout(ack_timeout)),
        }
        info!("subscribed to {} topics: {:?}", set.len(), set.topics());
        Ok(())
    }

    async fn await_suback(&mut self, set: &SubscriptionSet) -> Result<(), SubscriptionError> {
        loop {
            match self.eventloop.poll().await? {
                Event::Incoming(Packet::SubAck(ack)) => {
                    let rejected: Vec<String> = ack
                        .return_codes
                        .iter()
                        .zip(set.entries())
                        .filter(|(code, _)| matches!(code, SubscribeReasonCode::Failure))
                        .map(|(_, (topic, _))| topic.clone())
                        .collect();
                    return if rejected.is_empty() {
                        Ok(())
                    } else {
                        Err(SubscriptionError::Rejected(rejected))
                    };
                }
                Event::Incoming(Packet::Publish(p)) => self.pending.push_back(p),
                _ => {}
            }
        }
    }

    /// Delivery loop. Without a reconnect policy the first connection error
    /// ends the session and is returned; with one, the loop backs off,
    /// reconnects and resubscribes.
    pub async fn run<H: MessageHandler + ?Sized>(mut self, handler: &H) -> Result<(), ConnectionError> {
        while let Some(p) = self.pending.pop_front() {
            handler.on_message(&p.topic, &p.payload[..]);
        }

        let mut backoff: Option<Duration> = None;
        loop {
            match self.eventloop.poll().await {
                Ok(Event::Incoming(Packet::Publish(p))) => {
                    handler.on_message(&p.topic, &p.payload[..]);
                }
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    info!("MQTT reconnected (session present: {})", ack.session_present);
                    self.stats.mark_mqtt_connected();
                    backoff = None;
                    if !ack.session_present {
                        self.resubscribe();
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    self.stats.mark_mqtt_disconnected();
                    let Some(policy) = &self.reconnect else {
                        error!("MQTT connection lost: {e}; reconnect disabled, live data stops");
                        return Err(e.into());
                    };
                    let delay = next_backoff(backoff, policy);
                    backoff = Some(delay);
                    self.stats.increment_reconnects();
                    warn!("MQTT connection lost: {e}; retrying in {delay:?}");
                    sleep(delay).await;
                }
            }
        }
    }

    fn resubscribe(&self) {
        let Some(set) = &self.subscriptions else {
            return;
        };
        match self.client.try_subscribe_many(filters(set)) {
            Ok(()) => debug!("resubscribed to {} topics", set.len()),
            Err(e) => error!("resubscribe failed: {e}"),
        }
    }
}

async fn await_connack(eventloop: &mut EventLoop) -> Result<(), ConnectionError> {
    loop {
        if let Event::Incoming(Packet::ConnAck(ack)) = eventloop.poll().await? {
            return match ack.code {
                ConnectReturnCode::Success => Ok(()),
                code => Err(ConnectionError::Refused(format!("{code:?}"))),
            };
        }
    }
}

fn filters(set: &SubscriptionSet) -> Vec<SubscribeFilter> {
    set.entries()
        .iter()
        .map(|(topic, qos)| SubscribeFilter::new(topic.clone(), *qos))
        .collect()
}
