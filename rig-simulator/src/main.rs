//! Publishes synthetic rig readings on the dashboard's default topics and
//! echoes the guidance it gets back. Every tenth tick also sends a malformed
//! heartbeat and a message on an unknown topic.
//!
//! Env: `RIG_MQTT_HOST` (127.0.0.1), `RIG_MQTT_PORT` (1883),
//! `RIG_SIM_INTERVAL_MS` (1000), `RIG_SIM_NOISE` (1, set 0 to disable).

use anyhow::{Context, Result};
use log::{debug, error, info, warn};
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, QoS};
use tokio::time::{interval, sleep, Duration};

const CLIENT_ID: &str = "rig-simulator";
const GUIDANCE_TOPIC: &str = "Gps_guidance";

struct SimConfig {
    host: String,
    port: u16,
    interval: Duration,
    noise: bool,
}

impl SimConfig {
    fn from_env() -> Result<Self> {
        let var = |key: &str| std::env::var(key).ok();
        Ok(Self {
            host: var("RIG_MQTT_HOST").unwrap_or_else(|| "127.0.0.1".into()),
            port: var("RIG_MQTT_PORT")
                .map(|p| p.parse().context("RIG_MQTT_PORT"))
                .transpose()?
                .unwrap_or(1883),
            interval: Duration::from_millis(
                var("RIG_SIM_INTERVAL_MS")
                    .map(|v| v.parse().context("RIG_SIM_INTERVAL_MS"))
                    .transpose()?
                    .unwrap_or(1000),
            ),
            noise: var("RIG_SIM_NOISE").map_or(true, |v| v != "0"),
        })
    }
}

/// One tick worth of (topic, payload) pairs.
fn readings(tick: u64, noise: bool) -> Vec<(&'static str, String)> {
    let t = tick as f64;
    let mut out = vec![
        ("temperature sensor", format!("{:.2}", 36.5 + (t / 7.0).sin() * 0.8)),
        ("heartbeat", format!("{}", 72 + (tick % 11) as i32 - 5)),
        ("SPO2_Data", format!("{}", 96 + (tick % 4) as i32)),
        ("geluid sensor", format!("{:.1}", (t * 37.0) % 360.0)),
        ("MQ2 sensor", format!("{}", u8::from(tick % 15 == 0))),
        ("Gps_sensor_lat", format!("{:.6}", 51.539 + t * 0.000015)),
        ("Gps_sensor_lon", format!("{:.6}", 5.077)),
    ];
    if noise && tick % 10 == 9 {
        out.push(("heartbeat", "abc".into()));
        out.push(("foo/bar", "42".into()));
    }
    out
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let cfg = SimConfig::from_env()?;
    info!("starting rig-simulator against {}:{}", cfg.host, cfg.port);

    let mut mqttoptions = MqttOptions::new(CLIENT_ID, cfg.host.clone(), cfg.port);
    mqttoptions.set_keep_alive(Duration::from_secs(30));
    let (client, mut eventloop) = AsyncClient::new(mqttoptions, 64);

    client.subscribe(GUIDANCE_TOPIC, QoS::AtLeastOnce).await?;

    let publisher = client.clone();
    let noise = cfg.noise;
    let period = cfg.interval;
    tokio::spawn(async move {
        let mut ticker = interval(period);
        let mut tick = 0u64;
        loop {
            ticker.tick().await;
            for (topic, payload) in readings(tick, noise) {
                if let Err(e) = publisher.publish(topic, QoS::AtLeastOnce, false, payload.clone()).await {
                    error!("publish to {topic} failed: {e}");
                } else {
                    debug!("{topic} <- {payload}");
                }
            }
            tick += 1;
        }
    });

    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Incoming::Publish(publish))) => {
                let payload = String::from_utf8_lossy(&publish.payload);
                match publish.topic.as_str() {
                    GUIDANCE_TOPIC => info!("guidance: {payload}"),
                    other => warn!("unexpected topic {other}"),
                }
            }
            Ok(_) => {}
            Err(e) => {
                warn!("MQTT connection error: {e}. Reconnecting...");
                sleep(Duration::from_secs(5)).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noise_every_tenth_tick() {
        assert_eq!(readings(0, true).len(), 7);
        let noisy = readings(9, true);
        assert_eq!(noisy.len(), 9);
        assert!(noisy.contains(&("foo/bar", "42".to_string())));
        assert_eq!(readings(9, false).len(), 7);
    }

    #[test]
    fn test_track_heads_north() {
        let first = readings(0, false);
        let later = readings(100, false);
        let lat = |r: &[(&str, String)]| r[5].1.parse::<f64>().unwrap();
        assert!(lat(&later) > lat(&first));
        assert_eq!(first[6].1, later[6].1);
    }
}
