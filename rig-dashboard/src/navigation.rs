//! Navigation guidance.
//!
//! The engine owns the current position and the operator's target behind a
//! single mutex, so a designation and a position update never interleave and
//! a computation always reads a consistent pair. Every position update while
//! a target is set produces a `"<km:.2>,<deg:.1>"` message on the guidance
//! topic.
//!
//! Position updates come either from the simulated track (fixed speed, due
//! north) or from GPS readings assembled by [`GpsFixObserver`]; both go
//! through [`NavigationEngine::update_position`] or
//! [`NavigationEngine::advance`].

use crate::dispatch::Observer;
use crate::error::ObserverError;
use crate::health::PipelineStats;
use crate::models::{Coordinate, Guidance, SensorEvent, SensorValue};
use crate::mqtt::Publisher;
use crate::parser::parse_decimal;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{self, JoinHandle};
use tracing::{debug, info, warn};

pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Length of one degree of latitude used to turn metres travelled into degrees.
pub const METERS_PER_DEGREE_LATITUDE: f64 = 111_132.954;

/// Great-circle distance in km (haversine).
pub fn haversine_km(from: Coordinate, to: Coordinate) -> f64 {
    let lat1 = from.latitude.to_radians();
    let lat2 = to.latitude.to_radians();
    let dlat = lat2 - lat1;
    let dlon = (to.longitude - from.longitude).to_radians();

    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_KM * c
}

/// Initial bearing (forward azimuth) in degrees, normalized to [0, 360).
pub fn initial_bearing_deg(from: Coordinate, to: Coordinate) -> f64 {
    let lat1 = from.latitude.to_radians();
    let lat2 = to.latitude.to_radians();
    let dlon = (to.longitude - from.longitude).to_radians();

    let y = dlon.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * dlon.cos();
    let bearing = (y.atan2(x).to_degrees() + 360.0) % 360.0;
    if bearing >= 360.0 {
        0.0
    } else {
        bearing
    }
}

pub fn compute_guidance(position: Coordinate, target: Coordinate) -> Guidance {
    Guidance {
        distance_km: haversine_km(position, target),
        bearing_degrees: initial_bearing_deg(position, target),
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NavigationState {
    /// No target designated yet: ticks compute nothing.
    Idle,
    Tracking { target: Coordinate },
}

#[derive(Debug)]
struct NavState {
    position: Coordinate,
    target: Option<Coordinate>,
}

pub struct NavigationEngine {
    state: Mutex<NavState>,
    publisher: Arc<dyn Publisher>,
    guidance_topic: String,
    stats: PipelineStats,
}

impl NavigationEngine {
    pub fn new(
        start: Coordinate,
        publisher: Arc<dyn Publisher>,
        guidance_topic: impl Into<String>,
        stats: PipelineStats,
    ) -> Self {
        Self {
            state: Mutex::new(NavState { position: start, target: None }),
            publisher,
            guidance_topic: guidance_topic.into(),
            stats,
        }
    }

    /// Sets or overwrites the target. There is no way back to idle.
    pub fn designate(&self, target: Coordinate) {
        let previous = self.state.lock().target.replace(target);
        match previous {
            None => info!("navigation target set to {:.6},{:.6}", target.latitude, target.longitude),
            Some(_) => info!("navigation target moved to {:.6},{:.6}", target.latitude, target.longitude),
        }
    }

    pub fn state(&self) -> NavigationState {
        match self.state.lock().target {
            None => NavigationState::Idle,
            Some(target) => NavigationState::Tracking { target },
        }
    }

    pub fn position(&self) -> Coordinate {
        self.state.lock().position
    }

    /// Replaces the position (real GPS fix) and emits guidance if tracking.
    pub fn update_position(&self, position: Coordinate) -> Option<Guidance> {
        let target = {
            let mut state = self.state.lock();
            state.position = position;
            state.target
        };
        self.guide(position, target)
    }

    /// Moves the position north by `latitude_step` degrees (simulated tick)
    /// and emits guidance if tracking. The track stops at the pole.
    pub fn advance(&self, latitude_step: f64) -> Option<Guidance> {
        let (position, target) = {
            let mut state = self.state.lock();
            state.position.latitude = (state.position.latitude + latitude_step).clamp(-90.0, 90.0);
            (state.position, state.target)
        };
        self.guide(position, target)
    }

    /// Recomputes from the current pair without moving.
    pub fn tick(&self) -> Option<Guidance> {
        let (position, target) = {
            let state = self.state.lock();
            (state.position, state.target)
        };
        self.guide(position, target)
    }

    fn guide(&self, position: Coordinate, target: Option<Coordinate>) -> Option<Guidance> {
        let target = target?;
        let guidance = compute_guidance(position, target);
        let payload = guidance.to_payload();
        match self.publisher.publish(&self.guidance_topic, &payload) {
            Ok(()) => {
                self.stats.record_guidance_published();
                debug!("guidance {payload} -> {}", self.guidance_topic);
            }
            Err(e) => {
                self.stats.record_publish_error();
                warn!("guidance not published: {e}");
            }
        }
        Some(guidance)
    }
}

/// Constant-speed track heading due north, one step per interval.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulatedTrack {
    pub speed_kmh: f64,
    pub interval: Duration,
}

impl SimulatedTrack {
    pub fn latitude_step(&self) -> f64 {
        (self.speed_kmh * 1000.0 / 3600.0 * self.interval.as_secs_f64()) / METERS_PER_DEGREE_LATITUDE
    }
}

pub fn spawn_simulation(engine: Arc<NavigationEngine>, track: SimulatedTrack) -> JoinHandle<()> {
    task::spawn(async move {
        info!(
            "simulated track: {} km/h due north, step {:?}",
            track.speed_kmh, track.interval
        );
        let step = track.latitude_step();
        let mut interval = tokio::time::interval(track.interval);
        interval.tick().await;
        loop {
            interval.tick().await;
            engine.advance(step);
        }
    })
}

#[derive(Debug, Default)]
struct PendingFix {
    latitude: Option<f64>,
    longitude: Option<f64>,
}

/// Pairs `LocationLat`/`LocationLon` readings into position fixes for the
/// engine. A fix is formed once both halves have arrived since the last one;
/// a newer half replaces an unpaired older one.
pub struct GpsFixObserver {
    engine: Arc<NavigationEngine>,
    pending: Mutex<PendingFix>,
}

impl GpsFixObserver {
    pub fn new(engine: Arc<NavigationEngine>) -> Self {
        Self { engine, pending: Mutex::new(PendingFix::default()) }
    }
}

impl Observer for GpsFixObserver {
    fn name(&self) -> &str {
        "gps-fix"
    }

    fn on_event(&self, event: &SensorEvent) -> Result<(), ObserverError> {
        let fix = {
            let mut pending = self.pending.lock();
            match &event.value {
                SensorValue::LocationLat(raw) => {
                    pending.latitude = Some(
                        parse_decimal(raw)
                            .ok_or_else(|| ObserverError::Other(format!("invalid latitude '{raw}'")))?,
                    );
                }
                SensorValue::LocationLon(raw) => {
                    pending.longitude = Some(
                        parse_decimal(raw)
                            .ok_or_else(|| ObserverError::Other(format!("invalid longitude '{raw}'")))?,
                    );
                }
                _ => return Ok(()),
            }
            match (pending.latitude, pending.longitude) {
                (Some(lat), Some(lon)) => {
                    *pending = PendingFix::default();
                    Some((lat, lon))
                }
                _ => None,
            }
        };

        if let Some((lat, lon)) = fix {
            let position = Coordinate::new(lat, lon).map_err(|e| ObserverError::Other(e.to_string()))?;
            self.engine.update_position(position);
        }
        Ok(())
    }
}
