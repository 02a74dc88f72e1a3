use crate::error::CoordinateError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use time::macros::format_description;
use time::{OffsetDateTime, UtcOffset};

/// Sensor kinds the rig reports, one inbound topic each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorKind {
    Temperature,
    Heartbeat,
    Oxygen,
    Sound,
    GasDetection,
    LocationLat,
    LocationLon,
}

impl SensorKind {
    pub const ALL: [SensorKind; 7] = [
        SensorKind::Temperature,
        SensorKind::Heartbeat,
        SensorKind::Oxygen,
        SensorKind::Sound,
        SensorKind::GasDetection,
        SensorKind::LocationLat,
        SensorKind::LocationLon,
    ];

    /// Location halves go to the position-fix table, everything else is a sensor sample.
    pub fn is_location(self) -> bool {
        matches!(self, SensorKind::LocationLat | SensorKind::LocationLon)
    }

    /// Kinds with a UI alert widget (sound direction, gas).
    pub fn has_alert(self) -> bool {
        matches!(self, SensorKind::Sound | SensorKind::GasDetection)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SensorKind::Temperature => "temperature",
            SensorKind::Heartbeat => "heartbeat",
            SensorKind::Oxygen => "oxygen",
            SensorKind::Sound => "sound",
            SensorKind::GasDetection => "gas_detection",
            SensorKind::LocationLat => "location_lat",
            SensorKind::LocationLon => "location_lon",
        }
    }
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validated value of a single reading.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum SensorValue {
    Temperature(f64),
    Heartbeat(i32),
    Oxygen(i32),
    /// Sound direction in degrees as reported by the microphone array.
    Sound(f64),
    GasDetection(i32),
    /// GPS halves stay opaque strings until the navigation/persistence boundary.
    LocationLat(String),
    LocationLon(String),
}

impl SensorValue {
    pub fn kind(&self) -> SensorKind {
        match self {
            SensorValue::Temperature(_) => SensorKind::Temperature,
            SensorValue::Heartbeat(_) => SensorKind::Heartbeat,
            SensorValue::Oxygen(_) => SensorKind::Oxygen,
            SensorValue::Sound(_) => SensorKind::Sound,
            SensorValue::GasDetection(_) => SensorKind::GasDetection,
            SensorValue::LocationLat(_) => SensorKind::LocationLat,
            SensorValue::LocationLon(_) => SensorKind::LocationLon,
        }
    }
}

/// One inbound message after routing and parsing.
///
/// `value` is `None` when parsing rejected the payload; the raw payload is
/// kept either way for diagnostics.
#[derive(Debug, Clone)]
pub struct Reading {
    pub kind: SensorKind,
    pub raw_payload: String,
    pub value: Option<SensorValue>,
    pub received_at: OffsetDateTime,
}

impl Reading {
    /// Accepted readings become dispatchable events, rejected ones vanish here.
    pub fn into_event(self) -> Option<SensorEvent> {
        let value = self.value?;
        Some(SensorEvent {
            value,
            raw_payload: self.raw_payload,
            received_at: self.received_at,
        })
    }
}

/// An accepted reading as handed to dispatcher observers.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorEvent {
    pub value: SensorValue,
    pub raw_payload: String,
    pub received_at: OffsetDateTime,
}

impl SensorEvent {
    pub fn kind(&self) -> SensorKind {
        self.value.kind()
    }
}

/// UI alert derived from the raw payload, independent of whether the
/// reading itself was accepted for storage.
#[derive(Debug, Clone, PartialEq)]
pub struct AlertEvent {
    pub kind: SensorKind,
    /// Payload as a float with two decimals.
    pub text: String,
    pub raw_payload: String,
    pub received_at: OffsetDateTime,
}

/// Latitude/longitude pair in degrees. Used for both the current position and the target.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, CoordinateError> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(CoordinateError::Latitude(latitude));
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(CoordinateError::Longitude(longitude));
        }
        Ok(Self { latitude, longitude })
    }
}

/// Parses a designation of the form `"51.540,5.077"` (dot decimal separator).
impl FromStr for Coordinate {
    type Err = CoordinateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (lat, lon) = s
            .split_once(',')
            .ok_or_else(|| CoordinateError::Format(s.to_string()))?;
        let parse = |part: &str| {
            part.trim()
                .parse::<f64>()
                .map_err(|_| CoordinateError::Number(part.trim().to_string()))
        };
        Coordinate::new(parse(lat)?, parse(lon)?)
    }
}

/// Distance and initial bearing from the current position to the target.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Guidance {
    #[serde(rename = "distanceKm")]
    pub distance_km: f64,
    #[serde(rename = "bearingDegrees")]
    pub bearing_degrees: f64,
}

impl Guidance {
    /// Wire form `"<distance:.2>,<bearing:.1>"`, e.g. `"3.42,128.7"`.
    pub fn to_payload(&self) -> String {
        // 359.96 must not print as "360.0"
        let mut bearing = (self.bearing_degrees * 10.0).round() / 10.0;
        if bearing >= 360.0 {
            bearing = 0.0;
        }
        format!("{:.2},{:.1}", self.distance_km, bearing)
    }
}

/// Row handed to the store for sensor kinds. Exactly one value field is populated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SensorSample {
    #[serde(default)]
    pub id: Option<u64>,
    pub timestamp: String,
    pub temperature: Option<f64>,
    pub heartbeat: Option<i32>,
    pub oxygen: Option<i32>,
    pub direction: Option<f64>,
    pub gas: Option<i32>,
}

impl SensorSample {
    /// Builds the sample for a sensor value; `None` for location halves.
    pub fn from_value(value: &SensorValue, timestamp: String) -> Option<Self> {
        let mut sample = SensorSample { timestamp, ..Default::default() };
        match value {
            SensorValue::Temperature(v) => sample.temperature = Some(*v),
            SensorValue::Heartbeat(v) => sample.heartbeat = Some(*v),
            SensorValue::Oxygen(v) => sample.oxygen = Some(*v),
            SensorValue::Sound(v) => sample.direction = Some(*v),
            SensorValue::GasDetection(v) => sample.gas = Some(*v),
            SensorValue::LocationLat(_) | SensorValue::LocationLon(_) => return None,
        }
        Some(sample)
    }
}

/// Row handed to the store for GPS halves. Lat and lon arrive on separate topics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PositionFix {
    #[serde(default)]
    pub id: Option<u64>,
    pub timestamp: String,
    pub latitude: Option<String>,
    pub longitude: Option<String>,
}

impl PositionFix {
    pub fn from_value(value: &SensorValue, timestamp: String) -> Option<Self> {
        match value {
            SensorValue::LocationLat(lat) => Some(PositionFix {
                timestamp,
                latitude: Some(lat.clone()),
                ..Default::default()
            }),
            SensorValue::LocationLon(lon) => Some(PositionFix {
                timestamp,
                longitude: Some(lon.clone()),
                ..Default::default()
            }),
            _ => None,
        }
    }
}

/// `yyyy-MM-dd HH:mm:ss` in the configured local offset, as the store keys rows.
pub fn storage_timestamp(at: OffsetDateTime, offset: UtcOffset) -> String {
    let format = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    at.to_offset(offset)
        .format(&format)
        .unwrap_or_else(|_| at.unix_timestamp().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::{datetime, offset};

    #[test]
    fn test_coordinate_from_designation() {
        let c: Coordinate = "51.540,5.077".parse().unwrap();
        assert_eq!(c.latitude, 51.540);
        assert_eq!(c.longitude, 5.077);

        let c: Coordinate = " -33.5 , 151.25 ".parse().unwrap();
        assert_eq!(c.latitude, -33.5);

        assert!(matches!("51,5".parse::<Coordinate>(), Ok(_)));
        assert_eq!("51.5".parse::<Coordinate>(), Err(CoordinateError::Format("51.5".into())));
        assert_eq!("51,5;3".parse::<Coordinate>(), Err(CoordinateError::Number("5;3".into())));
        assert_eq!("91,5".parse::<Coordinate>(), Err(CoordinateError::Latitude(91.0)));
        assert_eq!("0,-181".parse::<Coordinate>(), Err(CoordinateError::Longitude(-181.0)));
    }

    #[test]
    fn test_guidance_payload_format() {
        let g = Guidance { distance_km: 3.4249, bearing_degrees: 128.66 };
        assert_eq!(g.to_payload(), "3.42,128.7");

        let g = Guidance { distance_km: 0.111, bearing_degrees: 0.0 };
        assert_eq!(g.to_payload(), "0.11,0.0");

        let g = Guidance { distance_km: 1.0, bearing_degrees: 359.97 };
        assert_eq!(g.to_payload(), "1.00,0.0");
    }

    #[test]
    fn test_storage_timestamp_applies_offset() {
        let at = datetime!(2025-06-10 21:30:05 UTC);
        assert_eq!(storage_timestamp(at, offset!(+2)), "2025-06-10 23:30:05");
        assert_eq!(storage_timestamp(at, offset!(+3)), "2025-06-11 00:30:05");
    }

    #[test]
    fn test_sample_populates_single_field() {
        let s = SensorSample::from_value(&SensorValue::Heartbeat(72), "t".into()).unwrap();
        assert_eq!(s.heartbeat, Some(72));
        assert!(s.temperature.is_none() && s.oxygen.is_none() && s.gas.is_none());

        assert!(SensorSample::from_value(&SensorValue::LocationLat("51.5".into()), "t".into()).is_none());

        let fix = PositionFix::from_value(&SensorValue::LocationLon("5.07".into()), "t".into()).unwrap();
        assert_eq!(fix.longitude.as_deref(), Some("5.07"));
        assert!(fix.latitude.is_none());
    }
}
