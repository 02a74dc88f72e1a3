//! Raw payload → typed value, per sensor kind.
//!
//! Rejection is a value, not an error: a malformed payload only suppresses
//! that one reading.

use crate::models::{SensorKind, SensorValue};

#[derive(Debug, Clone, PartialEq)]
pub enum ParseResult {
    Rejected,
    Accepted(SensorValue),
}

impl ParseResult {
    pub fn accepted(self) -> Option<SensorValue> {
        match self {
            ParseResult::Accepted(value) => Some(value),
            ParseResult::Rejected => None,
        }
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, ParseResult::Rejected)
    }
}

impl From<Option<SensorValue>> for ParseResult {
    fn from(value: Option<SensorValue>) -> Self {
        value.map_or(ParseResult::Rejected, ParseResult::Accepted)
    }
}

pub fn parse(kind: SensorKind, raw: &str) -> ParseResult {
    let value = match kind {
        SensorKind::Temperature => parse_decimal(raw).map(SensorValue::Temperature),
        SensorKind::Heartbeat => parse_integer(raw).map(SensorValue::Heartbeat),
        SensorKind::Oxygen => parse_integer(raw).map(SensorValue::Oxygen),
        SensorKind::GasDetection => parse_integer(raw).map(SensorValue::GasDetection),
        SensorKind::Sound => parse_decimal(raw).map(SensorValue::Sound),
        SensorKind::LocationLat => Some(SensorValue::LocationLat(raw.to_string())),
        SensorKind::LocationLon => Some(SensorValue::LocationLon(raw.to_string())),
    };
    value.into()
}

/// Dot-decimal float, surrounding whitespace allowed. NaN and infinities are rejected.
pub fn parse_decimal(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Signed 32-bit integer, surrounding whitespace allowed.
pub fn parse_integer(raw: &str) -> Option<i32> {
    raw.trim().parse::<i32>().ok()
}

/// Alert text for kinds that have an alert widget, `None` otherwise or when
/// the payload is not a float. Gas payloads are stored as integers but the
/// alert accepts any float.
pub fn alert(kind: SensorKind, raw: &str) -> Option<String> {
    if kind.has_alert() {
        alert_text(raw)
    } else {
        None
    }
}

/// Alert text for the sound-direction and gas widgets: the payload as a
/// float with two decimals, or `None` so the caller shows no alert at all.
pub fn alert_text(raw: &str) -> Option<String> {
    parse_decimal(raw).map(|v| format!("{v:.2}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temperature_accepts_invariant_decimals() {
        for (raw, expected) in [("21.5", 21.5), ("-3.25", -3.25), (" 37 ", 37.0), ("+0.5", 0.5), ("1e1", 10.0)] {
            match parse(SensorKind::Temperature, raw) {
                ParseResult::Accepted(SensorValue::Temperature(v)) => {
                    assert!((v - expected).abs() < 1e-9, "{raw} -> {v}")
                }
                other => panic!("{raw} gave {other:?}"),
            }
        }
    }

    #[test]
    fn test_temperature_rejects_non_numeric() {
        for raw in ["", "abc", "21,5", "21.5C", "NaN", "inf", "--1"] {
            assert!(parse(SensorKind::Temperature, raw).is_rejected(), "{raw} should be rejected");
        }
    }

    #[test]
    fn test_temperature_decimal_strings_roundtrip_within_tolerance() {
        for i in -500..500 {
            let expected = i as f64 * 0.137;
            let raw = format!("{expected:.3}");
            let parsed = parse_decimal(&raw).unwrap();
            assert!((parsed - raw.parse::<f64>().unwrap()).abs() < 1e-12);
            assert!((parsed - expected).abs() < 1e-3);
        }
    }

    #[test]
    fn test_integer_kinds_are_strict() {
        assert_eq!(parse(SensorKind::Heartbeat, "72"), ParseResult::Accepted(SensorValue::Heartbeat(72)));
        assert_eq!(parse(SensorKind::Oxygen, " 98\n"), ParseResult::Accepted(SensorValue::Oxygen(98)));
        assert_eq!(parse(SensorKind::GasDetection, "-1"), ParseResult::Accepted(SensorValue::GasDetection(-1)));

        assert!(parse(SensorKind::Heartbeat, "abc").is_rejected());
        assert!(parse(SensorKind::Heartbeat, "72.0").is_rejected());
        assert!(parse(SensorKind::Oxygen, "").is_rejected());
        assert!(parse(SensorKind::GasDetection, "99999999999").is_rejected());
    }

    #[test]
    fn test_sound_is_decimal() {
        assert_eq!(parse(SensorKind::Sound, "182.75"), ParseResult::Accepted(SensorValue::Sound(182.75)));
        assert!(parse(SensorKind::Sound, "left").is_rejected());
    }

    #[test]
    fn test_location_stays_opaque() {
        assert_eq!(
            parse(SensorKind::LocationLat, "51.5390"),
            ParseResult::Accepted(SensorValue::LocationLat("51.5390".into()))
        );
        assert_eq!(
            parse(SensorKind::LocationLon, "not-a-number"),
            ParseResult::Accepted(SensorValue::LocationLon("not-a-number".into()))
        );
    }

    #[test]
    fn test_alert_text_two_decimals_or_nothing() {
        assert_eq!(alert_text("3.14159").as_deref(), Some("3.14"));
        assert_eq!(alert_text("400").as_deref(), Some("400.00"));
        assert_eq!(alert_text("high"), None);
        assert_eq!(alert_text(""), None);
    }

    #[test]
    fn test_gas_alert_accepts_floats_the_store_rejects() {
        assert!(parse(SensorKind::GasDetection, "0.75").is_rejected());
        assert_eq!(alert(SensorKind::GasDetection, "0.75").as_deref(), Some("0.75"));
        assert_eq!(alert(SensorKind::GasDetection, "smoke"), None);
        assert_eq!(alert(SensorKind::Sound, "90").as_deref(), Some("90.00"));
        assert_eq!(alert(SensorKind::Heartbeat, "72"), None);
    }
}
