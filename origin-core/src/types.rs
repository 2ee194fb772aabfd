//! Shared types, error enum, and snapshot/alert records for origin-core.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use tracing::debug;

/// All errors produced by origin-core.
#[derive(Debug, Error)]
pub enum OriginError {
    #[error("current flight leg contains no points")]
    EmptyLeg,
    #[error("malformed trace: {0}")]
    MalformedTrace(String),
    #[error("tolerance window of ±{tolerance}° around {target}° wraps both ends of the circle")]
    ToleranceWindow { target: f64, tolerance: f64 },
    #[error("config error: {0}")]
    Config(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, OriginError>;

// ---------------------------------------------------------------------------
// Geography
// ---------------------------------------------------------------------------

/// A WGS84 position in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub lat: f64,
    pub lon: f64,
}

impl Point {
    pub fn new(lat: f64, lon: f64) -> Self {
        Point { lat, lon }
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.5},{:.5}", self.lat, self.lon)
    }
}

// ---------------------------------------------------------------------------
// Altitude
// ---------------------------------------------------------------------------

/// Barometric altitude as reported by the feed: feet, or the "ground" sentinel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Altitude {
    Feet(f64),
    Ground,
}

impl Altitude {
    pub fn feet(&self) -> Option<f64> {
        match self {
            Altitude::Feet(ft) => Some(*ft),
            Altitude::Ground => None,
        }
    }
}

impl<'de> Deserialize<'de> for Altitude {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(f64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(ft) => Ok(Altitude::Feet(ft)),
            Raw::Text(s) if s == "ground" => Ok(Altitude::Ground),
            Raw::Text(s) => Err(serde::de::Error::custom(format!(
                "unexpected altitude value: {s}"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Snapshot records
// ---------------------------------------------------------------------------

/// One aircraft entry of a live snapshot. Every field except `hex` may be absent.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AircraftRecord {
    pub hex: String,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lon: Option<f64>,
    #[serde(default)]
    pub alt_baro: Option<Altitude>,
    #[serde(default)]
    pub flight: Option<String>,
    #[serde(default, rename = "r")]
    pub registration: Option<String>,
    #[serde(default, rename = "t")]
    pub type_code: Option<String>,
}

/// A batch of aircraft records received from the feed.
///
/// Records that fail to parse are dropped one by one; the rest of the batch
/// survives.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub now: Option<f64>,
    #[serde(default, deserialize_with = "parseable_records")]
    pub aircraft: Vec<AircraftRecord>,
}

fn parseable_records<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Vec<AircraftRecord>, D::Error> {
    let raw = Vec::<serde_json::Value>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .filter_map(|value| match AircraftRecord::deserialize(&value) {
            Ok(record) => Some(record),
            Err(e) => {
                debug!(record = %value, "dropping malformed aircraft record: {e}");
                None
            }
        })
        .collect())
}

/// An airborne aircraft with a known position, selected for enrichment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Craft {
    pub hex: String,
    pub lat: f64,
    pub lon: f64,
    pub altitude_ft: f64,
    pub flight: Option<String>,
    pub registration: Option<String>,
    pub type_code: Option<String>,
}

impl Craft {
    /// Build from a snapshot record. `None` when altitude or position is missing,
    /// or the aircraft is on the ground.
    pub fn from_record(record: &AircraftRecord) -> Option<Self> {
        let altitude_ft = record.alt_baro?.feet()?;
        Some(Craft {
            hex: record.hex.clone(),
            lat: record.lat?,
            lon: record.lon?,
            altitude_ft,
            flight: record.flight.clone(),
            registration: record.registration.clone(),
            type_code: record.type_code.clone(),
        })
    }

    pub fn position(&self) -> Point {
        Point::new(self.lat, self.lon)
    }

    /// Trimmed callsign, if any.
    pub fn callsign(&self) -> Option<&str> {
        self.flight
            .as_deref()
            .map(str::trim)
            .filter(|cs| !cs.is_empty())
    }
}

// ---------------------------------------------------------------------------
// Alert output
// ---------------------------------------------------------------------------

/// Result of enriching one aircraft, handed to the alert sink.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertRecord {
    pub hex: String,
    pub craft_summary: String,
    pub origin_description: String,
    pub nationality_label: String,
}

impl AlertRecord {
    pub fn new(
        craft: &Craft,
        description: &str,
        origin_description: String,
        nationality_label: String,
    ) -> Self {
        AlertRecord {
            hex: craft.hex.clone(),
            craft_summary: craft_summary(description, craft.registration.as_deref()),
            origin_description,
            nationality_label,
        }
    }

    /// Human-readable alert line, e.g. `Swiss Cessna 172 (HB-CQR) started from ...`.
    pub fn text(&self) -> String {
        if self.nationality_label.is_empty() {
            format!("{} started from {}", self.craft_summary, self.origin_description)
        } else {
            format!(
                "{} {} started from {}",
                self.nationality_label, self.craft_summary, self.origin_description
            )
        }
    }
}

/// `"{desc} ({registration})"`, with `?` standing in for a missing registration.
pub fn craft_summary(description: &str, registration: Option<&str>) -> String {
    format!("{} ({})", description, registration.unwrap_or("?"))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_parse() {
        let json = r#"{
            "now": 1700000000.5,
            "aircraft": [
                {"hex": "4ca7b5", "lat": 51.47, "lon": -0.45, "alt_baro": 3250,
                 "flight": "RYR12AB ", "r": "EI-DWF", "t": "B738"},
                {"hex": "406b90", "lat": 51.47, "lon": -0.46, "alt_baro": "ground"},
                {"hex": "3c6444"}
            ]
        }"#;
        let snapshot: Snapshot = serde_json::from_str(json).unwrap();
        assert_eq!(snapshot.aircraft.len(), 3);
        assert_eq!(snapshot.aircraft[0].alt_baro, Some(Altitude::Feet(3250.0)));
        assert_eq!(snapshot.aircraft[0].registration.as_deref(), Some("EI-DWF"));
        assert_eq!(snapshot.aircraft[1].alt_baro, Some(Altitude::Ground));
        assert!(snapshot.aircraft[2].lat.is_none());
    }

    #[test]
    fn test_snapshot_drops_malformed_records() {
        let json = r#"{
            "aircraft": [
                {"hex": "4ca7b5", "lat": 51.47, "lon": -0.45, "alt_baro": 3250},
                {"hex": "406b90", "lat": 51.47, "lon": -0.46, "alt_baro": "unknown"},
                {"lat": 51.48, "lon": -0.47, "alt_baro": 1200},
                "not a record",
                {"hex": "3c6444", "lat": 51.49, "lon": -0.48, "alt_baro": 5100}
            ]
        }"#;
        let snapshot: Snapshot = serde_json::from_str(json).unwrap();
        let hexes: Vec<&str> = snapshot.aircraft.iter().map(|a| a.hex.as_str()).collect();
        assert_eq!(hexes, vec!["4ca7b5", "3c6444"]);
    }

    #[test]
    fn test_craft_from_record() {
        let record = AircraftRecord {
            hex: "4ca7b5".into(),
            lat: Some(51.0),
            lon: Some(-1.0),
            alt_baro: Some(Altitude::Feet(2000.0)),
            flight: Some("RYR12AB ".into()),
            ..Default::default()
        };
        let craft = Craft::from_record(&record).unwrap();
        assert_eq!(craft.altitude_ft, 2000.0);
        assert_eq!(craft.callsign(), Some("RYR12AB"));
    }

    #[test]
    fn test_craft_rejects_ground_and_missing() {
        let ground = AircraftRecord {
            hex: "a".into(),
            lat: Some(51.0),
            lon: Some(-1.0),
            alt_baro: Some(Altitude::Ground),
            ..Default::default()
        };
        assert!(Craft::from_record(&ground).is_none());

        let no_lon = AircraftRecord {
            hex: "b".into(),
            lat: Some(51.0),
            alt_baro: Some(Altitude::Feet(1000.0)),
            ..Default::default()
        };
        assert!(Craft::from_record(&no_lon).is_none());
    }

    #[test]
    fn test_bad_altitude_string() {
        let result: std::result::Result<Altitude, _> = serde_json::from_str("\"high\"");
        assert!(result.is_err());
    }

    #[test]
    fn test_alert_text() {
        let craft = Craft {
            hex: "4b1805".into(),
            lat: 51.0,
            lon: -1.0,
            altitude_ft: 1500.0,
            flight: None,
            registration: Some("HB-JFI".into()),
            type_code: None,
        };
        let alert = AlertRecord::new(
            &craft,
            "AIRBUS A-340-300",
            "Zurich Airport (ZRH), Switzerland".into(),
            "Swiss".into(),
        );
        assert_eq!(alert.craft_summary, "AIRBUS A-340-300 (HB-JFI)");
        assert_eq!(
            alert.text(),
            "Swiss AIRBUS A-340-300 (HB-JFI) started from Zurich Airport (ZRH), Switzerland"
        );

        let unknown = AlertRecord {
            nationality_label: String::new(),
            ..alert
        };
        assert!(unknown.text().starts_with("AIRBUS"));
    }
}
