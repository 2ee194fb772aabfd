//! Trace stitching and current-leg extraction.
//!
//! A trace store keeps two logs per aircraft: a long, coarse `historic` log and
//! a short, fine-grained `recent` one. Each stores point times relative to its
//! own base `timestamp`. Stitching normalizes both to absolute time, drops the
//! historic tail that the recent log already covers, and concatenates them.
//!
//! Point tuple layout: `[dt, lat, lon, alt, gs, track, flags, vrate, details, ...]`
//! where `alt` may be `"ground"` or null and `details` is an object or null.

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::debug;

use crate::types::{Altitude, OriginError, Point, Result};

/// Flag bit marking the first point of a new leg (touch-and-go, tracking restart).
pub const FLAG_NEW_LEG: u32 = 2;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Per-point metadata, present only on some points.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PointDetails {
    #[serde(default)]
    pub flight: Option<String>,
}

/// One trace sample.
#[derive(Debug, Clone, PartialEq)]
pub struct TracePoint {
    /// Seconds; log-relative until normalized.
    pub time: f64,
    pub lat: f64,
    pub lon: f64,
    pub altitude: Option<Altitude>,
    pub ground_speed: Option<f64>,
    pub track: Option<f64>,
    pub flags: u32,
    pub vertical_rate: Option<f64>,
    pub details: Option<PointDetails>,
}

impl TracePoint {
    pub fn new(time: f64, lat: f64, lon: f64) -> Self {
        TracePoint {
            time,
            lat,
            lon,
            altitude: None,
            ground_speed: None,
            track: None,
            flags: 0,
            vertical_rate: None,
            details: None,
        }
    }

    pub fn position(&self) -> Point {
        Point::new(self.lat, self.lon)
    }

    pub fn starts_leg(&self) -> bool {
        self.flags & FLAG_NEW_LEG != 0
    }

    fn from_tuple(tuple: &[Value]) -> std::result::Result<Self, String> {
        let number = |i: usize, name: &str| {
            tuple
                .get(i)
                .and_then(Value::as_f64)
                .ok_or_else(|| format!("point is missing numeric {name} at index {i}"))
        };
        let optional = |i: usize| tuple.get(i).and_then(Value::as_f64);

        let altitude = match tuple.get(3) {
            Some(Value::String(s)) if s == "ground" => Some(Altitude::Ground),
            Some(v) => v.as_f64().map(Altitude::Feet),
            None => None,
        };
        let details = match tuple.get(8) {
            Some(v) if v.is_object() => Some(
                PointDetails::deserialize(v).map_err(|e| format!("bad point details: {e}"))?,
            ),
            _ => None,
        };

        Ok(TracePoint {
            time: number(0, "time")?,
            lat: number(1, "latitude")?,
            lon: number(2, "longitude")?,
            altitude,
            ground_speed: optional(4),
            track: optional(5),
            flags: tuple
                .get(6)
                .and_then(Value::as_u64)
                .and_then(|f| u32::try_from(f).ok())
                .unwrap_or(0),
            vertical_rate: optional(7),
            details,
        })
    }
}

impl<'de> Deserialize<'de> for TracePoint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let tuple = Vec::<Value>::deserialize(deserializer)?;
        TracePoint::from_tuple(&tuple).map_err(serde::de::Error::custom)
    }
}

/// One trace document as served by the trace store.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TraceLog {
    pub timestamp: f64,
    #[serde(default)]
    pub desc: Option<String>,
    #[serde(default)]
    pub trace: Vec<TracePoint>,
}

impl TraceLog {
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| OriginError::MalformedTrace(e.to_string()))
    }

    /// Points with absolute timestamps.
    pub fn normalized(&self) -> Vec<TracePoint> {
        self.trace
            .iter()
            .map(|p| TracePoint {
                time: p.time + self.timestamp,
                ..p.clone()
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Stitching
// ---------------------------------------------------------------------------

/// Merge both logs into one ascending trace without overlapping coverage.
pub fn stitch(historic: &TraceLog, recent: &TraceLog) -> Vec<TracePoint> {
    let mut trace = historic.normalized();
    let recent = recent.normalized();

    if let Some(recent_start) = recent.first().map(|p| p.time) {
        if let Some(cutoff) = trace.iter().position(|p| p.time > recent_start) {
            debug!(cutoff, historic = trace.len(), "truncating historic trace");
            trace.truncate(cutoff);
        }
    }

    trace.extend(recent);
    trace
}

/// The points of the current leg: from the later of the current callsign's
/// first appearance and the most recent new-leg flag, to the end.
pub fn current_leg(trace: &[TracePoint]) -> &[TracePoint] {
    let flight_start = trace
        .iter()
        .rev()
        .find_map(|p| p.details.as_ref())
        .map(|active| {
            trace
                .iter()
                .position(|p| {
                    p.details
                        .as_ref()
                        .is_some_and(|d| d.flight == active.flight)
                })
                .unwrap_or(0)
        })
        .unwrap_or(0);

    let leg_start = trace.iter().rposition(TracePoint::starts_leg).unwrap_or(0);

    debug!(
        len = trace.len(),
        flight_start, leg_start, "current leg boundaries"
    );
    &trace[flight_start.max(leg_start)..]
}

/// Where the aircraft's current leg began.
pub fn find_origin(historic: &TraceLog, recent: &TraceLog) -> Result<Point> {
    let trace = stitch(historic, recent);
    current_leg(&trace)
        .first()
        .map(TracePoint::position)
        .ok_or(OriginError::EmptyLeg)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
