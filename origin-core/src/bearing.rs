//! Great-circle initial bearing and circular tolerance checks.
//!
//! Inputs are geographic degrees; conversion to radians happens here and
//! nowhere else.

use crate::types::{OriginError, Point, Result};

/// Allowed deviation either side of a target approach bearing.
pub const BEARING_TOLERANCE_DEG: f64 = 20.0;

/// Initial bearing from `from` to `to`, in degrees within `[0, 360)`.
pub fn bearing(from: Point, to: Point) -> f64 {
    let lat1 = from.lat.to_radians();
    let lat2 = to.lat.to_radians();
    let dlon = (to.lon - from.lon).to_radians();

    let y = dlon.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * dlon.cos();
    (y.atan2(x).to_degrees() + 360.0) % 360.0
}

/// Whether `actual` lies within ±[`BEARING_TOLERANCE_DEG`] of `target` (inclusive).
pub fn within_tolerance(target: f64, actual: f64) -> Result<bool> {
    within(target, actual, BEARING_TOLERANCE_DEG)
}

/// Inclusive circular window check `[target - tolerance, target + tolerance] mod 360`.
///
/// A window that spills past both 0° and 360° can only arise from a tolerance
/// of 180° or more and is reported as [`OriginError::ToleranceWindow`].
pub fn within(target: f64, actual: f64, tolerance: f64) -> Result<bool> {
    let min = target - tolerance;
    let max = target + tolerance;

    match (min < 0.0, max > 360.0) {
        (false, false) => Ok(actual >= min && actual <= max),
        (true, false) => Ok(actual >= min + 360.0 || actual <= max),
        (false, true) => Ok(actual >= min || actual <= max - 360.0),
        (true, true) => Err(OriginError::ToleranceWindow { target, tolerance }),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
