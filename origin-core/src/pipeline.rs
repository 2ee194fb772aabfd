//! Region-entry alert pipeline: geofence, novelty, height and heading filters.
//!
//! `handle_snapshot` is the only entry point. It is a pure function of the
//! snapshot, the region, and the caller-owned [`TrackingState`]; the caller
//! dispatches whatever it returns for enrichment.

use std::collections::{HashMap, HashSet};

use tracing::{debug, warn};

use crate::bearing::{bearing, within_tolerance};
use crate::config::RegionConfig;
use crate::types::{Craft, Point, Snapshot};

// ---------------------------------------------------------------------------
// Tracking state
// ---------------------------------------------------------------------------

/// Session-lifetime state mutated by [`handle_snapshot`].
///
/// Both collections only grow; a session is bounded by the idle timeout of
/// whatever drives the pipeline.
#[derive(Debug, Clone, Default)]
pub struct TrackingState {
    /// Hex identifiers already alerted on. Never re-alerted.
    seen: HashSet<String>,
    /// Last observed position per hex, used as the first bearing sample.
    last_points: HashMap<String, Point>,
}

impl TrackingState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seen_count(&self) -> usize {
        self.seen.len()
    }
}

#[cfg(test)]
impl TrackingState {
    fn has_seen(&self, hex: &str) -> bool {
        self.seen.contains(hex)
    }

    fn last_point(&self, hex: &str) -> Option<Point> {
        self.last_points.get(hex).copied()
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Select aircraft newly qualifying for an alert from one snapshot.
///
/// Every returned craft has been added to the seen-set.
pub fn handle_snapshot(
    snapshot: &Snapshot,
    config: &RegionConfig,
    state: &mut TrackingState,
) -> Vec<Craft> {
    let mut crafts: Vec<Craft> = snapshot
        .aircraft
        .iter()
        .filter_map(Craft::from_record)
        .filter(|c| config.contains(c.lat, c.lon))
        .filter(|c| !state.seen.contains(&c.hex))
        .collect();

    if !config.exclude_types.is_empty() {
        crafts.retain(|c| match &c.type_code {
            Some(t) => !config.exclude_types.contains(t),
            None => true,
        });
    }

    if let Some(ceiling) = config.max_height_ft {
        crafts.retain(|c| c.altitude_ft <= ceiling);
    }

    if let Some(target) = config.direction_deg {
        crafts.retain(|c| approaching(c, target, state));
    }

    for craft in &crafts {
        state.seen.insert(craft.hex.clone());
    }

    if !crafts.is_empty() {
        debug!(
            count = crafts.len(),
            seen = state.seen.len(),
            "new aircraft entered region"
        );
    }
    crafts
}

/// Record the current point and test the heading from the previous one.
///
/// A first sighting only stores the baseline and is rejected this round.
fn approaching(craft: &Craft, target: f64, state: &mut TrackingState) -> bool {
    let current = craft.position();
    let Some(previous) = state.last_points.insert(craft.hex.clone(), current) else {
        return false;
    };

    let heading = bearing(previous, current);
    match within_tolerance(target, heading) {
        Ok(ok) => {
            debug!(hex = %craft.hex, heading, target, ok, "heading check");
            ok
        }
        Err(e) => {
            warn!(hex = %craft.hex, "heading check failed: {e}");
            false
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
