//! origin-core: Pure filtering + enrichment policy for region-entry alerts.
//!
//! No async and no I/O beyond config and prefix-table files. Just algorithms.
//! `origin-watch` supplies the feed, trace, and spatial-query clients and
//! drives the pipeline.

pub mod bearing;
pub mod config;
pub mod geo;
pub mod pipeline;
pub mod prefixes;
pub mod registration;
pub mod trace;
pub mod types;

// Re-export commonly used types at crate root
pub use bearing::{bearing, within, within_tolerance};
pub use geo::{GeoLookup, GeoResolution};
pub use pipeline::{handle_snapshot, TrackingState};
pub use registration::{nationality_for, PrefixEntry, PrefixTable};
pub use trace::{current_leg, find_origin, stitch, TraceLog};
pub use types::*;
