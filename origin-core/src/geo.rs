//! Reverse-geocoding policy over map elements: airport, city, and country.
//!
//! Containment first: the elements enclosing the point give the country, an
//! enclosing aerodrome, and the city. Only when no enclosing aerodrome exists
//! does the caller run a proximity query for aerodrome nodes, of which the
//! nearest wins. Unresolved parts are omitted from the description.

use std::collections::HashMap;
use std::fmt;

use serde::Deserialize;
use tracing::debug;

use crate::types::Point;

/// Search radius for the aerodrome proximity fallback.
pub const NEARBY_RADIUS_M: u32 = 2000;

/// City lookup order by admin level. Level 6 (county) is a coarse last resort.
const CITY_ADMIN_LEVELS: [&str; 4] = ["7", "8", "9", "6"];

// ---------------------------------------------------------------------------
// Map elements
// ---------------------------------------------------------------------------

/// A map element returned by a spatial query.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct GeoElement {
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lon: Option<f64>,
    #[serde(default)]
    pub tags: Option<HashMap<String, String>>,
}

impl GeoElement {
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.as_ref()?.get(key).map(String::as_str)
    }

    fn tag_count(&self) -> usize {
        self.tags.as_ref().map_or(0, HashMap::len)
    }

    /// English name, falling back to the default name.
    pub fn name(&self) -> Option<&str> {
        self.tag("name:en")
            .filter(|n| !n.is_empty())
            .or_else(|| self.tag("name").filter(|n| !n.is_empty()))
    }

    pub fn is_aerodrome(&self) -> bool {
        self.tag("aerodrome").is_some() || self.tag("aeroway") == Some("aerodrome")
    }

    fn planar_distance(&self, to: Point) -> f64 {
        match (self.lat, self.lon) {
            (Some(lat), Some(lon)) => {
                let dlat = to.lat - lat;
                let dlon = to.lon - lon;
                (dlat * dlat + dlon * dlon).sqrt()
            }
            _ => f64::INFINITY,
        }
    }
}

/// Body of a spatial query response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SpatialResponse {
    #[serde(default)]
    pub elements: Vec<GeoElement>,
}

impl SpatialResponse {
    /// Elements that carry tag data, in query order.
    pub fn tagged(self) -> Vec<GeoElement> {
        self.elements
            .into_iter()
            .filter(|e| e.tags.is_some())
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Selection rules
// ---------------------------------------------------------------------------

/// Country among `admin_level=2` elements: ISO-coded first, then most tags,
/// then query order.
pub fn pick_country(elements: &[GeoElement]) -> Option<&GeoElement> {
    elements
        .iter()
        .filter(|e| e.tag("admin_level") == Some("2"))
        .min_by_key(|e| {
            (
                std::cmp::Reverse(e.tag("ISO3166-1").is_some()),
                std::cmp::Reverse(e.tag_count()),
            )
        })
}

/// Nearest aerodrome to `origin` by planar distance in degrees; query order
/// breaks ties.
pub fn nearest_aerodrome(origin: Point, elements: &[GeoElement]) -> Option<&GeoElement> {
    elements
        .iter()
        .filter(|e| e.is_aerodrome())
        .min_by(|a, b| {
            a.planar_distance(origin)
                .total_cmp(&b.planar_distance(origin))
        })
}

/// Airport display name (with IATA code) and the city it serves.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AirportInfo {
    pub name: Option<String>,
    pub city_served: Option<String>,
}

impl AirportInfo {
    pub fn from_element(airport: &GeoElement) -> Self {
        let iata = airport.tag("iata").filter(|c| !c.is_empty());
        let name = match (airport.name(), iata) {
            (Some(name), Some(code)) => Some(format!("{name} ({code})")),
            (Some(name), None) => Some(name.to_string()),
            (None, Some(code)) => Some(format!("({code})")),
            (None, None) => None,
        };
        AirportInfo {
            name,
            city_served: airport
                .tag("city_served")
                .filter(|c| !c.is_empty())
                .map(String::from),
        }
    }
}

/// City among contained elements: `place=city`, then admin levels 7, 8, 9, 6.
pub fn find_city(elements: &[GeoElement]) -> Option<&GeoElement> {
    elements
        .iter()
        .find(|e| e.tag("place") == Some("city"))
        .or_else(|| {
            CITY_ADMIN_LEVELS.iter().find_map(|level| {
                elements
                    .iter()
                    .find(|e| e.tag("admin_level") == Some(*level))
            })
        })
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// Resolved place names for one coordinate. Any part may be missing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeoResolution {
    pub airport_name: Option<String>,
    pub city_name: Option<String>,
    pub country_name: Option<String>,
}

impl GeoResolution {
    /// Airport, city, country joined with `", "`, skipping missing parts and
    /// any name that contains, or is contained in, one already kept.
    pub fn describe(&self) -> String {
        let mut kept: Vec<&str> = Vec::new();
        let names = [&self.airport_name, &self.city_name, &self.country_name];
        for name in names.into_iter().flatten() {
            let name = name.as_str();
            if kept.iter().any(|k| k.contains(name) || name.contains(*k)) {
                continue;
            }
            kept.push(name);
        }
        kept.join(", ")
    }

    pub fn is_empty(&self) -> bool {
        self.airport_name.is_none() && self.city_name.is_none() && self.country_name.is_none()
    }
}

impl fmt::Display for GeoResolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

/// Resolution in progress after the containment query.
///
/// ```text
/// let mut lookup = GeoLookup::from_contained(contained);
/// if lookup.needs_nearby() {
///     lookup.apply_nearby(origin, &nearby_elements);
/// }
/// let resolution = lookup.finish();
/// ```
#[derive(Debug, Clone)]
pub struct GeoLookup {
    contained: Vec<GeoElement>,
    resolution: GeoResolution,
}

impl GeoLookup {
    /// Resolve what the enclosing elements reveal: country and enclosing airport.
    pub fn from_contained(elements: Vec<GeoElement>) -> Self {
        let contained: Vec<GeoElement> = elements.into_iter().filter(|e| e.tags.is_some()).collect();
        let mut resolution = GeoResolution {
            country_name: pick_country(&contained)
                .and_then(GeoElement::name)
                .map(String::from),
            ..Default::default()
        };

        if let Some(airport) = contained.iter().find(|e| e.is_aerodrome()) {
            let info = AirportInfo::from_element(airport);
            resolution.airport_name = info.name;
            resolution.city_name = info.city_served;
        }

        debug!(
            contained = contained.len(),
            country = ?resolution.country_name,
            airport = ?resolution.airport_name,
            "containment lookup"
        );
        GeoLookup {
            contained,
            resolution,
        }
    }

    /// Whether the proximity fallback should run.
    pub fn needs_nearby(&self) -> bool {
        self.resolution.airport_name.is_none()
    }

    /// Take the nearest aerodrome node from a proximity query.
    pub fn apply_nearby(&mut self, origin: Point, elements: &[GeoElement]) {
        if let Some(airport) = nearest_aerodrome(origin, elements) {
            let info = AirportInfo::from_element(airport);
            debug!(airport = ?info.name, "nearby aerodrome");
            self.resolution.airport_name = info.name;
            self.resolution.city_name = info.city_served;
        }
    }

    /// Fill the city from containment when the airport did not name one.
    pub fn finish(mut self) -> GeoResolution {
        if self.resolution.city_name.is_none() {
            self.resolution.city_name = find_city(&self.contained)
                .and_then(GeoElement::name)
                .map(String::from);
        }
        self.resolution
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
