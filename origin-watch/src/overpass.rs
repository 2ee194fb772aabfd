//! Overpass API client for containment and nearby-aerodrome queries.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use origin_core::geo::{GeoElement, SpatialResponse};
use origin_core::Point;

use crate::error::{with_timeout, Result, WatchError};

/// Spatial queries backing the reverse geocoder.
#[async_trait]
pub trait SpatialService: Send + Sync {
    /// Tagged areas (ways and relations) enclosing `point`.
    async fn contained(&self, point: Point) -> Result<Vec<GeoElement>>;

    /// Aerodrome nodes within `radius_m` of `point`, with coordinates.
    async fn nearby_aerodromes(&self, point: Point, radius_m: u32) -> Result<Vec<GeoElement>>;
}

pub fn containment_query(point: Point) -> String {
    format!(
        "[timeout:10][out:json];\n\
         is_in({lat},{lon})->.a;\n\
         way(pivot.a);\n\
         out tags;\n\
         relation(pivot.a);\n\
         out tags;",
        lat = point.lat,
        lon = point.lon,
    )
}

pub fn nearby_query(point: Point, radius_m: u32) -> String {
    format!(
        "[timeout:10][out:json];\n\
         node(around:{radius_m},{lat},{lon})->.nearby;\n\
         (\n  node.nearby[aeroway=aerodrome];\n  node.nearby[aerodrome];\n)->.nearbyAirports;\n\
         .nearbyAirports out meta;",
        lat = point.lat,
        lon = point.lon,
    )
}

#[derive(Clone)]
pub struct OverpassClient {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl OverpassClient {
    pub fn new(client: reqwest::Client, url: &str, timeout: Duration) -> Self {
        OverpassClient {
            client,
            url: url.to_string(),
            timeout,
        }
    }

    async fn query(&self, what: &str, query: String) -> Result<Vec<GeoElement>> {
        with_timeout(what, self.timeout, async {
            let response = self.client.post(&self.url).body(query).send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(WatchError::Status {
                    what: what.to_string(),
                    status,
                });
            }
            let body: SpatialResponse = serde_json::from_str(&response.text().await?)?;
            let elements = body.tagged();
            debug!(what, elements = elements.len(), "overpass response");
            Ok(elements)
        })
        .await
    }
}

#[async_trait]
impl SpatialService for OverpassClient {
    async fn contained(&self, point: Point) -> Result<Vec<GeoElement>> {
        self.query("overpass is_in", containment_query(point)).await
    }

    async fn nearby_aerodromes(&self, point: Point, radius_m: u32) -> Result<Vec<GeoElement>> {
        self.query("overpass around", nearby_query(point, radius_m))
            .await
    }
}
