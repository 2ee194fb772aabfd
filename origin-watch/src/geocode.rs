//! Reverse geocoder: drives [`GeoLookup`] over a [`SpatialService`].

use std::sync::Arc;

use tracing::debug;

use origin_core::geo::{GeoLookup, GeoResolution, NEARBY_RADIUS_M};
use origin_core::Point;

use crate::error::Result;
use crate::overpass::SpatialService;

pub struct GeoResolver {
    spatial: Arc<dyn SpatialService>,
}

impl GeoResolver {
    pub fn new(spatial: Arc<dyn SpatialService>) -> Self {
        GeoResolver { spatial }
    }

    /// Resolve airport, city, and country for `point`.
    ///
    /// The proximity query only runs when no enclosing aerodrome was found.
    pub async fn resolve(&self, point: Point) -> Result<GeoResolution> {
        let contained = self.spatial.contained(point).await?;
        let mut lookup = GeoLookup::from_contained(contained);

        if lookup.needs_nearby() {
            let nearby = self
                .spatial
                .nearby_aerodromes(point, NEARBY_RADIUS_M)
                .await?;
            debug!(%point, nearby = nearby.len(), "aerodrome proximity fallback");
            lookup.apply_nearby(point, &nearby);
        }

        Ok(lookup.finish())
    }

    /// Comma-joined description, `""` when nothing resolved.
    pub async fn describe(&self, point: Point) -> Result<String> {
        Ok(self.resolve(point).await?.describe())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use origin_core::geo::{GeoElement, SpatialResponse};

    pub(crate) fn fixture(name: &str) -> Vec<GeoElement> {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/testdata/");
        let text = std::fs::read_to_string(format!("{path}{name}")).unwrap();
        serde_json::from_str::<SpatialResponse>(&text).unwrap().tagged()
    }

    /// Serves canned elements and counts proximity queries.
    #[derive(Default)]
    pub(crate) struct StubSpatial {
        pub contained: Vec<GeoElement>,
        pub nearby: Vec<GeoElement>,
        pub nearby_calls: AtomicUsize,
    }

    #[async_trait]
    impl SpatialService for StubSpatial {
        async fn contained(&self, _point: Point) -> Result<Vec<GeoElement>> {
            Ok(self.contained.clone())
        }

        async fn nearby_aerodromes(&self, _point: Point, radius_m: u32) -> Result<Vec<GeoElement>> {
            assert_eq!(radius_m, NEARBY_RADIUS_M);
            self.nearby_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.nearby.clone())
        }
    }

    fn resolver(stub: StubSpatial) -> (GeoResolver, Arc<StubSpatial>) {
        let stub = Arc::new(stub);
        (GeoResolver::new(stub.clone()), stub)
    }

    #[tokio::test]
    async fn test_heathrow_enclosing_aerodrome() {
        let (geo, stub) = resolver(StubSpatial {
            contained: fixture("heathrow_contained.json"),
            ..Default::default()
        });
        let desc = geo.describe(Point::new(51.4703, -0.4737)).await.unwrap();
        assert_eq!(desc, "London Heathrow Airport (LHR), United Kingdom");
        assert_eq!(stub.nearby_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_larnaca_nearby_fallback() {
        let (geo, stub) = resolver(StubSpatial {
            contained: fixture("larnaca_contained.json"),
            nearby: fixture("larnaca_nearby.json"),
            ..Default::default()
        });
        let desc = geo.describe(Point::new(34.88398, 33.63031)).await.unwrap();
        assert_eq!(desc, "Larnaca International Airport (LCA), Cyprus");
        assert_eq!(stub.nearby_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_farnborough_city_from_containment() {
        let (geo, _) = resolver(StubSpatial {
            contained: fixture("farnborough_contained.json"),
            ..Default::default()
        });
        let resolution = geo.resolve(Point::new(51.280746, -0.777569)).await.unwrap();
        assert_eq!(resolution.city_name.as_deref(), Some("Rushmoor"));
        assert_eq!(
            resolution.describe(),
            "Farnborough Airport (FAB), Rushmoor, United Kingdom"
        );
    }

    #[tokio::test]
    async fn test_nothing_resolved_is_empty() {
        let (geo, stub) = resolver(StubSpatial::default());
        let desc = geo.describe(Point::new(0.0, -30.0)).await.unwrap();
        assert_eq!(desc, "");
        assert_eq!(stub.nearby_calls.load(Ordering::SeqCst), 1);
    }
}
