//! Geofence zone lookups (zones are administered elsewhere)

use std::sync::Arc;
use waypost_api::GeofenceZone;
use waypost_store::Store;
use waypost_util::{haversine_distance_meters, validate_point, Result};

pub struct ZoneMatcher {
    store: Arc<dyn Store>,
}

impl ZoneMatcher {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Active zones whose circle contains the point
    pub fn zones_containing(&self, lat: f64, lon: f64) -> Result<Vec<GeofenceZone>> {
        validate_point(lat, lon)?;

        Ok(self
            .store
            .active_geofences()?
            .into_iter()
            .filter(|zone| {
                haversine_distance_meters(lat, lon, zone.latitude, zone.longitude)
                    <= zone.radius_meters
            })
            .collect())
    }
}
