//! Hotspot matching
//!
//! Hotspots are learned incrementally: each observation either lands inside
//! an existing hotspot of the same category (and counts as a visit) or seeds
//! a new one.

use std::cmp::Ordering;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info};
use waypost_api::{Hotspot, LocationType, NewHotspot};
use waypost_config::HotspotSettings;
use waypost_store::Store;
use waypost_util::{
    haversine_distance_meters, validate_point, validate_radius, BoundingBox, DriverId, HotspotId,
    Result,
};

/// Find-or-create and nearby lookups over stored hotspots
pub struct HotspotEngine {
    store: Arc<dyn Store>,
    settings: HotspotSettings,
    /// Serializes the search-then-create sequence so two observers of a new
    /// place cannot both create it
    create_lock: Mutex<()>,
}

impl HotspotEngine {
    pub fn new(store: Arc<dyn Store>, settings: HotspotSettings) -> Self {
        Self {
            store,
            settings,
            create_lock: Mutex::new(()),
        }
    }

    pub fn settings(&self) -> &HotspotSettings {
        &self.settings
    }

    /// Match an observation against same-category hotspots within
    /// `radius_meters`, or create a new hotspot there.
    ///
    /// Among several matches the most visited one wins. Returns the hotspot
    /// and whether it was created.
    pub fn find_or_create(
        &self,
        lat: f64,
        lon: f64,
        location_type: LocationType,
        radius_meters: f64,
        driver_id: Option<&DriverId>,
    ) -> Result<(Hotspot, bool)> {
        validate_point(lat, lon)?;
        validate_radius(radius_meters)?;

        let _guard = self.create_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let bounds = BoundingBox::around(lat, lon, radius_meters);
        let best = self
            .store
            .hotspots_in_bounds(&bounds, Some(location_type))?
            .into_iter()
            .map(|h| {
                let distance = haversine_distance_meters(lat, lon, h.latitude, h.longitude);
                (h, distance)
            })
            .filter(|(_, distance)| *distance <= radius_meters)
            .max_by(|(a, da), (b, db)| {
                a.visit_count
                    .cmp(&b.visit_count)
                    .then_with(|| db.partial_cmp(da).unwrap_or(Ordering::Equal))
                    .then_with(|| b.id.cmp(&a.id))
            });

        if let Some((hotspot, distance)) = best {
            let visited = self.store.record_hotspot_visit(hotspot.id, driver_id)?;
            debug!(
                hotspot_id = %visited.id,
                distance_m = distance,
                visit_count = visited.visit_count,
                "Observation matched hotspot"
            );
            return Ok((visited, false));
        }

        let created = self.store.insert_hotspot(
            &NewHotspot {
                name: format!("Auto-detected {location_type}"),
                location_type,
                latitude: lat,
                longitude: lon,
                radius_meters,
                is_auto_detected: true,
            },
            driver_id,
        )?;
        info!(
            hotspot_id = %created.id,
            location_type = %location_type,
            lat, lon,
            "New hotspot created"
        );

        Ok((created, true))
    }

    /// [`HotspotEngine::find_or_create`] with the configured match radius
    pub fn observe(
        &self,
        lat: f64,
        lon: f64,
        location_type: LocationType,
        driver_id: Option<&DriverId>,
    ) -> Result<(Hotspot, bool)> {
        self.find_or_create(
            lat,
            lon,
            location_type,
            self.settings.match_radius_meters,
            driver_id,
        )
    }

    /// Hotspots of any category within `radius_meters`, most visited first,
    /// capped at the configured limit.
    pub fn find_nearby(&self, lat: f64, lon: f64, radius_meters: f64) -> Result<Vec<Hotspot>> {
        validate_point(lat, lon)?;
        validate_radius(radius_meters)?;

        let bounds = BoundingBox::around(lat, lon, radius_meters);
        let mut nearby: Vec<Hotspot> = self
            .store
            .hotspots_in_bounds(&bounds, None)?
            .into_iter()
            .filter(|h| haversine_distance_meters(lat, lon, h.latitude, h.longitude) <= radius_meters)
            .collect();

        nearby.sort_by(|a, b| b.visit_count.cmp(&a.visit_count).then(a.id.cmp(&b.id)));
        nearby.truncate(self.settings.nearby_limit);

        Ok(nearby)
    }

    pub fn get_hotspot(&self, id: HotspotId) -> Result<Hotspot> {
        Ok(self.store.get_hotspot(id)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use waypost_store::SqliteStore;
    use waypost_util::WaypostError;

    fn engine() -> HotspotEngine {
        let store: Arc<dyn Store> = Arc::new(SqliteStore::in_memory().unwrap());
        HotspotEngine::new(store, HotspotSettings::default())
    }

    #[test]
    fn same_point_twice_creates_one_hotspot() {
        let engine = engine();

        let (first, created) = engine
            .find_or_create(41.0, 29.0, LocationType::Customer, 100.0, None)
            .unwrap();
        assert!(created);
        assert_eq!(first.visit_count, 1);
        assert!(first.is_auto_detected);

        let (second, created) = engine
            .find_or_create(41.0, 29.0, LocationType::Customer, 100.0, None)
            .unwrap();
        assert!(!created);
        assert_eq!(second.id, first.id);
        assert_eq!(second.visit_count, 2);
    }

    #[test]
    fn categories_do_not_match_each_other() {
        let engine = engine();
        engine
            .find_or_create(41.0, 29.0, LocationType::Customer, 100.0, None)
            .unwrap();

        let (_, created) = engine
            .find_or_create(41.0, 29.0, LocationType::FuelStation, 100.0, None)
            .unwrap();
        assert!(created);
    }

    #[test]
    fn match_uses_true_distance_not_the_box() {
        let engine = engine();
        engine
            .find_or_create(41.0, 29.0, LocationType::Warehouse, 100.0, None)
            .unwrap();

        // Inside the bounding box corner but ~130 m away
        let (_, created) = engine
            .find_or_create(41.0008, 29.00105, LocationType::Warehouse, 100.0, None)
            .unwrap();
        assert!(created);
    }

    #[test]
    fn most_visited_candidate_wins_over_nearest() {
        let engine = engine();
        let (busy, _) = engine
            .find_or_create(41.0, 29.0, LocationType::Rest, 100.0, None)
            .unwrap();
        engine
            .find_or_create(41.0, 29.0, LocationType::Rest, 100.0, None)
            .unwrap();

        // ~111 m north, outside the first hotspot's reach at 100 m
        let (quiet, created) = engine
            .find_or_create(41.001, 29.0, LocationType::Rest, 100.0, None)
            .unwrap();
        assert!(created);

        // Closer to `quiet`, but both are within 150 m
        let (matched, created) = engine
            .find_or_create(41.0007, 29.0, LocationType::Rest, 150.0, None)
            .unwrap();
        assert!(!created);
        assert_eq!(matched.id, busy.id);
        assert_ne!(matched.id, quiet.id);
        assert_eq!(matched.visit_count, 3);
    }

    #[test]
    fn unique_drivers_are_counted() {
        let engine = engine();
        let d1 = DriverId::new("d1");
        let d2 = DriverId::new("d2");

        engine.observe(41.0, 29.0, LocationType::Customer, Some(&d1)).unwrap();
        engine.observe(41.0, 29.0, LocationType::Customer, Some(&d1)).unwrap();
        let (hotspot, _) = engine.observe(41.0, 29.0, LocationType::Customer, Some(&d2)).unwrap();

        assert_eq!(hotspot.visit_count, 3);
        assert_eq!(hotspot.unique_drivers, 2);
    }

    #[test]
    fn concurrent_observations_lose_no_visits() {
        let engine = Arc::new(engine());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let engine = Arc::clone(&engine);
                thread::spawn(move || {
                    let driver = DriverId::new(format!("d{i}"));
                    for _ in 0..10 {
                        engine
                            .find_or_create(41.0, 29.0, LocationType::Parking, 100.0, Some(&driver))
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let nearby = engine.find_nearby(41.0, 29.0, 100.0).unwrap();
        assert_eq!(nearby.len(), 1);
        assert_eq!(nearby[0].visit_count, 80);
        assert_eq!(nearby[0].unique_drivers, 8);
    }

    #[test]
    fn find_nearby_orders_by_visits_and_caps() {
        let store: Arc<dyn Store> = Arc::new(SqliteStore::in_memory().unwrap());
        let engine = HotspotEngine::new(
            store,
            HotspotSettings {
                match_radius_meters: 100.0,
                nearby_limit: 3,
            },
        );

        // Five hotspots ~250 m apart along a meridian, visited 1..=5 times
        for i in 0..5 {
            let lat = 41.0 + 0.00225 * i as f64;
            for _ in 0..=i {
                engine.observe(lat, 29.0, LocationType::Customer, None).unwrap();
            }
        }
        engine.observe(60.0, 10.0, LocationType::Customer, None).unwrap();

        let nearby = engine.find_nearby(41.0045, 29.0, 2_000.0).unwrap();
        let visits: Vec<_> = nearby.iter().map(|h| h.visit_count).collect();
        assert_eq!(visits, vec![5, 4, 3]);
    }

    #[test]
    fn invalid_input_and_unknown_ids() {
        let engine = engine();
        assert!(matches!(
            engine.find_or_create(91.0, 0.0, LocationType::Other, 100.0, None),
            Err(WaypostError::Validation(_))
        ));
        assert!(matches!(
            engine.find_nearby(0.0, 0.0, -1.0),
            Err(WaypostError::Validation(_))
        ));
        assert!(matches!(
            engine.get_hotspot(HotspotId::new(12)),
            Err(WaypostError::NotFound(_))
        ));
    }
}
