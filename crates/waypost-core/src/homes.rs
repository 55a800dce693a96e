//! Driver home proximity

use std::sync::Arc;
use tracing::info;
use waypost_api::{DriverHome, DEFAULT_HOME_RADIUS_METERS};
use waypost_store::Store;
use waypost_util::{
    haversine_distance_meters, validate_point, validate_radius, DriverId, HomeId, Result,
    WaypostError,
};

pub struct HomeChecker {
    store: Arc<dyn Store>,
}

impl HomeChecker {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// The first active home of the driver whose radius contains the point.
    pub fn is_near_home(&self, driver_id: &DriverId, lat: f64, lon: f64) -> Result<Option<DriverHome>> {
        let homes = self.store.active_homes(driver_id)?;

        Ok(homes.into_iter().find(|home| {
            haversine_distance_meters(lat, lon, home.latitude, home.longitude) <= home.radius_meters
        }))
    }

    /// Register a new active home; a driver may have at most two.
    pub fn register_home(
        &self,
        driver_id: &DriverId,
        name: impl Into<String>,
        lat: f64,
        lon: f64,
        radius_meters: Option<f64>,
    ) -> Result<DriverHome> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(WaypostError::validation("home name cannot be empty"));
        }
        validate_point(lat, lon)?;
        let radius_meters = radius_meters.unwrap_or(DEFAULT_HOME_RADIUS_METERS);
        validate_radius(radius_meters)?;

        let home = self.store.insert_home(&DriverHome {
            id: HomeId::new(0),
            driver_id: driver_id.clone(),
            name,
            latitude: lat,
            longitude: lon,
            radius_meters,
            is_active: true,
        })?;

        info!(driver_id = %driver_id, home_id = %home.id, radius_m = radius_meters, "Home registered");
        Ok(home)
    }

    pub fn deactivate_home(&self, id: HomeId) -> Result<()> {
        Ok(self.store.deactivate_home(id)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use waypost_store::SqliteStore;

    fn checker() -> HomeChecker {
        HomeChecker::new(Arc::new(SqliteStore::in_memory().unwrap()))
    }

    #[test]
    fn near_home_uses_each_homes_radius() {
        let checker = checker();
        let driver = DriverId::new("d1");
        checker.register_home(&driver, "Flat", 41.0, 29.0, None).unwrap();
        let parents = checker
            .register_home(&driver, "Parents", 40.0, 30.0, Some(1_000.0))
            .unwrap();

        // ~111 m from the flat
        let home = checker.is_near_home(&driver, 41.001, 29.0).unwrap().unwrap();
        assert_eq!(home.name, "Flat");

        // ~333 m from the flat, outside its 200 m default
        assert!(checker.is_near_home(&driver, 41.003, 29.0).unwrap().is_none());

        // ~556 m from the parents' home, inside its 1 km radius
        let home = checker.is_near_home(&driver, 40.005, 30.0).unwrap().unwrap();
        assert_eq!(home.id, parents.id);
    }

    #[test]
    fn other_drivers_homes_do_not_match() {
        let checker = checker();
        checker
            .register_home(&DriverId::new("d1"), "Flat", 41.0, 29.0, None)
            .unwrap();
        assert!(checker
            .is_near_home(&DriverId::new("d2"), 41.0, 29.0)
            .unwrap()
            .is_none());
    }

    #[test]
    fn third_active_home_is_rejected() {
        let checker = checker();
        let driver = DriverId::new("d1");
        let first = checker.register_home(&driver, "A", 41.0, 29.0, None).unwrap();
        checker.register_home(&driver, "B", 41.1, 29.0, None).unwrap();

        assert!(matches!(
            checker.register_home(&driver, "C", 41.2, 29.0, None),
            Err(WaypostError::Validation(_))
        ));

        checker.deactivate_home(first.id).unwrap();
        checker.register_home(&driver, "C", 41.2, 29.0, None).unwrap();
        assert!(checker.is_near_home(&driver, 41.0, 29.0).unwrap().is_none());
    }

    #[test]
    fn invalid_homes_are_rejected() {
        let checker = checker();
        let driver = DriverId::new("d1");
        assert!(checker.register_home(&driver, " ", 41.0, 29.0, None).is_err());
        assert!(checker.register_home(&driver, "A", 41.0, 190.0, None).is_err());
        assert!(checker.register_home(&driver, "A", 41.0, 29.0, Some(0.0)).is_err());
        assert!(matches!(
            checker.deactivate_home(HomeId::new(77)),
            Err(WaypostError::NotFound(_))
        ));
    }
}
