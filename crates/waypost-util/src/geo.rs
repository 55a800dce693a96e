//! Geometry primitives
//!
//! Everything is expressed in WGS84 degrees and meters on a spherical earth.

use serde::{Deserialize, Serialize};

use crate::WaypostError;

/// Mean earth radius used for all distance computations
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Reject coordinates outside the WGS84 ranges
pub fn validate_point(lat: f64, lon: f64) -> Result<(), WaypostError> {
    if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
        return Err(WaypostError::validation(format!("latitude {lat} out of range")));
    }
    if !lon.is_finite() || !(-180.0..=180.0).contains(&lon) {
        return Err(WaypostError::validation(format!("longitude {lon} out of range")));
    }
    Ok(())
}

/// Reject radii that are not a positive, finite number of meters
pub fn validate_radius(radius_meters: f64) -> Result<(), WaypostError> {
    if !radius_meters.is_finite() || radius_meters <= 0.0 {
        return Err(WaypostError::validation(format!(
            "radius {radius_meters} must be a positive number of meters"
        )));
    }
    Ok(())
}

/// Great-circle distance between two points in meters.
pub fn haversine_distance_meters(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let delta_lat = (lat2 - lat1).to_radians();
    let delta_lon = (lon2 - lon1).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_METERS * c
}

/// Arithmetic mean of a set of coordinates.
///
/// Returns `None` for an empty set. Stops are small (≤ a few hundred meters),
/// so the planar mean is indistinguishable from the spherical centroid.
pub fn centroid<I>(points: I) -> Option<(f64, f64)>
where
    I: IntoIterator<Item = (f64, f64)>,
{
    let mut count = 0usize;
    let (mut lat_sum, mut lon_sum) = (0.0, 0.0);
    for (lat, lon) in points {
        lat_sum += lat;
        lon_sum += lon;
        count += 1;
    }

    if count == 0 {
        return None;
    }
    Some((lat_sum / count as f64, lon_sum / count as f64))
}

/// Axis-aligned bounding box in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl BoundingBox {
    pub fn new(min_lat: f64, max_lat: f64, min_lon: f64, max_lon: f64) -> Self {
        Self {
            min_lat,
            max_lat,
            min_lon,
            max_lon,
        }
    }

    /// Smallest box containing every point within `radius_meters` of the center.
    ///
    /// The box never excludes a point whose haversine distance is within the
    /// radius. Near the poles or across the antimeridian it widens to the
    /// full longitude range.
    pub fn around(lat: f64, lon: f64, radius_meters: f64) -> Self {
        let angular = radius_meters.max(0.0) / EARTH_RADIUS_METERS;
        let delta_lat = angular.to_degrees();

        let min_lat = (lat - delta_lat).max(-90.0);
        let max_lat = (lat + delta_lat).min(90.0);

        let full = Self::new(min_lat, max_lat, -180.0, 180.0);
        if min_lat <= -90.0 || max_lat >= 90.0 {
            return full;
        }

        let ratio = angular.sin() / lat.to_radians().cos();
        if !(0.0..1.0).contains(&ratio) {
            return full;
        }

        let delta_lon = ratio.asin().to_degrees();
        let (min_lon, max_lon) = (lon - delta_lon, lon + delta_lon);
        if min_lon < -180.0 || max_lon > 180.0 {
            return full;
        }

        Self::new(min_lat, max_lat, min_lon, max_lon)
    }

    /// Check if this box contains a point (edges inclusive).
    pub fn contains_point(&self, lat: f64, lon: f64) -> bool {
        lat >= self.min_lat && lat <= self.max_lat && lon >= self.min_lon && lon <= self.max_lon
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ANKARA: (f64, f64) = (39.9334, 32.8597);
    const ISTANBUL: (f64, f64) = (41.0082, 29.0121);

    #[test]
    fn haversine_identity() {
        assert_eq!(
            haversine_distance_meters(ANKARA.0, ANKARA.1, ANKARA.0, ANKARA.1),
            0.0
        );
    }

    #[test]
    fn haversine_symmetry() {
        let ab = haversine_distance_meters(ANKARA.0, ANKARA.1, ISTANBUL.0, ISTANBUL.1);
        let ba = haversine_distance_meters(ISTANBUL.0, ISTANBUL.1, ANKARA.0, ANKARA.1);
        assert!((ab - ba).abs() < 1e-6);
    }

    #[test]
    fn haversine_ankara_istanbul() {
        let d = haversine_distance_meters(ANKARA.0, ANKARA.1, ISTANBUL.0, ISTANBUL.1);
        assert!((335_000.0..=365_000.0).contains(&d), "got {d}");
    }

    #[test]
    fn haversine_short_distance() {
        // 0.001° of latitude is ~111 m
        let d = haversine_distance_meters(41.0, 29.0, 41.001, 29.0);
        assert!((d - 111.19).abs() < 0.5, "got {d}");
    }

    #[test]
    fn centroid_of_points() {
        let c = centroid([(41.0, 29.0), (41.002, 29.002)]).unwrap();
        assert!((c.0 - 41.001).abs() < 1e-9);
        assert!((c.1 - 29.001).abs() < 1e-9);
        assert!(centroid(std::iter::empty::<(f64, f64)>()).is_none());
    }

    #[test]
    fn bounding_box_contains_points_within_radius() {
        let (lat, lon) = (41.0, 29.0);
        let bbox = BoundingBox::around(lat, lon, 500.0);

        // Walk a ring of points just inside the radius
        for step in 0..36 {
            let bearing = (step as f64 * 10.0).to_radians();
            let d = 499.0 / EARTH_RADIUS_METERS;
            let lat1 = lat.to_radians();
            let lat2 = (lat1.sin() * d.cos() + lat1.cos() * d.sin() * bearing.cos()).asin();
            let lon2 = lon.to_radians()
                + (bearing.sin() * d.sin() * lat1.cos()).atan2(d.cos() - lat1.sin() * lat2.sin());
            assert!(bbox.contains_point(lat2.to_degrees(), lon2.to_degrees()));
        }

        assert!(!bbox.contains_point(41.01, 29.0));
    }

    #[test]
    fn bounding_box_widens_near_antimeridian() {
        let bbox = BoundingBox::around(10.0, 179.999, 1_000.0);
        assert_eq!(bbox.min_lon, -180.0);
        assert_eq!(bbox.max_lon, 180.0);
    }

    #[test]
    fn point_and_radius_validation() {
        assert!(validate_point(41.0, 29.0).is_ok());
        assert!(validate_point(90.0, -180.0).is_ok());
        assert!(validate_point(90.5, 0.0).is_err());
        assert!(validate_point(0.0, f64::NAN).is_err());

        assert!(validate_radius(200.0).is_ok());
        assert!(validate_radius(0.0).is_err());
        assert!(validate_radius(f64::INFINITY).is_err());
    }
}
