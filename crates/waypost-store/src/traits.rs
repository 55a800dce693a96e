//! Store trait definitions

use chrono::{DateTime, Utc};
use waypost_api::{
    Driver, DriverHome, DriverStatus, GeofenceZone, Hotspot, LocationSample, LocationType,
    NewHotspot, Stop,
};
use waypost_util::{BoundingBox, DriverId, HomeId, HotspotId, StopId};

use crate::StoreResult;

/// Box around an existing stop inside which a new stop counts as the same one
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DedupWindow {
    /// Allowed difference between `started_at` values, either direction
    pub time_tolerance: chrono::Duration,
    /// Allowed difference in latitude and in longitude, in degrees
    pub coord_tolerance_degrees: f64,
}

impl Default for DedupWindow {
    fn default() -> Self {
        Self {
            time_tolerance: chrono::Duration::minutes(5),
            coord_tolerance_degrees: 0.001,
        }
    }
}

/// Main store trait
///
/// Implementations must tolerate concurrent calls from several drivers'
/// scans at once.
pub trait Store: Send + Sync {
    // Drivers

    /// Insert or replace a driver
    fn upsert_driver(&self, driver: &Driver) -> StoreResult<()>;

    /// Look up a driver
    fn get_driver(&self, id: &DriverId) -> StoreResult<Option<Driver>>;

    /// All drivers flagged active
    fn active_drivers(&self) -> StoreResult<Vec<Driver>>;

    /// Record a driver's latest live status
    fn set_driver_status(&self, id: &DriverId, status: DriverStatus) -> StoreResult<()>;

    // Location samples

    /// Append a sample, returning its sequence number
    fn append_sample(&self, sample: &LocationSample) -> StoreResult<i64>;

    /// A driver's samples with `start <= recorded_at <= end`, oldest first
    fn samples_in_range(
        &self,
        driver_id: &DriverId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StoreResult<Vec<LocationSample>>;

    /// Up to `limit` of a driver's samples with `recorded_at < before`, newest first
    fn samples_before(
        &self,
        driver_id: &DriverId,
        before: DateTime<Utc>,
        limit: usize,
    ) -> StoreResult<Vec<LocationSample>>;

    /// Up to `limit` of a driver's samples with `recorded_at > after`, oldest first
    fn samples_following(
        &self,
        driver_id: &DriverId,
        after: DateTime<Utc>,
        limit: usize,
    ) -> StoreResult<Vec<LocationSample>>;

    /// Samples appended after sequence number `after`, in append order
    fn samples_after(&self, after: i64, limit: usize) -> StoreResult<Vec<(i64, LocationSample)>>;

    /// Highest sequence number appended so far (0 when empty)
    fn latest_sample_seq(&self) -> StoreResult<i64>;

    // Stops

    /// Insert a driver's stops in one transaction, skipping any that fall
    /// inside the de-dup window of an existing stop of the same driver, or
    /// whose interval overlaps one.
    ///
    /// Returns only the stops actually inserted, with ids assigned. On error
    /// nothing from the batch is kept.
    fn insert_stops_deduplicated(
        &self,
        stops: &[Stop],
        window: &DedupWindow,
    ) -> StoreResult<Vec<Stop>>;

    /// A driver's stops that started within `[start, end]`, oldest first
    fn stops_for_driver(
        &self,
        driver_id: &DriverId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StoreResult<Vec<Stop>>;

    /// Explicit lookup; unknown ids are `NotFound`
    fn get_stop(&self, id: StopId) -> StoreResult<Stop>;

    // Hotspots

    /// Hotspots whose center lies in the box, optionally of one category
    fn hotspots_in_bounds(
        &self,
        bounds: &BoundingBox,
        location_type: Option<LocationType>,
    ) -> StoreResult<Vec<Hotspot>>;

    /// Create a hotspot with a visit count of one
    fn insert_hotspot(
        &self,
        hotspot: &NewHotspot,
        driver_id: Option<&DriverId>,
    ) -> StoreResult<Hotspot>;

    /// Atomically add one visit (and the driver as a visitor, if given)
    fn record_hotspot_visit(
        &self,
        id: HotspotId,
        driver_id: Option<&DriverId>,
    ) -> StoreResult<Hotspot>;

    /// Explicit lookup; unknown ids are `NotFound`
    fn get_hotspot(&self, id: HotspotId) -> StoreResult<Hotspot>;

    // Homes

    /// A driver's active homes
    fn active_homes(&self, driver_id: &DriverId) -> StoreResult<Vec<DriverHome>>;

    /// Insert a home; the `id` field is ignored. Fails with `Constraint`
    /// when the driver already has the maximum number of active homes.
    fn insert_home(&self, home: &DriverHome) -> StoreResult<DriverHome>;

    /// Mark a home inactive
    fn deactivate_home(&self, id: HomeId) -> StoreResult<()>;

    // Geofence zones (administered elsewhere)

    /// Insert a zone; the `id` field is ignored
    fn insert_geofence(&self, zone: &GeofenceZone) -> StoreResult<GeofenceZone>;

    /// All active zones
    fn active_geofences(&self) -> StoreResult<Vec<GeofenceZone>>;

    // Health

    /// Check if store is healthy
    fn is_healthy(&self) -> bool;
}
