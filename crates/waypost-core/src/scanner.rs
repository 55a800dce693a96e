//! Batch stop scanning
//!
//! Runs the detector over stored samples and persists the result with the
//! store's de-duplication, so overlapping scans insert each stop at most once.
//!
//! A window edge can fall in the middle of a dwell. The samples are widened
//! past both edges until the driver is seen moving, so a stop is always
//! detected with its real start and end. A dwell that is still in progress
//! is not stored; a later scan picks it up once the driver leaves.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use waypost_api::{LocationSample, Stop};
use waypost_config::{DedupSettings, DetectorSettings};
use waypost_store::{DedupWindow, Store};
use waypost_util::{DriverId, Result, WaypostError};

use crate::StopDetector;

/// Samples fetched per query while widening a window edge
const EDGE_CHUNK: usize = 500;

/// Upper bound on samples pulled in past one edge (a week at one per minute)
const MAX_EDGE_SAMPLES: usize = 7 * 24 * 60;

/// Outcome of a scan over every active driver
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanSummary {
    pub drivers: usize,
    pub inserted: usize,
    pub failed: usize,
}

/// Detects and persists stops for one or all drivers
#[derive(Clone)]
pub struct BatchScanner {
    store: Arc<dyn Store>,
    detector: StopDetector,
    dedup: DedupWindow,
    workers: usize,
}

impl BatchScanner {
    pub fn new(
        store: Arc<dyn Store>,
        detector: DetectorSettings,
        dedup: DedupSettings,
        workers: usize,
    ) -> Self {
        Self {
            store,
            detector: StopDetector::new(detector),
            dedup: DedupWindow {
                time_tolerance: dedup.time_tolerance,
                coord_tolerance_degrees: dedup.coord_tolerance_degrees,
            },
            workers: workers.max(1),
        }
    }

    /// Detect one driver's stops in `[start, end]` and insert the new ones.
    ///
    /// Returns only the stops that were inserted; stops already on record
    /// are skipped silently.
    pub fn detect_for_driver(
        &self,
        driver_id: &DriverId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Stop>> {
        if start > end {
            return Err(WaypostError::validation(format!(
                "scan window starts after it ends ({start} > {end})"
            )));
        }

        let mut samples = self.store.samples_in_range(driver_id, start, end)?;
        let before = samples.len();
        samples.retain(|s| s.validate().is_ok());
        if samples.len() < before {
            warn!(
                driver_id = %driver_id,
                rejected = before - samples.len(),
                "Skipping malformed samples"
            );
        }
        if samples.is_empty() {
            debug!(driver_id = %driver_id, "No samples in window");
            return Ok(Vec::new());
        }

        self.widen_backward(driver_id, &mut samples)?;
        self.widen_forward(driver_id, &mut samples)?;

        // Widening can reach dwells that lie entirely outside the window
        let detected: Vec<Stop> = self
            .detector
            .detect_closed(&samples)
            .into_iter()
            .filter(|stop| {
                stop.started_at <= end && stop.ended_at.is_some_and(|ended| ended >= start)
            })
            .collect();
        if detected.is_empty() {
            debug!(driver_id = %driver_id, samples = samples.len(), "No stops detected");
            return Ok(Vec::new());
        }

        let inserted = self.store.insert_stops_deduplicated(&detected, &self.dedup)?;
        debug!(
            driver_id = %driver_id,
            samples = samples.len(),
            detected = detected.len(),
            inserted = inserted.len(),
            "Driver scanned"
        );

        Ok(inserted)
    }

    /// Prepend earlier samples while the first one is part of a dwell
    fn widen_backward(&self, driver_id: &DriverId, samples: &mut Vec<LocationSample>) -> Result<()> {
        let mut cursor = match samples.first() {
            Some(first) if self.detector.is_stationary(first) => first.recorded_at,
            _ => return Ok(()),
        };

        // Newest first until reversed below
        let mut earlier = Vec::new();
        'walk: while earlier.len() < MAX_EDGE_SAMPLES {
            let chunk = self.store.samples_before(driver_id, cursor, EDGE_CHUNK)?;
            let exhausted = chunk.len() < EDGE_CHUNK;
            let Some(oldest) = chunk.last() else {
                break;
            };
            cursor = oldest.recorded_at;

            for sample in chunk {
                if sample.validate().is_err() {
                    continue;
                }
                let stationary = self.detector.is_stationary(&sample);
                earlier.push(sample);
                if !stationary {
                    break 'walk;
                }
            }
            if exhausted {
                break;
            }
        }

        if !earlier.is_empty() {
            debug!(driver_id = %driver_id, samples = earlier.len(), "Window start widened");
            earlier.reverse();
            earlier.append(samples);
            *samples = earlier;
        }
        Ok(())
    }

    /// Append later samples while the last one is part of a dwell
    fn widen_forward(&self, driver_id: &DriverId, samples: &mut Vec<LocationSample>) -> Result<()> {
        let mut cursor = match samples.last() {
            Some(last) if self.detector.is_stationary(last) => last.recorded_at,
            _ => return Ok(()),
        };

        let mut added = 0;
        'walk: while added < MAX_EDGE_SAMPLES {
            let chunk = self.store.samples_following(driver_id, cursor, EDGE_CHUNK)?;
            let exhausted = chunk.len() < EDGE_CHUNK;
            let Some(newest) = chunk.last() else {
                break;
            };
            cursor = newest.recorded_at;

            for sample in chunk {
                if sample.validate().is_err() {
                    continue;
                }
                let stationary = self.detector.is_stationary(&sample);
                samples.push(sample);
                added += 1;
                if !stationary {
                    break 'walk;
                }
            }
            if exhausted {
                break;
            }
        }

        if added > 0 {
            debug!(driver_id = %driver_id, samples = added, "Window end widened");
        }
        Ok(())
    }

    /// Scan every active driver, returning the number of stops inserted.
    ///
    /// A failure for one driver is logged and does not stop the others.
    pub async fn detect_for_all(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<usize> {
        Ok(self.scan_all(start, end).await?.inserted)
    }

    /// Same as [`BatchScanner::detect_for_all`], with per-driver counts.
    pub async fn scan_all(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<ScanSummary> {
        let drivers = self.store.active_drivers()?;
        let mut summary = ScanSummary {
            drivers: drivers.len(),
            ..Default::default()
        };

        let semaphore = Arc::new(Semaphore::new(self.workers));
        let mut tasks = JoinSet::new();

        for driver in drivers {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| WaypostError::internal(format!("scan worker pool closed: {e}")))?;

            let scanner = self.clone();
            tasks.spawn_blocking(move || {
                let _permit = permit;
                let result = scanner.detect_for_driver(&driver.id, start, end);
                (driver.id, result)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(stops))) => summary.inserted += stops.len(),
                Ok((driver_id, Err(e))) => {
                    warn!(
                        driver_id = %driver_id,
                        error = %e,
                        transient = e.is_transient(),
                        "Stop scan failed for driver, skipping"
                    );
                    summary.failed += 1;
                }
                Err(e) => {
                    warn!(error = %e, "Stop scan task did not complete");
                    summary.failed += 1;
                }
            }
        }

        info!(
            drivers = summary.drivers,
            inserted = summary.inserted,
            failed = summary.failed,
            "Stop scan finished"
        );

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use waypost_api::{
        Driver, DriverHome, DriverStatus, GeofenceZone, Hotspot, LocationSample, LocationType,
        NewHotspot,
    };
    use waypost_store::{SqliteStore, StoreError, StoreResult};
    use waypost_util::{BoundingBox, HomeId, HotspotId, StopId};

    fn t(minute: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap() + chrono::Duration::minutes(minute)
    }

    fn seed_driver(store: &dyn Store, id: &str) {
        store
            .upsert_driver(&Driver {
                id: DriverId::new(id),
                name: id.to_uppercase(),
                status: DriverStatus::Offline,
                is_active: true,
            })
            .unwrap();

        // 40 minutes parked, then driving off
        for minute in 0..=40 {
            store
                .append_sample(&LocationSample {
                    driver_id: DriverId::new(id),
                    latitude: 41.0,
                    longitude: 29.0,
                    speed: Some(0.0),
                    is_moving: false,
                    battery: None,
                    recorded_at: t(minute),
                })
                .unwrap();
        }
        store
            .append_sample(&LocationSample {
                driver_id: DriverId::new(id),
                latitude: 41.01,
                longitude: 29.0,
                speed: Some(50.0),
                is_moving: true,
                battery: None,
                recorded_at: t(41),
            })
            .unwrap();
    }

    fn scanner(store: Arc<dyn Store>) -> BatchScanner {
        BatchScanner::new(store, DetectorSettings::default(), DedupSettings::default(), 2)
    }

    #[test]
    fn detect_for_driver_is_idempotent() {
        let store: Arc<dyn Store> = Arc::new(SqliteStore::in_memory().unwrap());
        seed_driver(store.as_ref(), "d1");
        let scanner = scanner(store.clone());
        let driver = DriverId::new("d1");

        let first = scanner.detect_for_driver(&driver, t(-60), t(120)).unwrap();
        assert_eq!(first.len(), 1);
        assert!(first[0].id.is_some());

        let second = scanner.detect_for_driver(&driver, t(-60), t(120)).unwrap();
        assert!(second.is_empty());

        // Overlapping window
        let third = scanner.detect_for_driver(&driver, t(-10), t(60)).unwrap();
        assert!(third.is_empty());

        assert_eq!(store.stops_for_driver(&driver, t(-60), t(120)).unwrap().len(), 1);
    }

    #[test]
    fn inverted_window_is_a_validation_error() {
        let store: Arc<dyn Store> = Arc::new(SqliteStore::in_memory().unwrap());
        let result = scanner(store).detect_for_driver(&DriverId::new("d1"), t(10), t(0));
        assert!(matches!(result, Err(WaypostError::Validation(_))));
    }

    #[tokio::test]
    async fn detect_for_all_covers_every_active_driver() {
        let store: Arc<dyn Store> = Arc::new(SqliteStore::in_memory().unwrap());
        for id in ["d1", "d2", "d3"] {
            seed_driver(store.as_ref(), id);
        }

        let scanner = scanner(store);
        assert_eq!(scanner.detect_for_all(t(-60), t(120)).await.unwrap(), 3);
        assert_eq!(scanner.detect_for_all(t(-60), t(120)).await.unwrap(), 0);
    }

    fn park(store: &dyn Store, id: &str, minutes: std::ops::RangeInclusive<i64>) {
        for minute in minutes {
            store
                .append_sample(&LocationSample {
                    driver_id: DriverId::new(id),
                    latitude: 41.0,
                    longitude: 29.0,
                    speed: Some(0.0),
                    is_moving: false,
                    battery: None,
                    recorded_at: t(minute),
                })
                .unwrap();
        }
    }

    fn drive_off(store: &dyn Store, id: &str, minute: i64) {
        store
            .append_sample(&LocationSample {
                driver_id: DriverId::new(id),
                latitude: 41.01,
                longitude: 29.0,
                speed: Some(50.0),
                is_moving: true,
                battery: None,
                recorded_at: t(minute),
            })
            .unwrap();
    }

    #[test]
    fn overlapping_windows_store_one_dwell_once() {
        let store: Arc<dyn Store> = Arc::new(SqliteStore::in_memory().unwrap());
        park(store.as_ref(), "d1", 0..=90);
        drive_off(store.as_ref(), "d1", 91);
        let scanner = scanner(store.clone());
        let driver = DriverId::new("d1");

        // The window ends mid-dwell; the stop still gets its real end
        let first = scanner.detect_for_driver(&driver, t(-60), t(40)).unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].started_at, t(0));
        assert_eq!(first[0].ended_at, Some(t(90)));
        assert_eq!(first[0].duration_minutes, 90);

        // This one starts mid-dwell
        let second = scanner.detect_for_driver(&driver, t(10), t(120)).unwrap();
        assert!(second.is_empty());

        let stored = store.stops_for_driver(&driver, t(-60), t(120)).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].ended_at, Some(t(90)));
    }

    #[test]
    fn dwell_in_progress_is_stored_after_the_driver_leaves() {
        let store: Arc<dyn Store> = Arc::new(SqliteStore::in_memory().unwrap());
        park(store.as_ref(), "d1", 0..=90);
        let scanner = scanner(store.clone());
        let driver = DriverId::new("d1");

        assert!(scanner.detect_for_driver(&driver, t(-60), t(40)).unwrap().is_empty());
        assert!(scanner.detect_for_driver(&driver, t(10), t(120)).unwrap().is_empty());
        assert!(store.stops_for_driver(&driver, t(-60), t(120)).unwrap().is_empty());

        drive_off(store.as_ref(), "d1", 91);
        let stops = scanner.detect_for_driver(&driver, t(60), t(120)).unwrap();
        assert_eq!(stops.len(), 1);
        assert_eq!(stops[0].started_at, t(0));
        assert_eq!(stops[0].ended_at, Some(t(90)));
    }

    #[test]
    fn dwells_outside_the_window_are_not_reported() {
        let store: Arc<dyn Store> = Arc::new(SqliteStore::in_memory().unwrap());
        park(store.as_ref(), "d1", 0..=40);
        drive_off(store.as_ref(), "d1", 41);
        park(store.as_ref(), "d1", 100..=140);
        drive_off(store.as_ref(), "d1", 141);
        let scanner = scanner(store.clone());

        let stops = scanner
            .detect_for_driver(&DriverId::new("d1"), t(60), t(120))
            .unwrap();
        assert_eq!(stops.len(), 1);
        assert_eq!(stops[0].started_at, t(100));
    }

    /// Delegates to an in-memory store but fails reads for one driver
    struct FlakyStore {
        inner: SqliteStore,
        broken: DriverId,
    }

    impl Store for FlakyStore {
        fn upsert_driver(&self, driver: &Driver) -> StoreResult<()> {
            self.inner.upsert_driver(driver)
        }
        fn get_driver(&self, id: &DriverId) -> StoreResult<Option<Driver>> {
            self.inner.get_driver(id)
        }
        fn active_drivers(&self) -> StoreResult<Vec<Driver>> {
            self.inner.active_drivers()
        }
        fn set_driver_status(&self, id: &DriverId, status: DriverStatus) -> StoreResult<()> {
            self.inner.set_driver_status(id, status)
        }
        fn append_sample(&self, sample: &LocationSample) -> StoreResult<i64> {
            self.inner.append_sample(sample)
        }
        fn samples_in_range(
            &self,
            driver_id: &DriverId,
            start: DateTime<Utc>,
            end: DateTime<Utc>,
        ) -> StoreResult<Vec<LocationSample>> {
            if *driver_id == self.broken {
                return Err(StoreError::Database("disk I/O error".into()));
            }
            self.inner.samples_in_range(driver_id, start, end)
        }
        fn samples_before(
            &self,
            driver_id: &DriverId,
            before: DateTime<Utc>,
            limit: usize,
        ) -> StoreResult<Vec<LocationSample>> {
            self.inner.samples_before(driver_id, before, limit)
        }
        fn samples_following(
            &self,
            driver_id: &DriverId,
            after: DateTime<Utc>,
            limit: usize,
        ) -> StoreResult<Vec<LocationSample>> {
            self.inner.samples_following(driver_id, after, limit)
        }
        fn samples_after(&self, after: i64, limit: usize) -> StoreResult<Vec<(i64, LocationSample)>> {
            self.inner.samples_after(after, limit)
        }
        fn latest_sample_seq(&self) -> StoreResult<i64> {
            self.inner.latest_sample_seq()
        }
        fn insert_stops_deduplicated(
            &self,
            stops: &[Stop],
            window: &DedupWindow,
        ) -> StoreResult<Vec<Stop>> {
            self.inner.insert_stops_deduplicated(stops, window)
        }
        fn stops_for_driver(
            &self,
            driver_id: &DriverId,
            start: DateTime<Utc>,
            end: DateTime<Utc>,
        ) -> StoreResult<Vec<Stop>> {
            self.inner.stops_for_driver(driver_id, start, end)
        }
        fn get_stop(&self, id: StopId) -> StoreResult<Stop> {
            self.inner.get_stop(id)
        }
        fn hotspots_in_bounds(
            &self,
            bounds: &BoundingBox,
            location_type: Option<LocationType>,
        ) -> StoreResult<Vec<Hotspot>> {
            self.inner.hotspots_in_bounds(bounds, location_type)
        }
        fn insert_hotspot(
            &self,
            hotspot: &NewHotspot,
            driver_id: Option<&DriverId>,
        ) -> StoreResult<Hotspot> {
            self.inner.insert_hotspot(hotspot, driver_id)
        }
        fn record_hotspot_visit(
            &self,
            id: HotspotId,
            driver_id: Option<&DriverId>,
        ) -> StoreResult<Hotspot> {
            self.inner.record_hotspot_visit(id, driver_id)
        }
        fn get_hotspot(&self, id: HotspotId) -> StoreResult<Hotspot> {
            self.inner.get_hotspot(id)
        }
        fn active_homes(&self, driver_id: &DriverId) -> StoreResult<Vec<DriverHome>> {
            self.inner.active_homes(driver_id)
        }
        fn insert_home(&self, home: &DriverHome) -> StoreResult<DriverHome> {
            self.inner.insert_home(home)
        }
        fn deactivate_home(&self, id: HomeId) -> StoreResult<()> {
            self.inner.deactivate_home(id)
        }
        fn insert_geofence(&self, zone: &GeofenceZone) -> StoreResult<GeofenceZone> {
            self.inner.insert_geofence(zone)
        }
        fn active_geofences(&self) -> StoreResult<Vec<GeofenceZone>> {
            self.inner.active_geofences()
        }
        fn is_healthy(&self) -> bool {
            self.inner.is_healthy()
        }
    }

    #[tokio::test]
    async fn one_failing_driver_does_not_abort_the_scan() {
        let flaky = FlakyStore {
            inner: SqliteStore::in_memory().unwrap(),
            broken: DriverId::new("d2"),
        };
        for id in ["d1", "d2", "d3"] {
            seed_driver(&flaky, id);
        }
        let store: Arc<dyn Store> = Arc::new(flaky);

        let summary = scanner(store.clone()).scan_all(t(-60), t(120)).await.unwrap();
        assert_eq!(
            summary,
            ScanSummary {
                drivers: 3,
                inserted: 2,
                failed: 1
            }
        );

        let d2_stops = store
            .stops_for_driver(&DriverId::new("d2"), t(-60), t(120))
            .unwrap();
        assert!(d2_stops.is_empty());
    }
}
