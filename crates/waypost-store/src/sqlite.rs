//! SQLite-based store implementation

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};
use waypost_api::{
    Driver, DriverHome, DriverStatus, GeofenceZone, Hotspot, LocationSample, LocationType,
    NewHotspot, Stop, MAX_HOMES_PER_DRIVER,
};
use waypost_util::{
    format_timestamp, parse_timestamp, BoundingBox, DriverId, HomeId, HotspotId, StopId, TripId,
    ZoneId,
};

use crate::{DedupWindow, Store, StoreError, StoreResult};

const SAMPLE_COLUMNS: &str =
    "seq, driver_id, latitude, longitude, speed, is_moving, battery, recorded_at";

const STOP_COLUMNS: &str = "id, driver_id, trip_id, latitude, longitude, location_type, \
     started_at, ended_at, duration_minutes, is_in_vehicle";

const HOTSPOT_COLUMNS: &str = "id, name, location_type, latitude, longitude, radius_meters, \
     visit_count, unique_drivers, is_verified, is_auto_detected, created_at";

const HOME_COLUMNS: &str = "id, driver_id, name, latitude, longitude, radius_meters, is_active";

const ZONE_COLUMNS: &str = "id, name, zone_type, latitude, longitude, radius_meters, is_active";

/// SQLite-based store
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a store at the given path
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn init_schema(&self) -> StoreResult<()> {
        let conn = self.conn();

        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA busy_timeout = 5000;

            CREATE TABLE IF NOT EXISTS drivers (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'offline',
                is_active INTEGER NOT NULL DEFAULT 1
            );

            -- Append-only
            CREATE TABLE IF NOT EXISTS location_samples (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                driver_id TEXT NOT NULL,
                latitude REAL NOT NULL,
                longitude REAL NOT NULL,
                speed REAL,
                is_moving INTEGER NOT NULL,
                battery REAL,
                recorded_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS stops (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                driver_id TEXT NOT NULL,
                trip_id TEXT,
                latitude REAL NOT NULL,
                longitude REAL NOT NULL,
                location_type TEXT NOT NULL DEFAULT 'unknown',
                started_at TEXT NOT NULL,
                ended_at TEXT,
                duration_minutes INTEGER NOT NULL,
                is_in_vehicle INTEGER NOT NULL DEFAULT 1
            );

            CREATE TABLE IF NOT EXISTS hotspots (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                location_type TEXT NOT NULL,
                latitude REAL NOT NULL,
                longitude REAL NOT NULL,
                radius_meters REAL NOT NULL,
                visit_count INTEGER NOT NULL DEFAULT 1 CHECK (visit_count >= 1),
                unique_drivers INTEGER NOT NULL DEFAULT 0,
                is_verified INTEGER NOT NULL DEFAULT 0,
                is_auto_detected INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS hotspot_visitors (
                hotspot_id INTEGER NOT NULL REFERENCES hotspots(id),
                driver_id TEXT NOT NULL,
                PRIMARY KEY (hotspot_id, driver_id)
            );

            CREATE TABLE IF NOT EXISTS driver_homes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                driver_id TEXT NOT NULL,
                name TEXT NOT NULL,
                latitude REAL NOT NULL,
                longitude REAL NOT NULL,
                radius_meters REAL NOT NULL DEFAULT 200,
                is_active INTEGER NOT NULL DEFAULT 1
            );

            CREATE TABLE IF NOT EXISTS geofence_zones (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                zone_type TEXT NOT NULL,
                latitude REAL NOT NULL,
                longitude REAL NOT NULL,
                radius_meters REAL NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 1
            );

            -- Indexes
            CREATE INDEX IF NOT EXISTS idx_samples_driver_time
                ON location_samples(driver_id, recorded_at);
            CREATE INDEX IF NOT EXISTS idx_stops_driver_start ON stops(driver_id, started_at);
            CREATE INDEX IF NOT EXISTS idx_hotspots_lat_lon ON hotspots(latitude, longitude);
            CREATE INDEX IF NOT EXISTS idx_homes_driver ON driver_homes(driver_id);
            "#,
        )?;

        debug!("Store schema initialized");
        Ok(())
    }
}

fn conversion_error(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        idx,
        Type::Text,
        Box::new(StoreError::Serialization(message)),
    )
}

fn get_timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let s: String = row.get(idx)?;
    parse_timestamp(&s).ok_or_else(|| conversion_error(idx, format!("bad timestamp '{s}'")))
}

fn get_location_type(row: &Row<'_>, idx: usize) -> rusqlite::Result<LocationType> {
    let s: String = row.get(idx)?;
    s.parse()
        .map_err(|e: waypost_api::UnknownLocationType| conversion_error(idx, e.to_string()))
}

fn row_to_sample(row: &Row<'_>) -> rusqlite::Result<(i64, LocationSample)> {
    Ok((
        row.get(0)?,
        LocationSample {
            driver_id: DriverId::new(row.get::<_, String>(1)?),
            latitude: row.get(2)?,
            longitude: row.get(3)?,
            speed: row.get(4)?,
            is_moving: row.get(5)?,
            battery: row.get(6)?,
            recorded_at: get_timestamp(row, 7)?,
        },
    ))
}

fn row_to_stop(row: &Row<'_>) -> rusqlite::Result<Stop> {
    let ended_at = match row.get::<_, Option<String>>(7)? {
        Some(s) => Some(
            parse_timestamp(&s).ok_or_else(|| conversion_error(7, format!("bad timestamp '{s}'")))?,
        ),
        None => None,
    };

    Ok(Stop {
        id: Some(StopId::new(row.get(0)?)),
        driver_id: DriverId::new(row.get::<_, String>(1)?),
        trip_id: row.get::<_, Option<String>>(2)?.map(TripId::new),
        latitude: row.get(3)?,
        longitude: row.get(4)?,
        location_type: get_location_type(row, 5)?,
        started_at: get_timestamp(row, 6)?,
        ended_at,
        duration_minutes: row.get(8)?,
        is_in_vehicle: row.get(9)?,
    })
}

fn row_to_hotspot(row: &Row<'_>) -> rusqlite::Result<Hotspot> {
    Ok(Hotspot {
        id: HotspotId::new(row.get(0)?),
        name: row.get(1)?,
        location_type: get_location_type(row, 2)?,
        latitude: row.get(3)?,
        longitude: row.get(4)?,
        radius_meters: row.get(5)?,
        visit_count: row.get(6)?,
        unique_drivers: row.get(7)?,
        is_verified: row.get(8)?,
        is_auto_detected: row.get(9)?,
        created_at: get_timestamp(row, 10)?,
    })
}

fn row_to_home(row: &Row<'_>) -> rusqlite::Result<DriverHome> {
    Ok(DriverHome {
        id: HomeId::new(row.get(0)?),
        driver_id: DriverId::new(row.get::<_, String>(1)?),
        name: row.get(2)?,
        latitude: row.get(3)?,
        longitude: row.get(4)?,
        radius_meters: row.get(5)?,
        is_active: row.get(6)?,
    })
}

fn row_to_zone(row: &Row<'_>) -> rusqlite::Result<GeofenceZone> {
    Ok(GeofenceZone {
        id: ZoneId::new(row.get(0)?),
        name: row.get(1)?,
        zone_type: row.get(2)?,
        latitude: row.get(3)?,
        longitude: row.get(4)?,
        radius_meters: row.get(5)?,
        is_active: row.get(6)?,
    })
}

fn row_to_driver(row: &Row<'_>) -> rusqlite::Result<Driver> {
    Ok(Driver {
        id: DriverId::new(row.get::<_, String>(0)?),
        name: row.get(1)?,
        status: DriverStatus::parse_lossy(&row.get::<_, String>(2)?),
        is_active: row.get(3)?,
    })
}

fn load_hotspot(conn: &Connection, id: HotspotId) -> StoreResult<Hotspot> {
    conn.query_row(
        &format!("SELECT {HOTSPOT_COLUMNS} FROM hotspots WHERE id = ?1"),
        [id.get()],
        row_to_hotspot,
    )
    .optional()?
    .ok_or_else(|| StoreError::NotFound(format!("hotspot {id}")))
}

impl Store for SqliteStore {
    fn upsert_driver(&self, driver: &Driver) -> StoreResult<()> {
        let conn = self.conn();

        conn.execute(
            r#"
            INSERT INTO drivers (id, name, status, is_active)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(id)
            DO UPDATE SET name = excluded.name,
                          status = excluded.status,
                          is_active = excluded.is_active
            "#,
            params![
                driver.id.as_str(),
                driver.name,
                driver.status.as_str(),
                driver.is_active
            ],
        )?;

        debug!(driver_id = %driver.id, "Driver upserted");
        Ok(())
    }

    fn get_driver(&self, id: &DriverId) -> StoreResult<Option<Driver>> {
        let conn = self.conn();

        let driver = conn
            .query_row(
                "SELECT id, name, status, is_active FROM drivers WHERE id = ?1",
                [id.as_str()],
                row_to_driver,
            )
            .optional()?;

        Ok(driver)
    }

    fn active_drivers(&self) -> StoreResult<Vec<Driver>> {
        let conn = self.conn();

        let mut stmt = conn.prepare(
            "SELECT id, name, status, is_active FROM drivers WHERE is_active = 1 ORDER BY id",
        )?;
        let drivers = stmt
            .query_map([], row_to_driver)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(drivers)
    }

    fn set_driver_status(&self, id: &DriverId, status: DriverStatus) -> StoreResult<()> {
        let conn = self.conn();

        let updated = conn.execute(
            "UPDATE drivers SET status = ?1 WHERE id = ?2",
            params![status.as_str(), id.as_str()],
        )?;
        if updated == 0 {
            return Err(StoreError::NotFound(format!("driver {id}")));
        }

        Ok(())
    }

    fn append_sample(&self, sample: &LocationSample) -> StoreResult<i64> {
        let conn = self.conn();

        conn.execute(
            r#"
            INSERT INTO location_samples
                (driver_id, latitude, longitude, speed, is_moving, battery, recorded_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                sample.driver_id.as_str(),
                sample.latitude,
                sample.longitude,
                sample.speed,
                sample.is_moving,
                sample.battery,
                format_timestamp(&sample.recorded_at),
            ],
        )?;

        Ok(conn.last_insert_rowid())
    }

    fn samples_in_range(
        &self,
        driver_id: &DriverId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StoreResult<Vec<LocationSample>> {
        let conn = self.conn();

        let mut stmt = conn.prepare(&format!(
            "SELECT {SAMPLE_COLUMNS} FROM location_samples \
             WHERE driver_id = ?1 AND recorded_at >= ?2 AND recorded_at <= ?3 \
             ORDER BY recorded_at, seq"
        ))?;
        let samples = stmt
            .query_map(
                params![
                    driver_id.as_str(),
                    format_timestamp(&start),
                    format_timestamp(&end)
                ],
                row_to_sample,
            )?
            .map(|row| row.map(|(_, sample)| sample))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(samples)
    }

    fn samples_before(
        &self,
        driver_id: &DriverId,
        before: DateTime<Utc>,
        limit: usize,
    ) -> StoreResult<Vec<LocationSample>> {
        let conn = self.conn();

        let mut stmt = conn.prepare(&format!(
            "SELECT {SAMPLE_COLUMNS} FROM location_samples \
             WHERE driver_id = ?1 AND recorded_at < ?2 \
             ORDER BY recorded_at DESC, seq DESC LIMIT ?3"
        ))?;
        let samples = stmt
            .query_map(
                params![driver_id.as_str(), format_timestamp(&before), limit as i64],
                row_to_sample,
            )?
            .map(|row| row.map(|(_, sample)| sample))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(samples)
    }

    fn samples_following(
        &self,
        driver_id: &DriverId,
        after: DateTime<Utc>,
        limit: usize,
    ) -> StoreResult<Vec<LocationSample>> {
        let conn = self.conn();

        let mut stmt = conn.prepare(&format!(
            "SELECT {SAMPLE_COLUMNS} FROM location_samples \
             WHERE driver_id = ?1 AND recorded_at > ?2 \
             ORDER BY recorded_at, seq LIMIT ?3"
        ))?;
        let samples = stmt
            .query_map(
                params![driver_id.as_str(), format_timestamp(&after), limit as i64],
                row_to_sample,
            )?
            .map(|row| row.map(|(_, sample)| sample))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(samples)
    }

    fn samples_after(&self, after: i64, limit: usize) -> StoreResult<Vec<(i64, LocationSample)>> {
        let conn = self.conn();

        let mut stmt = conn.prepare(&format!(
            "SELECT {SAMPLE_COLUMNS} FROM location_samples WHERE seq > ?1 ORDER BY seq LIMIT ?2"
        ))?;
        let samples = stmt
            .query_map(params![after, limit as i64], row_to_sample)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(samples)
    }

    fn latest_sample_seq(&self) -> StoreResult<i64> {
        let conn = self.conn();
        let seq = conn.query_row(
            "SELECT COALESCE(MAX(seq), 0) FROM location_samples",
            [],
            |row| row.get(0),
        )?;
        Ok(seq)
    }

    fn insert_stops_deduplicated(
        &self,
        stops: &[Stop],
        window: &DedupWindow,
    ) -> StoreResult<Vec<Stop>> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let eps = window.coord_tolerance_degrees;

        let mut inserted = Vec::new();
        for stop in stops {
            let existing: Option<i64> = tx
                .query_row(
                    r#"
                    SELECT id FROM stops
                    WHERE driver_id = ?1
                      AND (
                        (started_at BETWEEN ?2 AND ?3
                          AND latitude BETWEEN ?4 AND ?5
                          AND longitude BETWEEN ?6 AND ?7)
                        OR (started_at <= ?9 AND (ended_at IS NULL OR ended_at >= ?8))
                      )
                    LIMIT 1
                    "#,
                    params![
                        stop.driver_id.as_str(),
                        format_timestamp(&(stop.started_at - window.time_tolerance)),
                        format_timestamp(&(stop.started_at + window.time_tolerance)),
                        stop.latitude - eps,
                        stop.latitude + eps,
                        stop.longitude - eps,
                        stop.longitude + eps,
                        format_timestamp(&stop.started_at),
                        format_timestamp(&stop.ended_at.unwrap_or(stop.started_at)),
                    ],
                    |row| row.get(0),
                )
                .optional()?;

            if let Some(existing) = existing {
                debug!(
                    driver_id = %stop.driver_id,
                    existing_stop = existing,
                    started_at = %stop.started_at,
                    "Skipping duplicate stop"
                );
                continue;
            }

            tx.execute(
                &format!(
                    "INSERT INTO stops ({}) VALUES (NULL, ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                    STOP_COLUMNS
                ),
                params![
                    stop.driver_id.as_str(),
                    stop.trip_id.as_ref().map(|t| t.as_str()),
                    stop.latitude,
                    stop.longitude,
                    stop.location_type.as_str(),
                    format_timestamp(&stop.started_at),
                    stop.ended_at.as_ref().map(format_timestamp),
                    stop.duration_minutes,
                    stop.is_in_vehicle,
                ],
            )?;

            let mut stored = stop.clone();
            stored.id = Some(StopId::new(tx.last_insert_rowid()));
            inserted.push(stored);
        }

        tx.commit()?;

        debug!(
            candidates = stops.len(),
            inserted = inserted.len(),
            "Stops persisted"
        );
        Ok(inserted)
    }

    fn stops_for_driver(
        &self,
        driver_id: &DriverId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StoreResult<Vec<Stop>> {
        let conn = self.conn();

        let mut stmt = conn.prepare(&format!(
            "SELECT {STOP_COLUMNS} FROM stops \
             WHERE driver_id = ?1 AND started_at >= ?2 AND started_at <= ?3 \
             ORDER BY started_at, id"
        ))?;
        let stops = stmt
            .query_map(
                params![
                    driver_id.as_str(),
                    format_timestamp(&start),
                    format_timestamp(&end)
                ],
                row_to_stop,
            )?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(stops)
    }

    fn get_stop(&self, id: StopId) -> StoreResult<Stop> {
        let conn = self.conn();

        conn.query_row(
            &format!("SELECT {STOP_COLUMNS} FROM stops WHERE id = ?1"),
            [id.get()],
            row_to_stop,
        )
        .optional()?
        .ok_or_else(|| StoreError::NotFound(format!("stop {id}")))
    }

    fn hotspots_in_bounds(
        &self,
        bounds: &BoundingBox,
        location_type: Option<LocationType>,
    ) -> StoreResult<Vec<Hotspot>> {
        let conn = self.conn();

        let mut stmt = conn.prepare(&format!(
            "SELECT {HOTSPOT_COLUMNS} FROM hotspots \
             WHERE latitude BETWEEN ?1 AND ?2 \
               AND longitude BETWEEN ?3 AND ?4 \
               AND (?5 IS NULL OR location_type = ?5) \
             ORDER BY visit_count DESC, id"
        ))?;
        let hotspots = stmt
            .query_map(
                params![
                    bounds.min_lat,
                    bounds.max_lat,
                    bounds.min_lon,
                    bounds.max_lon,
                    location_type.map(|t| t.as_str()),
                ],
                row_to_hotspot,
            )?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(hotspots)
    }

    fn insert_hotspot(
        &self,
        hotspot: &NewHotspot,
        driver_id: Option<&DriverId>,
    ) -> StoreResult<Hotspot> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        tx.execute(
            r#"
            INSERT INTO hotspots
                (name, location_type, latitude, longitude, radius_meters,
                 visit_count, unique_drivers, is_verified, is_auto_detected, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6, 0, ?7, ?8)
            "#,
            params![
                hotspot.name,
                hotspot.location_type.as_str(),
                hotspot.latitude,
                hotspot.longitude,
                hotspot.radius_meters,
                i64::from(driver_id.is_some()),
                hotspot.is_auto_detected,
                format_timestamp(&waypost_util::now()),
            ],
        )?;
        let id = HotspotId::new(tx.last_insert_rowid());

        if let Some(driver_id) = driver_id {
            tx.execute(
                "INSERT INTO hotspot_visitors (hotspot_id, driver_id) VALUES (?1, ?2)",
                params![id.get(), driver_id.as_str()],
            )?;
        }

        let created = load_hotspot(&tx, id)?;
        tx.commit()?;

        debug!(hotspot_id = %id, location_type = %hotspot.location_type, "Hotspot created");
        Ok(created)
    }

    fn record_hotspot_visit(
        &self,
        id: HotspotId,
        driver_id: Option<&DriverId>,
    ) -> StoreResult<Hotspot> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let updated = tx.execute(
            "UPDATE hotspots SET visit_count = visit_count + 1 WHERE id = ?1",
            [id.get()],
        )?;
        if updated == 0 {
            return Err(StoreError::NotFound(format!("hotspot {id}")));
        }

        if let Some(driver_id) = driver_id {
            let first_visit = tx.execute(
                "INSERT OR IGNORE INTO hotspot_visitors (hotspot_id, driver_id) VALUES (?1, ?2)",
                params![id.get(), driver_id.as_str()],
            )?;
            if first_visit > 0 {
                tx.execute(
                    "UPDATE hotspots SET unique_drivers = unique_drivers + 1 WHERE id = ?1",
                    [id.get()],
                )?;
            }
        }

        let hotspot = load_hotspot(&tx, id)?;
        tx.commit()?;

        Ok(hotspot)
    }

    fn get_hotspot(&self, id: HotspotId) -> StoreResult<Hotspot> {
        let conn = self.conn();
        load_hotspot(&conn, id)
    }

    fn active_homes(&self, driver_id: &DriverId) -> StoreResult<Vec<DriverHome>> {
        let conn = self.conn();

        let mut stmt = conn.prepare(&format!(
            "SELECT {HOME_COLUMNS} FROM driver_homes \
             WHERE driver_id = ?1 AND is_active = 1 ORDER BY id"
        ))?;
        let homes = stmt
            .query_map([driver_id.as_str()], row_to_home)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(homes)
    }

    fn insert_home(&self, home: &DriverHome) -> StoreResult<DriverHome> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let active: i64 = tx.query_row(
            "SELECT COUNT(*) FROM driver_homes WHERE driver_id = ?1 AND is_active = 1",
            [home.driver_id.as_str()],
            |row| row.get(0),
        )?;
        if home.is_active && active >= MAX_HOMES_PER_DRIVER as i64 {
            return Err(StoreError::Constraint(format!(
                "driver {} already has {} active homes",
                home.driver_id, active
            )));
        }

        tx.execute(
            r#"
            INSERT INTO driver_homes (driver_id, name, latitude, longitude, radius_meters, is_active)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                home.driver_id.as_str(),
                home.name,
                home.latitude,
                home.longitude,
                home.radius_meters,
                home.is_active,
            ],
        )?;
        let id = HomeId::new(tx.last_insert_rowid());
        tx.commit()?;

        debug!(driver_id = %home.driver_id, home_id = %id, "Home registered");
        Ok(DriverHome {
            id,
            ..home.clone()
        })
    }

    fn deactivate_home(&self, id: HomeId) -> StoreResult<()> {
        let conn = self.conn();

        let updated = conn.execute(
            "UPDATE driver_homes SET is_active = 0 WHERE id = ?1",
            [id.get()],
        )?;
        if updated == 0 {
            return Err(StoreError::NotFound(format!("home {id}")));
        }

        Ok(())
    }

    fn insert_geofence(&self, zone: &GeofenceZone) -> StoreResult<GeofenceZone> {
        let conn = self.conn();

        conn.execute(
            r#"
            INSERT INTO geofence_zones (name, zone_type, latitude, longitude, radius_meters, is_active)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                zone.name,
                zone.zone_type,
                zone.latitude,
                zone.longitude,
                zone.radius_meters,
                zone.is_active,
            ],
        )?;

        Ok(GeofenceZone {
            id: ZoneId::new(conn.last_insert_rowid()),
            ..zone.clone()
        })
    }

    fn active_geofences(&self) -> StoreResult<Vec<GeofenceZone>> {
        let conn = self.conn();

        let mut stmt = conn.prepare(&format!(
            "SELECT {ZONE_COLUMNS} FROM geofence_zones WHERE is_active = 1 ORDER BY id"
        ))?;
        let zones = stmt
            .query_map([], row_to_zone)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(zones)
    }

    fn is_healthy(&self) -> bool {
        match self.conn.lock() {
            Ok(conn) => conn.query_row("SELECT 1", [], |_| Ok(())).is_ok(),
            Err(_) => {
                warn!("Store lock poisoned");
                false
            }
        }
    }
}
