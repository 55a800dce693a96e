//! Domain records for location intelligence

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use waypost_util::{DriverId, HomeId, HotspotId, StopId, TripId, WaypostError, ZoneId};

/// Default radius of a driver home, in meters
pub const DEFAULT_HOME_RADIUS_METERS: f64 = 200.0;

/// Maximum number of active homes per driver
pub const MAX_HOMES_PER_DRIVER: usize = 2;

/// A single GPS fix reported by a driver's device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationSample {
    pub driver_id: DriverId,
    pub latitude: f64,
    pub longitude: f64,
    /// Ground speed in km/h, if the device reported one
    pub speed: Option<f64>,
    pub is_moving: bool,
    /// Battery level in percent
    pub battery: Option<f64>,
    pub recorded_at: DateTime<Utc>,
}

impl LocationSample {
    /// Check the sample is well-formed before it reaches the detector.
    pub fn validate(&self) -> Result<(), WaypostError> {
        waypost_util::validate_point(self.latitude, self.longitude)?;
        if let Some(speed) = self.speed
            && (!speed.is_finite() || speed < 0.0)
        {
            return Err(WaypostError::validation(format!("invalid speed {speed}")));
        }
        if let Some(battery) = self.battery
            && !(0.0..=100.0).contains(&battery)
        {
            return Err(WaypostError::validation(format!(
                "battery {battery} out of range"
            )));
        }
        if self.driver_id.as_str().is_empty() {
            return Err(WaypostError::validation("driver id cannot be empty"));
        }
        Ok(())
    }
}

/// Category of a place a vehicle dwelled at
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationType {
    #[default]
    Unknown,
    Home,
    Customer,
    Warehouse,
    FuelStation,
    Rest,
    Parking,
    Other,
}

impl LocationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LocationType::Unknown => "unknown",
            LocationType::Home => "home",
            LocationType::Customer => "customer",
            LocationType::Warehouse => "warehouse",
            LocationType::FuelStation => "fuel_station",
            LocationType::Rest => "rest",
            LocationType::Parking => "parking",
            LocationType::Other => "other",
        }
    }
}

impl fmt::Display for LocationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error)]
#[error("unknown location type: {0}")]
pub struct UnknownLocationType(pub String);

impl FromStr for LocationType {
    type Err = UnknownLocationType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "unknown" => LocationType::Unknown,
            "home" => LocationType::Home,
            "customer" => LocationType::Customer,
            "warehouse" => LocationType::Warehouse,
            "fuel_station" => LocationType::FuelStation,
            "rest" => LocationType::Rest,
            "parking" => LocationType::Parking,
            "other" => LocationType::Other,
            other => return Err(UnknownLocationType(other.to_string())),
        })
    }
}

/// A detected dwell interval
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stop {
    /// Assigned by the store on insert
    pub id: Option<StopId>,
    pub driver_id: DriverId,
    pub trip_id: Option<TripId>,
    /// Mean of the member samples
    pub latitude: f64,
    pub longitude: f64,
    pub location_type: LocationType,
    pub started_at: DateTime<Utc>,
    /// `None` while the dwell is still in progress
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_minutes: i64,
    pub is_in_vehicle: bool,
}

impl Stop {
    pub fn is_open(&self) -> bool {
        self.ended_at.is_none()
    }
}

/// A learned point of interest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hotspot {
    pub id: HotspotId,
    pub name: String,
    pub location_type: LocationType,
    pub latitude: f64,
    pub longitude: f64,
    pub radius_meters: f64,
    pub visit_count: i64,
    pub unique_drivers: i64,
    pub is_verified: bool,
    pub is_auto_detected: bool,
    pub created_at: DateTime<Utc>,
}

/// Fields of a hotspot about to be created
#[derive(Debug, Clone, PartialEq)]
pub struct NewHotspot {
    pub name: String,
    pub location_type: LocationType,
    pub latitude: f64,
    pub longitude: f64,
    pub radius_meters: f64,
    pub is_auto_detected: bool,
}

/// An administrator-defined circular zone
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeofenceZone {
    pub id: ZoneId,
    pub name: String,
    pub zone_type: String,
    pub latitude: f64,
    pub longitude: f64,
    pub radius_meters: f64,
    pub is_active: bool,
}

/// A home location registered by a driver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverHome {
    pub id: HomeId,
    pub driver_id: DriverId,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub radius_meters: f64,
    pub is_active: bool,
}

/// A driver known to the fleet backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Driver {
    pub id: DriverId,
    pub name: String,
    pub status: DriverStatus,
    pub is_active: bool,
}

/// Coarse live status derived from the latest sample
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverStatus {
    #[default]
    Offline,
    Moving,
    Stopped,
    AtHome,
}

impl DriverStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DriverStatus::Offline => "offline",
            DriverStatus::Moving => "moving",
            DriverStatus::Stopped => "stopped",
            DriverStatus::AtHome => "at_home",
        }
    }

    /// Parse a stored status, treating anything unrecognised as offline
    pub fn parse_lossy(s: &str) -> Self {
        match s {
            "moving" => DriverStatus::Moving,
            "stopped" => DriverStatus::Stopped,
            "at_home" => DriverStatus::AtHome,
            _ => DriverStatus::Offline,
        }
    }
}

impl fmt::Display for DriverStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
