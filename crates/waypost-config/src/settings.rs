//! Validated settings structures

use crate::schema::{
    RawConfig, RawDedupConfig, RawDetectorConfig, RawHotspotConfig, RawHubConfig,
    RawScannerConfig, RawServiceConfig,
};
use crate::{DEFAULT_PING_INTERVAL_SECS, DEFAULT_READ_TIMEOUT_SECS};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Validated settings ready for use by the core and the hub
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub service: ServiceConfig,
    pub detector: DetectorSettings,
    pub dedup: DedupSettings,
    pub hotspots: HotspotSettings,
    pub scanner: ScannerSettings,
    pub hub: HubSettings,
}

impl Settings {
    /// Convert from raw config (after validation)
    pub fn from_raw(raw: RawConfig) -> Self {
        Self {
            service: ServiceConfig::from_raw(raw.service),
            detector: DetectorSettings::from_raw(raw.detector),
            dedup: DedupSettings::from_raw(raw.dedup),
            hotspots: HotspotSettings::from_raw(raw.hotspots),
            scanner: ScannerSettings::from_raw(raw.scanner),
            hub: HubSettings::from_raw(raw.hub),
        }
    }
}

/// Service configuration
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub socket_path: PathBuf,
    pub tcp_listen: Option<SocketAddr>,
    pub data_dir: PathBuf,
}

impl ServiceConfig {
    fn from_raw(raw: RawServiceConfig) -> Self {
        Self {
            socket_path: raw
                .socket_path
                .unwrap_or_else(waypost_util::default_socket_path),
            tcp_listen: raw.tcp_listen.and_then(|addr| addr.parse().ok()),
            data_dir: raw
                .data_dir
                .unwrap_or_else(waypost_util::default_data_dir),
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self::from_raw(RawServiceConfig::default())
    }
}

/// Thresholds for dwell detection
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectorSettings {
    /// Maximum distance from the cluster anchor for a sample to join it
    pub stop_radius_meters: f64,
    /// Minimum dwell (inclusive) for a cluster to become a stop
    pub min_stop_duration: chrono::Duration,
    /// Samples reporting a lower speed are stationary
    pub min_moving_speed_kmh: f64,
}

impl DetectorSettings {
    fn from_raw(raw: RawDetectorConfig) -> Self {
        let defaults = Self::default();
        Self {
            stop_radius_meters: raw.stop_radius_meters.unwrap_or(defaults.stop_radius_meters),
            min_stop_duration: raw
                .min_stop_duration_minutes
                .and_then(chrono::Duration::try_minutes)
                .unwrap_or(defaults.min_stop_duration),
            min_moving_speed_kmh: raw
                .min_moving_speed_kmh
                .unwrap_or(defaults.min_moving_speed_kmh),
        }
    }
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            stop_radius_meters: 100.0,
            min_stop_duration: chrono::Duration::minutes(30),
            min_moving_speed_kmh: 5.0,
        }
    }
}

/// Box used to recognise a stop that was already persisted
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DedupSettings {
    pub time_tolerance: chrono::Duration,
    pub coord_tolerance_degrees: f64,
}

impl DedupSettings {
    fn from_raw(raw: RawDedupConfig) -> Self {
        let defaults = Self::default();
        Self {
            time_tolerance: raw
                .time_tolerance_minutes
                .and_then(chrono::Duration::try_minutes)
                .unwrap_or(defaults.time_tolerance),
            coord_tolerance_degrees: raw
                .coord_tolerance_degrees
                .unwrap_or(defaults.coord_tolerance_degrees),
        }
    }
}

impl Default for DedupSettings {
    fn default() -> Self {
        Self {
            time_tolerance: chrono::Duration::minutes(5),
            coord_tolerance_degrees: 0.001,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HotspotSettings {
    pub match_radius_meters: f64,
    pub nearby_limit: usize,
}

impl HotspotSettings {
    fn from_raw(raw: RawHotspotConfig) -> Self {
        let defaults = Self::default();
        Self {
            match_radius_meters: raw
                .match_radius_meters
                .unwrap_or(defaults.match_radius_meters),
            nearby_limit: raw.nearby_limit.unwrap_or(defaults.nearby_limit),
        }
    }
}

impl Default for HotspotSettings {
    fn default() -> Self {
        Self {
            match_radius_meters: 100.0,
            nearby_limit: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScannerSettings {
    pub workers: usize,
    /// None disables periodic scans
    pub interval: Option<Duration>,
    pub lookback: chrono::Duration,
}

impl ScannerSettings {
    fn from_raw(raw: RawScannerConfig) -> Self {
        let defaults = Self::default();
        Self {
            workers: raw.workers.unwrap_or(defaults.workers),
            interval: match raw.interval_minutes {
                Some(0) => None,
                Some(minutes) => minutes
                    .checked_mul(60)
                    .map(Duration::from_secs)
                    .or(defaults.interval),
                None => defaults.interval,
            },
            lookback: raw
                .lookback_hours
                .and_then(chrono::Duration::try_hours)
                .unwrap_or(defaults.lookback),
        }
    }
}

impl Default for ScannerSettings {
    fn default() -> Self {
        Self {
            workers: 4,
            interval: Some(Duration::from_secs(15 * 60)),
            lookback: chrono::Duration::hours(24),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HubSettings {
    pub queue_capacity: usize,
    pub ping_interval: Duration,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub feed_interval: Duration,
}

impl HubSettings {
    fn from_raw(raw: RawHubConfig) -> Self {
        let defaults = Self::default();
        Self {
            queue_capacity: raw.queue_capacity.unwrap_or(defaults.queue_capacity),
            ping_interval: raw
                .ping_interval_seconds
                .map(Duration::from_secs)
                .unwrap_or(defaults.ping_interval),
            read_timeout: raw
                .read_timeout_seconds
                .map(Duration::from_secs)
                .unwrap_or(defaults.read_timeout),
            write_timeout: raw
                .write_timeout_seconds
                .map(Duration::from_secs)
                .unwrap_or(defaults.write_timeout),
            feed_interval: raw
                .feed_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.feed_interval),
        }
    }
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            ping_interval: Duration::from_secs(DEFAULT_PING_INTERVAL_SECS),
            read_timeout: Duration::from_secs(DEFAULT_READ_TIMEOUT_SECS),
            write_timeout: Duration::from_secs(10),
            feed_interval: Duration::from_millis(1000),
        }
    }
}
