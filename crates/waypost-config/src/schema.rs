//! Raw configuration schema (as parsed from TOML)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Raw configuration as parsed from TOML
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawConfig {
    /// Config schema version
    pub config_version: u32,

    /// Service-level settings
    #[serde(default)]
    pub service: RawServiceConfig,

    /// Stop detection thresholds
    #[serde(default)]
    pub detector: RawDetectorConfig,

    /// Duplicate-stop suppression window
    #[serde(default)]
    pub dedup: RawDedupConfig,

    /// Hotspot matching
    #[serde(default)]
    pub hotspots: RawHotspotConfig,

    /// Periodic batch scanning
    #[serde(default)]
    pub scanner: RawScannerConfig,

    /// Live distribution hub
    #[serde(default)]
    pub hub: RawHubConfig,
}

/// Service-level settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawServiceConfig {
    /// Viewer socket path (default: $XDG_RUNTIME_DIR/waypost/waypostd.sock)
    pub socket_path: Option<PathBuf>,

    /// Optional TCP address for viewers, e.g. "0.0.0.0:7400"
    pub tcp_listen: Option<String>,

    /// Data directory for the store
    pub data_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawDetectorConfig {
    /// Maximum distance from the cluster anchor, in meters (default 100)
    pub stop_radius_meters: Option<f64>,

    /// Minimum dwell to count as a stop (default 30)
    pub min_stop_duration_minutes: Option<i64>,

    /// Samples slower than this are stationary (default 5)
    pub min_moving_speed_kmh: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawDedupConfig {
    /// ±minutes around started_at (default 5)
    pub time_tolerance_minutes: Option<i64>,

    /// ±degrees around the centroid (default 0.001, ~100 m)
    pub coord_tolerance_degrees: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawHotspotConfig {
    /// Radius used when matching stops against hotspots (default 100)
    pub match_radius_meters: Option<f64>,

    /// Maximum results returned by nearby lookups (default 10)
    pub nearby_limit: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawScannerConfig {
    /// Drivers processed concurrently (default 4)
    pub workers: Option<usize>,

    /// Minutes between periodic scans, 0 disables them (default 15)
    pub interval_minutes: Option<u64>,

    /// How far back each periodic scan looks (default 24)
    pub lookback_hours: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawHubConfig {
    /// Outbound queue slots per viewer (default 256)
    pub queue_capacity: Option<usize>,

    /// Seconds between heartbeats (default 54)
    pub ping_interval_seconds: Option<u64>,

    /// Seconds of silence before a viewer is dropped (default 60)
    pub read_timeout_seconds: Option<u64>,

    /// Seconds a single write may take (default 10)
    pub write_timeout_seconds: Option<u64>,

    /// Milliseconds between live feed polls (default 1000)
    pub feed_interval_ms: Option<u64>,
}
