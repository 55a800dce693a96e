//! Configuration validation

use crate::schema::RawConfig;
use std::net::SocketAddr;
use thiserror::Error;

/// Validation error
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    #[error("{field}: {message}")]
    InvalidValue { field: &'static str, message: String },

    #[error("Invalid TCP listen address '{0}'")]
    InvalidListenAddress(String),

    #[error("Ping interval {ping_secs}s must be shorter than read timeout {read_timeout_secs}s")]
    HeartbeatTooSlow {
        ping_secs: u64,
        read_timeout_secs: u64,
    },
}

fn positive_f64(field: &'static str, value: Option<f64>, errors: &mut Vec<ValidationError>) {
    if let Some(v) = value
        && (!v.is_finite() || v <= 0.0)
    {
        errors.push(ValidationError::InvalidValue {
            field,
            message: format!("must be a positive number, got {v}"),
        });
    }
}

/// Longest accepted duration given in minutes (one year)
const MAX_MINUTES: i64 = 365 * 24 * 60;

/// Longest accepted duration given in hours (one year)
const MAX_HOURS: i64 = 365 * 24;

/// Longest accepted hub timing given in seconds (one day)
const MAX_HUB_SECONDS: u64 = 24 * 60 * 60;

fn positive_i64(
    field: &'static str,
    value: Option<i64>,
    max: i64,
    errors: &mut Vec<ValidationError>,
) {
    match value {
        Some(v) if v <= 0 => errors.push(ValidationError::InvalidValue {
            field,
            message: format!("must be positive, got {v}"),
        }),
        Some(v) if v > max => errors.push(ValidationError::InvalidValue {
            field,
            message: format!("must be at most {max}, got {v}"),
        }),
        _ => {}
    }
}

fn nonzero(field: &'static str, value: Option<u64>, errors: &mut Vec<ValidationError>) {
    if value == Some(0) {
        errors.push(ValidationError::InvalidValue {
            field,
            message: "must be greater than zero".into(),
        });
    }
}

fn at_most(field: &'static str, value: Option<u64>, max: u64, errors: &mut Vec<ValidationError>) {
    if let Some(v) = value
        && v > max
    {
        errors.push(ValidationError::InvalidValue {
            field,
            message: format!("must be at most {max}, got {v}"),
        });
    }
}

/// Validate a raw configuration, collecting every problem found
pub fn validate_config(config: &RawConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if let Some(addr) = &config.service.tcp_listen
        && addr.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidListenAddress(addr.clone()));
    }

    let detector = &config.detector;
    positive_f64("detector.stop_radius_meters", detector.stop_radius_meters, &mut errors);
    positive_i64(
        "detector.min_stop_duration_minutes",
        detector.min_stop_duration_minutes,
        MAX_MINUTES,
        &mut errors,
    );
    positive_f64("detector.min_moving_speed_kmh", detector.min_moving_speed_kmh, &mut errors);

    if let Some(v) = config.dedup.time_tolerance_minutes
        && !(0..=MAX_MINUTES).contains(&v)
    {
        errors.push(ValidationError::InvalidValue {
            field: "dedup.time_tolerance_minutes",
            message: format!("must be between 0 and {MAX_MINUTES}, got {v}"),
        });
    }
    if let Some(v) = config.dedup.coord_tolerance_degrees
        && (!v.is_finite() || v < 0.0)
    {
        errors.push(ValidationError::InvalidValue {
            field: "dedup.coord_tolerance_degrees",
            message: format!("cannot be negative, got {v}"),
        });
    }

    positive_f64(
        "hotspots.match_radius_meters",
        config.hotspots.match_radius_meters,
        &mut errors,
    );
    nonzero(
        "hotspots.nearby_limit",
        config.hotspots.nearby_limit.map(|v| v as u64),
        &mut errors,
    );

    nonzero("scanner.workers", config.scanner.workers.map(|v| v as u64), &mut errors);
    at_most(
        "scanner.interval_minutes",
        config.scanner.interval_minutes,
        MAX_MINUTES as u64,
        &mut errors,
    );
    positive_i64(
        "scanner.lookback_hours",
        config.scanner.lookback_hours,
        MAX_HOURS,
        &mut errors,
    );

    let hub = &config.hub;
    nonzero("hub.queue_capacity", hub.queue_capacity.map(|v| v as u64), &mut errors);
    nonzero("hub.ping_interval_seconds", hub.ping_interval_seconds, &mut errors);
    nonzero("hub.read_timeout_seconds", hub.read_timeout_seconds, &mut errors);
    nonzero("hub.write_timeout_seconds", hub.write_timeout_seconds, &mut errors);
    nonzero("hub.feed_interval_ms", hub.feed_interval_ms, &mut errors);
    at_most("hub.ping_interval_seconds", hub.ping_interval_seconds, MAX_HUB_SECONDS, &mut errors);
    at_most("hub.read_timeout_seconds", hub.read_timeout_seconds, MAX_HUB_SECONDS, &mut errors);
    at_most("hub.write_timeout_seconds", hub.write_timeout_seconds, MAX_HUB_SECONDS, &mut errors);
    at_most("hub.feed_interval_ms", hub.feed_interval_ms, MAX_HUB_SECONDS * 1000, &mut errors);

    let ping = hub.ping_interval_seconds.unwrap_or(crate::DEFAULT_PING_INTERVAL_SECS);
    let read_timeout = hub.read_timeout_seconds.unwrap_or(crate::DEFAULT_READ_TIMEOUT_SECS);
    if ping >= read_timeout {
        errors.push(ValidationError::HeartbeatTooSlow {
            ping_secs: ping,
            read_timeout_secs: read_timeout,
        });
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = RawConfig {
            config_version: 1,
            ..Default::default()
        };
        assert!(validate_config(&config).is_empty());
    }

    #[test]
    fn non_positive_thresholds_rejected() {
        let mut config = RawConfig::default();
        config.detector.stop_radius_meters = Some(0.0);
        config.detector.min_stop_duration_minutes = Some(-5);
        config.scanner.workers = Some(0);

        let errors = validate_config(&config);
        assert_eq!(errors.len(), 3);
        assert!(errors.iter().all(|e| matches!(e, ValidationError::InvalidValue { .. })));
    }

    #[test]
    fn oversized_durations_rejected() {
        let mut config = RawConfig::default();
        config.detector.min_stop_duration_minutes = Some(i64::MAX);
        config.dedup.time_tolerance_minutes = Some(i64::MAX);
        config.scanner.interval_minutes = Some(u64::MAX);
        config.scanner.lookback_hours = Some(i64::MAX);
        config.hub.write_timeout_seconds = Some(u64::MAX);

        let errors = validate_config(&config);
        assert_eq!(errors.len(), 5);
    }

    #[test]
    fn heartbeat_must_beat_read_timeout() {
        let mut config = RawConfig::default();
        config.hub.ping_interval_seconds = Some(60);
        config.hub.read_timeout_seconds = Some(30);

        let errors = validate_config(&config);
        assert!(errors.iter().any(|e| matches!(e, ValidationError::HeartbeatTooSlow { .. })));
    }

    #[test]
    fn bad_listen_address_rejected() {
        let mut config = RawConfig::default();
        config.service.tcp_listen = Some("not-an-address".into());

        let errors = validate_config(&config);
        assert!(matches!(errors.as_slice(), [ValidationError::InvalidListenAddress(_)]));
    }
}
