//! Messages streamed from the hub to live viewers

use serde::{Deserialize, Serialize};
use waypost_util::DriverId;

use crate::{DriverStatus, LocationSample};

/// Latest position of a driver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationUpdate {
    pub driver_id: DriverId,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub speed: f64,
    pub is_moving: bool,
    pub status: String,
    /// Unix seconds of the underlying sample
    pub timestamp: i64,
}

impl LocationUpdate {
    pub fn from_sample(sample: &LocationSample, name: impl Into<String>, status: DriverStatus) -> Self {
        Self {
            driver_id: sample.driver_id.clone(),
            name: name.into(),
            latitude: sample.latitude,
            longitude: sample.longitude,
            speed: sample.speed.unwrap_or(0.0),
            is_moving: sample.is_moving,
            status: status.as_str().to_string(),
            timestamp: sample.recorded_at.timestamp(),
        }
    }
}

/// A driver's status changed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverStatusUpdate {
    pub driver_id: DriverId,
    pub name: String,
    pub status: String,
}

/// Everything the hub writes to a viewer, one JSON object per line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LiveMessage {
    LocationUpdate(LocationUpdate),
    DriverStatus(DriverStatusUpdate),
    /// Heartbeat; viewers answer with a pong
    Ping,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    #[test]
    fn location_update_wire_shape() {
        let sample = LocationSample {
            driver_id: DriverId::new("drv-7"),
            latitude: 41.0,
            longitude: 29.0,
            speed: None,
            is_moving: false,
            battery: None,
            recorded_at: Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap(),
        };
        let msg = LiveMessage::LocationUpdate(LocationUpdate::from_sample(
            &sample,
            "Ayse",
            DriverStatus::Stopped,
        ));

        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "location_update",
                "driver_id": "drv-7",
                "name": "Ayse",
                "latitude": 41.0,
                "longitude": 29.0,
                "speed": 0.0,
                "is_moving": false,
                "status": "stopped",
                "timestamp": 1740816000i64,
            })
        );
    }

    #[test]
    fn driver_status_wire_shape() {
        let msg = LiveMessage::DriverStatus(DriverStatusUpdate {
            driver_id: DriverId::new("drv-7"),
            name: "Ayse".into(),
            status: "at_home".into(),
        });

        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            value,
            json!({"type": "driver_status", "driver_id": "drv-7", "name": "Ayse", "status": "at_home"})
        );
    }

    #[test]
    fn ping_wire_shape() {
        assert_eq!(serde_json::to_string(&LiveMessage::Ping).unwrap(), r#"{"type":"ping"}"#);
    }
}
