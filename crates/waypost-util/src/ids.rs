//! Strongly-typed identifiers for waypost

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifier of a driver, as assigned by the fleet backend
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DriverId(String);

impl DriverId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DriverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for DriverId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for DriverId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Identifier of a trip a stop belongs to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TripId(String);

impl TripId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TripId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

macro_rules! row_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            pub fn new(id: i64) -> Self {
                Self(id)
            }

            pub fn get(&self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

row_id!(
    /// Row id of a persisted stop
    StopId
);
row_id!(
    /// Row id of a learned hotspot
    HotspotId
);
row_id!(
    /// Row id of a registered driver home
    HomeId
);
row_id!(
    /// Row id of an administered geofence zone
    ZoneId
);

/// Identifier of a connected live viewer
///
/// Viewers announce their own identifier in the handshake; one is generated
/// when they don't.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(String);

impl ClientId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::generate()
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn driver_id_equality() {
        let id1 = DriverId::new("drv-1");
        let id2 = DriverId::from("drv-1");
        let id3 = DriverId::new("drv-2");

        assert_eq!(id1, id2);
        assert_ne!(id1, id3);
    }

    #[test]
    fn generated_client_ids_are_unique() {
        assert_ne!(ClientId::generate(), ClientId::generate());
    }

    #[test]
    fn ids_serialize_as_bare_values() {
        assert_eq!(serde_json::to_string(&DriverId::new("d1")).unwrap(), "\"d1\"");
        assert_eq!(serde_json::to_string(&StopId::new(7)).unwrap(), "7");

        let parsed: HotspotId = serde_json::from_str("42").unwrap();
        assert_eq!(parsed.get(), 42);
    }
}
