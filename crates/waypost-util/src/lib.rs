//! Shared utilities for waypost
//!
//! This crate provides:
//! - ID types (DriverId, StopId, HotspotId, ClientId, ...)
//! - Geometry primitives (haversine distance, bounding boxes, centroids)
//! - Time utilities (UTC clock with a mock override for development)
//! - The error taxonomy shared by the core
//! - Default paths for socket, data, and config

mod error;
mod geo;
mod ids;
mod paths;
mod time;

pub use error::*;
pub use geo::*;
pub use ids::*;
pub use paths::*;
pub use time::*;
