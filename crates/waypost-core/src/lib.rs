//! Location intelligence for waypost
//!
//! This crate contains:
//! - Stop detection (batch and incremental) over a driver's samples
//! - Batch scanning with per-driver failure isolation
//! - Hotspot find-or-create and nearby lookups
//! - Home proximity and geofence zone checks

mod detector;
mod homes;
mod hotspots;
mod scanner;
mod zones;

pub use detector::*;
pub use homes::*;
pub use hotspots::*;
pub use scanner::*;
pub use zones::*;
