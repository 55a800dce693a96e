//! Domain records and wire protocol for waypost
//!
//! This crate defines the types shared between the core, the store and
//! live viewers:
//! - Location samples, stops, hotspots, homes and geofence zones
//! - Client handshake messages (viewer -> hub)
//! - Live messages (hub -> viewer)

mod commands;
mod events;
mod types;

pub use commands::*;
pub use events::*;
pub use types::*;
