//! Live distribution hub for waypost
//!
//! Provides:
//! - A connection registry owned by a single control loop
//! - Non-blocking fan-out; slow viewers are dropped, never waited on
//! - NDJSON (newline-delimited JSON) framing with a hello handshake
//! - Heartbeats and read deadlines per connection
//! - Unix domain socket and TCP acceptors, and a viewer client

mod client;
mod connection;
mod hub;
mod server;

pub use client::*;
pub use connection::*;
pub use hub::*;
pub use server::*;

use thiserror::Error;

/// Hub errors
#[derive(Debug, Error)]
pub enum HubError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Handshake failed: {0}")]
    Handshake(String),

    #[error("Hub has stopped")]
    HubStopped,
}

impl From<HubError> for waypost_util::WaypostError {
    fn from(e: HubError) -> Self {
        match e {
            HubError::HubStopped => waypost_util::WaypostError::internal(e.to_string()),
            other => waypost_util::WaypostError::connection(other.to_string()),
        }
    }
}

pub type HubResult<T> = Result<T, HubError>;
