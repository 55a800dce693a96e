//! Persistence layer for waypost
//!
//! Provides:
//! - Append-only location samples
//! - Stops with at-most-once insertion (de-duplication window)
//! - Hotspots with atomic visit counting
//! - Driver homes (at most two active per driver) and geofence zones

mod sqlite;
mod traits;

pub use sqlite::*;
pub use traits::*;

use thiserror::Error;
use waypost_util::WaypostError;

/// Store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Constraint violated: {0}")]
    Constraint(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

impl From<StoreError> for WaypostError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(what) => WaypostError::NotFound(what),
            StoreError::Constraint(what) => WaypostError::Validation(what),
            other => WaypostError::Storage(other.to_string()),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
