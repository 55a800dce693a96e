//! Error types for waypost

use thiserror::Error;

/// Error taxonomy for location intelligence operations
///
/// Pure functions (geometry, detection) never produce these on empty input;
/// batch operations log and skip per driver, single-driver calls surface them.
#[derive(Debug, Error)]
pub enum WaypostError {
    /// Malformed sample, home, or configuration value. Rejected before processing.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Unknown id in an explicit lookup
    #[error("Not found: {0}")]
    NotFound(String),

    /// Failure persisting or loading from the store
    #[error("Storage error: {0}")]
    Storage(String),

    /// Live connection read/write failure
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl WaypostError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether retrying the same operation later may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Storage(_) | Self::Connection(_))
    }
}

pub type Result<T> = std::result::Result<T, WaypostError>;
