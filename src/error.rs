//! Error types for the Floodgate engine.

use thiserror::Error;

use crate::rate::Rate;

/// Main error type for Floodgate operations.
#[derive(Error, Debug)]
pub enum FloodgateError {
    /// A bucket rejected an item and no retry within the caller's delay
    /// budget succeeded. This is the only expected, recoverable failure.
    #[error("rate limit exceeded for '{name}': {rate}")]
    CapacityExceeded {
        /// Name of the rejected item.
        name: String,
        /// The configured rate that was violated.
        rate: Rate,
    },

    /// Malformed item or rate definition (empty name, zero limit, misordered
    /// rates). Programmer error; never retried.
    #[error("invalid item or rate: {0}")]
    InvalidItem(String),

    /// No rates are registered for the requested name.
    #[error("no rate limit registered for '{0}'")]
    UnknownLimit(String),

    /// Configuration-related errors
    #[error("configuration error: {0}")]
    Config(String),

    /// Backing store or clock failure, propagated unchanged.
    #[error("backend error: {0}")]
    Backend(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FloodgateError {
    /// Whether this error is the expected capacity-exceeded rejection, as
    /// opposed to a programmer or collaborator failure.
    pub fn is_capacity_exceeded(&self) -> bool {
        matches!(self, FloodgateError::CapacityExceeded { .. })
    }
}

/// Result type alias for Floodgate operations.
pub type Result<T> = std::result::Result<T, FloodgateError>;
