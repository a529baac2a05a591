//! Error types for Citadel core.

use thiserror::Error;

/// The main error type for core operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Generic error with custom message.
    #[error("{0}")]
    Generic(String),

    /// An identifier could not be parsed.
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] crate::id::IdParseError),

    /// A role string is not recognised.
    #[error("unknown role: {0}")]
    UnknownRole(String),
}

impl Error {
    /// Create a new generic error.
    pub fn new(msg: impl Into<String>) -> Self {
        Self::Generic(msg.into())
    }
}

/// Result type alias using Citadel's core Error.
pub type Result<T> = std::result::Result<T, Error>;
