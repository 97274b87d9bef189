//! Store port error types

use thiserror::Error;

/// Error returned by any store port
#[derive(Debug, Error)]
pub enum StoreError {
    /// The requested canonical record does not exist
    #[error("{entity} not found")]
    NotFound { entity: &'static str },

    #[error("invalid cursor: {0}")]
    InvalidCursor(String),

    /// Store unreachable or failed the request
    #[error("backend error: {0}")]
    Backend(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for store port calls
pub type StoreResult<T> = Result<T, StoreError>;

impl StoreError {
    /// Create a backend error
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }

    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<StoreError> for tally_common::Error {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound { entity } => Self::not_found(entity),
            StoreError::InvalidCursor(cursor) => {
                Self::invalid_argument(format!("invalid cursor: {cursor}"))
            }
            StoreError::Backend(msg) => Self::Store(msg),
            StoreError::Serialization(e) => Self::Serialization(e.to_string()),
            StoreError::Io(e) => Self::Store(e.to_string()),
        }
    }
}
