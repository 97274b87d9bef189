//! Error types for Tally
//!
//! Not-found and infrastructure failures abort a read and reach the caller.
//! Degraded conditions (cache down, corrupt cache payload, metadata index
//! lagging) are absorbed where they happen and never become an `Error`.

use thiserror::Error;

/// Common result type for Tally operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for Tally
#[derive(Debug, Error)]
pub enum Error {
    /// Canonical record absent from the relational store
    #[error("no {entity} records found")]
    NotFound { entity: String },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("relational store error: {0}")]
    Store(String),

    #[error("cache error: {0}")]
    Cache(String),

    #[error("metadata store error: {0}")]
    Metadata(String),

    #[error("outbox error: {0}")]
    Outbox(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a not found error for an entity kind
    pub fn not_found(entity: impl Into<String>) -> Self {
        Self::NotFound {
            entity: entity.into(),
        }
    }

    /// Create an invalid argument error
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Check if this is a not found error
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Check if retrying the read may succeed
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Store(_) | Self::Cache(_) | Self::Metadata(_) | Self::Outbox(_)
        )
    }

    /// Stable identifying code exposed to API clients
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "TALLY-0007",
            Self::Internal(_) => "TALLY-0100",
            Self::Store(_) => "TALLY-0101",
            Self::Cache(_) => "TALLY-0102",
            Self::Metadata(_) => "TALLY-0103",
            Self::Outbox(_) => "TALLY-0104",
            Self::Serialization(_) => "TALLY-0105",
            Self::Configuration(_) => "TALLY-0106",
            Self::InvalidArgument(_) => "TALLY-0107",
        }
    }

    /// Get HTTP status code for API responses
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            Self::InvalidArgument(_) => 400,
            Self::NotFound { .. } => 404,
            Self::Store(_) | Self::Cache(_) | Self::Metadata(_) | Self::Outbox(_) => 503,
            Self::Internal(_) | Self::Serialization(_) | Self::Configuration(_) => 500,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}
