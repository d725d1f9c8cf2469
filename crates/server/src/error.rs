//! Service error taxonomy.
//!
//! Business-rule failures are converted to `ERROR` replies at the dispatcher
//! boundary and never tear down a connection; transport failures are handled
//! in the connection worker and never appear here.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    /// Employee, trip, or client absent; also logout of an id with no session.
    #[error("{0}")]
    NotFound(String),

    /// Duplicate login or seat already reserved.
    #[error("{0}")]
    Conflict(String),

    /// Malformed or out-of-range input, including bad credentials.
    #[error("{0}")]
    InvalidArgument(String),

    /// Operation requires a logged-in session.
    #[error("not logged in")]
    Unauthenticated,

    /// Storage-layer failure, surfaced to the caller and not retried.
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),
}

impl ServiceError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }
}
