//! Store error types.

use thiserror::Error;

/// Errors that can occur during store operations.
///
/// Every variant is considered transient from the pipeline's point of view:
/// the caller (or the webhook transport) is expected to retry.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A set-once field was written twice or a uniqueness rule was violated.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Injected failure from a test double.
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Convenience type alias for store results.
pub type Result<T> = std::result::Result<T, StoreError>;
