//! Analytics error types.

use thiserror::Error;

/// Errors surfaced while building a report.
#[derive(Debug, Error)]
pub enum AnalyticsError {
    #[error("unknown analytics range: {0}")]
    UnknownRange(String),

    #[error("store error: {0}")]
    Store(#[from] store::StoreError),

    #[error("catalog error: {0}")]
    Catalog(#[from] pipeline::PipelineError),
}

/// Convenience result alias for analytics operations.
pub type Result<T> = std::result::Result<T, AnalyticsError>;
