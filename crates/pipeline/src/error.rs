//! Pipeline error types.

use common::OrderId;
use store::StoreError;
use thiserror::Error;

/// Errors that can occur across the checkout, reconciliation, and
/// fulfillment paths.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Caller error, never retried.
    #[error("Invalid input: {0}")]
    InvalidInput(#[from] domain::OrderError),

    /// Webhook signature did not verify; the payload is never parsed.
    #[error("Webhook signature verification failed")]
    AuthenticationFailed,

    /// Event payload did not decode to a known shape, or referenced a
    /// nonexistent order. Acknowledged to stop redelivery, logged, no
    /// state action taken.
    #[error("Malformed event: {0}")]
    MalformedEvent(String),

    /// No order with the given ID.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// Caller lacks the admin capability.
    #[error("Caller is not an admin")]
    Forbidden,

    /// Store failure; surfaced as retryable so the transport redelivers.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Payment gateway call failed.
    #[error("Payment gateway error: {0}")]
    Gateway(String),

    /// Payment gateway did not answer within the bounded timeout.
    /// The order is left pending.
    #[error("Payment gateway timed out after {0}ms")]
    GatewayTimeout(u64),

    /// Catalog collaborator failure.
    #[error("Catalog error: {0}")]
    Catalog(String),

    /// Notification collaborator failure.
    #[error("Notification error: {0}")]
    Notification(String),

    /// Job dispatcher failure.
    #[error("Dispatch error: {0}")]
    Dispatch(String),

    /// Another delivery currently holds the order's workflow run.
    /// Retryable: the holder finishes or its claim goes stale.
    #[error("Fulfillment run for order {0} is already in progress")]
    RunInProgress(OrderId),

    /// A workflow step exhausted its retries. The run is flagged for
    /// manual remediation; the order keeps its paid status.
    #[error("Workflow step '{step}' exhausted after {attempts} attempts: {reason}")]
    StepExhausted {
        step: &'static str,
        attempts: u32,
        reason: String,
    },
}

impl PipelineError {
    /// Returns true if redelivering the triggering message can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PipelineError::Store(_)
                | PipelineError::OrderNotFound(_)
                | PipelineError::RunInProgress(_)
                | PipelineError::Catalog(_)
                | PipelineError::Notification(_)
        )
    }
}

/// Convenience type alias for pipeline results.
pub type Result<T> = std::result::Result<T, PipelineError>;
