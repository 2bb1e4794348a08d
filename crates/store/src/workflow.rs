//! Per-order fulfillment workflow-run records.
//!
//! The run record is what makes the workflow resumable: the step cursor
//! records the furthest step whose side effect has been durably applied, so
//! a crash-recovery redelivery skips already-applied effects instead of
//! re-executing them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::OrderId;
use serde::{Deserialize, Serialize};

use crate::Result;

/// The furthest workflow step whose side effect has been applied.
///
/// Ordered: a step is skipped on re-execution when the cursor has already
/// reached or passed it.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum StepCursor {
    /// Run record created, no side effects applied yet.
    #[default]
    Started,
    /// Product stock has been decremented for every line item.
    StockDecremented,
    /// The day's analytics snapshot has been incremented.
    AnalyticsRecorded,
    /// The confirmation notification has been dispatched.
    Notified,
}

impl StepCursor {
    /// Returns the cursor name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            StepCursor::Started => "started",
            StepCursor::StockDecremented => "stock_decremented",
            StepCursor::AnalyticsRecorded => "analytics_recorded",
            StepCursor::Notified => "notified",
        }
    }

    /// Parses a cursor from its string name.
    pub fn parse(s: &str) -> Option<StepCursor> {
        match s {
            "started" => Some(StepCursor::Started),
            "stock_decremented" => Some(StepCursor::StockDecremented),
            "analytics_recorded" => Some(StepCursor::AnalyticsRecorded),
            "notified" => Some(StepCursor::Notified),
            _ => None,
        }
    }
}

/// Overall state of a workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// The run is in progress (or was interrupted and awaits redelivery).
    #[default]
    Running,
    /// All steps applied and the order was marked fulfilled.
    Completed,
    /// A step exhausted its retries; flagged for manual remediation.
    /// The order keeps its `paid` status.
    Failed,
}

impl RunStatus {
    /// Returns the status name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }

    /// Parses a status from its string name.
    pub fn parse(s: &str) -> Option<RunStatus> {
        match s {
            "running" => Some(RunStatus::Running),
            "completed" => Some(RunStatus::Completed),
            "failed" => Some(RunStatus::Failed),
            _ => None,
        }
    }
}

/// Durable record of one order's fulfillment workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FulfillmentRun {
    /// The order this run belongs to (one run per order).
    pub order_id: OrderId,
    /// Furthest step whose side effect is durably applied.
    pub cursor: StepCursor,
    /// Overall run state.
    pub status: RunStatus,
    /// Number of times the run has been (re)delivered to the runner.
    pub deliveries: u32,
    /// Reason recorded when a step exhausted its retries.
    pub last_error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Outcome of claiming an order's workflow run for execution.
///
/// A `Running` run is an exclusive claim held by one delivery at a time;
/// concurrent deliveries of the same job observe `Busy` instead of
/// re-executing steps the holder is mid-way through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunClaim {
    /// The caller now holds the run and should execute from the returned
    /// cursor.
    Claimed(FulfillmentRun),
    /// Another delivery currently holds the run.
    Busy,
    /// The run already completed; nothing left to execute.
    Finished,
}

/// Store for per-order workflow-run records.
#[async_trait]
pub trait FulfillmentRunStore: Send + Sync {
    /// Claims the run record for an order, creating it if absent and
    /// re-opening a `Failed` one (status back to `Running`, delivery count
    /// bumped). A run already `Running` belongs to another delivery and
    /// yields [`RunClaim::Busy`] — unless its `updated_at` is at or before
    /// `stale_before`, in which case the holder is presumed dead and the
    /// claim is taken over. A `Completed` run is terminal: the delivery is
    /// still counted but the claim comes back [`RunClaim::Finished`].
    async fn begin(&self, order_id: OrderId, stale_before: DateTime<Utc>) -> Result<RunClaim>;

    /// Fetches the run record for an order.
    async fn get(&self, order_id: OrderId) -> Result<Option<FulfillmentRun>>;

    /// Advances the step cursor, refreshing `updated_at` so a long run
    /// keeps its claim fresh. Never moves backwards: advancing to a cursor
    /// at or behind the stored one is a no-op.
    async fn advance(&self, order_id: OrderId, cursor: StepCursor) -> Result<()>;

    /// Marks the run completed.
    async fn mark_completed(&self, order_id: OrderId) -> Result<()>;

    /// Marks the run failed with the exhausted step and reason.
    async fn mark_failed(&self, order_id: OrderId, step: &str, reason: &str) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_ordering_follows_step_sequence() {
        assert!(StepCursor::Started < StepCursor::StockDecremented);
        assert!(StepCursor::StockDecremented < StepCursor::AnalyticsRecorded);
        assert!(StepCursor::AnalyticsRecorded < StepCursor::Notified);
    }

    #[test]
    fn cursor_string_roundtrip() {
        for cursor in [
            StepCursor::Started,
            StepCursor::StockDecremented,
            StepCursor::AnalyticsRecorded,
            StepCursor::Notified,
        ] {
            assert_eq!(StepCursor::parse(cursor.as_str()), Some(cursor));
        }
        assert_eq!(StepCursor::parse("shipped"), None);
    }

    #[test]
    fn run_status_string_roundtrip() {
        for status in [RunStatus::Running, RunStatus::Completed, RunStatus::Failed] {
            assert_eq!(RunStatus::parse(status.as_str()), Some(status));
        }
    }
}
