//! Order store trait and transition types.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::OrderId;
use domain::{Order, OrderStatus};

use crate::Result;

/// A requested automated status change.
///
/// The target status determines the set of valid predecessors
/// ([`OrderStatus::automated_predecessors`]); the store applies the change
/// only if the currently persisted status is one of them.
#[derive(Debug, Clone)]
pub struct StatusChange {
    /// Target status.
    pub to: OrderStatus,
    /// Payment-intent reference to record, if the transition carries one.
    /// Set once; an already-set value is left untouched.
    pub payment_intent_ref: Option<String>,
    /// Tracking reference to record, if the transition carries one.
    pub tracking_ref: Option<String>,
}

impl StatusChange {
    /// `pending -> paid`, recording the payment-intent reference.
    pub fn paid(payment_intent_ref: impl Into<String>) -> Self {
        Self {
            to: OrderStatus::Paid,
            payment_intent_ref: Some(payment_intent_ref.into()),
            tracking_ref: None,
        }
    }

    /// `pending -> failed`.
    pub fn failed() -> Self {
        Self {
            to: OrderStatus::Failed,
            payment_intent_ref: None,
            tracking_ref: None,
        }
    }

    /// `paid -> fulfilled`, optionally recording a tracking reference.
    pub fn fulfilled(tracking_ref: Option<String>) -> Self {
        Self {
            to: OrderStatus::Fulfilled,
            payment_intent_ref: None,
            tracking_ref,
        }
    }
}

/// Result of an atomic conditional transition.
#[derive(Debug, Clone)]
pub enum TransitionOutcome {
    /// The stored status was a valid predecessor and the change was applied.
    Applied(Order),
    /// The stored status was not a valid predecessor; nothing changed.
    /// Duplicate webhook deliveries land here.
    Skipped {
        /// The status the order was found in.
        current: OrderStatus,
    },
    /// No order with the given ID exists.
    NotFound,
}

impl TransitionOutcome {
    /// Returns true if the transition actually changed state.
    pub fn is_applied(&self) -> bool {
        matches!(self, TransitionOutcome::Applied(_))
    }
}

/// Manual edits from the admin surface.
///
/// Admin writes bypass the predecessor guard: they are explicit overrides.
#[derive(Debug, Clone, Default)]
pub struct AdminPatch {
    pub status: Option<OrderStatus>,
    pub tracking_ref: Option<String>,
}

/// Durable record of orders; single source of truth for order status.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Persists a new order. Fails on duplicate ID.
    async fn insert(&self, order: Order) -> Result<()>;

    /// Fetches an order by ID.
    async fn get(&self, id: OrderId) -> Result<Option<Order>>;

    /// Looks up the order owning a payment-session reference.
    async fn find_by_session_ref(&self, session_ref: &str) -> Result<Option<Order>>;

    /// Looks up the order owning a payment-intent reference.
    async fn find_by_payment_intent(&self, intent_ref: &str) -> Result<Option<Order>>;

    /// Records the payment-session reference on a pending order.
    ///
    /// Set once: fails with a conflict if the order already has a session
    /// reference or if another order owns this one.
    async fn set_session_ref(&self, id: OrderId, session_ref: &str) -> Result<()>;

    /// Applies a status change if and only if the currently persisted status
    /// is a valid predecessor for the target, as a single atomic write.
    ///
    /// An invalid predecessor is a no-op ([`TransitionOutcome::Skipped`]),
    /// not an error: this is the idempotent redelivery guard.
    async fn transition(&self, id: OrderId, change: StatusChange) -> Result<TransitionOutcome>;

    /// Applies an admin override, ignoring the predecessor guard.
    /// Returns the updated order, or `None` if it does not exist.
    async fn admin_update(&self, id: OrderId, patch: AdminPatch) -> Result<Option<Order>>;

    /// Deletes an order (admin self-service only; the pipeline never deletes).
    /// Returns true if an order was removed.
    async fn delete(&self, id: OrderId) -> Result<bool>;

    /// All orders with `created_at` in `[from, to]`, for the read-side
    /// aggregator.
    async fn created_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Order>>;
}
