//! Order state machine.

use serde::{Deserialize, Serialize};

/// The status of an order in its lifecycle.
///
/// Automated transitions:
/// ```text
/// Pending ──┬──► Paid ──┬──► Fulfilled
///           │           └──► Refunded (admin only)
///           └──► Failed
/// ```
///
/// `Failed` and `Refunded` absorb automated transitions; only an explicit
/// admin override may mutate them further. `Fulfilled` is terminal for the
/// automated pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Order created at checkout, payment not yet confirmed.
    #[default]
    Pending,

    /// Payment confirmed by the provider webhook.
    Paid,

    /// Payment failed (absorbing for automated transitions).
    Failed,

    /// Fulfillment workflow completed (terminal for the pipeline).
    Fulfilled,

    /// Refunded by explicit admin action (absorbing).
    Refunded,
}

impl OrderStatus {
    /// Valid predecessor statuses for an automated transition into `target`.
    ///
    /// A "payment failed" event for an order that is already `Paid` is a
    /// no-op, so `Failed` is only reachable from `Pending` without admin
    /// intervention.
    pub fn automated_predecessors(target: OrderStatus) -> &'static [OrderStatus] {
        match target {
            OrderStatus::Pending => &[],
            OrderStatus::Paid => &[OrderStatus::Pending],
            OrderStatus::Failed => &[OrderStatus::Pending],
            OrderStatus::Fulfilled => &[OrderStatus::Paid],
            OrderStatus::Refunded => &[],
        }
    }

    /// Returns true if an automated transition from `self` to `target` is allowed.
    pub fn can_transition_to(&self, target: OrderStatus) -> bool {
        Self::automated_predecessors(target).contains(self)
    }

    /// Returns true if no automated transition can leave this status.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Failed | OrderStatus::Fulfilled | OrderStatus::Refunded
        )
    }

    /// Returns true if the order counts toward revenue analytics.
    pub fn is_revenue(&self) -> bool {
        matches!(self, OrderStatus::Paid | OrderStatus::Fulfilled)
    }

    /// Returns the status name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Paid => "paid",
            OrderStatus::Failed => "failed",
            OrderStatus::Fulfilled => "fulfilled",
            OrderStatus::Refunded => "refunded",
        }
    }

    /// Parses a status from its string name.
    pub fn parse(s: &str) -> Option<OrderStatus> {
        match s {
            "pending" => Some(OrderStatus::Pending),
            "paid" => Some(OrderStatus::Paid),
            "failed" => Some(OrderStatus::Failed),
            "fulfilled" => Some(OrderStatus::Fulfilled),
            "refunded" => Some(OrderStatus::Refunded),
            _ => None,
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_status_is_pending() {
        assert_eq!(OrderStatus::default(), OrderStatus::Pending);
    }

    #[test]
    fn pending_can_become_paid_or_failed() {
        assert!(OrderStatus::Pending.can_transition_to(OrderStatus::Paid));
        assert!(OrderStatus::Pending.can_transition_to(OrderStatus::Failed));
        assert!(!OrderStatus::Pending.can_transition_to(OrderStatus::Fulfilled));
        assert!(!OrderStatus::Pending.can_transition_to(OrderStatus::Refunded));
    }

    #[test]
    fn paid_can_only_become_fulfilled_automatically() {
        assert!(OrderStatus::Paid.can_transition_to(OrderStatus::Fulfilled));
        assert!(!OrderStatus::Paid.can_transition_to(OrderStatus::Paid));
        // Payment-failed after payment confirmation is a no-op.
        assert!(!OrderStatus::Paid.can_transition_to(OrderStatus::Failed));
    }

    #[test]
    fn absorbing_statuses_reject_automated_transitions() {
        for from in [
            OrderStatus::Failed,
            OrderStatus::Fulfilled,
            OrderStatus::Refunded,
        ] {
            for to in [
                OrderStatus::Pending,
                OrderStatus::Paid,
                OrderStatus::Failed,
                OrderStatus::Fulfilled,
                OrderStatus::Refunded,
            ] {
                assert!(!from.can_transition_to(to), "{from} -> {to} must be rejected");
            }
        }
    }

    #[test]
    fn refunded_is_never_reached_automatically() {
        assert!(OrderStatus::automated_predecessors(OrderStatus::Refunded).is_empty());
    }

    #[test]
    fn terminal_statuses() {
        assert!(!OrderStatus::Pending.is_terminal());
        assert!(!OrderStatus::Paid.is_terminal());
        assert!(OrderStatus::Failed.is_terminal());
        assert!(OrderStatus::Fulfilled.is_terminal());
        assert!(OrderStatus::Refunded.is_terminal());
    }

    #[test]
    fn revenue_statuses() {
        assert!(OrderStatus::Paid.is_revenue());
        assert!(OrderStatus::Fulfilled.is_revenue());
        assert!(!OrderStatus::Pending.is_revenue());
        assert!(!OrderStatus::Failed.is_revenue());
        assert!(!OrderStatus::Refunded.is_revenue());
    }

    #[test]
    fn display_and_parse_roundtrip() {
        for status in [
            OrderStatus::Pending,
            OrderStatus::Paid,
            OrderStatus::Failed,
            OrderStatus::Fulfilled,
            OrderStatus::Refunded,
        ] {
            assert_eq!(OrderStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(OrderStatus::parse("shipped"), None);
    }

    #[test]
    fn serialization_uses_snake_case() {
        let json = serde_json::to_string(&OrderStatus::Paid).unwrap();
        assert_eq!(json, "\"paid\"");
        let back: OrderStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(back, OrderStatus::Paid);
    }
}
