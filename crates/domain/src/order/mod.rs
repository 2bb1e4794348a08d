//! The order aggregate and its item snapshot.

pub mod status;

use chrono::{DateTime, Utc};
use common::{CustomerId, Money, OrderId, ProductId};
use serde::{Deserialize, Serialize};

pub use status::OrderStatus;

use crate::pricing::PricingBreakdown;

/// A line item in an order.
///
/// This is a snapshot taken at checkout time: price and name never follow
/// later catalog edits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    /// The product identifier.
    pub product_id: ProductId,

    /// Product name as displayed at checkout.
    pub name: String,

    /// Price per unit in cents at checkout.
    pub unit_price: Money,

    /// Quantity ordered.
    pub quantity: u32,

    /// Product image reference, if any.
    pub image_url: Option<String>,
}

impl OrderItem {
    /// Returns the total price for this line (quantity * unit_price).
    pub fn line_total(&self) -> Money {
        self.unit_price.multiply(self.quantity)
    }
}

/// The durable transactional record of a purchase attempt and its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Store-generated unique identifier.
    pub id: OrderId,

    /// The purchasing customer.
    pub customer_id: CustomerId,

    /// Immutable item snapshot taken at checkout.
    pub items: Vec<OrderItem>,

    /// Sum of line totals.
    pub subtotal: Money,

    /// Shipping charge.
    pub shipping: Money,

    /// Tax charge.
    pub tax: Money,

    /// `subtotal + shipping + tax`, always.
    pub total: Money,

    /// Current lifecycle status.
    pub status: OrderStatus,

    /// Payment-provider session reference, set once by checkout.
    pub payment_session_ref: Option<String>,

    /// Payment-intent reference, set once by the webhook reconciler.
    pub payment_intent_ref: Option<String>,

    /// Shipment tracking reference, set by fulfillment or admin.
    pub tracking_ref: Option<String>,

    /// Creation timestamp.
    pub created_at: DateTime<Utc>,

    /// Advances on every state-affecting write.
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Creates a new pending order from a priced item snapshot.
    pub fn new(
        customer_id: CustomerId,
        items: Vec<OrderItem>,
        pricing: PricingBreakdown,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: OrderId::new(),
            customer_id,
            items,
            subtotal: pricing.subtotal,
            shipping: pricing.shipping,
            tax: pricing.tax,
            total: pricing.total,
            status: OrderStatus::Pending,
            payment_session_ref: None,
            payment_intent_ref: None,
            tracking_ref: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Total units across all line items.
    pub fn total_units(&self) -> u64 {
        self.items.iter().map(|i| i.quantity as u64).sum()
    }

    /// Returns true if `total == subtotal + shipping + tax`.
    pub fn totals_consistent(&self) -> bool {
        self.total == self.subtotal + self.shipping + self.tax
    }
}
