//! Checkout pricing rules.
//!
//! All arithmetic is integer math on cents; tax rounding is half-up so the
//! computed totals are reproducible across platforms.

use common::{Money, ProductId};
use serde::{Deserialize, Serialize};

use crate::error::OrderError;
use crate::order::OrderItem;

/// Free shipping applies strictly above this subtotal (in cents).
pub const FREE_SHIPPING_THRESHOLD_CENTS: i64 = 5000;

/// Flat shipping charge below the free-shipping threshold.
pub const FLAT_SHIPPING_CENTS: i64 = 500;

/// Tax rate numerator over a denominator of 100 (8%).
pub const TAX_RATE_PERCENT: i64 = 8;

/// One line of an incoming cart, before it is snapshotted onto an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: ProductId,
    pub name: String,
    pub unit_price: Money,
    pub quantity: u32,
    pub image_url: Option<String>,
}

impl CartLine {
    /// Converts the cart line into the immutable order item snapshot.
    pub fn into_item(self) -> OrderItem {
        OrderItem {
            product_id: self.product_id,
            name: self.name,
            unit_price: self.unit_price,
            quantity: self.quantity,
            image_url: self.image_url,
        }
    }
}

/// The computed charges for a cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingBreakdown {
    pub subtotal: Money,
    pub shipping: Money,
    pub tax: Money,
    pub total: Money,
}

/// Prices a cart: subtotal, shipping, tax, and total.
///
/// Rules:
/// - subtotal = Σ unit_price × quantity
/// - shipping = 0 if subtotal > 5000 cents, else 500
/// - tax = subtotal × 8%, rounded half-up to whole cents
/// - total = subtotal + shipping + tax
///
/// Fails with [`OrderError::EmptyCart`] for an empty cart and rejects lines
/// with zero quantity or negative prices.
pub fn price_cart(lines: &[CartLine]) -> Result<PricingBreakdown, OrderError> {
    if lines.is_empty() {
        return Err(OrderError::EmptyCart);
    }

    for line in lines {
        if line.quantity == 0 {
            return Err(OrderError::InvalidQuantity {
                product_id: line.product_id.to_string(),
            });
        }
        if line.unit_price.is_negative() {
            return Err(OrderError::InvalidPrice {
                product_id: line.product_id.to_string(),
            });
        }
    }

    let subtotal: Money = lines
        .iter()
        .map(|line| line.unit_price.multiply(line.quantity))
        .sum();

    let shipping = if subtotal.cents() > FREE_SHIPPING_THRESHOLD_CENTS {
        Money::zero()
    } else {
        Money::from_cents(FLAT_SHIPPING_CENTS)
    };

    // Half-up rounding in integer math: (subtotal * 8 + 50) / 100.
    let tax = Money::from_cents((subtotal.cents() * TAX_RATE_PERCENT + 50) / 100);

    let total = subtotal + shipping + tax;

    Ok(PricingBreakdown {
        subtotal,
        shipping,
        tax,
        total,
    })
}
