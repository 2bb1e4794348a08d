//! Domain error types.

use thiserror::Error;

/// Errors produced by order domain logic.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum OrderError {
    /// Checkout was requested with an empty cart.
    #[error("Cart is empty")]
    EmptyCart,

    /// A cart line carries a zero quantity.
    #[error("Invalid quantity for product {product_id}: quantity must be at least 1")]
    InvalidQuantity { product_id: String },

    /// A cart line carries a negative unit price.
    #[error("Invalid price for product {product_id}: price must not be negative")]
    InvalidPrice { product_id: String },
}
