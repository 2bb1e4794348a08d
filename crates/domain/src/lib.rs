//! Domain layer for the storefront order pipeline.
//!
//! This crate provides the core domain model:
//! - the [`Order`] aggregate with its immutable item snapshot
//! - the [`OrderStatus`] state machine with predecessor guards
//! - checkout pricing rules ([`pricing`])

pub mod error;
pub mod order;
pub mod pricing;

pub use error::OrderError;
pub use order::{Order, OrderItem, OrderStatus};
pub use pricing::{CartLine, PricingBreakdown};
