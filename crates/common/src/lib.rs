//! Shared types for the storefront order pipeline.
//!
//! Identifier newtypes and the [`Money`] minor-currency-unit type used
//! across the domain, store, pipeline, and analytics crates.

pub mod types;

pub use types::{CustomerId, Money, OrderId, ProductId};
