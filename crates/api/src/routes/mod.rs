//! HTTP route handlers.

pub mod admin;
pub mod analytics;
pub mod checkout;
pub mod health;
pub mod metrics;
pub mod webhooks;
