//! The order payment-and-fulfillment pipeline.
//!
//! This crate drives the order lifecycle end to end:
//! 1. [`CheckoutService`] prices a cart, persists a pending order, and
//!    requests a payment session from the provider.
//! 2. [`WebhookReconciler`] verifies and consumes provider events,
//!    transitioning order state idempotently and enqueuing fulfillment
//!    exactly once per logical `pending -> paid` transition.
//! 3. [`FulfillmentRunner`] executes the post-payment workflow (stock
//!    decrement, analytics, notification) with a durable step cursor so
//!    at-least-once redelivery never double-applies a side effect.
//!
//! External collaborators (payment gateway, catalog, job dispatcher,
//! notification sender, access policy) are consumed through the narrow
//! traits in [`services`], each with an in-memory implementation for tests.

pub mod admin;
pub mod checkout;
pub mod error;
pub mod event;
pub mod reconciler;
pub mod services;
pub mod worker;
pub mod workflow;

pub use admin::{AdminOrderPatch, AdminService};
pub use checkout::{CheckoutService, CheckoutSession};
pub use error::PipelineError;
pub use event::{PaymentEvent, sign_payload, verify_and_parse};
pub use reconciler::{WebhookAck, WebhookReconciler};
pub use services::{
    AccessPolicy, Catalog, ChannelJobDispatcher, FulfillmentJob, InMemoryCatalog,
    InMemoryJobDispatcher, InMemoryNotificationSender, InMemoryPaymentGateway, JobDispatcher,
    NotificationSender, PaymentGateway, Product, SessionLineItem, SessionRequest,
    StaticAccessPolicy,
};
pub use worker::spawn_fulfillment_worker;
pub use workflow::{FulfillmentRunner, RetryPolicy};
