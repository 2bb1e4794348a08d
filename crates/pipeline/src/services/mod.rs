//! Collaborator interfaces consumed by the pipeline.
//!
//! Each trait is the narrow boundary to an external system, with an
//! in-memory implementation used by tests and local runs.

pub mod access;
pub mod catalog;
pub mod dispatch;
pub mod notify;
pub mod payment;

pub use access::{AccessPolicy, StaticAccessPolicy};
pub use catalog::{Catalog, InMemoryCatalog, Product};
pub use dispatch::{ChannelJobDispatcher, FulfillmentJob, InMemoryJobDispatcher, JobDispatcher};
pub use notify::{InMemoryNotificationSender, NotificationSender, SentNotification};
pub use payment::{InMemoryPaymentGateway, PaymentGateway, SessionLineItem, SessionRequest};
