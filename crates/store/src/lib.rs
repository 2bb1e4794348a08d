//! Durable stores for the storefront order pipeline.
//!
//! This crate defines the storage traits the pipeline depends on and two
//! implementations of each:
//! - [`OrderStore`] — source of truth for orders; all status changes go
//!   through a single atomic conditional write ([`OrderStore::transition`])
//! - [`FulfillmentRunStore`] — per-order workflow-run records whose step
//!   cursor doubles as the stock-decrement idempotency marker
//! - [`AnalyticsStore`] — per-day revenue/order/product aggregates
//!
//! In-memory implementations back tests and local runs; the PostgreSQL
//! implementation backs deployments.

pub mod analytics;
pub mod error;
pub mod memory;
pub mod order;
pub mod postgres;
pub mod workflow;

pub use analytics::{AnalyticsStore, DailySnapshot};
pub use error::{Result, StoreError};
pub use memory::{InMemoryAnalyticsStore, InMemoryOrderStore, InMemoryRunStore};
pub use order::{AdminPatch, OrderStore, StatusChange, TransitionOutcome};
pub use postgres::PostgresStore;
pub use workflow::{FulfillmentRun, FulfillmentRunStore, RunClaim, RunStatus, StepCursor};
