//! Read-side analytics for the storefront admin dashboard.
//!
//! Reports are computed from the order store (the source of truth) over a
//! trailing calendar window, then opportunistically cached back into the
//! per-day snapshot store. Cache writes are best effort: a snapshot-store
//! outage degrades freshness, never the report.

pub mod aggregator;
pub mod error;
pub mod report;

pub use aggregator::AnalyticsAggregator;
pub use error::AnalyticsError;
pub use report::{
    AnalyticsRange, AnalyticsReport, CategoryCount, DailyRevenuePoint, TopProduct,
};
