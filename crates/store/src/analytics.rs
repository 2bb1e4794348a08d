//! Per-day analytics snapshot store.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use common::{Money, ProductId};
use serde::{Deserialize, Serialize};

use crate::Result;

/// One calendar day's aggregate record.
///
/// Units sold are kept as a map from product to cumulative count, merged on
/// every increment, so the record stays bounded by the catalog size rather
/// than growing with every order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailySnapshot {
    pub day: NaiveDate,
    pub revenue_cents: i64,
    pub orders_count: u64,
    pub units_by_product: HashMap<ProductId, u64>,
}

impl DailySnapshot {
    /// Creates an empty snapshot for a day.
    pub fn empty(day: NaiveDate) -> Self {
        Self {
            day,
            revenue_cents: 0,
            orders_count: 0,
            units_by_product: HashMap::new(),
        }
    }

    /// The top `limit` products by units sold, ties broken by product ID
    /// ascending for a deterministic order.
    pub fn top_products(&self, limit: usize) -> Vec<(ProductId, u64)> {
        let mut entries: Vec<_> = self
            .units_by_product
            .iter()
            .map(|(id, units)| (id.clone(), *units))
            .collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.as_str().cmp(b.0.as_str())));
        entries.truncate(limit);
        entries
    }
}

/// Store for per-day aggregates, written incrementally by the fulfillment
/// workflow and opportunistically refreshed by the read-side aggregator.
#[async_trait]
pub trait AnalyticsStore: Send + Sync {
    /// Atomically folds one confirmed order into a day's snapshot: adds the
    /// revenue, bumps the order count, and merges per-product units.
    /// The day row is created lazily on first touch.
    async fn record_sale(
        &self,
        day: NaiveDate,
        revenue: Money,
        items: &[(ProductId, u64)],
    ) -> Result<()>;

    /// Fetches a day's snapshot.
    async fn get_day(&self, day: NaiveDate) -> Result<Option<DailySnapshot>>;

    /// Overwrites a day's revenue and order totals with freshly recomputed
    /// values (read-side cache write). Leaves the product-unit map alone.
    async fn upsert_day_totals(
        &self,
        day: NaiveDate,
        revenue_cents: i64,
        orders_count: u64,
    ) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn top_products_sorts_by_units_then_id() {
        let mut snapshot = DailySnapshot::empty(NaiveDate::from_ymd_opt(2026, 8, 1).unwrap());
        snapshot.units_by_product.insert(ProductId::new("SKU-B"), 5);
        snapshot.units_by_product.insert(ProductId::new("SKU-A"), 5);
        snapshot.units_by_product.insert(ProductId::new("SKU-C"), 9);

        let top = snapshot.top_products(2);
        assert_eq!(top[0], (ProductId::new("SKU-C"), 9));
        // Tie between A and B broken by ID ascending.
        assert_eq!(top[1], (ProductId::new("SKU-A"), 5));
    }

    #[test]
    fn top_products_caps_at_limit() {
        let mut snapshot = DailySnapshot::empty(NaiveDate::from_ymd_opt(2026, 8, 1).unwrap());
        for i in 0..20 {
            snapshot
                .units_by_product
                .insert(ProductId::new(format!("SKU-{i:02}")), i);
        }
        assert_eq!(snapshot.top_products(10).len(), 10);
    }
}
