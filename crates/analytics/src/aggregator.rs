//! Report computation over the order store.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use common::ProductId;
use domain::Order;
use pipeline::Catalog;
use store::order::OrderStore;
use store::AnalyticsStore;

use crate::error::Result;
use crate::report::{
    change_pct, AnalyticsRange, AnalyticsReport, CategoryCount, DailyRevenuePoint, TopProduct,
};

const TOP_PRODUCTS_LIMIT: usize = 10;
const CATEGORY_LIMIT: usize = 12;

/// Builds dashboard reports from orders, the catalog, and the snapshot
/// cache.
pub struct AnalyticsAggregator<O, C, A> {
    orders: O,
    catalog: C,
    snapshots: A,
}

impl<O, C, A> AnalyticsAggregator<O, C, A>
where
    O: OrderStore,
    C: Catalog,
    A: AnalyticsStore,
{
    /// Creates a new aggregator.
    pub fn new(orders: O, catalog: C, snapshots: A) -> Self {
        Self {
            orders,
            catalog,
            snapshots,
        }
    }

    /// Builds the report for a trailing window ending now.
    pub async fn report(&self, range: AnalyticsRange) -> Result<AnalyticsReport> {
        self.report_at(range, Utc::now()).await
    }

    /// Builds the report for a trailing window ending at `now`.
    #[tracing::instrument(skip(self, now), fields(range = range.as_str()))]
    pub async fn report_at(
        &self,
        range: AnalyticsRange,
        now: DateTime<Utc>,
    ) -> Result<AnalyticsReport> {
        let days = range.days();
        let start_date = now.date_naive() - Duration::days(days - 1);
        let window_start = midnight(start_date);
        let prev_start = midnight(start_date - Duration::days(days));

        let current: Vec<Order> = self
            .orders
            .created_between(window_start, now)
            .await?
            .into_iter()
            .filter(|o| o.status.is_revenue())
            .collect();
        let previous: Vec<Order> = self
            .orders
            .created_between(prev_start, window_start)
            .await?
            .into_iter()
            .filter(|o| o.created_at < window_start && o.status.is_revenue())
            .collect();

        let total_revenue_cents: i64 = current.iter().map(|o| o.total.cents()).sum();
        let prev_revenue_cents: i64 = previous.iter().map(|o| o.total.cents()).sum();
        let customers = distinct_customers(&current);
        let prev_customers = distinct_customers(&previous);
        let products = distinct_products(&current);
        let prev_products = distinct_products(&previous);

        let mut revenue_per_day: HashMap<NaiveDate, i64> = HashMap::new();
        let mut orders_per_day: HashMap<NaiveDate, u64> = HashMap::new();
        let mut units: HashMap<ProductId, (String, u64)> = HashMap::new();
        for order in &current {
            let day = order.created_at.date_naive();
            *revenue_per_day.entry(day).or_insert(0) += order.total.cents();
            *orders_per_day.entry(day).or_insert(0) += 1;
            for item in &order.items {
                let entry = units
                    .entry(item.product_id.clone())
                    .or_insert_with(|| (item.name.clone(), 0));
                entry.1 += u64::from(item.quantity);
            }
        }

        let revenue_by_day: Vec<DailyRevenuePoint> = (0..days)
            .map(|offset| {
                let date = start_date + Duration::days(offset);
                DailyRevenuePoint {
                    date,
                    revenue_cents: revenue_per_day.get(&date).copied().unwrap_or(0),
                }
            })
            .collect();

        let mut top_products: Vec<TopProduct> = units
            .into_values()
            .map(|(name, units_sold)| TopProduct { name, units_sold })
            .collect();
        top_products.sort_by(|a, b| {
            b.units_sold
                .cmp(&a.units_sold)
                .then_with(|| a.name.cmp(&b.name))
        });
        top_products.truncate(TOP_PRODUCTS_LIMIT);

        let category_distribution = self.category_distribution().await?;

        self.refresh_snapshots(&revenue_per_day, &orders_per_day).await;

        metrics::counter!("analytics_reports_total", "range" => range.as_str()).increment(1);
        Ok(AnalyticsReport {
            range,
            generated_at: now,
            total_revenue_cents,
            orders_count: current.len() as u64,
            revenue_change_pct: change_pct(prev_revenue_cents, total_revenue_cents),
            orders_change_pct: change_pct(previous.len() as i64, current.len() as i64),
            customers_count: customers as u64,
            customers_change_pct: change_pct(prev_customers as i64, customers as i64),
            products_count: products as u64,
            products_change_pct: change_pct(prev_products as i64, products as i64),
            revenue_by_day,
            top_products,
            category_distribution,
        })
    }

    async fn category_distribution(&self) -> Result<Vec<CategoryCount>> {
        let mut counts: HashMap<String, u64> = HashMap::new();
        for product in self.catalog.all_products().await? {
            *counts.entry(product.category).or_insert(0) += 1;
        }
        let mut distribution: Vec<CategoryCount> = counts
            .into_iter()
            .map(|(category, count)| CategoryCount { category, count })
            .collect();
        distribution.sort_by(|a, b| {
            b.count
                .cmp(&a.count)
                .then_with(|| a.category.cmp(&b.category))
        });
        distribution.truncate(CATEGORY_LIMIT);
        Ok(distribution)
    }

    /// Writes recomputed day totals back into the snapshot cache. Failures
    /// are logged and swallowed: the report is already computed from the
    /// source of truth.
    async fn refresh_snapshots(
        &self,
        revenue_per_day: &HashMap<NaiveDate, i64>,
        orders_per_day: &HashMap<NaiveDate, u64>,
    ) {
        for (day, revenue) in revenue_per_day {
            let orders = orders_per_day.get(day).copied().unwrap_or(0);
            if let Err(e) = self.snapshots.upsert_day_totals(*day, *revenue, orders).await {
                tracing::warn!(day = %day, error = %e, "snapshot cache refresh failed");
                metrics::counter!("analytics_cache_refresh_failures_total").increment(1);
            }
        }
    }
}

fn midnight(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

fn distinct_customers(orders: &[Order]) -> usize {
    orders
        .iter()
        .map(|o| &o.customer_id)
        .collect::<HashSet<_>>()
        .len()
}

fn distinct_products(orders: &[Order]) -> usize {
    orders
        .iter()
        .flat_map(|o| o.items.iter().map(|i| &i.product_id))
        .collect::<HashSet<_>>()
        .len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{CustomerId, Money};
    use domain::pricing::price_cart;
    use domain::{CartLine, OrderStatus};
    use pipeline::{InMemoryCatalog, Product};
    use store::memory::{InMemoryAnalyticsStore, InMemoryOrderStore};

    type TestAggregator =
        AnalyticsAggregator<InMemoryOrderStore, InMemoryCatalog, InMemoryAnalyticsStore>;

    struct Fixture {
        orders: InMemoryOrderStore,
        catalog: InMemoryCatalog,
        snapshots: InMemoryAnalyticsStore,
        now: DateTime<Utc>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                orders: InMemoryOrderStore::new(),
                catalog: InMemoryCatalog::new(),
                snapshots: InMemoryAnalyticsStore::new(),
                now: "2026-08-29T15:00:00Z".parse().unwrap(),
            }
        }

        fn aggregator(&self) -> TestAggregator {
            AnalyticsAggregator::new(
                self.orders.clone(),
                self.catalog.clone(),
                self.snapshots.clone(),
            )
        }

        async fn seed_order(
            &self,
            product: &str,
            quantity: u32,
            unit_cents: i64,
            days_ago: i64,
            status: OrderStatus,
        ) -> Order {
            let lines = vec![CartLine {
                product_id: ProductId::from(product),
                name: product.to_string(),
                unit_price: Money::from_cents(unit_cents),
                quantity,
                image_url: None,
            }];
            let pricing = price_cart(&lines).unwrap();
            let items = lines.into_iter().map(CartLine::into_item).collect();
            let created = self.now - Duration::days(days_ago);
            let mut order = Order::new(CustomerId::from("cust-1"), items, pricing, created);
            order.status = status;
            self.orders.insert(order.clone()).await.unwrap();
            order
        }
    }

    #[tokio::test]
    async fn seven_day_window_is_gap_filled() {
        let fx = Fixture::new();
        let oldest = fx
            .seed_order("tea", 1, 6000, 6, OrderStatus::Fulfilled)
            .await;
        let newest = fx.seed_order("tea", 1, 6000, 0, OrderStatus::Paid).await;

        let report = fx
            .aggregator()
            .report_at(AnalyticsRange::SevenDays, fx.now)
            .await
            .unwrap();

        assert_eq!(report.revenue_by_day.len(), 7);
        assert_eq!(
            report.revenue_by_day[0].date,
            oldest.created_at.date_naive()
        );
        assert_eq!(report.revenue_by_day[0].revenue_cents, oldest.total.cents());
        for point in &report.revenue_by_day[1..6] {
            assert_eq!(point.revenue_cents, 0);
        }
        assert_eq!(report.revenue_by_day[6].revenue_cents, newest.total.cents());
        assert_eq!(report.orders_count, 2);
        assert_eq!(
            report.total_revenue_cents,
            oldest.total.cents() + newest.total.cents()
        );
    }

    #[tokio::test]
    async fn only_revenue_statuses_count() {
        let fx = Fixture::new();
        fx.seed_order("tea", 1, 6000, 1, OrderStatus::Paid).await;
        fx.seed_order("tea", 1, 6000, 1, OrderStatus::Pending).await;
        fx.seed_order("tea", 1, 6000, 1, OrderStatus::Failed).await;
        fx.seed_order("tea", 1, 6000, 1, OrderStatus::Refunded).await;

        let report = fx
            .aggregator()
            .report_at(AnalyticsRange::SevenDays, fx.now)
            .await
            .unwrap();
        assert_eq!(report.orders_count, 1);
    }

    #[tokio::test]
    async fn change_is_measured_against_the_preceding_window() {
        let fx = Fixture::new();
        // Previous window: one order, 6750 cents total.
        fx.seed_order("tea", 1, 6000, 8, OrderStatus::Fulfilled).await;
        // Current window: two of them.
        fx.seed_order("tea", 1, 6000, 3, OrderStatus::Fulfilled).await;
        fx.seed_order("tea", 1, 6000, 2, OrderStatus::Fulfilled).await;

        let report = fx
            .aggregator()
            .report_at(AnalyticsRange::SevenDays, fx.now)
            .await
            .unwrap();
        assert_eq!(report.revenue_change_pct, 100);
        assert_eq!(report.orders_change_pct, 100);
    }

    #[tokio::test]
    async fn empty_previous_window_reads_as_full_growth() {
        let fx = Fixture::new();
        fx.seed_order("tea", 1, 6000, 1, OrderStatus::Paid).await;

        let report = fx
            .aggregator()
            .report_at(AnalyticsRange::SevenDays, fx.now)
            .await
            .unwrap();
        assert_eq!(report.revenue_change_pct, 100);
    }

    #[tokio::test]
    async fn top_products_rank_by_units_then_name() {
        let fx = Fixture::new();
        fx.seed_order("mug", 3, 6000, 1, OrderStatus::Paid).await;
        fx.seed_order("kettle", 3, 6000, 1, OrderStatus::Paid).await;
        fx.seed_order("tea", 5, 6000, 2, OrderStatus::Fulfilled).await;

        let report = fx
            .aggregator()
            .report_at(AnalyticsRange::SevenDays, fx.now)
            .await
            .unwrap();
        let names: Vec<_> = report
            .top_products
            .iter()
            .map(|p| p.name.as_str())
            .collect();
        assert_eq!(names, vec!["tea", "kettle", "mug"]);
        assert_eq!(report.top_products[0].units_sold, 5);
    }

    #[tokio::test]
    async fn customer_and_product_counts_are_distinct() {
        let fx = Fixture::new();
        fx.seed_order("tea", 2, 6000, 1, OrderStatus::Paid).await;
        fx.seed_order("tea", 1, 6000, 2, OrderStatus::Fulfilled).await;
        fx.seed_order("mug", 1, 6000, 1, OrderStatus::Paid).await;

        let report = fx
            .aggregator()
            .report_at(AnalyticsRange::SevenDays, fx.now)
            .await
            .unwrap();
        assert_eq!(report.products_count, 2);
        assert_eq!(report.customers_count, 1);
        assert_eq!(report.customers_change_pct, 100);
    }

    #[tokio::test]
    async fn category_distribution_comes_from_the_catalog() {
        let fx = Fixture::new();
        for (id, category) in [
            ("tea", "Beverages"),
            ("coffee", "Beverages"),
            ("mug", "Kitchen"),
        ] {
            fx.catalog.put_product(Product {
                id: ProductId::from(id),
                name: id.to_string(),
                category: category.to_string(),
                unit_price: Money::from_cents(1000),
                stock: 1,
            });
        }

        let report = fx
            .aggregator()
            .report_at(AnalyticsRange::SevenDays, fx.now)
            .await
            .unwrap();
        assert_eq!(report.category_distribution.len(), 2);
        assert_eq!(report.category_distribution[0].category, "Beverages");
        assert_eq!(report.category_distribution[0].count, 2);
        assert_eq!(report.category_distribution[1].category, "Kitchen");
    }

    #[tokio::test]
    async fn report_refreshes_the_snapshot_cache() {
        let fx = Fixture::new();
        let order = fx.seed_order("tea", 1, 6000, 1, OrderStatus::Paid).await;

        fx.aggregator()
            .report_at(AnalyticsRange::SevenDays, fx.now)
            .await
            .unwrap();

        let day = order.created_at.date_naive();
        let snapshot = fx.snapshots.get_day(day).await.unwrap().unwrap();
        assert_eq!(snapshot.revenue_cents, order.total.cents());
        assert_eq!(snapshot.orders_count, 1);
    }

    #[tokio::test]
    async fn snapshot_outage_does_not_fail_the_report() {
        let fx = Fixture::new();
        fx.seed_order("tea", 1, 6000, 1, OrderStatus::Paid).await;
        fx.snapshots.set_fail_writes(true).await;

        let report = fx
            .aggregator()
            .report_at(AnalyticsRange::SevenDays, fx.now)
            .await
            .unwrap();
        assert_eq!(report.orders_count, 1);
    }

    #[tokio::test]
    async fn boundary_order_belongs_to_the_newer_window() {
        let fx = Fixture::new();
        // Exactly at the current window's start (midnight six days back).
        let start = midnight(fx.now.date_naive() - Duration::days(6));
        let lines = vec![CartLine {
            product_id: ProductId::from("tea"),
            name: "tea".to_string(),
            unit_price: Money::from_cents(6000),
            quantity: 1,
            image_url: None,
        }];
        let pricing = price_cart(&lines).unwrap();
        let items = lines.into_iter().map(CartLine::into_item).collect();
        let mut order = Order::new(CustomerId::from("cust-1"), items, pricing, start);
        order.status = OrderStatus::Paid;
        fx.orders.insert(order).await.unwrap();

        let report = fx
            .aggregator()
            .report_at(AnalyticsRange::SevenDays, fx.now)
            .await
            .unwrap();
        assert_eq!(report.orders_count, 1);
        // The preceding window does not double-count it.
        assert_eq!(report.revenue_change_pct, 100);
    }
}
