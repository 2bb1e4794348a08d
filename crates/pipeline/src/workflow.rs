//! The fulfillment workflow: a resumable, idempotent sequence of side
//! effects executed once per paid order.
//!
//! Each step is guarded by the run record's step cursor. The cursor is
//! advanced only after a step's side effect is durably applied, so a
//! redelivered job re-executes nothing the previous delivery finished.
//! The run itself is an exclusive claim: a delivery that finds the run
//! held by another backs off with a retryable error instead of racing it
//! through the steps.

use chrono::{DateTime, Duration, Utc};
use common::OrderId;
use domain::Order;
use store::order::{OrderStore, StatusChange, TransitionOutcome};
use store::workflow::{FulfillmentRunStore, RunClaim, StepCursor};
use store::AnalyticsStore;

use crate::error::{PipelineError, Result};
use crate::services::{Catalog, NotificationSender};

/// How long a `Running` claim stays exclusive before a redelivery may
/// presume its holder dead and take the run over.
const CLAIM_LEASE_SECS: i64 = 300;

/// Per-step retry budget.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3 }
    }
}

/// Executes the fulfillment workflow for paid orders.
pub struct FulfillmentRunner<O, R, C, A, N> {
    orders: O,
    runs: R,
    catalog: C,
    analytics: A,
    notifier: N,
    retry: RetryPolicy,
}

impl<O, R, C, A, N> FulfillmentRunner<O, R, C, A, N>
where
    O: OrderStore,
    R: FulfillmentRunStore,
    C: Catalog,
    A: AnalyticsStore,
    N: NotificationSender,
{
    /// Creates a new runner with the default retry policy.
    pub fn new(orders: O, runs: R, catalog: C, analytics: A, notifier: N) -> Self {
        Self {
            orders,
            runs,
            catalog,
            analytics,
            notifier,
            retry: RetryPolicy::default(),
        }
    }

    /// Overrides the per-step retry policy.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Runs the workflow for an order, stamping side effects with the
    /// current time.
    pub async fn run(&self, order_id: OrderId) -> Result<()> {
        self.run_at(order_id, Utc::now()).await
    }

    /// Runs the workflow, resuming from the persisted step cursor.
    #[tracing::instrument(skip(self, now), fields(order_id = %order_id))]
    pub async fn run_at(&self, order_id: OrderId, now: DateTime<Utc>) -> Result<()> {
        let stale_before = Utc::now() - Duration::seconds(CLAIM_LEASE_SECS);
        let run = match self.runs.begin(order_id, stale_before).await? {
            RunClaim::Claimed(run) => run,
            RunClaim::Finished => {
                tracing::info!("run already completed, nothing to do");
                return Ok(());
            }
            RunClaim::Busy => {
                tracing::info!("run held by another delivery, backing off");
                metrics::counter!("fulfillment_runs_busy_total").increment(1);
                return Err(PipelineError::RunInProgress(order_id));
            }
        };
        if run.cursor > StepCursor::Started {
            tracing::info!(
                cursor = run.cursor.as_str(),
                deliveries = run.deliveries,
                "resuming interrupted run"
            );
            metrics::counter!("fulfillment_runs_resumed_total").increment(1);
        }

        let order = self
            .orders
            .get(order_id)
            .await?
            .ok_or(PipelineError::OrderNotFound(order_id))?;

        if run.cursor < StepCursor::StockDecremented {
            self.decrement_stock(&order).await?;
            self.runs.advance(order_id, StepCursor::StockDecremented).await?;
        }

        if run.cursor < StepCursor::AnalyticsRecorded {
            self.record_analytics(&order, now).await?;
            self.runs.advance(order_id, StepCursor::AnalyticsRecorded).await?;
        }

        if run.cursor < StepCursor::Notified {
            self.notify_customer(&order).await?;
            self.runs.advance(order_id, StepCursor::Notified).await?;
        }

        let outcome = self
            .orders
            .transition(order_id, StatusChange::fulfilled(None))
            .await?;
        match outcome {
            TransitionOutcome::Applied(_) => {
                tracing::info!("order fulfilled");
            }
            TransitionOutcome::Skipped { current } => {
                // A concurrent delivery won the final transition, or an
                // admin already moved the order on. The steps themselves
                // were cursor-guarded, so this is safe to absorb.
                tracing::info!(current = current.as_str(), "final transition skipped");
            }
            TransitionOutcome::NotFound => {
                return Err(PipelineError::OrderNotFound(order_id));
            }
        }

        self.runs.mark_completed(order_id).await?;
        metrics::counter!("fulfillment_runs_completed_total").increment(1);
        Ok(())
    }

    async fn decrement_stock(&self, order: &Order) -> Result<()> {
        for item in &order.items {
            self.run_step(order.id, "decrement_stock", || {
                self.catalog.decrement_stock(&item.product_id, item.quantity)
            })
            .await?;
        }
        Ok(())
    }

    async fn record_analytics(&self, order: &Order, now: DateTime<Utc>) -> Result<()> {
        let units: Vec<_> = order
            .items
            .iter()
            .map(|item| (item.product_id.clone(), u64::from(item.quantity)))
            .collect();
        self.run_step(order.id, "record_analytics", || {
            self.analytics.record_sale(now.date_naive(), order.total, &units)
        })
        .await
    }

    async fn notify_customer(&self, order: &Order) -> Result<()> {
        let data = serde_json::json!({
            "order_id": order.id.to_string(),
            "total_cents": order.total.cents(),
            "items": order.items.iter().map(|i| {
                serde_json::json!({ "name": i.name, "quantity": i.quantity })
            }).collect::<Vec<_>>(),
        });
        self.run_step(order.id, "notify_customer", || {
            self.notifier
                .send("order_confirmation", &order.customer_id, data.clone())
        })
        .await
    }

    /// Retries a step up to the policy budget. Exhaustion marks the run
    /// failed and leaves the order in its current status for manual
    /// remediation.
    async fn run_step<F, Fut, T, E>(&self, order_id: OrderId, step: &'static str, op: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = std::result::Result<T, E>>,
        E: Into<PipelineError>,
    {
        let mut last: Option<PipelineError> = None;
        for attempt in 1..=self.retry.max_attempts {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    let e = e.into();
                    tracing::warn!(
                        order_id = %order_id,
                        step,
                        attempt,
                        error = %e,
                        "step attempt failed"
                    );
                    last = Some(e);
                }
            }
        }
        let reason = last
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no attempts made".to_string());
        self.runs.mark_failed(order_id, step, &reason).await?;
        metrics::counter!("fulfillment_steps_exhausted_total", "step" => step).increment(1);
        tracing::error!(order_id = %order_id, step, reason = %reason, "step exhausted retries");
        Err(PipelineError::StepExhausted {
            step,
            attempts: self.retry.max_attempts,
            reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{CustomerId, Money, ProductId};
    use domain::pricing::price_cart;
    use domain::{CartLine, OrderStatus};
    use store::memory::{InMemoryAnalyticsStore, InMemoryOrderStore, InMemoryRunStore};
    use store::workflow::RunStatus;

    use crate::services::{InMemoryCatalog, InMemoryNotificationSender, Product};

    type TestRunner = FulfillmentRunner<
        InMemoryOrderStore,
        InMemoryRunStore,
        InMemoryCatalog,
        InMemoryAnalyticsStore,
        InMemoryNotificationSender,
    >;

    struct Fixture {
        orders: InMemoryOrderStore,
        runs: InMemoryRunStore,
        catalog: InMemoryCatalog,
        analytics: InMemoryAnalyticsStore,
        notifier: InMemoryNotificationSender,
    }

    impl Fixture {
        fn new() -> Self {
            let catalog = InMemoryCatalog::new();
            catalog.put_product(Product {
                id: ProductId::from("sku-1"),
                name: "Widget".to_string(),
                category: "Gadgets".to_string(),
                unit_price: Money::from_cents(1300),
                stock: 10,
            });
            Self {
                orders: InMemoryOrderStore::new(),
                runs: InMemoryRunStore::new(),
                catalog,
                analytics: InMemoryAnalyticsStore::new(),
                notifier: InMemoryNotificationSender::new(),
            }
        }

        fn runner(&self) -> TestRunner {
            FulfillmentRunner::new(
                self.orders.clone(),
                self.runs.clone(),
                self.catalog.clone(),
                self.analytics.clone(),
                self.notifier.clone(),
            )
        }

        async fn seed_paid_order(&self) -> Order {
            let lines = vec![CartLine {
                product_id: ProductId::from("sku-1"),
                name: "Widget".to_string(),
                unit_price: Money::from_cents(1300),
                quantity: 2,
                image_url: None,
            }];
            let pricing = price_cart(&lines).unwrap();
            let items = lines.into_iter().map(CartLine::into_item).collect();
            let order =
                Order::new(CustomerId::from("cust-1"), items, pricing, Utc::now());
            self.orders.insert(order.clone()).await.unwrap();
            let outcome = self
                .orders
                .transition(order.id, StatusChange::paid("pi_001"))
                .await
                .unwrap();
            match outcome {
                TransitionOutcome::Applied(order) => order,
                _ => panic!("seed transition must apply"),
            }
        }
    }

    #[tokio::test]
    async fn happy_path_applies_every_step_and_fulfills() {
        let fx = Fixture::new();
        let order = fx.seed_paid_order().await;

        fx.runner().run(order.id).await.unwrap();

        assert_eq!(fx.catalog.stock(&ProductId::from("sku-1")), Some(8));
        let day = Utc::now().date_naive();
        let snapshot = fx.analytics.get_day(day).await.unwrap().unwrap();
        assert_eq!(snapshot.revenue_cents, order.total.cents());
        assert_eq!(snapshot.orders_count, 1);
        assert_eq!(
            snapshot.units_by_product.get(&ProductId::from("sku-1")),
            Some(&2)
        );
        assert_eq!(fx.notifier.sent_count(), 1);

        let stored = fx.orders.get(order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Fulfilled);
        let run = fx.runs.get(order.id).await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.cursor, StepCursor::Notified);
    }

    #[tokio::test]
    async fn redelivered_job_decrements_stock_exactly_once() {
        let fx = Fixture::new();
        let order = fx.seed_paid_order().await;

        fx.runner().run(order.id).await.unwrap();
        fx.runner().run(order.id).await.unwrap();

        assert_eq!(fx.catalog.stock(&ProductId::from("sku-1")), Some(8));
        assert_eq!(fx.catalog.decrement_count(), 1);
        assert_eq!(fx.notifier.sent_count(), 1);
        let day = Utc::now().date_naive();
        let snapshot = fx.analytics.get_day(day).await.unwrap().unwrap();
        assert_eq!(snapshot.orders_count, 1);
    }

    #[tokio::test]
    async fn resumes_past_applied_steps_after_interruption() {
        let fx = Fixture::new();
        let order = fx.seed_paid_order().await;

        // First delivery dies after the stock step: simulate by applying
        // the step's effect and cursor by hand, then aging the claim past
        // its lease.
        let stale_before = Utc::now() - Duration::seconds(CLAIM_LEASE_SECS);
        fx.runs.begin(order.id, stale_before).await.unwrap();
        fx.catalog
            .decrement_stock(&ProductId::from("sku-1"), 2)
            .await
            .unwrap();
        fx.runs
            .advance(order.id, StepCursor::StockDecremented)
            .await
            .unwrap();
        fx.runs
            .backdate(order.id, Duration::seconds(CLAIM_LEASE_SECS * 2))
            .await;

        fx.runner().run(order.id).await.unwrap();

        // Stock was not decremented again.
        assert_eq!(fx.catalog.stock(&ProductId::from("sku-1")), Some(8));
        assert_eq!(fx.catalog.decrement_count(), 1);
        // The remaining steps still ran.
        assert_eq!(fx.notifier.sent_count(), 1);
        let run = fx.runs.get(order.id).await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.deliveries, 2);
    }

    #[tokio::test]
    async fn concurrent_redeliveries_decrement_stock_once() {
        let fx = Fixture::new();
        let order = fx.seed_paid_order().await;
        // Widen the race window: the stock step parks mid-flight so the
        // second delivery arrives while the first holds the run.
        fx.catalog.set_yield_on_decrement(true);

        let runner = fx.runner();
        let (first, second) = tokio::join!(runner.run(order.id), runner.run(order.id));

        assert!(first.is_ok());
        match second {
            Err(e @ PipelineError::RunInProgress(_)) => assert!(e.is_retryable()),
            other => panic!("second delivery must back off, got {other:?}"),
        }
        assert_eq!(fx.catalog.stock(&ProductId::from("sku-1")), Some(8));
        assert_eq!(fx.catalog.decrement_count(), 1);
        assert_eq!(fx.notifier.sent_count(), 1);
        let day = Utc::now().date_naive();
        let snapshot = fx.analytics.get_day(day).await.unwrap().unwrap();
        assert_eq!(snapshot.orders_count, 1);
    }

    #[tokio::test]
    async fn step_exhaustion_fails_run_and_keeps_order_paid() {
        let fx = Fixture::new();
        let order = fx.seed_paid_order().await;
        fx.catalog.set_fail_on_decrement(true);

        let result = fx.runner().run(order.id).await;
        assert!(matches!(
            result,
            Err(PipelineError::StepExhausted {
                step: "decrement_stock",
                attempts: 3,
                ..
            })
        ));

        let stored = fx.orders.get(order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Paid);
        let run = fx.runs.get(order.id).await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Failed);
        assert!(run.last_error.is_some());
        assert_eq!(fx.notifier.sent_count(), 0);
    }

    #[tokio::test]
    async fn failed_run_recovers_on_redelivery() {
        let fx = Fixture::new();
        let order = fx.seed_paid_order().await;
        fx.catalog.set_fail_on_decrement(true);
        fx.runner().run(order.id).await.unwrap_err();

        fx.catalog.set_fail_on_decrement(false);
        fx.runner().run(order.id).await.unwrap();

        assert_eq!(fx.catalog.stock(&ProductId::from("sku-1")), Some(8));
        let stored = fx.orders.get(order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Fulfilled);
        let run = fx.runs.get(order.id).await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.deliveries, 2);
    }

    #[tokio::test]
    async fn completed_run_short_circuits() {
        let fx = Fixture::new();
        let order = fx.seed_paid_order().await;
        fx.runner().run(order.id).await.unwrap();

        // A third-party redelivery after completion touches nothing.
        fx.runner().run(order.id).await.unwrap();
        assert_eq!(fx.catalog.decrement_count(), 1);
        let run = fx.runs.get(order.id).await.unwrap().unwrap();
        assert_eq!(run.deliveries, 2);
    }

    #[tokio::test]
    async fn unknown_order_is_retryable() {
        let fx = Fixture::new();
        let result = fx.runner().run(OrderId::new()).await;
        match result {
            Err(e @ PipelineError::OrderNotFound(_)) => assert!(e.is_retryable()),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }
}
