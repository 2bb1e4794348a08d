//! End-to-end pipeline tests: checkout through webhook reconciliation
//! through the fulfillment workflow, over the in-memory stores.

use std::sync::Arc;

use common::{CustomerId, Money, OrderId, ProductId};
use domain::{CartLine, OrderStatus};
use pipeline::{
    sign_payload, spawn_fulfillment_worker, Catalog, ChannelJobDispatcher, CheckoutService,
    FulfillmentRunner, InMemoryCatalog, InMemoryNotificationSender, InMemoryPaymentGateway,
    Product, WebhookAck, WebhookReconciler,
};
use store::memory::{InMemoryAnalyticsStore, InMemoryOrderStore, InMemoryRunStore};
use store::order::OrderStore;
use store::workflow::{FulfillmentRunStore, RunStatus, StepCursor};
use store::AnalyticsStore;
use tokio::sync::mpsc;

const SECRET: &str = "whsec_integration";

struct Pipeline {
    orders: InMemoryOrderStore,
    runs: InMemoryRunStore,
    catalog: InMemoryCatalog,
    analytics: InMemoryAnalyticsStore,
    notifier: InMemoryNotificationSender,
    gateway: InMemoryPaymentGateway,
    checkout: CheckoutService<InMemoryOrderStore, InMemoryPaymentGateway>,
    reconciler: WebhookReconciler<InMemoryOrderStore, ChannelJobDispatcher>,
    jobs: Option<mpsc::UnboundedReceiver<pipeline::FulfillmentJob>>,
    job_tx: mpsc::UnboundedSender<pipeline::FulfillmentJob>,
}

impl Pipeline {
    fn new() -> Self {
        let orders = InMemoryOrderStore::new();
        let runs = InMemoryRunStore::new();
        let catalog = InMemoryCatalog::new();
        catalog.put_product(Product {
            id: ProductId::from("sku-tea"),
            name: "Oolong Tea".to_string(),
            category: "Beverages".to_string(),
            unit_price: Money::from_cents(1250),
            stock: 40,
        });
        catalog.put_product(Product {
            id: ProductId::from("sku-mug"),
            name: "Stoneware Mug".to_string(),
            category: "Kitchen".to_string(),
            unit_price: Money::from_cents(1800),
            stock: 12,
        });
        let analytics = InMemoryAnalyticsStore::new();
        let notifier = InMemoryNotificationSender::new();
        let gateway = InMemoryPaymentGateway::new();

        let checkout = CheckoutService::new(
            orders.clone(),
            gateway.clone(),
            "https://shop.example/success".to_string(),
            "https://shop.example/cancel".to_string(),
        );

        let (job_tx, jobs) = mpsc::unbounded_channel();
        let reconciler = WebhookReconciler::new(
            orders.clone(),
            ChannelJobDispatcher::new(job_tx.clone()),
            SECRET.to_string(),
        );

        Self {
            orders,
            runs,
            catalog,
            analytics,
            notifier,
            gateway,
            checkout,
            reconciler,
            jobs: Some(jobs),
            job_tx,
        }
    }

    fn runner(
        &self,
    ) -> FulfillmentRunner<
        InMemoryOrderStore,
        InMemoryRunStore,
        InMemoryCatalog,
        InMemoryAnalyticsStore,
        InMemoryNotificationSender,
    > {
        FulfillmentRunner::new(
            self.orders.clone(),
            self.runs.clone(),
            self.catalog.clone(),
            self.analytics.clone(),
            self.notifier.clone(),
        )
    }

    async fn checkout_cart(&self, lines: Vec<CartLine>) -> (OrderId, String) {
        let session = self
            .checkout
            .create_checkout(CustomerId::from("cust-1"), lines)
            .await
            .unwrap();
        (session.order_id, session.session_ref)
    }

    async fn deliver_completed(&self, order_id: OrderId, session_ref: &str) -> WebhookAck {
        let payload = serde_json::json!({
            "type": "checkout.session.completed",
            "data": {
                "session_id": session_ref,
                "payment_intent": format!("pi_{session_ref}"),
                "metadata": { "order_id": order_id.to_string() }
            }
        })
        .to_string()
        .into_bytes();
        let signature = sign_payload(SECRET, &payload);
        self.reconciler
            .handle_delivery(&payload, &signature)
            .await
            .unwrap()
    }
}

fn cart() -> Vec<CartLine> {
    vec![
        CartLine {
            product_id: ProductId::from("sku-tea"),
            name: "Oolong Tea".to_string(),
            unit_price: Money::from_cents(1250),
            quantity: 2,
            image_url: None,
        },
        CartLine {
            product_id: ProductId::from("sku-mug"),
            name: "Stoneware Mug".to_string(),
            unit_price: Money::from_cents(1800),
            quantity: 1,
            image_url: Some("https://cdn.example/mug.jpg".to_string()),
        },
    ]
}

#[tokio::test]
async fn checkout_to_fulfilled_end_to_end() {
    let mut pipeline = Pipeline::new();
    let (order_id, session_ref) = pipeline.checkout_cart(cart()).await;

    let ack = pipeline.deliver_completed(order_id, &session_ref).await;
    assert_eq!(ack, WebhookAck::Processed);

    let runner = Arc::new(pipeline.runner());
    let jobs = pipeline.jobs.take().unwrap();
    let handle = spawn_fulfillment_worker(runner, jobs, 3);
    // Closing the channel lets the worker drain and exit; the reconciler
    // holds the other sender clone, so it has to go too.
    drop(pipeline.job_tx);
    drop(pipeline.reconciler);
    handle.await.unwrap();

    let order = pipeline.orders.get(order_id).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Fulfilled);
    // 4300 subtotal sits under the free-shipping threshold.
    assert_eq!(order.subtotal, Money::from_cents(4300));
    assert_eq!(order.shipping, Money::from_cents(500));
    assert_eq!(order.tax, Money::from_cents(344));
    assert_eq!(order.total, Money::from_cents(5144));

    assert_eq!(pipeline.catalog.stock(&ProductId::from("sku-tea")), Some(38));
    assert_eq!(pipeline.catalog.stock(&ProductId::from("sku-mug")), Some(11));

    let day = chrono::Utc::now().date_naive();
    let snapshot = pipeline.analytics.get_day(day).await.unwrap().unwrap();
    assert_eq!(snapshot.revenue_cents, 5144);
    assert_eq!(snapshot.orders_count, 1);

    assert_eq!(pipeline.notifier.sent_count(), 1);

    let run = pipeline.runs.get(order_id).await.unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.cursor, StepCursor::Notified);
}

#[tokio::test]
async fn duplicate_webhook_fulfills_exactly_once() {
    let mut pipeline = Pipeline::new();
    let (order_id, session_ref) = pipeline.checkout_cart(cart()).await;

    assert_eq!(
        pipeline.deliver_completed(order_id, &session_ref).await,
        WebhookAck::Processed
    );
    assert_eq!(
        pipeline.deliver_completed(order_id, &session_ref).await,
        WebhookAck::Duplicate
    );

    let runner = Arc::new(pipeline.runner());
    let jobs = pipeline.jobs.take().unwrap();
    let handle = spawn_fulfillment_worker(runner, jobs, 3);
    drop(pipeline.job_tx);
    drop(pipeline.reconciler);
    handle.await.unwrap();

    // One decrement pass despite two deliveries.
    assert_eq!(pipeline.catalog.stock(&ProductId::from("sku-tea")), Some(38));
    let day = chrono::Utc::now().date_naive();
    let snapshot = pipeline.analytics.get_day(day).await.unwrap().unwrap();
    assert_eq!(snapshot.orders_count, 1);
    assert_eq!(pipeline.notifier.sent_count(), 1);
}

#[tokio::test]
async fn interrupted_run_resumes_without_double_effects() {
    let pipeline = Pipeline::new();
    let (order_id, session_ref) = pipeline.checkout_cart(cart()).await;
    pipeline.deliver_completed(order_id, &session_ref).await;

    // First delivery dies between analytics and notification: replay the
    // durable state such a crash leaves behind.
    let runner = pipeline.runner();
    let cutoff = chrono::Utc::now() - chrono::Duration::minutes(5);
    pipeline.runs.begin(order_id, cutoff).await.unwrap();
    for line in cart() {
        pipeline
            .catalog
            .decrement_stock(&line.product_id, line.quantity)
            .await
            .unwrap();
    }
    pipeline
        .runs
        .advance(order_id, StepCursor::StockDecremented)
        .await
        .unwrap();
    let order = pipeline.orders.get(order_id).await.unwrap().unwrap();
    let units: Vec<_> = order
        .items
        .iter()
        .map(|i| (i.product_id.clone(), u64::from(i.quantity)))
        .collect();
    pipeline
        .analytics
        .record_sale(chrono::Utc::now().date_naive(), order.total, &units)
        .await
        .unwrap();
    pipeline
        .runs
        .advance(order_id, StepCursor::AnalyticsRecorded)
        .await
        .unwrap();
    // The dead delivery's claim goes stale before redelivery.
    pipeline
        .runs
        .backdate(order_id, chrono::Duration::minutes(10))
        .await;

    // Redelivery completes the run.
    runner.run(order_id).await.unwrap();

    assert_eq!(pipeline.catalog.stock(&ProductId::from("sku-tea")), Some(38));
    let day = chrono::Utc::now().date_naive();
    let snapshot = pipeline.analytics.get_day(day).await.unwrap().unwrap();
    assert_eq!(snapshot.orders_count, 1);
    assert_eq!(pipeline.notifier.sent_count(), 1);

    let stored = pipeline.orders.get(order_id).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatus::Fulfilled);
    let run = pipeline.runs.get(order_id).await.unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.deliveries, 2);
}

#[tokio::test]
async fn exhausted_step_leaves_order_paid_for_remediation() {
    let mut pipeline = Pipeline::new();
    let (order_id, session_ref) = pipeline.checkout_cart(cart()).await;
    pipeline.deliver_completed(order_id, &session_ref).await;
    pipeline.catalog.set_fail_on_decrement(true);

    let runner = Arc::new(pipeline.runner());
    let jobs = pipeline.jobs.take().unwrap();
    let handle = spawn_fulfillment_worker(runner, jobs, 2);
    drop(pipeline.job_tx);
    drop(pipeline.reconciler);
    handle.await.unwrap();

    let order = pipeline.orders.get(order_id).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Paid);
    let run = pipeline.runs.get(order_id).await.unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Failed);
    assert!(run.last_error.as_deref().unwrap().contains("decrement_stock"));
    assert_eq!(pipeline.notifier.sent_count(), 0);
}

#[tokio::test]
async fn big_cart_gets_free_shipping() {
    let pipeline = Pipeline::new();
    let (order_id, _) = pipeline
        .checkout_cart(vec![CartLine {
            product_id: ProductId::from("sku-tea"),
            name: "Oolong Tea".to_string(),
            unit_price: Money::from_cents(1250),
            quantity: 5,
            image_url: None,
        }])
        .await;

    let order = pipeline.orders.get(order_id).await.unwrap().unwrap();
    assert_eq!(order.subtotal, Money::from_cents(6250));
    assert_eq!(order.shipping, Money::zero());
    assert_eq!(order.tax, Money::from_cents(500));
    assert_eq!(order.total, Money::from_cents(6750));
    assert_eq!(order.payment_session_ref.as_deref(), Some("cs_0001"));
}

#[tokio::test]
async fn gateway_sessions_are_keyed_to_orders() {
    let pipeline = Pipeline::new();
    let (order_id, session_ref) = pipeline.checkout_cart(cart()).await;

    let request = pipeline.gateway.session(&session_ref).unwrap();
    assert_eq!(
        request.metadata.get("order_id").unwrap(),
        &order_id.to_string()
    );
    assert_eq!(request.line_items.len(), 2);
}
