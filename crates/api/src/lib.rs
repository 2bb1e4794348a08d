//! HTTP surface for the storefront order pipeline.
//!
//! Exposes checkout initiation, the payment webhook, and the admin
//! surface (orders and analytics), with structured logging (tracing) and
//! Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use analytics::AnalyticsAggregator;
use axum::routing::{delete, get, patch, post};
use axum::Router;
use common::CustomerId;
use metrics_exporter_prometheus::PrometheusHandle;
use pipeline::{
    spawn_fulfillment_worker, AdminService, ChannelJobDispatcher, CheckoutService,
    FulfillmentRunner, InMemoryCatalog, InMemoryNotificationSender, InMemoryPaymentGateway,
    StaticAccessPolicy, WebhookReconciler,
};
use store::memory::{InMemoryAnalyticsStore, InMemoryOrderStore, InMemoryRunStore};
use store::{AnalyticsStore, OrderStore};
use tokio::sync::mpsc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use config::Config;

/// Shared application state accessible from all handlers.
pub struct AppState<O: OrderStore, A: AnalyticsStore> {
    pub checkout: CheckoutService<O, InMemoryPaymentGateway>,
    pub reconciler: WebhookReconciler<O, ChannelJobDispatcher>,
    pub admin: AdminService<O, StaticAccessPolicy>,
    pub analytics: AnalyticsAggregator<O, InMemoryCatalog, A>,
    pub policy: StaticAccessPolicy,
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<O, A>(state: Arc<AppState<O, A>>, metrics_handle: PrometheusHandle) -> Router
where
    O: OrderStore + Clone + 'static,
    A: AnalyticsStore + Clone + 'static,
{
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/checkout", post(routes::checkout::create::<O, A>))
        .route("/webhooks/payment", post(routes::webhooks::receive::<O, A>))
        .route(
            "/admin/analytics/{range}",
            get(routes::analytics::report::<O, A>),
        )
        .route("/admin/orders/{id}", get(routes::admin::get::<O, A>))
        .route("/admin/orders/{id}", patch(routes::admin::update::<O, A>))
        .route("/admin/orders/{id}", delete(routes::admin::delete::<O, A>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Handles to the in-memory backends behind the default state, for the
/// server binary (catalog seeding) and integration tests (assertions).
pub struct DefaultHandles {
    pub orders: InMemoryOrderStore,
    pub runs: InMemoryRunStore,
    pub snapshots: InMemoryAnalyticsStore,
    pub catalog: InMemoryCatalog,
    pub gateway: InMemoryPaymentGateway,
    pub notifier: InMemoryNotificationSender,
    pub worker: tokio::task::JoinHandle<()>,
}

/// Wires application state over any store implementations and spawns the
/// fulfillment worker that drains the webhook-fed job channel.
pub fn create_state<O, R, A>(
    config: &Config,
    orders: O,
    runs: R,
    snapshots: A,
    catalog: InMemoryCatalog,
    gateway: InMemoryPaymentGateway,
    notifier: InMemoryNotificationSender,
) -> (Arc<AppState<O, A>>, tokio::task::JoinHandle<()>)
where
    O: OrderStore + Clone + 'static,
    R: store::FulfillmentRunStore + Clone + 'static,
    A: AnalyticsStore + Clone + 'static,
{
    let policy = StaticAccessPolicy::new(
        config
            .admin_callers
            .iter()
            .map(|id| CustomerId::new(id.clone())),
    );

    let (job_tx, job_rx) = mpsc::unbounded_channel();
    let runner = Arc::new(FulfillmentRunner::new(
        orders.clone(),
        runs,
        catalog.clone(),
        snapshots.clone(),
        notifier,
    ));
    let worker = spawn_fulfillment_worker(runner, job_rx, 3);

    let state = Arc::new(AppState {
        checkout: CheckoutService::new(
            orders.clone(),
            gateway,
            config.success_url.clone(),
            config.cancel_url.clone(),
        ),
        reconciler: WebhookReconciler::new(
            orders.clone(),
            ChannelJobDispatcher::new(job_tx),
            config.webhook_secret.clone(),
        ),
        admin: AdminService::new(orders.clone(), policy.clone()),
        analytics: AnalyticsAggregator::new(orders, catalog, snapshots),
        policy,
    });

    (state, worker)
}

/// Creates application state over the in-memory stores.
pub fn create_default_state(
    config: &Config,
) -> (
    Arc<AppState<InMemoryOrderStore, InMemoryAnalyticsStore>>,
    DefaultHandles,
) {
    let orders = InMemoryOrderStore::new();
    let runs = InMemoryRunStore::new();
    let snapshots = InMemoryAnalyticsStore::new();
    let catalog = InMemoryCatalog::new();
    let gateway = InMemoryPaymentGateway::new();
    let notifier = InMemoryNotificationSender::new();

    let (state, worker) = create_state(
        config,
        orders.clone(),
        runs.clone(),
        snapshots.clone(),
        catalog.clone(),
        gateway.clone(),
        notifier.clone(),
    );

    let handles = DefaultHandles {
        orders,
        runs,
        snapshots,
        catalog,
        gateway,
        notifier,
        worker,
    };

    (state, handles)
}
