//! API server entry point.

use common::{Money, ProductId};
use pipeline::Product;
use tokio::signal;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

/// Seeds a small demo catalog so local checkouts can fulfill.
fn seed_demo_catalog(catalog: &pipeline::InMemoryCatalog) {
    for (id, name, category, cents, stock) in [
        ("sku-oolong", "Oolong Tea", "Beverages", 1250, 80),
        ("sku-espresso", "Espresso Blend", "Beverages", 1600, 60),
        ("sku-mug", "Stoneware Mug", "Kitchen", 1800, 40),
        ("sku-kettle", "Gooseneck Kettle", "Kitchen", 6400, 15),
    ] {
        catalog.put_product(Product {
            id: ProductId::from(id),
            name: name.to_string(),
            category: category.to_string(),
            unit_price: Money::from_cents(cents),
            stock,
        });
    }
}

#[tokio::main]
async fn main() {
    let config = api::Config::from_env();

    // 1. Initialize tracing
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone())),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 2. Install Prometheus metrics recorder
    let prometheus_builder = metrics_exporter_prometheus::PrometheusBuilder::new();
    let metrics_handle = prometheus_builder
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Wire stores, pipeline services, and the fulfillment worker
    let app = if let Some(database_url) = config.database_url.clone() {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(10)
            .connect(&database_url)
            .await
            .expect("failed to connect to database");
        let store = store::PostgresStore::new(pool);
        store.run_migrations().await.expect("migrations failed");
        tracing::info!("using PostgreSQL stores");

        let catalog = pipeline::InMemoryCatalog::new();
        seed_demo_catalog(&catalog);
        let (state, _worker) = api::create_state(
            &config,
            store.clone(),
            store.clone(),
            store,
            catalog,
            pipeline::InMemoryPaymentGateway::new(),
            pipeline::InMemoryNotificationSender::new(),
        );
        api::create_app(state, metrics_handle)
    } else {
        tracing::info!("DATABASE_URL not set, using in-memory stores");
        let (state, handles) = api::create_default_state(&config);
        seed_demo_catalog(&handles.catalog);
        api::create_app(state, metrics_handle)
    };

    // 4. Start server
    let addr = config.addr();
    tracing::info!(%addr, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    tracing::info!("server shut down gracefully");
}
