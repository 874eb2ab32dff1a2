use actix_web::{web, App, HttpServer};
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use uuid::Uuid;

use order_fulfillment::actors::{BackgroundDeps, Coordinator, HealthBoard};
use order_fulfillment::api::{self, AppState};
use order_fulfillment::clock::{Clock, SystemClock};
use order_fulfillment::config::EngineConfig;
use order_fulfillment::domain::checkout::{CheckoutService, InMemoryCartStore};
use order_fulfillment::domain::inventory::{InMemoryInventory, ProductRecord, ProductStatus};
use order_fulfillment::domain::order::{Money, OrderSweeper, TransitionEngine};
use order_fulfillment::messaging::{GuardedPaymentClient, LogNotifier, SimulatedGateway};
use order_fulfillment::metrics::{self, Metrics};
use order_fulfillment::store::{InMemoryOrderStore, OrderStore, ScyllaOrderStore};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured logging with environment-based filtering
    // Default to INFO level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,order_fulfillment=debug")),
        )
        .init();

    tracing::info!("🚀 Starting order fulfillment engine");

    let config = EngineConfig::from_env()?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    // === 1. Metrics ===
    let metrics = Arc::new(Metrics::new()?);
    tracing::info!("📊 Metrics registry created with {} metrics", metrics.registry().gather().len());

    // === 2. Order store ===
    let store: Arc<dyn OrderStore> = match &config.scylla_node {
        Some(node) => Arc::new(ScyllaOrderStore::connect(node, &config.keyspace).await?),
        None => {
            tracing::warn!("FULFILLMENT_SCYLLA_NODE not set, orders are kept in memory");
            Arc::new(InMemoryOrderStore::new())
        }
    };

    // === 3. Collaborators ===
    let inventory = Arc::new(InMemoryInventory::new());
    seed_demo_catalog(&inventory).await;
    let carts = Arc::new(InMemoryCartStore::new());
    let payments = Arc::new(GuardedPaymentClient::new(
        Arc::new(SimulatedGateway::new()),
        config.payment_timeout,
        metrics.clone(),
    ));

    // === 4. Engine ===
    let engine = Arc::new(TransitionEngine::new(
        store.clone(),
        inventory.clone(),
        Arc::new(config.carriers()),
        config.shipping(),
        clock.clone(),
        metrics.clone(),
    ));
    let sweeper = Arc::new(OrderSweeper::new(engine.clone(), config.sweep_rules()?, metrics.clone()));
    let checkout = Arc::new(CheckoutService::new(
        engine.clone(),
        inventory.clone(),
        carts,
        payments.clone(),
        config.pricing(),
        metrics.clone(),
    ));

    // === 5. Background actors ===
    let board = HealthBoard::new();
    let coordinator = Coordinator::start(
        BackgroundDeps {
            store: store.clone(),
            sweeper: sweeper.clone(),
            notifier: Arc::new(LogNotifier),
            payments,
            board: board.clone(),
            clock: clock.clone(),
            metrics: metrics.clone(),
        },
        config.background(),
    )
    .await;

    // === 6. Metrics server ===
    let metrics_server = actix_web::rt::spawn(metrics::start_metrics_server(
        metrics.clone(),
        board,
        config.metrics_port,
    ));

    // === 7. API server ===
    if config.gateway_secret.is_none() {
        tracing::warn!("FULFILLMENT_GATEWAY_SECRET is not set, payment callbacks will be rejected");
    }
    let state = web::Data::new(AppState {
        engine,
        checkout,
        sweeper,
        clock,
        gateway_secret: config.gateway_secret.clone(),
    });
    tracing::info!("🌐 API listening on http://{}", config.http_addr);
    let server = HttpServer::new(move || App::new().app_data(state.clone()).configure(api::configure))
        .bind(config.http_addr)?
        .disable_signals()
        .run();
    let handle = server.handle();
    let api_server = actix_web::rt::spawn(server);

    tracing::info!("✅ System running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c().await?;

    tracing::info!("🛑 Shutdown signal received");
    handle.stop(true).await;
    coordinator.shutdown().await;
    metrics_server.abort();

    match api_server.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!(error = %e, "API server error"),
        Err(e) => tracing::warn!(error = %e, "API server task ended abnormally"),
    }

    tracing::info!("👋 Shutdown complete");
    Ok(())
}

/// The in-memory catalog starts with a few products so checkout can be exercised
async fn seed_demo_catalog(inventory: &InMemoryInventory) {
    let products = [
        ("Soapstone chess set", "SSC-01", 2000, 25),
        ("Kikoy beach towel", "KBT-02", 850, 60),
        ("Maasai beaded bracelet", "MBB-03", 450, 120),
    ];

    for (name, sku, price, stock) in products {
        let id = Uuid::new_v4();
        tracing::info!(product_id = %id, sku = sku, stock = stock, "Demo product available");
        inventory
            .upsert_product(ProductRecord {
                id,
                name: name.to_string(),
                sku: sku.to_string(),
                price: Money::from_units(price),
                stock,
                status: ProductStatus::Active,
                seller_id: None,
                variants: vec![],
            })
            .await;
    }

    tracing::info!(products = products.len(), "🛒 Seeded demo catalog");
}
