use actix_web::{web, App, HttpServer};
use anyhow::Context;
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use delivery_orders::api::{self, AppState};
use delivery_orders::app_config::{Config, StoreBackend};
use delivery_orders::metrics::{self, Metrics};
use delivery_orders::payment::SandboxGateway;
use delivery_orders::store::{LocationStore, MemoryOrderStore, OrderStore, PgOrderStore};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load().context("Failed to load configuration")?;

    // Structured logging; RUST_LOG overrides the configured filter
    // Example: RUST_LOG=debug cargo run
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.filter)),
        )
        .init();

    tracing::info!("🚀 Starting delivery order service");

    // === 1. Metrics registry ===
    let metrics = Arc::new(Metrics::new()?);
    tracing::info!("📊 Metrics registry created with {} metrics", metrics.registry().gather().len());

    // === 2. Order store ===
    let (orders, locations): (Arc<dyn OrderStore>, Arc<dyn LocationStore>) = match config.store.backend {
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory store; orders are lost on restart");
            let store = Arc::new(MemoryOrderStore::new());
            (store.clone(), store)
        }
        StoreBackend::Postgres => {
            let url = config
                .store
                .database_url
                .as_deref()
                .context("store.database_url is required for the postgres backend")?;

            tracing::info!("Connecting to PostgreSQL...");
            let store = Arc::new(PgOrderStore::connect(url, config.store.max_connections).await?);
            store.migrate().await.context("Failed to run migrations")?;
            tracing::info!("✅ Database ready");
            (store.clone(), store)
        }
    };

    // === 3. Payment gateway ===
    let payments = Arc::new(SandboxGateway::new(
        config.payment.currency.clone(),
        config.payment.declined_tokens.clone(),
    ));

    // === 4. HTTP server ===
    let state = web::Data::new(AppState::new(
        orders,
        locations,
        payments,
        metrics.clone(),
        config.dispatch.ready_page_size,
    ));
    let metrics_data = web::Data::from(metrics);

    tracing::info!(
        "🌐 Listening on http://{}:{} (/api, /metrics, /health)",
        config.server.host,
        config.server.port
    );

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .app_data(metrics_data.clone())
            .configure(api::configure)
            .configure(metrics::configure)
    })
    .bind((config.server.host.as_str(), config.server.port))?
    .run()
    .await?;

    tracing::info!("Server stopped");
    Ok(())
}
