use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use velora_api::{app, AppState};
use velora_cart::{CartSessionManager, CleanupScheduler, ReservationLedger};
use velora_core::repository::{CartRepository, KeyValueStore};
use velora_store::{DbClient, PgCartRepository, RedisClient};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "velora_api=debug,velora_cart=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = velora_store::app_config::Config::load().expect("Failed to load config");
    tracing::info!("Starting Velora API on port {}", config.server.port);

    let db = DbClient::new(&config.database.url)
        .await
        .expect("Failed to connect to Postgres");
    db.migrate().await.expect("Failed to run migrations");

    let redis = RedisClient::new(&config.redis.url)
        .await
        .expect("Failed to connect to Redis");

    let store: Arc<dyn KeyValueStore> = Arc::new(redis);
    let carts: Arc<dyn CartRepository> = Arc::new(PgCartRepository::new(db.pool.clone()));

    let rules = &config.cart_rules;
    let ledger = Arc::new(ReservationLedger::new(
        Arc::clone(&store),
        rules.reservation_hold_seconds,
    ));
    let sessions = Arc::new(CartSessionManager::new(carts, store, Arc::clone(&ledger)));

    let scheduler = CleanupScheduler::start(
        Arc::clone(&ledger),
        Arc::clone(&sessions),
        Duration::from_secs(rules.reservation_cleanup_interval_seconds),
        Duration::from_secs(rules.cart_sweep_interval_seconds),
    );

    let app = app(AppState { ledger, sessions });

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind listener");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // Let in-flight cleanup cycles finish before the process exits
    scheduler.stop().await;
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install ctrl-c handler");
    tracing::info!("Shutdown signal received");
}
