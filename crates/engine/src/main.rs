use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::info;

use courier_tracking_engine::{config::Config, logging, TrackingEngine};
use domain::services::notification::MockNotificationSender;
use persistence::repositories::{
    CourierStateRepository, GeofenceEventRepository, GeofenceRepository, OrderTrackingRepository,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    logging::init_logging(&config.logging);

    info!(
        "Starting Courier Tracking Engine v{}",
        env!("CARGO_PKG_VERSION")
    );

    // Create database pool
    let pool = persistence::db::create_pool(&config.database.to_pool_config()).await?;

    // Run migrations
    info!("Running database migrations...");
    sqlx::migrate!("../persistence/src/migrations")
        .run(&pool)
        .await?;
    info!("Migrations completed");

    // The push/SMS transport is an external collaborator; the mock sender
    // logs instead of delivering.
    let sender = Arc::new(MockNotificationSender::new());

    let engine = TrackingEngine::new(
        Arc::new(GeofenceRepository::new(pool.clone())),
        Arc::new(CourierStateRepository::new(pool.clone())),
        Arc::new(GeofenceEventRepository::new(pool.clone())),
        Arc::new(OrderTrackingRepository::new(pool)),
        sender,
        config.tracking.clone(),
    );

    // Recover pending events and resume tracked couriers
    engine.start().await?;

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    engine.shutdown().await;
    engine.wait_for_shutdown(Duration::from_secs(10)).await;

    Ok(())
}
