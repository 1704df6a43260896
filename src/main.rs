//! Sighting recorder server

use std::sync::Arc;

use sighting_recorder::{
    api::{build_router, AppState},
    config::AppConfig,
    database::Database,
    dispatch::NotificationDispatcher,
    errors::SightingError,
    media::MediaStore,
    registry::SubscriberRegistry,
    service::SightingService,
};
use tokio::{net::TcpListener, signal};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), SightingError> {
    #[cfg(feature = "dotenv")]
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load configuration, preferring environment variables and config files
    let config = AppConfig::load()?;
    config.validate()?;

    let database = Database::connect(&config.database).await?;
    let registry = Arc::new(SubscriberRegistry::new(config.subscribers.send_timeout));
    let service = SightingService::new(
        database,
        MediaStore::new(&config.media.upload_dir),
        NotificationDispatcher::new(registry),
    );
    let app = build_router(
        AppState::new(service, config.subscribers.channel_capacity),
        config.media.max_upload_bytes,
    );

    let listener = TcpListener::bind(&config.server.bind).await?;
    info!("Listening on {}", config.server.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| SightingError::ServerError(e.to_string()))?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal");
}
