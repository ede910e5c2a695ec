//! Webhook ingestion and campaign trigger HTTP server.

use std::sync::Arc;

use anyhow::Result;
use fc_config::AppConfig;
use fc_queue::sqlite::SqliteQueue;
use fc_queue::{EmbeddedQueue, QueuePublisher};
use fc_storage::sqlite::SqliteStorageGateway;
use fc_storage::StorageGateway;
use fc_webhook::{AppState, WebhookSigningConfig};
use sqlx::sqlite::SqlitePoolOptions;
use tower_http::trace::TraceLayer;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    fc_common::logging::init_logging("fc-webhook-server");

    let config = AppConfig::load()?;
    info!(port = config.http.port, "starting webhook server");

    let pool = SqlitePoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(&config.database.url)
        .await?;

    let storage: Arc<dyn StorageGateway> = Arc::new(SqliteStorageGateway::new(pool.clone()));
    storage.init_schema().await?;

    let queue = Arc::new(SqliteQueue::new(pool, "campaign-jobs".to_string(), 30));
    queue.init_schema().await?;
    let queue: Arc<dyn QueuePublisher> = queue;

    let signing = WebhookSigningConfig::from(&config.webhook);
    let state = AppState::new(storage, queue, signing);

    let app = fc_webhook::create_router(state).layer(TraceLayer::new_for_http());

    let addr = format!("{}:{}", config.http.host, config.http.port);
    info!(%addr, "webhook server listening");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("webhook server stopped");
    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install CTRL+C handler");
    info!("shutdown signal received");
}
