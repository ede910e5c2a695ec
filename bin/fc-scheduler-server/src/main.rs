//! Campaign scheduler server: promotes READY campaigns whose schedule has
//! arrived and recovers RUNNING campaigns stuck past the staleness window.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{routing::get, Json, Router};
use fc_config::AppConfig;
use fc_queue::sqlite::SqliteQueue;
use fc_queue::{EmbeddedQueue, QueuePublisher};
use fc_scheduler::{CampaignScheduler, SchedulerConfig};
use fc_storage::sqlite::SqliteStorageGateway;
use fc_storage::StorageGateway;
use serde::Serialize;
use sqlx::sqlite::SqlitePoolOptions;
use tracing::info;

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    scheduler_running: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fc_common::logging::init_logging("fc-scheduler-server");

    info!("starting campaign scheduler server");

    let config = AppConfig::load()?;
    info!(
        enabled = config.scheduler.enabled,
        poll_interval_ms = config.scheduler.poll_interval_ms,
        "scheduler configuration loaded"
    );

    let pool = SqlitePoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(&config.database.url)
        .await?;

    let storage: Arc<dyn StorageGateway> = Arc::new(SqliteStorageGateway::new(pool.clone()));
    storage.init_schema().await?;

    let queue = Arc::new(SqliteQueue::new(pool, "campaign-jobs".to_string(), 30));
    queue.init_schema().await?;
    let queue: Arc<dyn QueuePublisher> = queue;

    let scheduler = Arc::new(CampaignScheduler::new(
        SchedulerConfig::from(&config.scheduler),
        storage,
        queue,
    ));
    scheduler.start().await;

    let scheduler_clone = scheduler.clone();
    let app = Router::new()
        .route(
            "/q/health",
            get(move || {
                let s = scheduler_clone.clone();
                async move {
                    let running = s.is_running().await;
                    Json(HealthResponse {
                        status: if running { "UP".to_string() } else { "DOWN".to_string() },
                        scheduler_running: running,
                    })
                }
            }),
        )
        .route("/q/health/live", get(|| async { Json(serde_json::json!({"status": "UP"})) }))
        .route("/q/health/ready", get(|| async { Json(serde_json::json!({"status": "UP"})) }));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.http.port));
    info!(?addr, "HTTP server starting");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(scheduler))
        .await?;

    info!("scheduler server stopped");
    Ok(())
}

async fn shutdown_signal(scheduler: Arc<CampaignScheduler>) {
    tokio::signal::ctrl_c().await.expect("failed to install CTRL+C handler");
    info!("shutdown signal received");
    scheduler.stop().await;
}
