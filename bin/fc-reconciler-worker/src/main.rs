//! Periodic sweep for delivery receipts that raced the Message insert and
//! were never reconciled inline by the webhook server.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use fc_config::AppConfig;
use fc_reconciler::Reconciler;
use fc_storage::sqlite::SqliteStorageGateway;
use fc_storage::StorageGateway;
use sqlx::sqlite::SqlitePoolOptions;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    fc_common::logging::init_logging("fc-reconciler-worker");

    let config = AppConfig::load()?;
    info!("starting delivery receipt reconciler worker");

    let pool = SqlitePoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(&config.database.url)
        .await?;

    let storage: Arc<dyn StorageGateway> = Arc::new(SqliteStorageGateway::new(pool));
    storage.init_schema().await?;

    let reconciler = Arc::new(Reconciler::new(storage));

    let health_addr = format!("{}:{}", config.http.host, config.http.port);
    let health_app = Router::new()
        .route("/q/health", get(|| async { Json(serde_json::json!({"status": "UP"})) }))
        .route("/q/health/live", get(|| async { Json(serde_json::json!({"status": "UP"})) }))
        .route("/q/health/ready", get(|| async { Json(serde_json::json!({"status": "UP"})) }));
    let health_listener = tokio::net::TcpListener::bind(&health_addr).await?;
    tokio::spawn(async move {
        if let Err(e) = axum::serve(health_listener, health_app).await {
            error!(error = %e, "health server error");
        }
    });

    let sweep_interval = Duration::from_millis(config.reconciler.sweep_interval_ms);
    let lookback_minutes = config.reconciler.orphan_lookback_minutes as i64;
    let mut ticker = tokio::time::interval(sweep_interval);

    info!(
        sweep_interval_ms = config.reconciler.sweep_interval_ms,
        lookback_minutes,
        "reconciler sweep ready"
    );

    loop {
        ticker.tick().await;
        let lookback = Utc::now() - chrono::Duration::minutes(lookback_minutes);
        match reconciler.sweep_unreconciled(lookback, 100).await {
            Ok(count) if count > 0 => info!(count, "swept unreconciled receipts"),
            Ok(_) => {}
            Err(e) => error!(error = %e, "orphan sweep failed"),
        }
    }
}
