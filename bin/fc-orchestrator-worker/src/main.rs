//! Campaign orchestrator worker: polls the durable job queue and runs each
//! campaign job through the compliance-gated dispatch pipeline.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::routing::get;
use axum::{Json, Router};
use fc_config::AppConfig;
use fc_lock::{AdvisoryLockConfig, AdvisoryLockManager};
use fc_orchestrator::{CampaignOrchestrator, OrchestratorConfig};
use fc_provider::{HttpProviderAdapter, ProviderAdapter, ProviderConfig};
use fc_queue::sqlite::SqliteQueue;
use fc_queue::{EmbeddedQueue, QueueConsumer};
use fc_ratelimiter::{RateLimiter, RateLimiterConfig};
use fc_storage::sqlite::SqliteStorageGateway;
use fc_storage::StorageGateway;
use sqlx::sqlite::SqlitePoolOptions;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    fc_common::logging::init_logging("fc-orchestrator-worker");

    let config = AppConfig::load()?;
    info!("starting campaign orchestrator worker");

    let pool = SqlitePoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(&config.database.url)
        .await?;

    let storage: Arc<dyn StorageGateway> = Arc::new(SqliteStorageGateway::new(pool.clone()));
    storage.init_schema().await?;

    let queue = Arc::new(SqliteQueue::new(pool, "campaign-jobs".to_string(), 30));
    queue.init_schema().await?;
    let queue: Arc<dyn QueueConsumer> = queue;

    let rate_limiter = RateLimiter::new(RateLimiterConfig {
        redis_url: config.redis.url.clone(),
        key_ttl_seconds: config.rate_limiter.key_ttl_seconds,
    })
    .await?;

    let provider: Arc<dyn ProviderAdapter> = Arc::new(HttpProviderAdapter::new(ProviderConfig {
        base_url: config.provider.base_url.clone(),
        account_sid: config.provider.account_sid.clone(),
        auth_token: config.provider.auth_token.clone(),
        timeout: Duration::from_millis(config.provider.timeout_ms),
        signing_secret: Some(config.provider.signing_secret.clone()),
        ..Default::default()
    }));

    let lock_manager = Arc::new(
        AdvisoryLockManager::new(AdvisoryLockConfig {
            redis_url: config.redis.url.clone(),
            lock_ttl_seconds: config.lock.lock_ttl_seconds,
            heartbeat_interval_seconds: config.lock.heartbeat_interval_seconds,
            ..Default::default()
        })
        .await?,
    );

    let orchestrator = Arc::new(CampaignOrchestrator::new(
        OrchestratorConfig {
            cursor_page_size: config.orchestrator.cursor_page_size as u32,
            lock_ttl_seconds: config.lock.lock_ttl_seconds,
        },
        storage,
        rate_limiter,
        provider,
        lock_manager,
    ));

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

    let semaphore = Arc::new(Semaphore::new(config.orchestrator.max_concurrent_campaigns));
    let poll_interval = Duration::from_millis(config.orchestrator.poll_interval_ms);
    let mut ticker = tokio::time::interval(poll_interval);

    info!(
        max_concurrent_campaigns = config.orchestrator.max_concurrent_campaigns,
        poll_interval_ms = config.orchestrator.poll_interval_ms,
        "orchestrator worker ready"
    );

    loop {
        ticker.tick().await;

        let available = semaphore.available_permits();
        if available == 0 {
            continue;
        }
        let jobs = match queue.poll(available as u32).await {
            Ok(jobs) => jobs,
            Err(e) => {
                error!(error = %e, "failed to poll campaign job queue");
                continue;
            }
        };

        for queued in jobs {
            let permit = semaphore.clone().acquire_owned().await.expect("semaphore not closed");
            let orchestrator = orchestrator.clone();
            let queue = queue.clone();
            tokio::spawn(async move {
                let _permit = permit;
                let campaign_id = queued.job.campaign_id.clone();
                match orchestrator.run_campaign(&campaign_id, queued.job.dry_run).await {
                    Ok(result) => {
                        info!(campaign_id = %campaign_id, sent = result.sent, failed = result.failed, "campaign run complete");
                        if let Err(e) = queue.ack(&queued.receipt_handle).await {
                            error!(campaign_id = %campaign_id, error = %e, "failed to ack campaign job");
                        }
                    }
                    Err(e) => {
                        warn!(campaign_id = %campaign_id, error = %e, "campaign run failed, nacking for retry");
                        if let Err(e) = queue.nack(&queued.receipt_handle, None).await {
                            error!(campaign_id = %campaign_id, error = %e, "failed to nack campaign job");
                        }
                    }
                }
            });
        }
    }
}
