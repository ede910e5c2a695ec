//! Development Monolith
//!
//! All-in-one binary for local development containing:
//! - Webhook ingestion and campaign trigger HTTP server
//! - Campaign scheduler (ready-campaign promotion, stale-running recovery)
//! - Campaign orchestrator worker (compliance-gated dispatch pipeline)
//! - Delivery receipt reconciler sweep

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::routing::get;
use chrono::Utc;
use clap::Parser;
use fc_config::AppConfig;
use fc_lock::{AdvisoryLockConfig, AdvisoryLockManager};
use fc_orchestrator::{CampaignOrchestrator, OrchestratorConfig};
use fc_provider::{HttpProviderAdapter, ProviderAdapter, ProviderConfig};
use fc_queue::sqlite::SqliteQueue;
use fc_queue::{EmbeddedQueue, QueueConsumer, QueuePublisher};
use fc_ratelimiter::{RateLimiter, RateLimiterConfig};
use fc_reconciler::Reconciler;
use fc_scheduler::{CampaignScheduler, SchedulerConfig};
use fc_storage::sqlite::SqliteStorageGateway;
use fc_storage::StorageGateway;
use fc_webhook::{AppState, WebhookSigningConfig};
use sqlx::sqlite::SqlitePoolOptions;
use tokio::signal;
use tokio::sync::{broadcast, Semaphore};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

/// Messaging Engine Development Server
#[derive(Parser, Debug)]
#[command(name = "fc-dev")]
#[command(about = "Messaging engine development monolith - all components in one binary")]
struct Args {
    /// HTTP server port
    #[arg(long, env = "FC_HTTP_PORT")]
    http_port: Option<u16>,

    /// Skip starting the orchestrator's dispatch loop (webhook + scheduler only)
    #[arg(long, env = "FC_DEV_NO_DISPATCH", default_value = "false")]
    no_dispatch: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    fc_common::logging::init_logging("fc-dev");

    let args = Args::parse();
    let mut config = AppConfig::load()?;
    if let Some(port) = args.http_port {
        config.http.port = port;
    }
    config.dev_mode = true;

    info!("starting messaging engine development monolith");

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    // 1. Shared sqlite pool backs storage and the embedded job queue.
    let pool = SqlitePoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(&config.database.url)
        .await?;

    let storage: Arc<dyn StorageGateway> = Arc::new(SqliteStorageGateway::new(pool.clone()));
    storage.init_schema().await?;

    let queue = Arc::new(SqliteQueue::new(pool, "campaign-jobs".to_string(), 30));
    queue.init_schema().await?;
    info!("embedded sqlite queue initialized");

    // 2. Campaign scheduler: promotes READY campaigns, recovers stale RUNNING ones.
    let publisher: Arc<dyn QueuePublisher> = queue.clone();
    let scheduler = Arc::new(CampaignScheduler::new(
        SchedulerConfig::from(&config.scheduler),
        storage.clone(),
        publisher.clone(),
    ));
    scheduler.start().await;

    // 3. Reconciler sweep for receipts that raced the Message insert.
    let reconciler = Arc::new(Reconciler::new(storage.clone()));
    let reconciler_handle = {
        let reconciler = reconciler.clone();
        let sweep_interval = Duration::from_millis(config.reconciler.sweep_interval_ms);
        let lookback_minutes = config.reconciler.orphan_lookback_minutes as i64;
        let mut shutdown_rx = shutdown_tx.subscribe();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(sweep_interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let lookback = Utc::now() - chrono::Duration::minutes(lookback_minutes);
                        if let Err(e) = reconciler.sweep_unreconciled(lookback, 100).await {
                            error!(error = %e, "orphan sweep failed");
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        info!("reconciler sweep shutting down");
                        break;
                    }
                }
            }
        })
    };

    // 4. Orchestrator dispatch loop (optional, for a webhook-only dev session).
    let orchestrator_handle = if args.no_dispatch {
        info!("dispatch loop disabled (--no-dispatch)");
        None
    } else {
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
            storage.clone(),
            rate_limiter,
            provider,
            lock_manager,
        ));

        let consumer: Arc<dyn QueueConsumer> = queue.clone();
        let semaphore = Arc::new(Semaphore::new(config.orchestrator.max_concurrent_campaigns));
        let poll_interval = Duration::from_millis(config.orchestrator.poll_interval_ms);
        let mut shutdown_rx = shutdown_tx.subscribe();

        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(poll_interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let available = semaphore.available_permits();
                        if available == 0 {
                            continue;
                        }
                        let jobs = match consumer.poll(available as u32).await {
                            Ok(jobs) => jobs,
                            Err(e) => {
                                error!(error = %e, "failed to poll campaign job queue");
                                continue;
                            }
                        };
                        for queued in jobs {
                            let permit = semaphore.clone().acquire_owned().await.expect("semaphore not closed");
                            let orchestrator = orchestrator.clone();
                            let consumer = consumer.clone();
                            tokio::spawn(async move {
                                let _permit = permit;
                                let campaign_id = queued.job.campaign_id.clone();
                                match orchestrator.run_campaign(&campaign_id, queued.job.dry_run).await {
                                    Ok(result) => {
                                        info!(campaign_id = %campaign_id, sent = result.sent, failed = result.failed, "campaign run complete");
                                        if let Err(e) = consumer.ack(&queued.receipt_handle).await {
                                            error!(campaign_id = %campaign_id, error = %e, "failed to ack campaign job");
                                        }
                                    }
                                    Err(e) => {
                                        warn!(campaign_id = %campaign_id, error = %e, "campaign run failed, nacking for retry");
                                        if let Err(e) = consumer.nack(&queued.receipt_handle, None).await {
                                            error!(campaign_id = %campaign_id, error = %e, "failed to nack campaign job");
                                        }
                                    }
                                }
                            });
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        info!("dispatch loop shutting down");
                        break;
                    }
                }
            }
        }))
    };

    // 5. Webhook ingestion + trigger API HTTP server.
    let signing = WebhookSigningConfig::from(&config.webhook);
    let app_state = AppState::new(storage, publisher, signing);
    let app = fc_webhook::create_router(app_state)
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http());

    let addr = format!("{}:{}", config.http.host, config.http.port);
    info!(%addr, "HTTP server listening");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let server_handle = {
        let mut shutdown_rx = shutdown_tx.subscribe();
        tokio::spawn(async move {
            let server = axum::serve(listener, app);
            tokio::select! {
                result = server => {
                    if let Err(e) = result {
                        error!(error = %e, "HTTP server error");
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("HTTP server shutting down");
                }
            }
        })
    };

    info!("messaging engine development monolith started, press Ctrl+C to shut down");
    shutdown_signal().await;
    info!("shutdown signal received, stopping components");

    let _ = shutdown_tx.send(());
    scheduler.stop().await;

    let shutdown_timeout = Duration::from_secs(10);
    let _ = tokio::time::timeout(shutdown_timeout, async {
        let _ = server_handle.await;
        let _ = reconciler_handle.await;
        if let Some(handle) = orchestrator_handle {
            let _ = handle.await;
        }
    })
    .await;

    info!("development monolith shutdown complete");
    Ok(())
}

async fn metrics_handler() -> &'static str {
    "# HELP fc_up messaging engine liveness\n# TYPE fc_up gauge\nfc_up 1\n"
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
