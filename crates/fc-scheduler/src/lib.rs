//! Campaign scheduler
//!
//! Two independent sweeps, run as background tasks:
//! - `ReadyCampaignPoller`: promotes `READY` campaigns whose `schedule_time`
//!   has arrived to `RUNNING` and enqueues the orchestrator job.
//! - `StaleRunningCampaignPoller`: reverts campaigns stuck in `RUNNING` past
//!   the staleness threshold back to `READY`.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::RwLock;
use tokio::time::interval;
use tracing::{error, info, warn};

pub mod poller;
pub mod stale_recovery;

pub use poller::ReadyCampaignPoller;
pub use stale_recovery::StaleRunningCampaignPoller;

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("storage error: {0}")]
    Storage(#[from] fc_storage::StorageError),
    #[error("queue error: {0}")]
    Queue(#[from] fc_queue::QueueError),
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub enabled: bool,
    pub poll_interval: Duration,
    pub batch_size: u32,
    pub stale_threshold: Duration,
    /// Fixed cadence for the stale-running sweep; not exposed in
    /// `fc_config::SchedulerConfig` because it rarely needs tuning.
    pub stale_sweep_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval: Duration::from_millis(30_000),
            batch_size: 50,
            stale_threshold: Duration::from_secs(15 * 60),
            stale_sweep_interval: Duration::from_secs(60),
        }
    }
}

impl From<&fc_config::SchedulerConfig> for SchedulerConfig {
    fn from(cfg: &fc_config::SchedulerConfig) -> Self {
        Self {
            enabled: cfg.enabled,
            poll_interval: Duration::from_millis(cfg.poll_interval_ms),
            batch_size: cfg.batch_size as u32,
            stale_threshold: Duration::from_secs(cfg.stale_threshold_minutes * 60),
            stale_sweep_interval: Duration::from_secs(60),
        }
    }
}

pub struct CampaignScheduler {
    config: SchedulerConfig,
    poller: ReadyCampaignPoller,
    stale_poller: StaleRunningCampaignPoller,
    running: Arc<RwLock<bool>>,
}

impl CampaignScheduler {
    pub fn new(
        config: SchedulerConfig,
        storage: Arc<dyn fc_storage::StorageGateway>,
        queue: Arc<dyn fc_queue::QueuePublisher>,
    ) -> Self {
        let poller = ReadyCampaignPoller::new(config.batch_size, storage.clone(), queue);
        let stale_poller = StaleRunningCampaignPoller::new(config.stale_threshold, config.batch_size, storage);
        Self {
            config,
            poller,
            stale_poller,
            running: Arc::new(RwLock::new(false)),
        }
    }

    pub async fn start(&self) {
        if !self.config.enabled {
            info!("campaign scheduler is disabled");
            return;
        }

        let mut running = self.running.write().await;
        if *running {
            warn!("scheduler already running");
            return;
        }
        *running = true;
        drop(running);

        info!(
            poll_interval_ms = self.config.poll_interval.as_millis(),
            batch_size = self.config.batch_size,
            "starting campaign scheduler"
        );

        let poller = self.poller.clone();
        let poll_interval = self.config.poll_interval;
        let running_clone = self.running.clone();
        tokio::spawn(async move {
            let mut ticker = interval(poll_interval);
            loop {
                ticker.tick().await;
                if !*running_clone.read().await {
                    break;
                }
                if let Err(e) = poller.poll().await {
                    error!(error = %e, "error polling ready campaigns");
                }
            }
        });

        let stale_poller = self.stale_poller.clone();
        let stale_interval = self.config.stale_sweep_interval;
        let running_clone2 = self.running.clone();
        tokio::spawn(async move {
            let mut ticker = interval(stale_interval);
            loop {
                ticker.tick().await;
                if !*running_clone2.read().await {
                    break;
                }
                if let Err(e) = stale_poller.recover_stale_campaigns().await {
                    error!(error = %e, "error recovering stale running campaigns");
                }
            }
        });
    }

    pub async fn stop(&self) {
        let mut running = self.running.write().await;
        *running = false;
        info!("campaign scheduler stopped");
    }

    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }
}
