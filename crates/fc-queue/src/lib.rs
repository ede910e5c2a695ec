//! Durably persisted local job queue used for the Scheduler/trigger-API ->
//! Orchestrator hand-off (§5): "the Scheduler and the trigger API both
//! enqueue onto the same durably-persisted local job queue ... rather than
//! calling the Orchestrator in-process, so a crashed orchestrator worker
//! does not lose a job."

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub mod error;
pub mod sqlite;

pub use error::QueueError;

pub type Result<T> = std::result::Result<T, QueueError>;

/// A campaign dispatch job enqueued by the Scheduler or the trigger API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignJob {
    pub campaign_id: String,
    pub segment_id: Option<String>,
    pub dry_run: bool,
}

/// A job handed back by `poll`, carrying the receipt handle needed to
/// ack/nack/extend it.
#[derive(Debug, Clone)]
pub struct QueuedJob {
    pub job: CampaignJob,
    pub receipt_handle: String,
}

/// Queue metrics for monitoring
#[derive(Debug, Clone, Default)]
pub struct QueueMetrics {
    pub pending_jobs: u64,
    pub in_flight_jobs: u64,
    pub queue_identifier: String,
}

/// Trait for consuming jobs from a queue
#[async_trait]
pub trait QueueConsumer: Send + Sync {
    fn identifier(&self) -> &str;

    async fn poll(&self, max_jobs: u32) -> Result<Vec<QueuedJob>>;

    async fn ack(&self, receipt_handle: &str) -> Result<()>;

    /// Make the job visible again after `delay_seconds`.
    async fn nack(&self, receipt_handle: &str, delay_seconds: Option<u32>) -> Result<()>;

    async fn extend_visibility(&self, receipt_handle: &str, seconds: u32) -> Result<()>;

    fn is_healthy(&self) -> bool;

    async fn stop(&self);

    async fn get_metrics(&self) -> Result<Option<QueueMetrics>> {
        Ok(None)
    }
}

/// Trait for publishing jobs to a queue
#[async_trait]
pub trait QueuePublisher: Send + Sync {
    fn identifier(&self) -> &str;

    /// Publish a job. `dedup_key` (e.g. the campaign id for a scheduler
    /// sweep) makes re-publishing a no-op, the same idempotency guard
    /// `create_message_if_absent` gives the Orchestrator at the recipient
    /// level.
    async fn publish(&self, dedup_key: &str, job: CampaignJob) -> Result<String>;
}

/// Combined consumer and publisher for the embedded sqlite queue.
#[async_trait]
pub trait EmbeddedQueue: QueueConsumer + QueuePublisher {
    async fn init_schema(&self) -> Result<()>;
}
