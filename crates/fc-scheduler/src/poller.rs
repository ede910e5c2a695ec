//! Promotes `READY` campaigns whose `schedule_time` has arrived to
//! `RUNNING` and hands them off to the orchestrator job queue (§4.9).

use std::sync::Arc;

use fc_common::CampaignStatus;
use fc_queue::{CampaignJob, QueuePublisher};
use fc_storage::StorageGateway;
use tracing::{debug, info, warn};

use crate::SchedulerError;

#[derive(Clone)]
pub struct ReadyCampaignPoller {
    batch_size: u32,
    storage: Arc<dyn StorageGateway>,
    queue: Arc<dyn QueuePublisher>,
}

impl ReadyCampaignPoller {
    pub fn new(
        batch_size: u32,
        storage: Arc<dyn StorageGateway>,
        queue: Arc<dyn QueuePublisher>,
    ) -> Self {
        Self {
            batch_size,
            storage,
            queue,
        }
    }

    pub async fn poll(&self) -> Result<usize, SchedulerError> {
        let due = self
            .storage
            .due_ready_campaigns(chrono::Utc::now(), self.batch_size)
            .await?;
        if due.is_empty() {
            debug!("no due campaigns to promote");
            return Ok(0);
        }

        metrics::gauge!("scheduler.due_campaigns").set(due.len() as f64);
        let mut promoted = 0;
        for campaign in due {
            let won = self
                .storage
                .transition_campaign_status(&campaign.id, CampaignStatus::Ready, CampaignStatus::Running)
                .await?;
            if !won {
                metrics::counter!("scheduler.promotion_races_lost_total").increment(1);
                continue;
            }

            let job = CampaignJob {
                campaign_id: campaign.id.clone(),
                segment_id: campaign.segment_name.clone(),
                dry_run: false,
            };

            match self.queue.publish(&campaign.id, job).await {
                Ok(_) => {
                    info!(campaign_id = %campaign.id, "promoted campaign to RUNNING and enqueued job");
                    metrics::counter!("scheduler.campaigns_promoted_total").increment(1);
                    promoted += 1;
                }
                Err(e) => {
                    warn!(campaign_id = %campaign.id, error = %e, "failed to enqueue promoted campaign");
                    metrics::counter!("scheduler.enqueue_errors_total").increment(1);
                }
            }
        }
        Ok(promoted)
    }
}
