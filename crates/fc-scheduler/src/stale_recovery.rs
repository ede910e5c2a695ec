//! Finds campaigns stuck in `RUNNING` past the staleness threshold — the
//! orchestrator worker that owned them died without reaching a terminal
//! state — and gives them back to `READY` so the next sweep can retry them
//! (§4.9).

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use fc_common::CampaignStatus;
use fc_storage::StorageGateway;
use tracing::{debug, info, warn};

use crate::SchedulerError;

#[derive(Clone)]
pub struct StaleRunningCampaignPoller {
    stale_threshold: Duration,
    batch_size: u32,
    storage: Arc<dyn StorageGateway>,
}

impl StaleRunningCampaignPoller {
    pub fn new(stale_threshold: Duration, batch_size: u32, storage: Arc<dyn StorageGateway>) -> Self {
        Self {
            stale_threshold,
            batch_size,
            storage,
        }
    }

    /// Revert campaigns whose `updated_at` hasn't moved in `stale_threshold`
    /// back to `READY`. Uses the same conditional transition the promotion
    /// poller uses, so a worker that wakes up mid-sweep can't race itself.
    pub async fn recover_stale_campaigns(&self) -> Result<usize, SchedulerError> {
        let threshold = Utc::now()
            - chrono::Duration::from_std(self.stale_threshold).unwrap_or_else(|_| chrono::Duration::minutes(15));

        let stale = self.storage.stale_running_campaigns(threshold, self.batch_size).await?;
        if stale.is_empty() {
            debug!("no stale running campaigns to recover");
            return Ok(0);
        }

        let mut recovered = 0;
        for campaign in &stale {
            let reverted = self
                .storage
                .transition_campaign_status(&campaign.id, CampaignStatus::Running, CampaignStatus::Ready)
                .await?;
            if reverted {
                warn!(campaign_id = %campaign.id, "reverted stale running campaign to ready");
                recovered += 1;
            }
        }

        metrics::counter!("scheduler.stale_campaigns.recovered_total").increment(recovered as u64);
        metrics::gauge!("scheduler.stale_campaigns.last_recovery_count").set(recovered as f64);

        if recovered > 0 {
            info!(
                count = recovered,
                threshold_mins = self.stale_threshold.as_secs() / 60,
                "recovered stale running campaigns"
            );
        }
        Ok(recovered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_converts_to_chrono_duration() {
        let threshold = Duration::from_secs(15 * 60);
        let converted = chrono::Duration::from_std(threshold).unwrap();
        assert_eq!(converted.num_minutes(), 15);
    }
}
