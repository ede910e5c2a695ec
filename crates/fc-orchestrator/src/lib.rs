//! The per-campaign worker (§4.10): the compliance-gated dispatch pipeline
//! that is the hard engineering core of this system. For a RUNNING
//! campaign, streams recipients from the Segment Evaluator and, for each,
//! runs consent -> quiet hours -> rate limit -> render -> materialize ->
//! dispatch, recording an outcome no matter what goes wrong for that one
//! recipient.

pub mod error;
pub mod quiet_hours;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use fc_common::{CampaignStatus, ConsentState, SkipReason};
use fc_lock::AdvisoryLockManager;
use fc_provider::ProviderAdapter;
use fc_ratelimiter::RateLimiter;
use fc_storage::{ConsentCaller, DispatchOutcome, Message, StorageGateway};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub use error::{OrchestratorError, Result};

/// Per-campaign-run summary, surfaced verbatim as the Trigger API response
/// and folded into `StorageGateway::campaign_report` (§7).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CampaignRunResult {
    pub campaign_id: String,
    pub dry_run: bool,
    pub total_recipients: u64,
    pub sent: u64,
    pub failed: u64,
    pub skipped: HashMap<String, u64>,
    pub final_status: Option<CampaignStatus>,
}

impl CampaignRunResult {
    fn new(campaign_id: String, dry_run: bool) -> Self {
        Self {
            campaign_id,
            dry_run,
            ..Default::default()
        }
    }

    fn record_skip(&mut self, reason: SkipReason) {
        *self.skipped.entry(reason.counter_name().to_string()).or_insert(0) += 1;
        metrics::counter!(reason.counter_name()).increment(1);
    }
}

pub struct OrchestratorConfig {
    pub cursor_page_size: u32,
    pub lock_ttl_seconds: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            cursor_page_size: 200,
            lock_ttl_seconds: 30,
        }
    }
}

pub struct CampaignOrchestrator {
    config: OrchestratorConfig,
    storage: Arc<dyn StorageGateway>,
    rate_limiter: RateLimiter,
    provider: Arc<dyn ProviderAdapter>,
    lock_manager: Arc<AdvisoryLockManager>,
}

impl CampaignOrchestrator {
    pub fn new(
        config: OrchestratorConfig,
        storage: Arc<dyn StorageGateway>,
        rate_limiter: RateLimiter,
        provider: Arc<dyn ProviderAdapter>,
        lock_manager: Arc<AdvisoryLockManager>,
    ) -> Self {
        Self {
            config,
            storage,
            rate_limiter,
            provider,
            lock_manager,
        }
    }

    fn lock_key(campaign_id: &str) -> String {
        format!("campaign:{campaign_id}")
    }

    /// Run one campaign to completion (or failure). Acquires the
    /// campaign-level advisory lock for the duration so at most one worker
    /// ever touches this campaign concurrently (§5).
    pub async fn run_campaign(&self, campaign_id: &str, dry_run: bool) -> Result<CampaignRunResult> {
        let lock_key = Self::lock_key(campaign_id);
        let Some(lock) = self.lock_manager.try_acquire(&lock_key).await? else {
            warn!(campaign_id, "campaign already owned by another worker, skipping");
            return Err(OrchestratorError::AlreadyOwned(campaign_id.to_string()));
        };

        let outcome = self.run_campaign_locked(campaign_id, dry_run).await;
        lock.release().await;
        outcome
    }

    async fn run_campaign_locked(&self, campaign_id: &str, dry_run: bool) -> Result<CampaignRunResult> {
        let mut result = CampaignRunResult::new(campaign_id.to_string(), dry_run);

        let campaign = match self.storage.get_campaign(campaign_id).await? {
            Some(c) => c,
            None => return Err(OrchestratorError::CampaignNotFound(campaign_id.to_string())),
        };
        if campaign.status != CampaignStatus::Running {
            return Err(OrchestratorError::NotRunning(campaign_id.to_string()));
        }

        let fail_campaign = |e: &OrchestratorError| {
            error!(campaign_id, error = %e, "campaign run hit a fatal error");
        };

        let template = match self.storage.get_template(&campaign.template_name).await? {
            Some(t) => t,
            None => {
                let e = OrchestratorError::TemplateNotFound(campaign.template_name.clone());
                fail_campaign(&e);
                let _ = self
                    .storage
                    .transition_campaign_status(campaign_id, CampaignStatus::Running, CampaignStatus::Failed)
                    .await;
                return Err(e);
            }
        };

        let segment = match &campaign.segment_name {
            Some(name) => self.storage.get_segment(name).await?,
            None => None,
        };

        let mut cursor: Option<String> = None;
        loop {
            let page = self
                .storage
                .fetch_recipients_page(segment.as_ref(), cursor.as_deref(), self.config.cursor_page_size)
                .await?;
            if page.users.is_empty() {
                break;
            }

            for user in &page.users {
                result.total_recipients += 1;
                self.process_recipient(&campaign, &template, user, dry_run, &mut result)
                    .await;
            }

            cursor = page.next_cursor;
            if cursor.is_none() {
                break;
            }
        }

        let final_status = if dry_run {
            None
        } else {
            self.storage
                .transition_campaign_status(campaign_id, CampaignStatus::Running, CampaignStatus::Completed)
                .await?;
            Some(CampaignStatus::Completed)
        };
        result.final_status = final_status;

        info!(
            campaign_id,
            dry_run,
            total = result.total_recipients,
            sent = result.sent,
            failed = result.failed,
            "campaign run finished"
        );
        Ok(result)
    }

    async fn process_recipient(
        &self,
        campaign: &fc_storage::Campaign,
        template: &fc_storage::Template,
        user: &fc_storage::User,
        dry_run: bool,
        result: &mut CampaignRunResult,
    ) {
        // a. Consent gate
        if user.consent_state != ConsentState::OptIn {
            debug!(phone = %user.phone, "skipped: consent state is not OPT_IN");
            result.record_skip(SkipReason::OptOut);
            return;
        }

        // b. Quiet-hours gate
        if let (Some(start), Some(end)) = (&campaign.quiet_hours_start, &campaign.quiet_hours_end) {
            let timezone = user.attributes.get("timezone").map(String::as_str);
            if quiet_hours::in_quiet_hours(start, end, Utc::now(), timezone) {
                debug!(phone = %user.phone, "skipped: quiet hours");
                result.record_skip(SkipReason::QuietHours);
                return;
            }
        }

        // c. Rate-limit gate, one retry after a one-second backoff
        let mut decision = self
            .rate_limiter
            .check_and_increment(&campaign.id, campaign.rate_limit_per_second)
            .await;
        if !decision.allowed {
            tokio::time::sleep(Duration::from_secs(1)).await;
            decision = self
                .rate_limiter
                .check_and_increment(&campaign.id, campaign.rate_limit_per_second)
                .await;
        }
        if !decision.allowed {
            warn!(phone = %user.phone, campaign_id = %campaign.id, "skipped: rate limit");
            result.record_skip(SkipReason::RateLimit);
            return;
        }

        // d. Render
        let content = match fc_template::render(&template.content, &user.attributes) {
            Ok(content) => content,
            Err(e) => {
                warn!(phone = %user.phone, error = %e, "skipped: missing template data");
                result.record_skip(SkipReason::MissingTemplateData);
                return;
            }
        };

        // e. Materialize. Dry runs skip the write but still count the
        // recipient as if dispatch had occurred, so the report shape
        // matches a real run.
        if dry_run {
            result.sent += 1;
            return;
        }

        let message = Message {
            id: Uuid::new_v4().to_string(),
            campaign_id: campaign.id.clone(),
            phone: user.phone.clone(),
            template_name: template.name.clone(),
            content: content.clone(),
            channel: template.channel,
            status: fc_common::MessageStatus::Queued,
            provider_sid: None,
            error_code: None,
            error_message: None,
            created_at: Utc::now(),
            sent_at: None,
            delivered_at: None,
        };

        let created = match self.storage.create_message_if_absent(message).await {
            Ok(created) => created,
            Err(e) => {
                warn!(phone = %user.phone, error = %e, "storage error materializing message");
                result.failed += 1;
                return;
            }
        };
        let Some(message) = created else {
            debug!(phone = %user.phone, campaign_id = %campaign.id, "skipped: duplicate message");
            result.record_skip(SkipReason::Duplicate);
            return;
        };

        // f. Dispatch
        let send_result = self.provider.send(&message.phone, &message.content, message.channel).await;
        let outcome = if send_result.success {
            result.sent += 1;
            DispatchOutcome::Sent {
                provider_sid: send_result.provider_sid.unwrap_or_default(),
            }
        } else {
            result.failed += 1;
            DispatchOutcome::Failed {
                error_code: send_result.error_code,
                error_message: send_result.error_message,
            }
        };

        if let Err(e) = self.storage.update_message_dispatch_result(&message.id, outcome).await {
            error!(message_id = %message.id, error = %e, "failed to persist dispatch result");
        }
    }

    /// Upsert a User with `ConsentCaller::Other`, used by bulk-import
    /// flows that precede campaign execution. Exposed here rather than in
    /// fc-storage directly so callers go through one seam with the
    /// consent-stickiness rule documented in one place.
    pub async fn upsert_recipient(
        &self,
        phone: &str,
        attributes: HashMap<String, String>,
    ) -> std::result::Result<fc_storage::User, fc_storage::StorageError> {
        self.storage.upsert_user(phone, attributes, ConsentCaller::Other).await
    }
}
