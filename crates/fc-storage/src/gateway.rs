//! The `StorageGateway` trait is the single seam every other crate goes
//! through to touch Users, Templates, Segments, Campaigns, Messages, and the
//! raw webhook audit tables (§3, §4.1). It is deliberately narrow: callers
//! never see a `sqlx::Pool` or build SQL themselves.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fc_common::{CampaignStatus, MessageStatus};

use crate::entities::{
    Campaign, CampaignReport, ConsentCaller, DeliveryReceipt, DispatchOutcome, InboundEvent,
    Message, NewDeliveryReceipt, NewInboundEvent, RecipientPage, Segment, Subscription, Template,
    User,
};
use crate::error::Result;

#[async_trait]
pub trait StorageGateway: Send + Sync {
    /// Insert or merge a User's attributes (§4.1). `caller` gates whether a
    /// `STOP` consent state may be overwritten — only the Consent Engine may
    /// move a user out of it.
    async fn upsert_user(
        &self,
        phone: &str,
        attributes: std::collections::HashMap<String, String>,
        caller: ConsentCaller,
    ) -> Result<User>;

    async fn get_user(&self, phone: &str) -> Result<Option<User>>;

    /// Apply a consent state transition; sticky `Stop` is enforced by the
    /// caller (fc-consent), not here — this is a raw write.
    async fn set_consent_state(&self, phone: &str, state: fc_common::ConsentState) -> Result<()>;

    async fn get_template(&self, name: &str) -> Result<Option<Template>>;

    async fn get_segment(&self, name: &str) -> Result<Option<Segment>>;

    async fn get_campaign(&self, id: &str) -> Result<Option<Campaign>>;

    async fn create_campaign(&self, campaign: Campaign) -> Result<Campaign>;

    /// Conditional update — only succeeds if `campaign.status` still matches
    /// `expected_current`, preventing two schedulers from double-promoting
    /// the same campaign (§4.9). Returns `false` if no row matched.
    async fn transition_campaign_status(
        &self,
        id: &str,
        expected_current: CampaignStatus,
        next: CampaignStatus,
    ) -> Result<bool>;

    /// Campaigns in `READY` whose `schedule_time` has arrived (or is unset).
    async fn due_ready_campaigns(&self, now: DateTime<Utc>, limit: u32) -> Result<Vec<Campaign>>;

    /// Campaigns stuck in `RUNNING` past the staleness threshold (§4.9 sweep).
    async fn stale_running_campaigns(
        &self,
        stale_before: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<Campaign>>;

    /// Keyset-paginated recipient scan over Users matching a compiled segment
    /// predicate, ordered by `phone` so resumption is stable (§4.5).
    async fn fetch_recipients_page(
        &self,
        segment: Option<&Segment>,
        cursor: Option<&str>,
        page_size: u32,
    ) -> Result<RecipientPage>;

    /// Idempotent insert keyed on `(campaign_id, phone)`; returns `None` if a
    /// Message already exists for this recipient (duplicate-skip, §4.10).
    async fn create_message_if_absent(&self, message: Message) -> Result<Option<Message>>;

    async fn update_message_dispatch_result(
        &self,
        message_id: &str,
        outcome: DispatchOutcome,
    ) -> Result<()>;

    /// Advance a Message's status, enforcing `MessageStatus::can_advance_to`.
    /// Returns `false` if the transition was rejected (stale/out-of-order
    /// receipt, §4.8).
    async fn advance_message_state(
        &self,
        message_id: &str,
        next: MessageStatus,
        delivered_at: Option<DateTime<Utc>>,
    ) -> Result<bool>;

    async fn get_message_by_provider_sid(&self, provider_sid: &str) -> Result<Option<Message>>;

    async fn campaign_report(&self, campaign_id: &str) -> Result<CampaignReport>;

    async fn insert_inbound_event(&self, event: NewInboundEvent) -> Result<InboundEvent>;

    async fn insert_delivery_receipt(&self, receipt: NewDeliveryReceipt) -> Result<DeliveryReceipt>;

    /// Receipts whose `provider_message_id` hasn't yet been matched to a
    /// Message, within the orphan-sweep lookback window (§4.8 sweep).
    async fn unreconciled_receipts(
        &self,
        since: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<DeliveryReceipt>>;

    async fn mark_receipt_reconciled(&self, receipt_id: &str, message_id: &str) -> Result<()>;

    async fn get_subscription(&self, phone: &str, topic: &str) -> Result<Option<Subscription>>;

    async fn set_subscription(&self, phone: &str, topic: &str, opted_in: bool) -> Result<()>;

    async fn init_schema(&self) -> Result<()>;
}
