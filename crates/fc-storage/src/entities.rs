//! Entity shapes for the transactional store (§3).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use fc_common::{Channel, CampaignStatus, ConsentState, MessageStatus, SegmentPredicate};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub phone: String,
    pub attributes: HashMap<String, String>,
    pub consent_state: ConsentState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    pub name: String,
    pub channel: Channel,
    pub locale: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Segment {
    pub name: String,
    pub predicate: SegmentPredicate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    pub id: String,
    pub topic: String,
    pub template_name: String,
    pub segment_name: Option<String>,
    pub status: CampaignStatus,
    pub rate_limit_per_second: u32,
    /// Wall-clock `HH:MM`.
    pub quiet_hours_start: Option<String>,
    pub quiet_hours_end: Option<String>,
    pub schedule_time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub campaign_id: String,
    pub phone: String,
    pub template_name: String,
    pub content: String,
    pub channel: Channel,
    pub status: MessageStatus,
    pub provider_sid: Option<String>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundEvent {
    pub id: String,
    pub raw_payload: String,
    pub channel: Option<Channel>,
    pub phone: Option<String>,
    pub body: Option<String>,
    pub provider_message_id: Option<String>,
    pub user_phone: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewInboundEvent {
    pub raw_payload: String,
    pub channel: Option<Channel>,
    pub phone: Option<String>,
    pub body: Option<String>,
    pub provider_message_id: Option<String>,
    pub user_phone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryReceipt {
    pub id: String,
    pub raw_payload: String,
    pub provider_message_id: String,
    pub status: String,
    pub error_code: Option<String>,
    pub message_id: Option<String>,
    pub reconciled: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewDeliveryReceipt {
    pub raw_payload: String,
    pub provider_message_id: String,
    pub status: String,
    pub error_code: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub user_phone: String,
    pub topic: String,
    pub opted_in: bool,
}

/// Aggregated per-campaign reporting (§7): totals, skip-reason counts, sent,
/// failed with top error codes, delivery rate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CampaignReport {
    pub campaign_id: String,
    pub status_counts: HashMap<String, i64>,
    pub top_error_codes: Vec<(String, i64)>,
}

/// Who is calling `upsert_user` — the Consent Engine is the only caller
/// allowed to move a `STOP` user, per §4.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsentCaller {
    ConsentEngine,
    Other,
}

/// Outcome of a provider dispatch attempt, written back by the Orchestrator.
#[derive(Debug, Clone)]
pub enum DispatchOutcome {
    Sent {
        provider_sid: String,
    },
    Failed {
        error_code: Option<String>,
        error_message: Option<String>,
    },
}

#[derive(Debug, Clone, Default)]
pub struct RecipientPage {
    pub users: Vec<User>,
    pub next_cursor: Option<String>,
}
