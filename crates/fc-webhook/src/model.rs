//! Request/response shapes for the webhook and trigger endpoints (§6).

use serde::{Deserialize, Serialize};

/// Form-encoded body posted by the provider for an inbound message.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundWebhookForm {
    #[serde(rename = "MessageSid")]
    pub message_sid: Option<String>,
    #[serde(rename = "From")]
    pub from: String,
    #[serde(rename = "To")]
    pub to: Option<String>,
    #[serde(rename = "Body")]
    pub body: Option<String>,
    #[serde(rename = "ProfileName")]
    pub profile_name: Option<String>,
    #[serde(rename = "WaId")]
    pub wa_id: Option<String>,
}

/// Form-encoded body posted by the provider for a delivery-status callback.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusWebhookForm {
    #[serde(rename = "MessageSid")]
    pub message_sid: String,
    #[serde(rename = "MessageStatus")]
    pub message_status: String,
    #[serde(rename = "ErrorCode")]
    pub error_code: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TriggerCampaignRequest {
    pub segment_id: Option<String>,
    #[serde(default)]
    pub immediate: bool,
    #[serde(default)]
    pub dry_run: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct TriggerCampaignResponse {
    pub job_id: String,
    pub campaign_id: String,
    pub dry_run: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}
