//! Webhook Ingestor (§4.7) and Trigger API (§6). The inbound and status
//! endpoints share one durability contract — persist the raw row before
//! acknowledging the provider — and the provider is always given a 200 so
//! it never retries into a storm; the Trigger API is the one endpoint here
//! that is allowed to fail loudly, since it's operator-facing.

pub mod error;
pub mod model;

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use fc_common::{extract_channel_and_phone, CampaignStatus};
use fc_consent::{classify_intent, normalize_body, profile_attributes, Intent};
use fc_queue::{CampaignJob, QueuePublisher};
use fc_reconciler::Reconciler;
use fc_storage::{ConsentCaller, NewDeliveryReceipt, NewInboundEvent, StorageGateway};
use tracing::{debug, error, info, warn};

pub use error::{Result, WebhookError};
use model::{
    HealthResponse, InboundWebhookForm, StatusWebhookForm, TriggerCampaignRequest,
    TriggerCampaignResponse,
};

#[derive(Debug, Clone)]
pub struct WebhookSigningConfig {
    pub signing_secret: String,
    pub require_signature: bool,
}

impl From<&fc_config::WebhookConfig> for WebhookSigningConfig {
    fn from(cfg: &fc_config::WebhookConfig) -> Self {
        Self {
            signing_secret: cfg.signing_secret.clone(),
            require_signature: cfg.require_signature,
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<dyn StorageGateway>,
    pub queue: Arc<dyn QueuePublisher>,
    pub reconciler: Arc<Reconciler>,
    pub signing: WebhookSigningConfig,
}

impl AppState {
    pub fn new(
        storage: Arc<dyn StorageGateway>,
        queue: Arc<dyn QueuePublisher>,
        signing: WebhookSigningConfig,
    ) -> Self {
        let reconciler = Arc::new(Reconciler::new(storage.clone()));
        Self { storage, queue, reconciler, signing }
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/q/health", get(health_handler))
        .route("/q/health/live", get(liveness_probe))
        .route("/q/health/ready", get(readiness_probe))
        .route("/webhooks/inbound", post(inbound_webhook))
        .route("/webhooks/status", post(status_webhook))
        .route("/campaigns/:id/trigger", post(trigger_campaign))
        .with_state(state)
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse { status: "UP" })
}

async fn liveness_probe() -> Json<HealthResponse> {
    Json(HealthResponse { status: "UP" })
}

async fn readiness_probe() -> Json<HealthResponse> {
    Json(HealthResponse { status: "UP" })
}

/// Verify the ambient HMAC signature, if the deployment requires it (§10).
/// A missing/invalid signature is treated the same as a malformed payload:
/// dropped with a warn log, never surfaced to the provider as an error.
fn signature_is_valid(signing: &WebhookSigningConfig, headers: &HeaderMap, body: &str) -> bool {
    if !signing.require_signature {
        return true;
    }
    let Some(sig) = headers.get(fc_provider::signing::SIGNATURE_HEADER).and_then(|v| v.to_str().ok()) else {
        return false;
    };
    let Some(ts) = headers.get(fc_provider::signing::TIMESTAMP_HEADER).and_then(|v| v.to_str().ok()) else {
        return false;
    };
    fc_provider::signing::verify(body, ts, sig, &signing.signing_secret)
}

/// §4.7 inbound path: extract+normalize, persist raw row, apply consent on
/// a STOP/START match, commit, always ack 200.
async fn inbound_webhook(State(state): State<AppState>, headers: HeaderMap, body: axum::body::Bytes) -> Response {
    let body_str = String::from_utf8_lossy(&body).into_owned();

    if !signature_is_valid(&state.signing, &headers, &body_str) {
        warn!("inbound webhook signature invalid, dropping");
        return StatusCode::OK.into_response();
    }

    let form: InboundWebhookForm = match serde_urlencoded::from_str(&body_str) {
        Ok(form) => form,
        Err(e) => {
            warn!(error = %e, "inbound webhook payload did not parse, dropping");
            return StatusCode::OK.into_response();
        }
    };

    let Some((channel, phone)) = extract_channel_and_phone(&form.from) else {
        warn!(from = %form.from, "inbound webhook sender did not normalize to E.164, dropping");
        return StatusCode::OK.into_response();
    };
    let phone = phone.as_str().to_string();

    let event = NewInboundEvent {
        raw_payload: body_str,
        channel: Some(channel),
        phone: Some(phone.clone()),
        body: form.body.clone(),
        provider_message_id: form.message_sid.clone(),
        user_phone: Some(phone.clone()),
    };
    if let Err(e) = state.storage.insert_inbound_event(event).await {
        error!(phone = %phone, error = %e, "failed to persist inbound event, acking anyway");
        metrics::counter!("webhook.inbound.persist_errors_total").increment(1);
        return StatusCode::OK.into_response();
    }

    let attrs = profile_attributes(form.profile_name.as_deref(), form.wa_id.as_deref());
    if let Err(e) = state.storage.upsert_user(&phone, attrs, ConsentCaller::Other).await {
        warn!(phone = %phone, error = %e, "failed to merge profile attributes");
    }

    if let Some(body) = &form.body {
        let normalized = normalize_body(body);
        let intent = classify_intent(&normalized);
        if intent != Intent::None {
            if let Ok(Some(user)) = state.storage.get_user(&phone).await {
                if let Some(next_state) = fc_consent::apply_intent(user.consent_state, intent) {
                    if let Err(e) = state.storage.set_consent_state(&phone, next_state).await {
                        error!(phone = %phone, error = %e, "failed to apply consent update");
                    } else {
                        info!(phone = %phone, ?next_state, "consent state updated from inbound intent");
                    }
                }
            }
        }
    }

    metrics::counter!("webhook.inbound.processed_total").increment(1);
    StatusCode::OK.into_response()
}

/// §4.7 receipt path: persist raw row, reconcile synchronously, always ack
/// 200 regardless of the reconciliation outcome.
async fn status_webhook(State(state): State<AppState>, body: axum::body::Bytes) -> Response {
    let body_str = String::from_utf8_lossy(&body).into_owned();

    let form: StatusWebhookForm = match serde_urlencoded::from_str(&body_str) {
        Ok(form) => form,
        Err(e) => {
            warn!(error = %e, "status webhook payload did not parse, dropping");
            return StatusCode::OK.into_response();
        }
    };

    let receipt = NewDeliveryReceipt {
        raw_payload: body_str,
        provider_message_id: form.message_sid.clone(),
        status: form.message_status.clone(),
        error_code: form.error_code.clone(),
    };
    let receipt = match state.storage.insert_delivery_receipt(receipt).await {
        Ok(receipt) => receipt,
        Err(e) => {
            error!(sid = %form.message_sid, error = %e, "failed to persist delivery receipt, acking anyway");
            metrics::counter!("webhook.status.persist_errors_total").increment(1);
            return StatusCode::OK.into_response();
        }
    };

    match state.reconciler.reconcile_receipt(&receipt).await {
        Ok(true) => debug!(sid = %form.message_sid, "receipt reconciled inline"),
        Ok(false) => debug!(sid = %form.message_sid, "receipt left for the orphan sweep"),
        Err(e) => warn!(sid = %form.message_sid, error = %e, "inline reconciliation failed, deferring to sweep"),
    }

    StatusCode::OK.into_response()
}

/// `POST /campaigns/{id}/trigger` (§6): enqueue a job on the same durable
/// queue the scheduler uses, with `dedup_key = campaign_id` so a re-trigger
/// against an already-running campaign is a no-op at the queue layer and
/// the per-recipient duplicate guard (§4.10-e) makes it a no-op at the
/// message layer too.
async fn trigger_campaign(
    State(state): State<AppState>,
    Path(campaign_id): Path<String>,
    Json(req): Json<TriggerCampaignRequest>,
) -> Result<Json<TriggerCampaignResponse>> {
    let campaign = state
        .storage
        .get_campaign(&campaign_id)
        .await?
        .ok_or_else(|| WebhookError::CampaignNotFound(campaign_id.clone()))?;

    match campaign.status {
        CampaignStatus::Running => {}
        CampaignStatus::Ready => {
            let _ = state
                .storage
                .transition_campaign_status(&campaign_id, CampaignStatus::Ready, CampaignStatus::Running)
                .await?;
        }
        _ => return Err(WebhookError::NotRunning(campaign_id)),
    }

    let job = CampaignJob {
        campaign_id: campaign_id.clone(),
        segment_id: req.segment_id.or(campaign.segment_name),
        dry_run: req.dry_run,
    };
    let job_id = state.queue.publish(&campaign_id, job).await?;

    info!(campaign_id = %campaign_id, dry_run = req.dry_run, immediate = req.immediate, job_id = %job_id, "campaign triggered");
    metrics::counter!("webhook.trigger.requests_total").increment(1);

    Ok(Json(TriggerCampaignResponse { job_id, campaign_id, dry_run: req.dry_run }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_check_passes_through_when_not_required() {
        let signing = WebhookSigningConfig { signing_secret: String::new(), require_signature: false };
        assert!(signature_is_valid(&signing, &HeaderMap::new(), "anything"));
    }

    #[test]
    fn signature_check_rejects_missing_headers_when_required() {
        let signing = WebhookSigningConfig { signing_secret: "secret".to_string(), require_signature: true };
        assert!(!signature_is_valid(&signing, &HeaderMap::new(), "anything"));
    }

    #[test]
    fn signature_check_accepts_a_valid_signature() {
        let (sig, ts) = fc_provider::signing::sign("body", "secret");
        let mut headers = HeaderMap::new();
        headers.insert(fc_provider::signing::SIGNATURE_HEADER, sig.parse().unwrap());
        headers.insert(fc_provider::signing::TIMESTAMP_HEADER, ts.parse().unwrap());
        let signing = WebhookSigningConfig { signing_secret: "secret".to_string(), require_signature: true };
        assert!(signature_is_valid(&signing, &headers, "body"));
    }
}
