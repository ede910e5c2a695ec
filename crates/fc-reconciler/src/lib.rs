//! Joins delivery receipts to messages by provider id and advances the
//! message state machine (§4.8). Runs both synchronously after each receipt
//! commit and as a periodic sweep over receipts that raced the Message
//! insert (the provider's webhook can arrive before the Orchestrator's own
//! write lands).

pub mod error;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use fc_common::MessageStatus;
use fc_storage::{DeliveryReceipt, StorageGateway};
use tracing::{debug, info, warn};

pub use error::{ReconcilerError, Result};

/// Map a provider-reported receipt status to the message transition table
/// in §4.8. `None` means the status string is unrecognized and the receipt
/// is retained but not acted on.
pub fn map_receipt_status(status: &str) -> Option<MessageStatus> {
    match status.to_lowercase().as_str() {
        "queued" => Some(MessageStatus::Queued),
        "sending" => Some(MessageStatus::Sending),
        "sent" => Some(MessageStatus::Sent),
        "delivered" => Some(MessageStatus::Delivered),
        "read" => Some(MessageStatus::Read),
        "failed" => Some(MessageStatus::Failed),
        "undelivered" => Some(MessageStatus::Undelivered),
        _ => None,
    }
}

pub struct Reconciler {
    storage: Arc<dyn StorageGateway>,
}

impl Reconciler {
    pub fn new(storage: Arc<dyn StorageGateway>) -> Self {
        Self { storage }
    }

    /// Attempt to reconcile one receipt against its Message. Returns `true`
    /// if the Message was found and the state transition was (or already
    /// had been) applied; `false` if the Message doesn't exist yet (the
    /// receipt stays unreconciled for the next sweep) or the transition was
    /// rejected as a regression.
    pub async fn reconcile_receipt(&self, receipt: &DeliveryReceipt) -> Result<bool> {
        let Some(next_status) = map_receipt_status(&receipt.status) else {
            warn!(status = %receipt.status, "unrecognized receipt status, leaving unreconciled");
            return Ok(false);
        };

        let message = self
            .storage
            .get_message_by_provider_sid(&receipt.provider_message_id)
            .await?;
        let Some(message) = message else {
            debug!(provider_sid = %receipt.provider_message_id, "no message yet for receipt, deferring");
            return Ok(false);
        };

        let delivered_at = matches!(next_status, MessageStatus::Delivered).then(Utc::now);
        let advanced = self
            .storage
            .advance_message_state(&message.id, next_status, delivered_at)
            .await?;

        if advanced || message.status == next_status {
            self.storage
                .mark_receipt_reconciled(&receipt.id, &message.id)
                .await?;
            metrics::counter!("reconciler.receipts_reconciled_total").increment(1);
            Ok(true)
        } else {
            debug!(
                message_id = %message.id,
                current = ?message.status,
                attempted = ?next_status,
                "out-of-order receipt ignored"
            );
            metrics::counter!("reconciler.receipts_rejected_total").increment(1);
            Ok(false)
        }
    }

    /// Periodic sweep over receipts that raced message creation, or were
    /// left unreconciled after a transient storage error.
    pub async fn sweep_unreconciled(&self, lookback: DateTime<Utc>, limit: u32) -> Result<usize> {
        let receipts = self.storage.unreconciled_receipts(lookback, limit).await?;
        let mut reconciled = 0;
        for receipt in &receipts {
            if self.reconcile_receipt(receipt).await? {
                reconciled += 1;
            }
        }
        if reconciled > 0 {
            info!(reconciled, scanned = receipts.len(), "orphan receipt sweep reconciled receipts");
        }
        Ok(reconciled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_known_statuses() {
        assert_eq!(map_receipt_status("delivered"), Some(MessageStatus::Delivered));
        assert_eq!(map_receipt_status("FAILED"), Some(MessageStatus::Failed));
    }

    #[test]
    fn unknown_status_maps_to_none() {
        assert_eq!(map_receipt_status("bogus"), None);
    }
}
