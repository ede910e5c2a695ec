//! Core enums shared by every crate that touches Users, Messages, or
//! Campaigns. State-machine transition tables live beside the type they
//! describe so the graph in the spec has one executable source of truth.

use serde::{Deserialize, Serialize};

/// §3: consent lifecycle. `Stop` is sticky — bulk import/upsert must never
/// silently move a user out of it; only an explicit inbound START does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConsentState {
    OptIn,
    OptOut,
    Stop,
}

impl ConsentState {
    pub fn as_str(self) -> &'static str {
        match self {
            ConsentState::OptIn => "OPT_IN",
            ConsentState::OptOut => "OPT_OUT",
            ConsentState::Stop => "STOP",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "OPT_IN" => Some(ConsentState::OptIn),
            "OPT_OUT" => Some(ConsentState::OptOut),
            "STOP" => Some(ConsentState::Stop),
            _ => None,
        }
    }
}

/// §4.8/§8: message delivery state. Transitions are monotonic along
/// `Queued -> Sending -> Sent -> Delivered -> Read`, with `Failed`/
/// `Undelivered` absorbing from any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageStatus {
    Queued,
    Sending,
    Sent,
    Delivered,
    Read,
    Failed,
    Undelivered,
}

impl MessageStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageStatus::Queued => "QUEUED",
            MessageStatus::Sending => "SENDING",
            MessageStatus::Sent => "SENT",
            MessageStatus::Delivered => "DELIVERED",
            MessageStatus::Read => "READ",
            MessageStatus::Failed => "FAILED",
            MessageStatus::Undelivered => "UNDELIVERED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "QUEUED" => Some(MessageStatus::Queued),
            "SENDING" => Some(MessageStatus::Sending),
            "SENT" => Some(MessageStatus::Sent),
            "DELIVERED" => Some(MessageStatus::Delivered),
            "READ" => Some(MessageStatus::Read),
            "FAILED" => Some(MessageStatus::Failed),
            "UNDELIVERED" => Some(MessageStatus::Undelivered),
            _ => None,
        }
    }

    /// Rank along the forward graph; `Failed`/`Undelivered` are terminal
    /// absorbing states reachable from any rank.
    fn rank(self) -> Option<u8> {
        match self {
            MessageStatus::Queued => Some(0),
            MessageStatus::Sending => Some(1),
            MessageStatus::Sent => Some(2),
            MessageStatus::Delivered => Some(3),
            MessageStatus::Read => Some(4),
            MessageStatus::Failed | MessageStatus::Undelivered => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            MessageStatus::Read | MessageStatus::Failed | MessageStatus::Undelivered
        )
    }

    /// True if moving from `self` to `next` is an allowed, non-regressing
    /// transition per the Reconciler's state graph (§4.8).
    pub fn can_advance_to(self, next: MessageStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        match (self.rank(), next.rank()) {
            (Some(from), Some(to)) => to >= from,
            // Failed/Undelivered absorb from any non-terminal state.
            (Some(_), None) => true,
            _ => false,
        }
    }
}

/// §4.9: campaign lifecycle. Allowed transitions are exactly the directed
/// edges in the spec's state diagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CampaignStatus {
    Draft,
    Ready,
    Running,
    Completed,
    Paused,
    Failed,
}

impl CampaignStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CampaignStatus::Draft => "DRAFT",
            CampaignStatus::Ready => "READY",
            CampaignStatus::Running => "RUNNING",
            CampaignStatus::Completed => "COMPLETED",
            CampaignStatus::Paused => "PAUSED",
            CampaignStatus::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "DRAFT" => Some(CampaignStatus::Draft),
            "READY" => Some(CampaignStatus::Ready),
            "RUNNING" => Some(CampaignStatus::Running),
            "COMPLETED" => Some(CampaignStatus::Completed),
            "PAUSED" => Some(CampaignStatus::Paused),
            "FAILED" => Some(CampaignStatus::Failed),
            _ => None,
        }
    }

    pub fn can_transition_to(self, next: CampaignStatus) -> bool {
        use CampaignStatus::*;
        matches!(
            (self, next),
            (Draft, Ready)
                | (Ready, Running)
                | (Running, Completed)
                | (Running, Paused)
                | (Paused, Running)
                | (Running, Failed)
                | (Ready, Failed)
                // Operator retry after a FAILED run (§4.10), and the
                // stale-running sweep giving up on a worker that vanished
                // mid-campaign (§4.9) both re-enter at READY.
                | (Failed, Ready)
                | (Running, Ready)
        )
    }
}

/// Per-recipient skip reasons surfaced in campaign reporting (§7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    OptOut,
    QuietHours,
    RateLimit,
    MissingTemplateData,
    Duplicate,
}

impl SkipReason {
    pub fn counter_name(self) -> &'static str {
        match self {
            SkipReason::OptOut => "skipped.opt_out",
            SkipReason::QuietHours => "skipped.quiet_hours",
            SkipReason::RateLimit => "skipped.rate_limit",
            SkipReason::MissingTemplateData => "skipped.missing_template_data",
            SkipReason::Duplicate => "skipped.duplicate",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_status_advances_forward() {
        assert!(MessageStatus::Queued.can_advance_to(MessageStatus::Sending));
        assert!(MessageStatus::Queued.can_advance_to(MessageStatus::Delivered));
    }

    #[test]
    fn message_status_rejects_regression() {
        assert!(!MessageStatus::Delivered.can_advance_to(MessageStatus::Sent));
    }

    #[test]
    fn message_status_allows_absorb_from_any_state() {
        assert!(MessageStatus::Sending.can_advance_to(MessageStatus::Failed));
        assert!(MessageStatus::Queued.can_advance_to(MessageStatus::Undelivered));
    }

    #[test]
    fn message_status_terminal_is_frozen() {
        assert!(!MessageStatus::Failed.can_advance_to(MessageStatus::Sent));
        assert!(!MessageStatus::Read.can_advance_to(MessageStatus::Delivered));
    }

    #[test]
    fn campaign_status_rejects_skip_from_draft_to_running() {
        assert!(!CampaignStatus::Draft.can_transition_to(CampaignStatus::Running));
    }

    #[test]
    fn campaign_status_allows_pause_resume() {
        assert!(CampaignStatus::Running.can_transition_to(CampaignStatus::Paused));
        assert!(CampaignStatus::Paused.can_transition_to(CampaignStatus::Running));
    }
}
