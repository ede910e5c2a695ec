use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WebhookError {
    #[error("storage error: {0}")]
    Storage(#[from] fc_storage::StorageError),

    #[error("reconciler error: {0}")]
    Reconciler(#[from] fc_reconciler::ReconcilerError),

    #[error("queue error: {0}")]
    Queue(#[from] fc_queue::QueueError),

    #[error("campaign {0} not found")]
    CampaignNotFound(String),

    #[error("campaign {0} is not RUNNING")]
    NotRunning(String),
}

pub type Result<T> = std::result::Result<T, WebhookError>;

/// Only the Trigger API (an operator-facing endpoint) surfaces error status
/// codes. The inbound/status webhook handlers never route through this —
/// §4.7 requires them to always acknowledge 200, errors included.
impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let status = match &self {
            WebhookError::CampaignNotFound(_) => StatusCode::NOT_FOUND,
            WebhookError::NotRunning(_) => StatusCode::CONFLICT,
            WebhookError::Storage(_) | WebhookError::Reconciler(_) | WebhookError::Queue(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, self.to_string()).into_response()
    }
}
