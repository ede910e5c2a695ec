use thiserror::Error;

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("storage error: {0}")]
    Storage(#[from] fc_storage::StorageError),

    #[error("advisory lock error: {0}")]
    Lock(#[from] fc_lock::LockError),

    #[error("campaign {0} not found")]
    CampaignNotFound(String),

    #[error("template {0} not found")]
    TemplateNotFound(String),

    #[error("campaign {0} is not RUNNING")]
    NotRunning(String),

    #[error("campaign {0} is already owned by another worker")]
    AlreadyOwned(String),
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;
