use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReconcilerError {
    #[error("storage error: {0}")]
    Storage(#[from] fc_storage::StorageError),
}

pub type Result<T> = std::result::Result<T, ReconcilerError>;
