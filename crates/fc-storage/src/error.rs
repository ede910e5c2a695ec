use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid segment predicate: {0}")]
    Segment(#[from] fc_segment::SegmentError),
}

pub type Result<T> = std::result::Result<T, StorageError>;

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StorageError::NotFound("row not found".to_string()),
            other => StorageError::Database(other.to_string()),
        }
    }
}

impl From<StorageError> for fc_common::DomainError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(msg) => fc_common::DomainError::NotFound(msg),
            StorageError::Conflict(msg) => fc_common::DomainError::Conflict(msg),
            other => fc_common::DomainError::Transient(other.to_string()),
        }
    }
}
