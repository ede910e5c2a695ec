//! Error types for the advisory lock module

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LockError {
    #[error("Redis connection error: {0}")]
    Connection(String),

    #[error("Redis operation error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Lock already held by another owner")]
    AlreadyHeld,

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, LockError>;
